//! Core types for the package catalog.
//!
//! A package ("card game definition") is identified by its human name plus
//! an optional origin host. The id doubles as the on-disk directory name and
//! the catalog key.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

// ============================================================================
// Identity
// ============================================================================

/// Reserved name carried by provisional and corrupt packages.
///
/// A discovered directory bearing this name is purged, never cataloged.
pub const RESERVED_NAME: &str = "_INVALID_";

/// Separator between the name and origin parts of an id.
const HOST_SEPARATOR: char = '@';

/// Derives a package id from a name and an optional origin host.
pub fn derive_id(name: &str, host: Option<&str>) -> String {
    match host {
        Some(host) if !host.is_empty() => format!("{}{}{}", name, HOST_SEPARATOR, host),
        _ => name.to_string(),
    }
}

/// Splits an id (or directory name) back into `(name, host)`.
pub fn split_id(id: &str) -> (String, Option<String>) {
    match id.rsplit_once(HOST_SEPARATOR) {
        Some((name, host)) if !name.is_empty() && !host.is_empty() => {
            (name.to_string(), Some(host.to_string()))
        }
        _ => (id.to_string(), None),
    }
}

/// Replaces characters that are not valid in file names with `_`.
pub fn safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

// ============================================================================
// Metadata (game.json)
// ============================================================================

fn default_page_count() -> u32 {
    1
}

/// Declared card set inside a package's metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetMetadata {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub cards_url: Option<String>,
}

/// Contents of a package's metadata file.
///
/// Unknown keys are kept in `extra` so a rewrite never drops content the
/// catalog doesn't understand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_update_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_cards_url: Option<String>,
    #[serde(default = "default_page_count")]
    pub all_cards_url_page_count: u32,
    #[serde(default)]
    pub all_cards_url_page_count_start_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_cards_url_page_identifier: Option<String>,
    #[serde(default)]
    pub sets: Vec<SetMetadata>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PackageMetadata {
    /// Returns the remote URL of one page of bulk card data.
    ///
    /// A `{page}` placeholder is substituted; otherwise multi-page packages
    /// append the page identifier and index.
    pub fn page_url(&self, page: u32) -> Option<String> {
        let base = self.all_cards_url.as_deref().filter(|u| !u.is_empty())?;
        if base.contains("{page}") {
            return Some(base.replace("{page}", &page.to_string()));
        }
        if self.all_cards_url_page_count > 1 {
            let identifier = self
                .all_cards_url_page_identifier
                .as_deref()
                .unwrap_or("?page=");
            return Some(format!("{}{}{}", base, identifier, page));
        }
        Some(base.to_string())
    }

    /// Page indices to load, in order.
    pub fn page_range(&self) -> std::ops::Range<u32> {
        let start = self.all_cards_url_page_count_start_index;
        start..start.saturating_add(self.all_cards_url_page_count)
    }
}

// ============================================================================
// Cards
// ============================================================================

/// A single card record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_code: Option<String>,
    #[serde(flatten)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

// ============================================================================
// Descriptor
// ============================================================================

/// Bulk card content loading state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    NotLoaded,
    Loading,
    Loaded,
}

/// Lazy-loading state for one card set.
#[derive(Debug, Clone, PartialEq)]
pub struct SetDescriptor {
    pub code: String,
    pub name: String,
    pub cards_url: Option<Url>,
    /// Cards from this set's file are attached to the descriptor.
    pub loaded: bool,
}

impl SetDescriptor {
    fn from_metadata(set: &SetMetadata) -> Self {
        let cards_url = set
            .cards_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .and_then(|u| Url::parse(u).ok());
        Self {
            code: set.code.clone(),
            name: set.name.clone().unwrap_or_else(|| set.code.clone()),
            cards_url,
            loaded: false,
        }
    }

    /// File name of this set's card data, keyed by the sanitized code.
    pub fn file_name(&self) -> String {
        safe_file_name(&format!("{}.json", self.code))
    }
}

/// In-memory representation of one package.
#[derive(Debug, Clone)]
pub struct PackageDescriptor {
    id: String,
    name: String,
    host: Option<String>,
    metadata: PackageMetadata,
    error: Option<String>,
    load_state: LoadState,
    sets: Vec<SetDescriptor>,
    cards: BTreeMap<String, Card>,
    consecutive_update_failures: u32,
}

impl PackageDescriptor {
    /// Creates a descriptor for an on-disk package directory.
    pub fn from_directory(dir_name: &str) -> Self {
        let (name, host) = split_id(dir_name);
        Self {
            id: dir_name.to_string(),
            name,
            host,
            metadata: PackageMetadata::default(),
            error: None,
            load_state: LoadState::NotLoaded,
            sets: Vec::new(),
            cards: BTreeMap::new(),
            consecutive_update_failures: 0,
        }
    }

    /// Creates a descriptor for a package that exists only as metadata so far.
    pub fn from_metadata(metadata: PackageMetadata, host: Option<&str>) -> Self {
        let id = derive_id(&metadata.name, host);
        let mut descriptor = Self::from_directory(&id);
        descriptor.apply_metadata(metadata);
        descriptor
    }

    /// The empty placeholder used as current only while the catalog is empty.
    pub fn placeholder() -> Self {
        let mut descriptor = Self::from_directory(RESERVED_NAME);
        descriptor.load_state = LoadState::Loaded;
        descriptor
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn metadata(&self) -> &PackageMetadata {
        &self.metadata
    }

    /// True for the reserved-name sentinel (placeholder or corrupt package).
    pub fn is_reserved(&self) -> bool {
        self.name == RESERVED_NAME
    }

    pub fn auto_update_url(&self) -> Option<Url> {
        parse_optional_url(self.metadata.auto_update_url.as_deref())
    }

    pub fn banner_image_url(&self) -> Option<Url> {
        parse_optional_url(self.metadata.banner_image_url.as_deref())
    }

    pub fn canonical_share_link(&self) -> Option<Url> {
        parse_optional_url(self.metadata.share_link.as_deref())
    }

    /// Replaces metadata and rebuilds set state; loaded cards are discarded.
    pub fn apply_metadata(&mut self, metadata: PackageMetadata) {
        self.sets = metadata.sets.iter().map(SetDescriptor::from_metadata).collect();
        self.metadata = metadata;
        self.cards.clear();
        self.load_state = LoadState::NotLoaded;
    }

    // ------------------------------------------------------------------------
    // Error state
    // ------------------------------------------------------------------------

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn has_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// Records a failure. The first recorded error wins until cleared.
    pub fn set_error(&mut self, error: impl Into<String>) {
        if !self.has_error() {
            self.error = Some(error.into());
        }
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn consecutive_update_failures(&self) -> u32 {
        self.consecutive_update_failures
    }

    pub(crate) fn record_update_result(&mut self, succeeded: bool) {
        if succeeded {
            self.consecutive_update_failures = 0;
        } else {
            self.consecutive_update_failures += 1;
        }
    }

    // ------------------------------------------------------------------------
    // Content
    // ------------------------------------------------------------------------

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    pub fn is_loaded(&self) -> bool {
        self.load_state == LoadState::Loaded
    }

    pub(crate) fn set_load_state(&mut self, state: LoadState) {
        self.load_state = state;
    }

    pub fn sets(&self) -> &[SetDescriptor] {
        &self.sets
    }

    pub(crate) fn sets_mut(&mut self) -> &mut [SetDescriptor] {
        &mut self.sets
    }

    pub fn set(&self, code: &str) -> Option<&SetDescriptor> {
        self.sets.iter().find(|s| s.code == code)
    }

    pub fn cards(&self) -> &BTreeMap<String, Card> {
        &self.cards
    }

    /// Adds cards, optionally stamping them with a set code.
    pub fn attach_cards(&mut self, cards: Vec<Card>, set_code: Option<&str>) {
        for mut card in cards {
            if let Some(code) = set_code {
                card.set_code = Some(code.to_string());
            }
            self.cards.insert(card.id.clone(), card);
        }
    }
}

impl fmt::Display for PackageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

fn parse_optional_url(value: Option<&str>) -> Option<Url> {
    value.filter(|v| !v.is_empty()).and_then(|v| Url::parse(v).ok())
}
