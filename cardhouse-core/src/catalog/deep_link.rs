//! Deep-link resolution and share-link construction.
//!
//! A shared link wraps a package's auto-update URL twice: the landing page
//! carries it in a `url` query parameter, and the dynamic-link service
//! carries the landing page in a `link` query parameter.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use super::types::PackageDescriptor;
use crate::error::{CatalogError, Result};

/// Endpoints and fixed query parameters used for share links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Prefix identifying dynamic-link redirects.
    pub dynamic_link_domain: String,
    /// Landing page prefix, up to and including the encoded `url=`.
    pub landing_url: String,
    /// Platform identifier parameters appended verbatim.
    pub platform_params: String,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            dynamic_link_domain: "https://cgs.link/".to_string(),
            landing_url: "https://www.cardgamesimulator.com/link?url%3D".to_string(),
            platform_params:
                "&apn=com.finoldigital.cardgamesim&isi=1392877362&ibi=com.finoldigital.CardGameSim"
                    .to_string(),
        }
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Unwraps a deep link into the auto-update URL it carries.
///
/// Returns `Ok(None)` when the link is valid but names no update URL.
///
/// # Errors
///
/// Returns [`CatalogError::MalformedLink`] if the link, the unwrapped
/// dynamic-link target, or the decoded landing URL is not well formed.
pub fn resolve(link: &str, dynamic_link_domain: &str) -> Result<Option<String>> {
    debug!("Resolving deep link {}", link);
    if !is_well_formed(link) {
        warn!("Deep link malformed: {}", link);
        return Err(CatalogError::MalformedLink(link.to_string()));
    }

    let mut link = link.to_string();
    if !dynamic_link_domain.is_empty() && link.starts_with(dynamic_link_domain) {
        let dynamic = Url::parse(&link).map_err(|_| CatalogError::MalformedLink(link.clone()))?;
        let inner = query_param(&dynamic, "link")
            .map(|value| url_decode(&value))
            .unwrap_or_default();
        debug!("Dynamic link target {}", inner);
        if !is_well_formed(&inner) {
            warn!("Dynamic link malformed: {}", link);
            return Err(CatalogError::MalformedLink(link));
        }
        link = inner;
    }

    let decoded = url_decode(&link);
    let landing = Url::parse(&decoded).map_err(|_| CatalogError::MalformedLink(decoded.clone()))?;
    let update_url = query_param(&landing, "url").filter(|url| !url.is_empty());
    debug!("Resolved auto-update URL {:?}", update_url);
    Ok(update_url)
}

/// True for a non-empty absolute URL, or a relative reference with only
/// legal URI characters and valid percent escapes.
pub fn is_well_formed(link: &str) -> bool {
    if link.is_empty() || !has_legal_characters(link) {
        return false;
    }
    match Url::parse(link) {
        Ok(_) => true,
        Err(url::ParseError::RelativeUrlWithoutBase) => true,
        Err(_) => false,
    }
}

fn has_legal_characters(link: &str) -> bool {
    let bytes = link.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let escaped = bytes
                    .get(i + 1..i + 3)
                    .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
                if !escaped {
                    return false;
                }
                i += 3;
                continue;
            }
            b'"' | b'<' | b'>' | b'\\' | b'^' | b'`' | b'{' | b'|' | b'}' => return false,
            b if b.is_ascii_whitespace() || b.is_ascii_control() => return false,
            _ => {}
        }
        i += 1;
    }
    true
}

fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Form-style decode: `+` is a space, `%XX` is a byte.
fn url_decode(value: &str) -> String {
    percent_encoding::percent_decode_str(&value.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

/// Form-style encode.
fn url_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

// ============================================================================
// Share Links
// ============================================================================

/// Builds the outbound share link for a package.
///
/// Returns `None` if the package has no well-formed auto-update URL.
pub fn build_share_link(descriptor: &PackageDescriptor, settings: &LinkSettings) -> Option<String> {
    let auto_update_url = descriptor.metadata().auto_update_url.as_deref()?;
    if !is_well_formed(auto_update_url) {
        return None;
    }

    let name = sanitize_name(descriptor.name());
    let mut link = format!(
        "{}?link={}{}{}",
        settings.dynamic_link_domain,
        settings.landing_url,
        url_encode(&url_encode(auto_update_url)),
        settings.platform_params
    );
    link.push_str(&format!(
        "&st=Card+Game+Simulator+-+{}&sd=Play+{}+on+CGS!",
        name, name
    ));

    if let Some(banner) = descriptor.metadata().banner_image_url.as_deref() {
        if is_well_formed(banner) {
            link.push_str("&si=");
            link.push_str(banner);
        }
    }

    Some(link)
}

fn name_filter() -> Option<&'static Regex> {
    static FILTER: OnceLock<Option<Regex>> = OnceLock::new();
    FILTER.get_or_init(|| Regex::new("[^a-zA-Z0-9 -]").ok()).as_ref()
}

/// Reduces a name to `[A-Za-z0-9 -]` for query-string use, with `+` for
/// every other character and for spaces.
pub fn sanitize_name(name: &str) -> String {
    let filtered = match name_filter() {
        Some(filter) => filter.replace_all(name, "+").into_owned(),
        None => name.to_string(),
    };
    filtered.replace(' ', "+")
}
