//! Catalog settings.
//!
//! Settings are persisted to the SQLite database as JSON.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::deep_link::LinkSettings;
use crate::catalog::defaults::STANDARD_PLAYING_CARDS;
use crate::catalog::loader::DEFAULT_NOTIFY_THRESHOLD;
use crate::catalog::paths;
use crate::catalog::store::PackageStore;
use crate::db::Database;

/// Settings key holding the serialized [`CatalogSettings`].
const SETTINGS_KEY: &str = "catalog_settings";

/// Catalog settings - persisted to database as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// Live package store.
    pub games_dir: PathBuf,

    /// Staging area for imports and downloads.
    pub import_dir: PathBuf,

    /// Destination for exported archives.
    pub export_dir: PathBuf,

    /// Package selected when no usable preference exists.
    pub default_package: String,

    /// Share-link endpoints.
    pub links: LinkSettings,

    /// Bulk page count above which loading messages are shown.
    pub notify_threshold: u32,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            games_dir: paths::get_games_dir(),
            import_dir: paths::get_import_dir(),
            export_dir: paths::get_export_dir(),
            default_package: STANDARD_PLAYING_CARDS.to_string(),
            links: LinkSettings::default(),
            notify_threshold: DEFAULT_NOTIFY_THRESHOLD,
        }
    }
}

impl CatalogSettings {
    /// Load settings from database, using defaults for missing values.
    ///
    /// If settings don't exist or can't be parsed, returns defaults.
    pub fn load(db: &Database) -> Self {
        let mut settings = Self::default();

        if let Ok(Some(json)) = db.get_setting(SETTINGS_KEY) {
            match serde_json::from_str::<CatalogSettings>(&json) {
                Ok(loaded) => settings = loaded,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse settings, using defaults");
                }
            }
        }

        settings.validate();
        settings
    }

    /// Save settings to database.
    pub fn save(&self, db: &Database) -> anyhow::Result<()> {
        let json = serde_json::to_string(self)?;
        db.set_setting(SETTINGS_KEY, &json)?;
        Ok(())
    }

    /// Places the games, import and export directories under `root`.
    pub fn relocate(&mut self, root: &Path) {
        self.games_dir = root.join("games");
        self.import_dir = root.join("import");
        self.export_dir = root.join("export");
    }

    /// Replace empty or out-of-range values with defaults.
    pub fn validate(&mut self) {
        let defaults = Self::default();

        if self.games_dir.as_os_str().is_empty() {
            self.games_dir = defaults.games_dir;
        }
        if self.import_dir.as_os_str().is_empty() {
            self.import_dir = defaults.import_dir;
        }
        if self.export_dir.as_os_str().is_empty() {
            self.export_dir = defaults.export_dir;
        }
        if self.default_package.trim().is_empty() {
            self.default_package = defaults.default_package;
        }
        if self.links.dynamic_link_domain.is_empty() {
            self.links.dynamic_link_domain = defaults.links.dynamic_link_domain;
        }
        if self.links.landing_url.is_empty() {
            self.links.landing_url = defaults.links.landing_url;
        }

        self.notify_threshold = self.notify_threshold.clamp(1, 100_000);
    }

    /// Store rooted at the configured directories.
    pub fn store(&self) -> PackageStore {
        PackageStore::new(
            self.games_dir.clone(),
            self.import_dir.clone(),
            self.export_dir.clone(),
        )
    }
}
