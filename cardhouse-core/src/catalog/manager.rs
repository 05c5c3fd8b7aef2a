//! The catalog manager: owns the set of installed packages and the current
//! selection, and implements every lifecycle operation on them.
//!
//! The manager is the single writer of the catalog. Operations take
//! `&mut self`, so callers serialize them by construction.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use url::Url;

use super::archive::ArchiveFormat;
use super::deep_link;
use super::fetch::{validate_url, Fetcher};
use super::loader::ContentLoader;
use super::notify::{LoadEventSender, Notifier, ReadyObservers, Subscription};
use super::paths::{self, BANNER_FILE, METADATA_FILE};
use super::store::{self, locate_extracted_package, remove_dir_best_effort, PackageStore};
use super::types::{derive_id, safe_file_name, split_id, PackageDescriptor, PackageMetadata, RESERVED_NAME};
use crate::config::CatalogSettings;
use crate::db::PreferenceStore;
use crate::error::{CatalogError, Result};

const OVERWRITE_PROMPT: &str = "Game already exists. Overwrite?";
const LOAD_ERROR_PROMPT: &str =
    "Error loading game! The game may be corrupted. Delete it (note that any decks would also be deleted)?";
const DELETE_PROMPT: &str = "Deleting a card game also deletes all decks saved for that card game. Are you sure you would like to delete this card game?";
const DELETE_WARNING: &str = "Please download additional card games before deleting.";

/// Result of an import request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The package was installed and selected under this id.
    Imported(String),
    /// The user declined to overwrite an existing package.
    Cancelled,
}

/// Result of a share request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareOutcome {
    /// A shareable message containing a deep link.
    Message(String),
    /// The package has no update URL; it was exported to this archive instead.
    Exported(PathBuf),
}

/// Owns the package catalog and the current selection.
pub struct CatalogManager {
    catalog: BTreeMap<String, PackageDescriptor>,
    current: Option<String>,
    placeholder: PackageDescriptor,
    settings: CatalogSettings,
    store: PackageStore,
    loader: ContentLoader,
    fetcher: Arc<dyn Fetcher>,
    notifier: Arc<dyn Notifier>,
    preferences: Box<dyn PreferenceStore>,
    ready: ReadyObservers,
    events: Option<LoadEventSender>,
}

impl CatalogManager {
    pub fn new(
        settings: CatalogSettings,
        fetcher: Arc<dyn Fetcher>,
        notifier: Arc<dyn Notifier>,
        preferences: Box<dyn PreferenceStore>,
    ) -> Self {
        let loader = ContentLoader::new(fetcher.clone(), notifier.clone())
            .with_notify_threshold(settings.notify_threshold);

        Self {
            catalog: BTreeMap::new(),
            current: None,
            placeholder: PackageDescriptor::placeholder(),
            store: settings.store(),
            settings,
            loader,
            fetcher,
            notifier,
            preferences,
            ready: ReadyObservers::new(),
            events: None,
        }
    }

    /// Streams content loading progress to `events`.
    pub fn with_load_events(mut self, events: LoadEventSender) -> Self {
        self.events = Some(events);
        self
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Creates the store directories, discovers packages and makes the
    /// default package current.
    pub async fn initialize(&mut self) -> Result<()> {
        info!(games = %self.store.games_dir().display(), "Initializing catalog");

        paths::ensure_dirs_exist(&[
            self.store.games_dir(),
            self.store.import_dir(),
            self.store.export_dir(),
        ])
        .map_err(|e| self.surface(CatalogError::load(format!("{:#}", e))))?;

        self.discover().map_err(|e| self.surface(e))?;
        self.reset_current_to_default();
        self.refresh().await
    }

    /// Drops every ready callback and clears leftover staging directories.
    pub fn shutdown(&mut self) {
        info!("Shutting down catalog");
        self.ready.clear();
        remove_dir_best_effort(self.store.import_dir());
    }

    // ========================================================================
    // Read Access
    // ========================================================================

    /// All error-free packages, ordered by id.
    pub fn catalog(&self) -> &BTreeMap<String, PackageDescriptor> {
        &self.catalog
    }

    pub fn get(&self, id: &str) -> Option<&PackageDescriptor> {
        self.catalog.get(id)
    }

    /// The current package, or the placeholder while the catalog is empty.
    pub fn current(&self) -> &PackageDescriptor {
        self.current
            .as_deref()
            .and_then(|id| self.catalog.get(id))
            .unwrap_or(&self.placeholder)
    }

    /// The package before the current one, wrapping to the last.
    pub fn previous(&self) -> &PackageDescriptor {
        let before = self.current.as_deref().and_then(|id| {
            self.catalog
                .range::<str, _>((Bound::Unbounded, Bound::Excluded(id)))
                .next_back()
                .map(|(_, d)| d)
        });
        before
            .or_else(|| self.catalog.values().next_back())
            .unwrap_or(&self.placeholder)
    }

    /// The package after the current one, wrapping to the first.
    pub fn next(&self) -> &PackageDescriptor {
        let after = self.current.as_deref().and_then(|id| {
            self.catalog
                .range::<str, _>((Bound::Excluded(id), Bound::Unbounded))
                .next()
                .map(|(_, d)| d)
        });
        after
            .or_else(|| self.catalog.values().next())
            .unwrap_or(&self.placeholder)
    }

    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    pub fn store(&self) -> &PackageStore {
        &self.store
    }

    pub fn preferences(&self) -> &dyn PreferenceStore {
        self.preferences.as_ref()
    }

    /// Registers a callback run each time the current package becomes ready.
    ///
    /// Callbacks must not subscribe or unsubscribe while running.
    #[must_use = "dropping the subscription unregisters the callback"]
    pub fn subscribe_ready<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PackageDescriptor) + Send + 'static,
    {
        self.ready.subscribe(callback)
    }

    // ========================================================================
    // Discovery & Selection
    // ========================================================================

    /// Scans the store and catalogs every readable package. Seeds the
    /// built-in packages first if the store is empty.
    ///
    /// Returns the number of cataloged packages.
    pub fn discover(&mut self) -> Result<usize> {
        let mut dirs = self
            .store
            .list_package_dirs()
            .map_err(|e| CatalogError::load(format!("{:#}", e)))?;

        if dirs.is_empty() {
            self.store
                .seed_defaults()
                .map_err(|e| CatalogError::load(format!("{:#}", e)))?;
            dirs = self
                .store
                .list_package_dirs()
                .map_err(|e| CatalogError::load(format!("{:#}", e)))?;
        }

        for dir_name in dirs {
            let (name, _) = split_id(&dir_name);
            if name == RESERVED_NAME {
                warn!(dir = %dir_name, "Found game with default name. Deleting it.");
                if let Err(e) = self.store.delete_package(&dir_name) {
                    warn!(dir = %dir_name, "Error deleting game: {:#}", e);
                }
                continue;
            }

            let mut descriptor = PackageDescriptor::from_directory(&dir_name);
            match self.store.read_metadata(&dir_name) {
                Ok(metadata) => {
                    descriptor.apply_metadata(metadata);
                    debug!(id = %dir_name, "Discovered package");
                    self.catalog.insert(dir_name, descriptor);
                }
                Err(e) => {
                    descriptor.set_error(format!("{:#}", e));
                    error!(id = %dir_name, "Error loading game: {:#}", e);
                }
            }
        }

        info!(count = self.catalog.len(), "Discovery complete");
        Ok(self.catalog.len())
    }

    /// Makes `id` current and refreshes.
    pub async fn select(&mut self, id: &str) -> Result<()> {
        if !self.catalog.contains_key(id) {
            return Err(self.surface(CatalogError::UnknownPackage(id.to_string())));
        }

        info!(id = %id, "Selecting package");
        self.current = Some(id.to_string());
        self.refresh().await
    }

    pub async fn select_next(&mut self) -> Result<()> {
        let id = self.next().id().to_string();
        self.select(&id).await
    }

    pub async fn select_previous(&mut self) -> Result<()> {
        let id = self.previous().id().to_string();
        self.select(&id).await
    }

    /// Preferred package if cataloged and error-free, else the first
    /// package, else the placeholder.
    fn reset_current_to_default(&mut self) {
        let preferred = match self.preferences.preferred_package() {
            Ok(Some(id)) => id,
            Ok(None) => self.settings.default_package.clone(),
            Err(e) => {
                warn!("Failed to read preferred package: {}", e);
                self.settings.default_package.clone()
            }
        };

        self.current = match self.catalog.get(&preferred) {
            Some(descriptor) if !descriptor.has_error() => Some(preferred),
            _ => self.catalog.keys().next().cloned(),
        };
        debug!(current = ?self.current, "Reset current package");
    }

    /// Loads the current package if needed, resolves load errors with the
    /// user, then persists the selection and notifies ready observers.
    pub async fn refresh(&mut self) -> Result<()> {
        loop {
            let Some(id) = self.current.clone() else {
                debug!("Catalog is empty; using placeholder");
                self.ready.notify(&self.placeholder);
                return Ok(());
            };

            self.ensure_loaded(&id).await;

            let load_error = match self.catalog.get(&id) {
                Some(descriptor) => descriptor.error().map(str::to_string),
                None => {
                    self.reset_current_to_default();
                    continue;
                }
            };

            if let Some(load_error) = load_error {
                error!(id = %id, "Error loading game: {}", load_error);
                if self.notifier.ask(LOAD_ERROR_PROMPT).await {
                    match self.remove_current() {
                        Ok(()) => continue,
                        Err(CatalogError::LastPackage) => {
                            self.notifier.show(DELETE_WARNING);
                        }
                        Err(e) => return Err(e),
                    }
                }

                if let Some(descriptor) = self.catalog.get_mut(&id) {
                    descriptor.clear_error();
                }
                self.reset_current_to_default();
                continue;
            }

            if let Err(e) = self.preferences.set_preferred_package(&id) {
                warn!(id = %id, "Failed to persist preferred package: {}", e);
            }
            if let Some(descriptor) = self.catalog.get(&id) {
                self.ready.notify(descriptor);
            }
            info!(id = %id, "Package ready");
            return Ok(());
        }
    }

    async fn ensure_loaded(&mut self, id: &str) {
        let dir = self.store.package_dir(id);
        if let Some(descriptor) = self.catalog.get_mut(id) {
            if !descriptor.is_loaded() {
                self.loader
                    .load(descriptor, &dir, self.events.as_ref())
                    .await;
            }
        }
    }

    // ========================================================================
    // Import & Export
    // ========================================================================

    /// Installs a package from an archive and selects it.
    ///
    /// The package id is the archive's file stem. If that package already
    /// exists the user is asked before anything is overwritten.
    pub async fn import(&mut self, archive_path: &Path) -> Result<ImportOutcome> {
        if !archive_path.is_file() {
            return Err(self.surface(CatalogError::NotFound(archive_path.to_path_buf())));
        }

        let file_name = archive_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let candidate = ArchiveFormat::from_path(archive_path)
            .stem(&file_name)
            .to_string();
        if candidate.is_empty() {
            return Err(self.surface(CatalogError::NotFound(archive_path.to_path_buf())));
        }

        if self.store.package_exists(&candidate) && !self.notifier.ask(OVERWRITE_PROMPT).await {
            info!(id = %candidate, "Import cancelled");
            return Ok(ImportOutcome::Cancelled);
        }

        info!(archive = %archive_path.display(), "Importing package");
        let staging = self
            .store
            .extract_to_staging(archive_path)
            .map_err(|e| self.surface(CatalogError::import(format!("{:#}", e))))?;

        let installed = self.install_extracted(&staging, &candidate);
        remove_dir_best_effort(&staging);
        let (id, metadata) = installed.map_err(|e| self.surface(e))?;

        let mut descriptor = PackageDescriptor::from_directory(&id);
        descriptor.apply_metadata(metadata);
        self.catalog.insert(id.clone(), descriptor);

        self.select(&id).await?;
        Ok(ImportOutcome::Imported(id))
    }

    /// Validates the extracted package, then moves it into the live store.
    fn install_extracted(&self, staging: &Path, candidate: &str) -> Result<(String, PackageMetadata)> {
        let (id, dir) = locate_extracted_package(staging, candidate).ok_or_else(|| {
            CatalogError::ImportFailure(format!("archive has no package folder named {}", candidate))
        })?;

        if split_id(&id).0 == RESERVED_NAME {
            return Err(CatalogError::ImportFailure(format!(
                "{} is a reserved package name",
                id
            )));
        }
        if !dir.join(METADATA_FILE).is_file() {
            return Err(CatalogError::ImportFailure(format!(
                "package folder {} has no {}",
                id, METADATA_FILE
            )));
        }

        let metadata =
            store::read_metadata_at(&dir).map_err(|e| CatalogError::load(format!("{:#}", e)))?;

        self.store
            .install_from(&dir, &id)
            .map_err(|e| CatalogError::import(format!("{:#}", e)))?;
        Ok((id, metadata))
    }

    /// Zips a package (the current one by default) into the export directory.
    pub fn export(&self, id: Option<&str>) -> Result<PathBuf> {
        let id = id.unwrap_or_else(|| self.current().id()).to_string();
        if !self.catalog.contains_key(&id) {
            return Err(self.surface(CatalogError::UnknownPackage(id)));
        }

        let archive = self
            .store
            .export(&id)
            .map_err(|e| self.surface(CatalogError::load(format!("{:#}", e))))?;
        info!(id = %id, archive = %archive.display(), "Exported package");
        Ok(archive)
    }

    // ========================================================================
    // Download & Update
    // ========================================================================

    /// Downloads the package described at `url` and selects it.
    ///
    /// If a cataloged package already updates from `url`, that package is
    /// updated instead of creating a new one.
    pub async fn download(&mut self, url: &str) -> Result<String> {
        let url = Url::parse(url.trim())
            .map_err(|_| self.surface(CatalogError::MalformedLink(url.to_string())))?;

        let existing = self
            .catalog
            .values()
            .filter(|d| d.auto_update_url().as_ref() == Some(&url))
            .last()
            .map(|d| d.id().to_string());

        if let Some(id) = existing {
            info!(id = %id, "Package already installed; updating");
            self.update(Some(&id)).await?;
            self.select(&id).await?;
            return Ok(id);
        }

        info!(url = %url, "Downloading package");
        let staging = self
            .store
            .create_staging_dir()
            .map_err(|e| self.surface(CatalogError::download(format!("{:#}", e))))?;

        let staged = self.stage_remote(&url, &staging, None).await;
        let installed = staged.and_then(|descriptor| {
            self.store.install_from(&staging, descriptor.id())?;
            Ok(descriptor)
        });
        remove_dir_best_effort(&staging);

        let descriptor =
            installed.map_err(|e| self.surface(CatalogError::download(format!("{:#}", e))))?;
        let id = descriptor.id().to_string();
        self.catalog.insert(id.clone(), descriptor);

        self.select(&id).await?;
        Ok(id)
    }

    /// Re-downloads a package (the current one by default) in place.
    ///
    /// On failure the previous content stays installed, the error is shown
    /// and then cleared, and the package stays in the catalog.
    pub async fn update(&mut self, id: Option<&str>) -> Result<()> {
        let id = match id {
            Some(id) => id.to_string(),
            None => self.current().id().to_string(),
        };
        let Some(descriptor) = self.catalog.get(&id) else {
            return Err(self.surface(CatalogError::UnknownPackage(id)));
        };

        info!(id = %id, "Updating package");
        let result = match descriptor.auto_update_url() {
            Some(url) => self.restage(&url, &id).await,
            None => Err(anyhow::anyhow!("{} has no auto-update URL", id)),
        };

        match result {
            Ok(mut updated) => {
                updated.record_update_result(true);
                self.catalog.insert(id.clone(), updated);
                info!(id = %id, "Update complete");
                if self.current.as_deref() == Some(id.as_str()) {
                    self.refresh().await?;
                }
                Ok(())
            }
            Err(e) => {
                let err = self.surface(CatalogError::download(format!("{:#}", e)));
                if let Some(descriptor) = self.catalog.get_mut(&id) {
                    descriptor.set_error(err.to_string());
                    descriptor.clear_error();
                    descriptor.record_update_result(false);
                    warn!(
                        id = %id,
                        failures = descriptor.consecutive_update_failures(),
                        "Update failed; keeping installed content"
                    );
                }
                Err(err)
            }
        }
    }

    async fn restage(&self, url: &Url, id: &str) -> anyhow::Result<PackageDescriptor> {
        let staging = self.store.create_staging_dir()?;
        let staged = self.stage_remote(url, &staging, Some(id)).await;
        let installed = staged.and_then(|descriptor| {
            self.store.install_from(&staging, id)?;
            Ok(descriptor)
        });
        remove_dir_best_effort(&staging);
        installed
    }

    /// Fetches metadata, banner and card content into `staging`.
    ///
    /// The returned descriptor is fully loaded; nothing in the live store
    /// is touched.
    async fn stage_remote(
        &self,
        url: &Url,
        staging: &Path,
        keep_id: Option<&str>,
    ) -> anyhow::Result<PackageDescriptor> {
        let bytes = self.fetcher.fetch(url).await?;
        let mut metadata: PackageMetadata = serde_json::from_slice(&bytes)
            .map_err(|e| anyhow::anyhow!("Invalid game metadata from {}: {}", url, e))?;

        if metadata.name.trim().is_empty() || metadata.name == RESERVED_NAME {
            anyhow::bail!("Game metadata from {} has no usable name", url);
        }
        if metadata.auto_update_url.as_deref().map_or(true, str::is_empty) {
            metadata.auto_update_url = Some(url.to_string());
        }

        store::write_metadata(staging, &metadata)?;
        self.fetch_banner(&metadata, staging).await;

        let id = match keep_id {
            Some(id) => id.to_string(),
            None => derive_id(&safe_file_name(&metadata.name), url.host_str()),
        };
        let mut descriptor = PackageDescriptor::from_directory(&id);
        descriptor.apply_metadata(metadata);

        self.loader
            .load(&mut descriptor, staging, self.events.as_ref())
            .await;
        if let Some(err) = descriptor.error() {
            anyhow::bail!("{}", err);
        }

        Ok(descriptor)
    }

    async fn fetch_banner(&self, metadata: &PackageMetadata, dir: &Path) {
        let Some(url) = metadata
            .banner_image_url
            .as_deref()
            .and_then(|u| Url::parse(u).ok())
        else {
            return;
        };
        if validate_url(&url).is_err() {
            return;
        }
        if let Err(e) = self.fetcher.save_to_file(&url, &dir.join(BANNER_FILE)).await {
            warn!(url = %url, "Failed to download banner: {:#}", e);
        }
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Deletes the current package and selects the next default.
    pub async fn delete(&mut self) -> Result<()> {
        self.remove_current().map_err(|e| self.surface(e))?;
        self.refresh().await
    }

    /// Asks before deleting the current package.
    ///
    /// Returns `true` if the package was deleted.
    pub async fn request_delete(&mut self) -> Result<bool> {
        if self.catalog.len() > 1 {
            if self.notifier.prompt(DELETE_PROMPT).await {
                self.delete().await?;
                return Ok(true);
            }
            Ok(false)
        } else {
            self.notifier.show(DELETE_WARNING);
            Ok(false)
        }
    }

    fn remove_current(&mut self) -> Result<()> {
        if self.catalog.len() <= 1 {
            return Err(CatalogError::LastPackage);
        }
        let Some(id) = self.current.clone() else {
            return Err(CatalogError::UnknownPackage(RESERVED_NAME.to_string()));
        };

        info!(id = %id, "Deleting package");
        if let Err(e) = self.store.delete_package(&id) {
            warn!(id = %id, "Error deleting game: {:#}", e);
        }
        self.catalog.remove(&id);
        self.reset_current_to_default();
        Ok(())
    }

    // ========================================================================
    // Links & Sharing
    // ========================================================================

    /// Share link for the current package, if it has an auto-update URL.
    pub fn build_share_link(&self) -> Option<String> {
        deep_link::build_share_link(self.current(), &self.settings.links)
    }

    /// Unwraps a deep link into the auto-update URL it carries.
    pub fn resolve(&self, link: &str) -> Result<Option<String>> {
        deep_link::resolve(link, &self.settings.links.dynamic_link_domain)
    }

    /// Shares the current package as a deep link, or exports it when it has
    /// no update URL.
    pub fn share(&self) -> Result<ShareOutcome> {
        let current = self.current();
        if current.auto_update_url().is_some() {
            let link = current
                .canonical_share_link()
                .map(String::from)
                .or_else(|| self.build_share_link());
            if let Some(link) = link {
                let message = format!("Get CGS for {}: {}", current.name(), link);
                self.notifier.show(&message);
                return Ok(ShareOutcome::Message(message));
            }
        }

        self.export(None).map(ShareOutcome::Exported)
    }

    /// Handles an activated deep link: resolves it and downloads the package.
    pub async fn open_link(&mut self, link: &str) -> Result<String> {
        let resolved = self.resolve(link).map_err(|e| self.surface(e))?;
        match resolved {
            Some(url) if deep_link::is_well_formed(&url) => self.download(&url).await,
            _ => Err(self.surface(CatalogError::MalformedLink(link.to_string()))),
        }
    }

    /// Logs and shows an operation failure, then hands it back.
    fn surface(&self, err: CatalogError) -> CatalogError {
        error!("{}", err);
        self.notifier.show(&err.to_string());
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::notify::{load_event_channel, LoadEvent};
    use crate::catalog::test_support::{FakeFetcher, ScriptedNotifier};
    use crate::db::MemoryPreferences;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const REMOTE_URL: &str = "https://x.org/games/remote.json";

    struct Harness {
        _temp: TempDir,
        fetcher: Arc<FakeFetcher>,
        notifier: Arc<ScriptedNotifier>,
        manager: CatalogManager,
    }

    fn harness_with(answers: &[bool], preferred: Option<&str>, setup: impl FnOnce(&PackageStore)) -> Harness {
        let temp = TempDir::new().unwrap();
        let mut settings = CatalogSettings::default();
        settings.relocate(temp.path());
        setup(&settings.store());

        let fetcher = Arc::new(FakeFetcher::new());
        let notifier = Arc::new(ScriptedNotifier::answering(answers));
        let preferences = match preferred {
            Some(id) => MemoryPreferences::with_preferred(id),
            None => MemoryPreferences::new(),
        };
        let manager = CatalogManager::new(
            settings,
            fetcher.clone(),
            notifier.clone(),
            Box::new(preferences),
        );

        Harness {
            _temp: temp,
            fetcher,
            notifier,
            manager,
        }
    }

    fn write_package(store: &PackageStore, id: &str, metadata: &str) {
        let dir = store.package_dir(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(METADATA_FILE), metadata).unwrap();
    }

    fn abc(store: &PackageStore) {
        for id in ["A", "B", "C"] {
            write_package(store, id, &format!(r#"{{"name":"{}"}}"#, id));
        }
    }

    fn serve_remote(fetcher: &FakeFetcher) {
        fetcher.insert(
            REMOTE_URL,
            r#"{"name":"Remote","allCardsUrl":"https://x.org/games/cards.json","bannerImageUrl":"https://x.org/banner.png"}"#,
        );
        fetcher.insert(
            "https://x.org/games/cards.json",
            r#"[{"id":"r1","name":"One"},{"id":"r2","name":"Two"}]"#,
        );
    }

    fn staging_leftovers(manager: &CatalogManager) -> usize {
        fs::read_dir(manager.store().import_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_initialize_seeds_and_selects_standard() {
        let mut h = harness_with(&[], None, |_| {});
        h.manager.initialize().await.unwrap();

        let ids: Vec<&String> = h.manager.catalog().keys().collect();
        assert_eq!(ids, vec!["Dominoes", "Mahjong", "Standard Playing Cards"]);
        assert_eq!(h.manager.current().id(), "Standard Playing Cards");
        assert!(h.manager.current().is_loaded());
        assert_eq!(h.manager.current().cards().len(), 54);
        assert_eq!(
            h.manager.preferences().preferred_package().unwrap().as_deref(),
            Some("Standard Playing Cards")
        );
    }

    #[tokio::test]
    async fn test_discover_purges_reserved_names() {
        let mut h = harness_with(&[], None, |store| {
            abc(store);
            write_package(store, "_INVALID_", r#"{"name":"_INVALID_"}"#);
            write_package(store, "_INVALID_@x.org", r#"{"name":"_INVALID_"}"#);
        });
        h.manager.initialize().await.unwrap();

        assert_eq!(h.manager.catalog().len(), 3);
        assert!(!h.manager.store().package_exists("_INVALID_"));
        assert!(!h.manager.store().package_exists("_INVALID_@x.org"));
        assert!(h.manager.catalog().keys().all(|id| !id.starts_with(RESERVED_NAME)));
    }

    #[tokio::test]
    async fn test_discover_skips_unreadable_metadata() {
        let mut h = harness_with(&[], None, |store| {
            abc(store);
            write_package(store, "Broken", "{ not json");
        });
        h.manager.initialize().await.unwrap();

        assert!(h.manager.get("Broken").is_none());
        assert!(h.manager.store().package_exists("Broken"));
        assert_eq!(h.manager.current().id(), "A");
    }

    #[tokio::test]
    async fn test_preferred_package_is_restored() {
        let mut h = harness_with(&[], Some("C"), abc);
        h.manager.initialize().await.unwrap();
        assert_eq!(h.manager.current().id(), "C");

        let mut h = harness_with(&[], Some("Missing"), abc);
        h.manager.initialize().await.unwrap();
        assert_eq!(h.manager.current().id(), "A");
    }

    #[tokio::test]
    async fn test_previous_and_next_wrap() {
        let mut h = harness_with(&[], Some("B"), abc);
        h.manager.initialize().await.unwrap();

        assert_eq!(h.manager.previous().id(), "A");
        assert_eq!(h.manager.next().id(), "C");

        h.manager.select("A").await.unwrap();
        assert_eq!(h.manager.previous().id(), "C");

        h.manager.select("C").await.unwrap();
        assert_eq!(h.manager.next().id(), "A");

        h.manager.select_next().await.unwrap();
        assert_eq!(h.manager.current().id(), "A");
        h.manager.select_previous().await.unwrap();
        assert_eq!(h.manager.current().id(), "C");
    }

    #[tokio::test]
    async fn test_select_unknown_package() {
        let mut h = harness_with(&[], None, abc);
        h.manager.initialize().await.unwrap();

        let err = h.manager.select("Nope").await.unwrap_err();
        assert!(matches!(err, CatalogError::UnknownPackage(ref id) if id == "Nope"));
        assert_eq!(h.manager.current().id(), "A");
        assert_eq!(h.notifier.shown().len(), 1);
    }

    #[tokio::test]
    async fn test_select_persists_preference_and_notifies() {
        let mut h = harness_with(&[], None, abc);
        h.manager.initialize().await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let subscription = h.manager.subscribe_ready(move |descriptor| {
            assert_eq!(descriptor.id(), "B");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        h.manager.select("B").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.manager.preferences().preferred_package().unwrap().as_deref(),
            Some("B")
        );

        drop(subscription);
        h.manager.select("B").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delete_last_package_is_refused() {
        let mut h = harness_with(&[], None, |store| {
            write_package(store, "Only", r#"{"name":"Only"}"#)
        });
        h.manager.initialize().await.unwrap();

        let err = h.manager.delete().await.unwrap_err();
        assert!(matches!(err, CatalogError::LastPackage));
        assert_eq!(h.manager.catalog().len(), 1);
        assert!(h.manager.store().package_exists("Only"));
    }

    #[tokio::test]
    async fn test_delete_removes_package_and_reselects() {
        let mut h = harness_with(&[], Some("B"), abc);
        h.manager.initialize().await.unwrap();

        h.manager.delete().await.unwrap();

        assert!(h.manager.get("B").is_none());
        assert!(!h.manager.store().package_exists("B"));
        // Preference still names B, which is gone.
        assert_eq!(h.manager.current().id(), "A");
    }

    #[tokio::test]
    async fn test_request_delete_flow() {
        let mut h = harness_with(&[false, true], None, abc);
        h.manager.initialize().await.unwrap();

        assert!(!h.manager.request_delete().await.unwrap());
        assert_eq!(h.manager.catalog().len(), 3);

        assert!(h.manager.request_delete().await.unwrap());
        assert_eq!(h.manager.catalog().len(), 2);
        assert_eq!(h.notifier.asked(), vec![DELETE_PROMPT, DELETE_PROMPT]);

        let mut h = harness_with(&[], None, |store| {
            write_package(store, "Only", r#"{"name":"Only"}"#)
        });
        h.manager.initialize().await.unwrap();
        assert!(!h.manager.request_delete().await.unwrap());
        assert_eq!(h.notifier.shown(), vec![DELETE_WARNING]);
        assert!(h.notifier.asked().is_empty());
    }

    #[tokio::test]
    async fn test_export_then_import_round_trip() {
        let metadata = r#"{"name":"Game","autoUpdateUrl":"https://x.org/game.json","cardSize":{"x":2.5}}"#;
        let mut h = harness_with(&[true], None, |store| {
            abc(store);
            write_package(store, "Game@x.org", metadata);
        });
        h.manager.initialize().await.unwrap();
        let before = h.manager.get("Game@x.org").unwrap().metadata().clone();

        let archive = h.manager.export(Some("Game@x.org")).unwrap();
        assert!(archive.ends_with("Game@x.org.zip"));

        let outcome = h.manager.import(&archive).await.unwrap();
        assert_eq!(outcome, ImportOutcome::Imported("Game@x.org".to_string()));
        assert_eq!(h.notifier.asked(), vec![OVERWRITE_PROMPT]);

        let after = h.manager.get("Game@x.org").unwrap();
        assert_eq!(after.metadata(), &before);
        assert_eq!(after.name(), "Game");
        assert_eq!(h.manager.current().id(), "Game@x.org");
        assert_eq!(h.manager.catalog().len(), 4);
        assert_eq!(staging_leftovers(&h.manager), 0);
    }

    #[tokio::test]
    async fn test_export_unknown_package_is_shown() {
        let mut h = harness_with(&[], None, abc);
        h.manager.initialize().await.unwrap();

        let err = h.manager.export(Some("Nope")).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownPackage(_)));
        assert_eq!(h.notifier.shown(), vec![err.to_string()]);
    }

    #[tokio::test]
    async fn test_import_declined_overwrite_changes_nothing() {
        let mut h = harness_with(&[false], None, abc);
        h.manager.initialize().await.unwrap();
        let archive = h.manager.export(Some("B")).unwrap();

        let outcome = h.manager.import(&archive).await.unwrap();
        assert_eq!(outcome, ImportOutcome::Cancelled);
        assert_eq!(h.manager.current().id(), "A");
        assert_eq!(staging_leftovers(&h.manager), 0);
    }

    #[tokio::test]
    async fn test_import_missing_archive() {
        let mut h = harness_with(&[], None, abc);
        h.manager.initialize().await.unwrap();

        let err = h.manager.import(Path::new("/no/such/game.zip")).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_import_renamed_archive_uses_inner_folder() {
        let mut h = harness_with(&[], None, |store| {
            abc(store);
            write_package(store, "Inner", r#"{"name":"Inner"}"#);
        });
        h.manager.initialize().await.unwrap();
        let exported = h.manager.export(Some("Inner")).unwrap();
        h.manager.select("Inner").await.unwrap();
        h.manager.delete().await.unwrap();

        let renamed = exported.with_file_name("Renamed.zip");
        fs::rename(&exported, &renamed).unwrap();

        let outcome = h.manager.import(&renamed).await.unwrap();
        assert_eq!(outcome, ImportOutcome::Imported("Inner".to_string()));
        assert!(h.manager.store().package_exists("Inner"));
        assert!(!h.manager.store().package_exists("Renamed"));
    }

    #[tokio::test]
    async fn test_import_garbage_archive_fails() {
        let mut h = harness_with(&[], None, abc);
        h.manager.initialize().await.unwrap();

        let archive = h.manager.store().export_dir().join("Junk.zip");
        fs::write(&archive, b"not a zip").unwrap();

        let err = h.manager.import(&archive).await.unwrap_err();
        assert!(matches!(err, CatalogError::ImportFailure(_)));
        assert_eq!(h.manager.catalog().len(), 3);
        assert_eq!(staging_leftovers(&h.manager), 0);
    }

    /// Zips `files` (paths relative to the archive root) into the export dir.
    fn build_archive(manager: &CatalogManager, archive_name: &str, files: &[(&str, &str)]) -> PathBuf {
        let source = manager.store().export_dir().join("source");
        for (path, content) in files {
            let file = source.join(path);
            fs::create_dir_all(file.parent().unwrap()).unwrap();
            fs::write(file, content).unwrap();
        }
        let archive = crate::catalog::archive::create_zip(
            &source,
            manager.store().export_dir(),
            archive_name,
        )
        .unwrap();
        fs::remove_dir_all(&source).unwrap();
        archive
    }

    #[tokio::test]
    async fn test_import_reserved_name_is_rejected() {
        let mut h = harness_with(&[], None, abc);
        h.manager.initialize().await.unwrap();

        let archive = build_archive(
            &h.manager,
            "_INVALID_.zip",
            &[("_INVALID_/game.json", r#"{"name":"_INVALID_"}"#)],
        );
        let err = h.manager.import(&archive).await.unwrap_err();
        assert!(matches!(err, CatalogError::ImportFailure(_)));

        let renamed = build_archive(
            &h.manager,
            "Innocent.zip",
            &[("_INVALID_@x.org/game.json", r#"{"name":"_INVALID_"}"#)],
        );
        let err = h.manager.import(&renamed).await.unwrap_err();
        assert!(matches!(err, CatalogError::ImportFailure(_)));

        let ids: Vec<&String> = h.manager.catalog().keys().collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert_eq!(h.manager.current().id(), "A");
        assert!(!h.manager.store().package_exists("_INVALID_"));
        assert!(!h.manager.store().package_exists("_INVALID_@x.org"));
        assert_eq!(staging_leftovers(&h.manager), 0);
    }

    #[tokio::test]
    async fn test_import_without_metadata_is_import_failure() {
        let mut h = harness_with(&[], None, abc);
        h.manager.initialize().await.unwrap();

        let archive = build_archive(&h.manager, "Hollow.zip", &[("Hollow/cards/0.json", "[]")]);
        let err = h.manager.import(&archive).await.unwrap_err();
        assert!(matches!(err, CatalogError::ImportFailure(_)));
        assert!(!h.manager.store().package_exists("Hollow"));

        let archive = build_archive(&h.manager, "Garbled.zip", &[("Garbled/game.json", "{ nope")]);
        let err = h.manager.import(&archive).await.unwrap_err();
        assert!(matches!(err, CatalogError::LoadFailure(_)));
        assert_eq!(h.manager.catalog().len(), 3);
        assert_eq!(staging_leftovers(&h.manager), 0);
    }

    #[tokio::test]
    async fn test_download_registers_and_selects() {
        let mut h = harness_with(&[], None, abc);
        serve_remote(&h.fetcher);
        h.manager.initialize().await.unwrap();

        let id = h.manager.download(REMOTE_URL).await.unwrap();
        assert_eq!(id, "Remote@x.org");

        let current = h.manager.current();
        assert_eq!(current.id(), "Remote@x.org");
        assert_eq!(current.cards().len(), 2);
        assert_eq!(current.metadata().auto_update_url.as_deref(), Some(REMOTE_URL));
        assert!(h.manager.store().package_dir(&id).join(METADATA_FILE).is_file());
        assert!(paths::page_file(&h.manager.store().package_dir(&id), 0).is_file());
        // Banner is best-effort; its 404 does not fail the download.
        assert!(h.fetcher.requests().contains(&"https://x.org/banner.png".to_string()));
        assert_eq!(staging_leftovers(&h.manager), 0);
    }

    #[tokio::test]
    async fn test_download_failure_leaves_catalog_unchanged() {
        let mut h = harness_with(&[], None, abc);
        h.manager.initialize().await.unwrap();

        let err = h.manager.download(REMOTE_URL).await.unwrap_err();
        assert!(matches!(err, CatalogError::DownloadFailure(_)));
        assert_eq!(h.manager.catalog().len(), 3);
        assert_eq!(h.manager.current().id(), "A");
        assert_eq!(staging_leftovers(&h.manager), 0);
        assert!(!h.manager.store().package_exists("Remote@x.org"));
    }

    #[tokio::test]
    async fn test_download_with_failing_cards_is_cleaned_up() {
        let mut h = harness_with(&[], None, abc);
        h.fetcher.insert(
            REMOTE_URL,
            r#"{"name":"Remote","allCardsUrl":"https://x.org/missing{page}.json","allCardsUrlPageCount":2}"#,
        );
        h.manager.initialize().await.unwrap();

        assert!(h.manager.download(REMOTE_URL).await.is_err());
        assert!(h.manager.get("Remote@x.org").is_none());
        assert!(!h.manager.store().package_exists("Remote@x.org"));
    }

    #[tokio::test]
    async fn test_download_known_url_updates_existing() {
        let mut h = harness_with(&[], None, abc);
        serve_remote(&h.fetcher);
        h.manager.initialize().await.unwrap();
        h.manager.download(REMOTE_URL).await.unwrap();
        h.manager.select("A").await.unwrap();

        let id = h
            .manager
            .download("HTTPS://X.ORG/games/remote.json")
            .await
            .unwrap();

        assert_eq!(id, "Remote@x.org");
        assert_eq!(h.manager.catalog().len(), 4);
        assert_eq!(h.manager.current().id(), "Remote@x.org");
        let metadata_fetches = h
            .fetcher
            .requests()
            .iter()
            .filter(|u| u.as_str() == REMOTE_URL)
            .count();
        assert_eq!(metadata_fetches, 2);
    }

    #[tokio::test]
    async fn test_update_failure_clears_error_and_keeps_package() {
        let mut h = harness_with(&[], None, abc);
        serve_remote(&h.fetcher);
        h.manager.initialize().await.unwrap();
        h.manager.download(REMOTE_URL).await.unwrap();

        h.fetcher.remove(REMOTE_URL);
        let err = h.manager.update(Some("Remote@x.org")).await.unwrap_err();
        assert!(matches!(err, CatalogError::DownloadFailure(_)));

        let descriptor = h.manager.get("Remote@x.org").unwrap();
        assert!(!descriptor.has_error());
        assert_eq!(descriptor.consecutive_update_failures(), 1);
        assert_eq!(descriptor.cards().len(), 2);
        assert!(h.manager.store().package_exists("Remote@x.org"));
        assert!(h
            .notifier
            .shown()
            .iter()
            .any(|m| m.starts_with("Error downloading game")));

        h.manager.update(None).await.unwrap_err();
        assert_eq!(
            h.manager.get("Remote@x.org").unwrap().consecutive_update_failures(),
            2
        );
    }

    #[tokio::test]
    async fn test_update_without_url_fails_softly() {
        let mut h = harness_with(&[], None, abc);
        h.manager.initialize().await.unwrap();

        assert!(matches!(
            h.manager.update(None).await,
            Err(CatalogError::DownloadFailure(_))
        ));
        assert!(h.manager.get("A").is_some());
    }

    #[tokio::test]
    async fn test_errored_current_ignore_clears_error() {
        let mut h = harness_with(&[false], Some("A"), |store| {
            abc(store);
            let page = paths::page_file(&store.package_dir("A"), 0);
            fs::create_dir_all(page.parent().unwrap()).unwrap();
            fs::write(page, "garbage").unwrap();
        });
        h.manager.initialize().await.unwrap();

        assert_eq!(h.notifier.asked(), vec![LOAD_ERROR_PROMPT]);
        assert_eq!(h.manager.current().id(), "A");
        assert!(!h.manager.current().has_error());
        assert!(h.manager.store().package_exists("A"));
    }

    #[tokio::test]
    async fn test_errored_current_delete_reselects() {
        let mut h = harness_with(&[true], Some("B"), |store| {
            abc(store);
            let page = paths::page_file(&store.package_dir("B"), 0);
            fs::create_dir_all(page.parent().unwrap()).unwrap();
            fs::write(page, "garbage").unwrap();
        });
        h.manager.initialize().await.unwrap();

        assert!(h.manager.get("B").is_none());
        assert!(!h.manager.store().package_exists("B"));
        assert_eq!(h.manager.current().id(), "A");
    }

    #[tokio::test]
    async fn test_share_with_and_without_update_url() {
        let mut h = harness_with(&[], None, abc);
        serve_remote(&h.fetcher);
        h.manager.initialize().await.unwrap();

        match h.manager.share().unwrap() {
            ShareOutcome::Exported(path) => assert!(path.ends_with("A.zip") && path.is_file()),
            other => panic!("expected export, got {:?}", other),
        }

        h.manager.download(REMOTE_URL).await.unwrap();
        match h.manager.share().unwrap() {
            ShareOutcome::Message(message) => {
                assert!(message.starts_with("Get CGS for Remote: https://cgs.link/?link="))
            }
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_share_prefers_valid_canonical_link() {
        let mut h = harness_with(&[], Some("Linked"), |store| {
            abc(store);
            write_package(
                store,
                "Linked",
                r#"{"name":"Linked","autoUpdateUrl":"https://x.org/linked.json","shareLink":"https://x.org/share/linked"}"#,
            );
            write_package(
                store,
                "Mangled",
                r#"{"name":"Mangled","autoUpdateUrl":"https://x.org/mangled.json","shareLink":"not a link"}"#,
            );
        });
        h.manager.initialize().await.unwrap();

        assert_eq!(
            h.manager.share().unwrap(),
            ShareOutcome::Message("Get CGS for Linked: https://x.org/share/linked".to_string())
        );

        h.manager.select("Mangled").await.unwrap();
        match h.manager.share().unwrap() {
            ShareOutcome::Message(message) => {
                assert!(message.starts_with("Get CGS for Mangled: https://cgs.link/?link="));
                assert!(!message.contains("not a link"));
            }
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_open_link_downloads_resolved_url() {
        let mut h = harness_with(&[], None, abc);
        serve_remote(&h.fetcher);
        h.manager.initialize().await.unwrap();

        let landing = format!(
            "https://www.cardgamesimulator.com/link?url={}",
            url::form_urlencoded::byte_serialize(REMOTE_URL.as_bytes()).collect::<String>()
        );
        let link = format!(
            "https://cgs.link/?link={}",
            url::form_urlencoded::byte_serialize(landing.as_bytes()).collect::<String>()
        );

        assert_eq!(h.manager.open_link(&link).await.unwrap(), "Remote@x.org");
        assert!(matches!(
            h.manager.open_link("https://x.org/link?nothing=1").await,
            Err(CatalogError::MalformedLink(_))
        ));
    }

    #[tokio::test]
    async fn test_load_events_are_streamed() {
        let (tx, mut rx) = load_event_channel();
        let mut h = harness_with(&[], None, abc);
        h.manager = CatalogManager::new(
            h.manager.settings().clone(),
            h.fetcher.clone(),
            h.notifier.clone(),
            Box::new(MemoryPreferences::new()),
        )
        .with_load_events(tx);

        h.manager.initialize().await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(events.contains(&LoadEvent::Finished {
            package_id: "A".to_string()
        }));
    }

    #[tokio::test]
    async fn test_empty_store_after_purge_uses_placeholder() {
        let mut h = harness_with(&[], None, |store| {
            write_package(store, "_INVALID_", r#"{"name":"_INVALID_"}"#);
        });
        h.manager.initialize().await.unwrap();

        assert!(h.manager.catalog().is_empty());
        assert!(h.manager.current().is_reserved());
        assert!(h.manager.next().is_reserved());
        assert!(matches!(h.manager.delete().await, Err(CatalogError::LastPackage)));
    }

    #[tokio::test]
    async fn test_shutdown_clears_observers() {
        let mut h = harness_with(&[], None, abc);
        h.manager.initialize().await.unwrap();
        let _subscription = h.manager.subscribe_ready(|_| {});

        h.manager.shutdown();
        assert!(!h.manager.store().import_dir().exists());
    }
}
