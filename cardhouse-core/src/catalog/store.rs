//! Filesystem-backed package store.
//!
//! Layout per package directory (`{games}/{id}/`):
//!
//! - `game.json`: metadata
//! - `cards/{page}.json`: bulk card pages
//! - `sets/{code}.json`: lazily fetched set files
//! - `banner.png`: optional banner image
//!
//! Imports and downloads are assembled in per-operation staging directories
//! under the import area and only moved into the live store once complete.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::archive::{self, ArchiveFormat};
use super::defaults::builtin_packages;
use super::paths::{self, METADATA_FILE};
use super::types::{safe_file_name, Card, PackageMetadata};

/// Directory-tree store for packages.
#[derive(Debug, Clone)]
pub struct PackageStore {
    games_dir: PathBuf,
    import_dir: PathBuf,
    export_dir: PathBuf,
}

impl PackageStore {
    pub fn new(games_dir: PathBuf, import_dir: PathBuf, export_dir: PathBuf) -> Self {
        Self {
            games_dir,
            import_dir,
            export_dir,
        }
    }

    /// Store with `games/`, `import/` and `export/` under one root.
    pub fn at_root(root: &Path) -> Self {
        Self::new(root.join("games"), root.join("import"), root.join("export"))
    }

    pub fn games_dir(&self) -> &Path {
        &self.games_dir
    }

    pub fn import_dir(&self) -> &Path {
        &self.import_dir
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    pub fn package_dir(&self, id: &str) -> PathBuf {
        self.games_dir.join(id)
    }

    pub fn package_exists(&self, id: &str) -> bool {
        self.package_dir(id).is_dir()
    }

    // ========================================================================
    // Enumeration
    // ========================================================================

    /// Names of all package directories, sorted.
    pub fn list_package_dirs(&self) -> Result<Vec<String>> {
        if !self.games_dir.is_dir() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.games_dir).with_context(|| {
            format!("Failed to read games directory: {}", self.games_dir.display())
        })?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Writes the built-in packages. Existing directories are left alone.
    pub fn seed_defaults(&self) -> Result<()> {
        for package in builtin_packages() {
            let dir = self.package_dir(&package.metadata.name);
            if dir.exists() {
                continue;
            }

            info!("Seeding built-in package {}", package.metadata.name);
            write_metadata(&dir, &package.metadata)?;
            let page = package.metadata.all_cards_url_page_count_start_index;
            write_json(&paths::page_file(&dir, page), &package.cards)?;
        }
        Ok(())
    }

    // ========================================================================
    // Metadata & Cards
    // ========================================================================

    pub fn read_metadata(&self, id: &str) -> Result<PackageMetadata> {
        read_metadata_at(&self.package_dir(id))
    }

    pub fn write_metadata(&self, id: &str, metadata: &PackageMetadata) -> Result<()> {
        write_metadata(&self.package_dir(id), metadata)
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Removes a package directory tree.
    pub fn delete_package(&self, id: &str) -> Result<()> {
        remove_dir(&self.package_dir(id))
    }

    /// Creates a fresh, empty staging directory under the import area.
    pub fn create_staging_dir(&self) -> Result<PathBuf> {
        let dir = self.import_dir.join(uuid::Uuid::new_v4().to_string());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create staging directory: {}", dir.display()))?;
        debug!("Created staging directory {}", dir.display());
        Ok(dir)
    }

    /// Moves a fully assembled package into the live store as `id`,
    /// replacing any existing copy.
    pub fn install_from(&self, staged_dir: &Path, id: &str) -> Result<PathBuf> {
        let target = self.package_dir(id);
        if target.exists() {
            info!("Replacing existing package directory {}", target.display());
            remove_dir(&target)?;
        }

        fs::create_dir_all(&self.games_dir).with_context(|| {
            format!("Failed to create games directory: {}", self.games_dir.display())
        })?;

        if fs::rename(staged_dir, &target).is_err() {
            // Staging may sit on another filesystem.
            copy_dir(staged_dir, &target)?;
            remove_dir(staged_dir)?;
        }

        info!("Installed package {} at {}", id, target.display());
        Ok(target)
    }

    /// Zips a package as `<safe id>.zip` with a single top-level `<safe id>/`
    /// folder, so the archive re-imports under the same id.
    pub fn export(&self, id: &str) -> Result<PathBuf> {
        let source = self.package_dir(id);
        if !source.is_dir() {
            anyhow::bail!("Package directory not found: {}", source.display());
        }

        let safe_id = safe_file_name(id);
        let container = self.export_dir.join(&safe_id);
        if container.exists() {
            remove_dir(&container)?;
        }

        copy_dir(&source, &container.join(&safe_id))?;
        let archive = archive::create_zip(&container, &self.export_dir, &format!("{}.zip", safe_id));
        if let Err(e) = remove_dir(&container) {
            warn!("Failed to clean up export container: {:#}", e);
        }

        archive
    }

    /// Extracts an archive into a new staging directory and returns it.
    pub fn extract_to_staging(&self, archive_path: &Path) -> Result<PathBuf> {
        let staging = self.create_staging_dir()?;
        let format = ArchiveFormat::from_path(archive_path);
        if let Err(e) = archive::extract_archive(archive_path, &staging, format) {
            remove_dir_best_effort(&staging);
            return Err(e);
        }
        Ok(staging)
    }
}

// ============================================================================
// Free helpers
// ============================================================================

pub fn read_metadata_at(package_dir: &Path) -> Result<PackageMetadata> {
    let path = package_dir.join(METADATA_FILE);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read metadata from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid metadata at {}", path.display()))
}

pub fn write_metadata(package_dir: &Path, metadata: &PackageMetadata) -> Result<()> {
    write_json(&package_dir.join(METADATA_FILE), metadata)
}

/// Parses a card data file (a JSON array of cards).
pub fn read_cards(path: &Path) -> Result<Vec<Card>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read card data from {}", path.display()))?;
    parse_cards(&content).with_context(|| format!("Invalid card data at {}", path.display()))
}

/// Accepts a bare array or an object with a `cards` array.
pub fn parse_cards(content: &str) -> Result<Vec<Card>> {
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum CardFile {
        Bare(Vec<Card>),
        Wrapped { cards: Vec<Card> },
    }

    Ok(match serde_json::from_str::<CardFile>(content)? {
        CardFile::Bare(cards) | CardFile::Wrapped { cards } => cards,
    })
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Recursively copies `source` into `target`.
pub fn copy_dir(source: &Path, target: &Path) -> Result<()> {
    fs::create_dir_all(target)
        .with_context(|| format!("Failed to create directory: {}", target.display()))?;

    for entry in fs::read_dir(source)
        .with_context(|| format!("Failed to read directory: {}", source.display()))?
    {
        let entry = entry?;
        let from = entry.path();
        let to = target.join(entry.file_name());
        if from.is_dir() {
            copy_dir(&from, &to)?;
        } else {
            fs::copy(&from, &to).with_context(|| {
                format!("Failed to copy {} to {}", from.display(), to.display())
            })?;
        }
    }
    Ok(())
}

fn remove_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)
            .with_context(|| format!("Failed to remove {}", dir.display()))?;
    }
    Ok(())
}

/// Deletes a directory tree, logging instead of failing.
pub fn remove_dir_best_effort(dir: &Path) {
    if let Err(e) = remove_dir(dir) {
        warn!("Error deleting directory: {:#}", e);
    }
}

/// Finds the package folder inside an extracted archive.
///
/// Prefers `expected`; otherwise accepts the single top-level directory the
/// archive produced.
pub fn locate_extracted_package(staging: &Path, expected: &str) -> Option<(String, PathBuf)> {
    let expected_dir = staging.join(expected);
    if expected_dir.is_dir() {
        return Some((expected.to_string(), expected_dir));
    }

    let dirs: Vec<PathBuf> = fs::read_dir(staging)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();

    match dirs.as_slice() {
        [only] => {
            let name = only.file_name()?.to_string_lossy().into_owned();
            debug!("Archive folder {} differs from expected {}", name, expected);
            Some((name, only.clone()))
        }
        _ => None,
    }
}
