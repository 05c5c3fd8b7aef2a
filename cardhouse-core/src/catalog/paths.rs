//! Data-directory path management for card game packages.
//!
//! Packages live under the per-user data directory:
//!
//! - Linux: `~/.local/share/cardhouse/`
//! - macOS: `~/Library/Application Support/cardhouse/`
//! - Windows: `C:\Users\<User>\AppData\Roaming\cardhouse\`
//!
//! The live store, the import staging area and the export area are sibling
//! directories so staging never touches live packages.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Subdirectory name under the OS data folder.
const CARDHOUSE_DIR: &str = "cardhouse";

/// Name of the metadata file at each package root.
pub const METADATA_FILE: &str = "game.json";

/// Subdirectory holding bulk card pages.
pub const CARDS_DIR: &str = "cards";

/// Subdirectory holding one file per lazily loaded set.
pub const SETS_DIR: &str = "sets";

/// Banner image file name.
pub const BANNER_FILE: &str = "banner.png";

// ============================================================================
// Path Resolution
// ============================================================================

/// Returns the base cardhouse directory inside the OS data folder.
///
/// Falls back to the temp folder when no data directory can be determined.
pub fn get_cardhouse_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/share")))
        .unwrap_or_else(std::env::temp_dir)
        .join(CARDHOUSE_DIR)
}

/// Path: `{data}/cardhouse/games/`
pub fn get_games_dir() -> PathBuf {
    get_cardhouse_dir().join("games")
}

/// Path: `{data}/cardhouse/import/`
pub fn get_import_dir() -> PathBuf {
    get_cardhouse_dir().join("import")
}

/// Path: `{data}/cardhouse/export/`
pub fn get_export_dir() -> PathBuf {
    get_cardhouse_dir().join("export")
}

/// Path: `{data}/cardhouse/cardhouse.db`
pub fn get_database_path() -> PathBuf {
    get_cardhouse_dir().join("cardhouse.db")
}

/// Relative path of one bulk card page inside a package directory.
pub fn page_file(package_dir: &Path, page: u32) -> PathBuf {
    package_dir.join(CARDS_DIR).join(format!("{}.json", page))
}

/// Creates each directory if missing.
///
/// # Errors
///
/// Returns an error if any directory cannot be created (e.g., permission issues).
pub fn ensure_dirs_exist(dirs: &[&Path]) -> Result<()> {
    for dir in dirs {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }

    Ok(())
}
