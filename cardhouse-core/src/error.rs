//! Error kinds surfaced by catalog operations.
//!
//! Every failure in the catalog subsystem is recoverable at the operation
//! boundary: callers match on the kind to decide whether to show a message,
//! offer a fallback, or retry.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by the catalog manager and its collaborators.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// An archive or file was expected on disk but is missing.
    #[error("File not found at {0}")]
    NotFound(PathBuf),

    /// A link failed URI validation at some resolution step.
    #[error("Malformed link: {0}")]
    MalformedLink(String),

    /// An archive was structurally invalid or lacked the expected content.
    #[error("Failed to import: {0}")]
    ImportFailure(String),

    /// A transport or remote-content failure.
    #[error("Error downloading game: {0}")]
    DownloadFailure(String),

    /// Local metadata or card data could not be parsed.
    #[error("Error loading game: {0}")]
    LoadFailure(String),

    /// Selection of an id that is not in the catalog.
    #[error("Could not select the card game because it is not recognized: {0}")]
    UnknownPackage(String),

    /// Delete attempted on the sole remaining package.
    #[error("Please download additional card games before deleting")]
    LastPackage,

    /// Preference or settings persistence failed.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl CatalogError {
    /// Wraps an `anyhow` chain as a load failure, keeping the full context.
    pub fn load(err: impl std::fmt::Display) -> Self {
        Self::LoadFailure(err.to_string())
    }

    /// Wraps an `anyhow` chain as a download failure.
    pub fn download(err: impl std::fmt::Display) -> Self {
        Self::DownloadFailure(err.to_string())
    }

    /// Wraps an `anyhow` chain as an import failure.
    pub fn import(err: impl std::fmt::Display) -> Self {
        Self::ImportFailure(err.to_string())
    }
}

/// Result alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;
