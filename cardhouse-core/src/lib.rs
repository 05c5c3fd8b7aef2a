//! Cardhouse Core Library
//!
//! This crate provides the core functionality for cardhouse, a manager for
//! card game definition packages. It includes:
//!
//! - Package catalog: discovery, import, export, download, update, delete
//! - Current-package selection with persisted preference
//! - Paginated and lazy per-set card loading
//! - Deep-link resolution and share-link construction
//! - Configuration management (catalog settings)
//! - Database layer for settings and preferences

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;

// Re-exports for convenience
pub use catalog::{
    CatalogManager, Fetcher, HttpFetcher, ImportOutcome, LogNotifier, Notifier,
    PackageDescriptor, ShareOutcome, Subscription,
};
pub use config::CatalogSettings;
pub use db::{Database, MemoryPreferences, PreferenceStore};
pub use error::{CatalogError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
