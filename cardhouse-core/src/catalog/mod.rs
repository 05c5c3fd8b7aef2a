//! Card game package catalog and lifecycle management.
//!
//! # Architecture
//!
//! - `types`: Package identity, metadata and in-memory descriptors
//! - `paths`: Data-directory resolution and on-disk layout
//! - `archive`: Archive extraction (zip, tar.gz, tar.xz) and zip creation
//! - `fetch`: Byte fetching over HTTP(S)
//! - `store`: Filesystem-backed package store
//! - `defaults`: Built-in packages seeded into an empty store
//! - `loader`: Paginated bulk and lazy per-set card loading
//! - `deep_link`: Deep-link resolution and share-link construction
//! - `notify`: User messages, ready observers and load events
//! - `manager`: High-level API owning the catalog and current selection
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cardhouse_core::catalog::{CatalogManager, HttpFetcher, LogNotifier};
//! use cardhouse_core::{CatalogSettings, Database};
//!
//! let db = Database::open()?;
//! db.migrate()?;
//! let settings = CatalogSettings::load(&db);
//!
//! let mut manager = CatalogManager::new(
//!     settings,
//!     Arc::new(HttpFetcher::new()),
//!     Arc::new(LogNotifier),
//!     Box::new(db),
//! );
//! manager.initialize().await?;
//! println!("Current: {}", manager.current());
//! ```

pub mod archive;
pub mod deep_link;
pub mod defaults;
pub mod fetch;
pub mod loader;
pub mod manager;
pub mod notify;
pub mod paths;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use deep_link::{build_share_link, is_well_formed, resolve, LinkSettings};
pub use fetch::{Fetcher, HttpFetcher};
pub use loader::{CardPageSource, ContentLoader, StoreCardSource};
pub use manager::{CatalogManager, ImportOutcome, ShareOutcome};
pub use notify::{
    load_event_channel, LoadEvent, LoadEventReceiver, LoadEventSender, LogNotifier, Notifier,
    ReadyObservers, Subscription,
};
pub use store::PackageStore;
pub use types::{Card, LoadState, PackageDescriptor, PackageMetadata, SetDescriptor, SetMetadata};
