//! Configuration module for cardhouse.
//!
//! Manages catalog settings stored in SQLite.

mod settings;

pub use settings::CatalogSettings;
