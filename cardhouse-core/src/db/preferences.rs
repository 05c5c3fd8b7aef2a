//! Persisted user preferences.

use std::sync::Mutex;

use super::Database;
use crate::error::Result;

/// Settings key holding the last selected package id.
pub const PREFERRED_PACKAGE_KEY: &str = "preferred_package";

/// Key-value store for the preferred (last selected) package.
pub trait PreferenceStore: Send {
    fn preferred_package(&self) -> Result<Option<String>>;

    fn set_preferred_package(&self, id: &str) -> Result<()>;
}

impl PreferenceStore for Database {
    fn preferred_package(&self) -> Result<Option<String>> {
        Ok(self.get_setting(PREFERRED_PACKAGE_KEY)?)
    }

    fn set_preferred_package(&self, id: &str) -> Result<()> {
        Ok(self.set_setting(PREFERRED_PACKAGE_KEY, id)?)
    }
}

/// Process-local preferences, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    preferred: Mutex<Option<String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preferred(id: &str) -> Self {
        Self {
            preferred: Mutex::new(Some(id.to_string())),
        }
    }
}

impl PreferenceStore for MemoryPreferences {
    fn preferred_package(&self) -> Result<Option<String>> {
        let preferred = self.preferred.lock().unwrap_or_else(|p| p.into_inner());
        Ok(preferred.clone())
    }

    fn set_preferred_package(&self, id: &str) -> Result<()> {
        let mut preferred = self.preferred.lock().unwrap_or_else(|p| p.into_inner());
        *preferred = Some(id.to_string());
        Ok(())
    }
}
