//! Environment Variable Provider
//!
//! Resolves references to variables of the current process environment,
//! useful for passing values through from CI or a shell.
//!
//! # Reference Format
//!
//! ```text
//! DATABASE_HOST=${env:DATABASE_HOST}
//! APP_ENV=${env:APP_ENV}
//! ```
//!
//! # Settings
//!
//! - `cache_enabled` (bool, default `true`): remember values for the life
//!   of the instance

use super::traits::{
    setting_bool, Provider, ProviderError, ProviderInfo, ProviderMetadata, ProviderResult,
    ProviderSettings,
};
use std::collections::HashMap;
use std::sync::RwLock;

const NAME: &str = "env";

/// Provider for process environment variables
#[derive(Debug)]
pub struct EnvironmentProvider {
    info: ProviderInfo,
    cache_enabled: bool,
    cache: RwLock<HashMap<String, String>>,
}

impl EnvironmentProvider {
    /// Create a new environment provider
    pub fn new() -> Self {
        Self {
            info: Self::metadata(),
            cache_enabled: true,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn cached(&self, reference: &str) -> Option<String> {
        if !self.cache_enabled {
            return None;
        }
        self.cache.read().ok()?.get(reference).cloned()
    }

    fn remember(&self, reference: &str, value: &str) {
        if !self.cache_enabled {
            return;
        }
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(reference.to_string(), value.to_string());
        }
    }
}

impl Default for EnvironmentProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderMetadata for EnvironmentProvider {
    fn metadata() -> ProviderInfo {
        ProviderInfo::new(NAME, "Environment variable provider")
            .with_author("use-env contributors")
            .with_pattern(r"^[A-Za-z_][A-Za-z0-9_]*$")
    }
}

#[async_trait::async_trait]
impl Provider for EnvironmentProvider {
    fn info(&self) -> &ProviderInfo {
        &self.info
    }

    async fn resolve(&self, reference: &str) -> ProviderResult<String> {
        if let Some(value) = self.cached(reference) {
            tracing::trace!(provider = NAME, reference = reference, "Cache hit");
            return Ok(value);
        }

        if !self.validate_reference(reference) {
            return Err(ProviderError::invalid_reference(NAME, reference));
        }

        match std::env::var(reference) {
            Ok(value) => {
                self.remember(reference, &value);
                Ok(value)
            }
            Err(std::env::VarError::NotPresent) => Err(ProviderError::not_found(
                NAME,
                reference,
                format!("Environment variable '{}' is not set", reference),
            )),
            Err(std::env::VarError::NotUnicode(_)) => Err(ProviderError::configuration(
                NAME,
                reference,
                format!("Environment variable '{}' contains invalid UTF-8", reference),
            )),
        }
    }

    fn configure(&mut self, settings: &ProviderSettings) -> ProviderResult<()> {
        if let Some(enabled) = setting_bool(settings, NAME, "cache_enabled")? {
            self.cache_enabled = enabled;
        }
        Ok(())
    }

    async fn close(&self) -> ProviderResult<()> {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
        Ok(())
    }
}
