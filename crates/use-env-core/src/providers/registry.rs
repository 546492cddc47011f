//! Provider Registry
//!
//! A directory of provider types (descriptors with metadata and a factory)
//! plus a cache of singleton instances keyed by registered name.
//!
//! The registry is an explicit value rather than process-global state: build
//! one per process (or per test) and share it behind an `Arc`. Both maps sit
//! behind a single `RwLock`, so concurrent loads may call [`ProviderRegistry::get`]
//! safely. A configuring `get` still replaces the cached instance for that
//! name, so two loads configuring the same provider type differently will
//! observe whichever configuration was applied last.
//!
//! # Example
//!
//! ```rust,ignore
//! use use_env_core::providers::{ProviderDescriptor, ProviderRegistry, EnvironmentProvider};
//!
//! let registry = ProviderRegistry::new();
//! registry.register(ProviderDescriptor::of::<EnvironmentProvider>(), None)?;
//!
//! let env = registry.get("env", None)?;
//! let home = env.resolve("HOME").await?;
//! ```

use super::traits::{Provider, ProviderInfo, ProviderMetadata, ProviderError, ProviderSettings};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Factory producing a fresh, unconfigured provider instance
pub type ProviderFactory = Arc<dyn Fn() -> Box<dyn Provider> + Send + Sync>;

/// Errors raised by registry operations
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A provider with this name is already registered
    #[error("Provider '{0}' is already registered")]
    DuplicateProvider(String),

    /// The descriptor carries no metadata
    #[error("Provider descriptor must carry ProviderInfo metadata")]
    MissingMetadata,

    /// The declared reference pattern is not a valid regular expression
    #[error("Provider '{name}' declares an invalid reference pattern: {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    /// No provider is registered under the requested name
    #[error("Provider '{name}' not found. Available providers: {available}")]
    NotFound { name: String, available: String },

    /// The provider rejected its settings
    #[error("Failed to configure provider '{name}': {source}")]
    Configuration {
        name: String,
        #[source]
        source: ProviderError,
    },

    /// The registry lock was poisoned by a panicking thread
    #[error("Provider registry lock poisoned")]
    LockPoisoned,
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// A registrable provider type
#[derive(Clone)]
pub struct ProviderDescriptor {
    info: Option<ProviderInfo>,
    factory: ProviderFactory,
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl ProviderDescriptor {
    /// Create a descriptor from a factory, without metadata
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn Provider> + Send + Sync + 'static,
    {
        Self {
            info: None,
            factory: Arc::new(factory),
        }
    }

    /// Attach metadata (builder pattern)
    pub fn with_info(mut self, info: ProviderInfo) -> Self {
        self.info = Some(info);
        self
    }

    /// Build a descriptor for a provider type with static metadata
    pub fn of<P>() -> Self
    where
        P: Provider + ProviderMetadata + Default + 'static,
    {
        Self::new(|| Box::new(P::default()) as Box<dyn Provider>).with_info(P::metadata())
    }

    /// Metadata attached to this descriptor, if any
    pub fn info(&self) -> Option<&ProviderInfo> {
        self.info.as_ref()
    }

    fn create(&self) -> Box<dyn Provider> {
        (self.factory)()
    }
}

#[derive(Default)]
struct RegistryState {
    descriptors: BTreeMap<String, ProviderDescriptor>,
    instances: HashMap<String, Arc<dyn Provider>>,
}

/// Registry of provider types and their cached instances
#[derive(Default)]
pub struct ProviderRegistry {
    state: RwLock<RegistryState>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.names();
        f.debug_struct("ProviderRegistry")
            .field("providers", &names)
            .finish()
    }
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in provider
    pub fn with_builtin_providers() -> RegistryResult<Self> {
        let registry = Self::new();
        super::register_builtin_providers(&registry)?;
        Ok(registry)
    }

    fn read(&self) -> RegistryResult<RwLockReadGuard<'_, RegistryState>> {
        self.state.read().map_err(|_| RegistryError::LockPoisoned)
    }

    fn write(&self) -> RegistryResult<RwLockWriteGuard<'_, RegistryState>> {
        self.state.write().map_err(|_| RegistryError::LockPoisoned)
    }

    /// Register a provider type
    ///
    /// The provider is registered under `name` when given, otherwise under
    /// the name declared in its metadata.
    pub fn register(&self, descriptor: ProviderDescriptor, name: Option<&str>) -> RegistryResult<()> {
        let info = descriptor.info.as_ref().ok_or(RegistryError::MissingMetadata)?;
        let provider_name = name.unwrap_or(&info.name).to_string();

        if let Some(pattern) = info.reference_pattern() {
            Regex::new(pattern).map_err(|source| RegistryError::InvalidPattern {
                name: provider_name.clone(),
                source,
            })?;
        }

        let mut state = self.write()?;
        if state.descriptors.contains_key(&provider_name) {
            return Err(RegistryError::DuplicateProvider(provider_name));
        }

        tracing::debug!(provider = %provider_name, "Registered provider");
        state.descriptors.insert(provider_name, descriptor);
        Ok(())
    }

    /// Get a provider instance by name
    ///
    /// Without settings the cached singleton is returned, created on first
    /// access. With settings a fresh instance is built, configured, and
    /// replaces the cached one; settings are never merged across calls.
    pub fn get(&self, name: &str, settings: Option<&ProviderSettings>) -> RegistryResult<Arc<dyn Provider>> {
        if settings.is_none() {
            if let Some(instance) = self.read()?.instances.get(name) {
                return Ok(Arc::clone(instance));
            }
        }

        let mut state = self.write()?;
        let descriptor = match state.descriptors.get(name) {
            Some(descriptor) => descriptor,
            None => {
                let available = state.descriptors.keys().cloned().collect::<Vec<_>>().join(", ");
                return Err(RegistryError::NotFound {
                    name: name.to_string(),
                    available,
                });
            }
        };

        let mut provider = descriptor.create();
        match settings {
            Some(settings) => {
                provider
                    .configure(settings)
                    .map_err(|source| RegistryError::Configuration {
                        name: name.to_string(),
                        source,
                    })?;
                tracing::debug!(provider = %name, "Configured provider instance");
            }
            None => {
                // Another caller may have created it while we waited for the lock
                if let Some(instance) = state.instances.get(name) {
                    return Ok(Arc::clone(instance));
                }
            }
        }

        let instance: Arc<dyn Provider> = Arc::from(provider);
        state.instances.insert(name.to_string(), Arc::clone(&instance));
        Ok(instance)
    }

    /// Metadata for every registered provider type, ordered by name
    pub fn list(&self) -> Vec<ProviderInfo> {
        self.read()
            .map(|state| {
                state
                    .descriptors
                    .values()
                    .filter_map(|d| d.info.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Registered names, ordered
    pub fn names(&self) -> Vec<String> {
        self.read()
            .map(|state| state.descriptors.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Check if a provider is registered
    pub fn is_registered(&self, name: &str) -> bool {
        self.read()
            .map(|state| state.descriptors.contains_key(name))
            .unwrap_or(false)
    }

    /// Close every cached instance and forget all registrations
    ///
    /// `close()` failures are logged and otherwise ignored.
    pub async fn clear(&self) {
        let instances: Vec<(String, Arc<dyn Provider>)> = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.descriptors.clear();
            state.instances.drain().collect()
        };

        for (name, instance) in instances {
            if let Err(e) = instance.close().await {
                tracing::debug!(provider = %name, error = %e, "Ignoring close failure during registry clear");
            }
        }
    }
}
