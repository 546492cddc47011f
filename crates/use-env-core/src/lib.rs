//! use-env core
//!
//! Resolves `${provider:payload}` secret references embedded in `KEY=VALUE`
//! environment files and produces a fully substituted file.
//!
//! ## Architecture
//!
//! 1. **Parser** (`parser`): raw text into ordered [`EnvVariable`] records.
//! 2. **Reference scanner** (`reference`): tokens from each variable value.
//! 3. **Providers** (`providers`): the [`Provider`] trait, built-in
//!    providers and the [`ProviderRegistry`].
//! 4. **Loader** (`loader`): provisions providers, resolves each distinct
//!    reference once under a strict or lenient policy, and closes every
//!    provider it used.
//! 5. **Rewriter** (`rewriter`): substitutes resolved values over the whole
//!    file text.
//!
//! Configuration (`config`) declares named provider instances and their
//! settings.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use use_env_core::{ContentSource, EnvLoader, LoadOptions, OutputTarget, ProviderRegistry, UseEnvConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(ProviderRegistry::with_builtin_providers()?);
//! let loader = EnvLoader::new(registry, UseEnvConfig::default());
//!
//! let result = loader
//!     .load(
//!         ContentSource::Text("DB_HOST=${env:DB_HOST}\n".to_string()),
//!         OutputTarget::Caller,
//!         LoadOptions::default().with_strict(false),
//!     )
//!     .await?;
//!
//! print!("{}", result.content);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod loader;
pub mod parser;
pub mod providers;
pub mod reference;
pub mod rewriter;

pub use config::{ConfigError, ProviderConfig, UseEnvConfig};
pub use error::LoadError;
pub use loader::{
    ContentSource, EnvLoader, LoadOptions, LoadResult, OutputLocation, OutputTarget, ResolutionError,
    DEFAULT_CONCURRENCY,
};
pub use parser::EnvVariable;
pub use providers::{
    Provider, ProviderDescriptor, ProviderError, ProviderErrorKind, ProviderInfo, ProviderMetadata,
    ProviderRegistry, ProviderResult, ProviderSettings, RegistryError,
};
pub use reference::{canonical_key, SecretReference, REFERENCE_PATTERN};
