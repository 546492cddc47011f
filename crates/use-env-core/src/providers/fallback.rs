//! Fallback Provider
//!
//! Combines several providers into a priority-ordered chain. A payload is
//! handed to each provider in turn until one resolves it.
//!
//! # Example
//!
//! ```rust,ignore
//! use use_env_core::providers::{FallbackProvider, EnvironmentProvider, FileProvider};
//!
//! // Try the environment first, then a mounted secrets directory
//! let chain = FallbackProvider::new()
//!     .with_provider(EnvironmentProvider::new())
//!     .with_provider(FileProvider::with_base_path("/run/secrets"));
//!
//! let value = chain.resolve("DB_PASSWORD").await?;
//! ```

use super::traits::{Provider, ProviderError, ProviderInfo, ProviderMetadata, ProviderResult};
use std::sync::Arc;

const NAME: &str = "fallback";

/// A chain of providers tried in order
///
/// Providers are tried in the order they were added. The first provider to
/// return a value wins; when all fail the error lists every failure.
pub struct FallbackProvider {
    info: ProviderInfo,
    providers: Vec<Arc<dyn Provider>>,
}

impl std::fmt::Debug for FallbackProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackProvider")
            .field("providers", &self.provider_names())
            .finish()
    }
}

impl FallbackProvider {
    /// Create an empty chain
    pub fn new() -> Self {
        Self {
            info: Self::metadata(),
            providers: Vec::new(),
        }
    }

    /// Add a provider to the chain (builder pattern)
    ///
    /// Providers added first have higher priority.
    pub fn with_provider<P: Provider + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Add a shared provider instance
    pub fn add_provider(&mut self, provider: Arc<dyn Provider>) {
        self.providers.push(provider);
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Provider names in priority order
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.info().name.as_str()).collect()
    }
}

impl Default for FallbackProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderMetadata for FallbackProvider {
    fn metadata() -> ProviderInfo {
        ProviderInfo::new(NAME, "Fallback provider that tries multiple sources")
            .with_author("use-env contributors")
    }
}

#[async_trait::async_trait]
impl Provider for FallbackProvider {
    fn info(&self) -> &ProviderInfo {
        &self.info
    }

    async fn resolve(&self, reference: &str) -> ProviderResult<String> {
        if self.providers.is_empty() {
            return Err(ProviderError::unavailable(
                NAME,
                reference,
                "No providers configured in chain",
            ));
        }

        let mut errors = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            let name = provider.info().name.as_str();
            if !provider.validate_reference(reference) {
                errors.push(format!("{}: invalid reference format", name));
                continue;
            }

            match provider.resolve(reference).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::debug!(
                        provider = name,
                        error = %e,
                        "Provider returned error, trying next"
                    );
                    errors.push(format!("{}: {}", name, e.message));
                }
            }
        }

        Err(ProviderError::not_found(
            NAME,
            reference,
            format!("All providers failed for '{}': {}", reference, errors.join("; ")),
        ))
    }

    async fn close(&self) -> ProviderResult<()> {
        let mut first_error = None;
        for provider in &self.providers {
            if let Err(e) = provider.close().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::env::EnvironmentProvider;
    use crate::providers::file::FileProvider;
    use crate::providers::traits::ProviderErrorKind;

    #[tokio::test]
    async fn test_empty_chain() {
        let chain = FallbackProvider::new();
        assert!(chain.is_empty());

        let err = chain.resolve("anything").await.unwrap_err();
        assert!(err.is(ProviderErrorKind::Unavailable));
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        std::env::set_var("USE_ENV_FALLBACK_FIRST", "from-env");
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("USE_ENV_FALLBACK_FIRST"), "from-file").unwrap();

        let chain = FallbackProvider::new()
            .with_provider(EnvironmentProvider::new())
            .with_provider(FileProvider::with_base_path(dir.path()));

        assert_eq!(chain.resolve("USE_ENV_FALLBACK_FIRST").await.unwrap(), "from-env");
        std::env::remove_var("USE_ENV_FALLBACK_FIRST");
    }

    #[tokio::test]
    async fn test_falls_back_to_next_provider() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("USE_ENV_FALLBACK_NEXT"), "from-file").unwrap();

        let chain = FallbackProvider::new()
            .with_provider(EnvironmentProvider::new())
            .with_provider(FileProvider::with_base_path(dir.path()));

        assert_eq!(chain.resolve("USE_ENV_FALLBACK_NEXT").await.unwrap(), "from-file");
    }

    #[tokio::test]
    async fn test_all_failures_are_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let chain = FallbackProvider::new()
            .with_provider(EnvironmentProvider::new())
            .with_provider(FileProvider::with_base_path(dir.path()));

        let err = chain.resolve("USE_ENV_FALLBACK_NONE").await.unwrap_err();
        assert!(err.message.contains("env:"));
        assert!(err.message.contains("file:"));
        assert_eq!(err.provider, "fallback");
    }

    #[test]
    fn test_provider_names() {
        let chain = FallbackProvider::new()
            .with_provider(EnvironmentProvider::new())
            .with_provider(FileProvider::new());

        assert_eq!(chain.len(), 2);
        assert_eq!(chain.provider_names(), vec!["env", "file"]);
    }
}
