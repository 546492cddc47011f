//! Secret Providers
//!
//! Pluggable resolvers that turn the payload of a `${name:payload}` token
//! into a value. Every provider implements the [`Provider`] trait and is
//! made available to the loader through a [`ProviderRegistry`].
//!
//! # Built-in Providers
//!
//! - **env**: Process environment variables
//! - **file**: Local files (Docker/Kubernetes secrets, plain files)
//! - **vault**: HashiCorp Vault KV engine (v1 and v2)
//! - **1password**: 1Password Connect server
//!
//! [`FallbackProvider`] chains several providers and is not registered by
//! default.
//!
//! # Example
//!
//! ```rust,ignore
//! use use_env_core::providers::{Provider, ProviderRegistry};
//!
//! let registry = ProviderRegistry::with_builtin_providers()?;
//! let env = registry.get("env", None)?;
//! let home = env.resolve("HOME").await?;
//! ```

pub mod traits;
pub mod registry;
pub mod env;
pub mod file;
pub mod vault;
pub mod onepassword;
pub mod fallback;

// Re-export core types
pub use traits::{
    ProgressCallback, Provider, ProviderError, ProviderErrorKind, ProviderInfo, ProviderMetadata,
    ProviderResult, ProviderSettings,
};
pub use registry::{ProviderDescriptor, ProviderFactory, ProviderRegistry, RegistryError, RegistryResult};

// Re-export provider implementations
pub use env::EnvironmentProvider;
pub use file::FileProvider;
pub use vault::{HashiCorpVaultProvider, VaultConfig};
pub use onepassword::OnePasswordConnectProvider;
pub use fallback::FallbackProvider;

/// Build `{base}/{segments...}`, percent-encoding each segment
///
/// Payload text never changes the query, fragment or segment structure of
/// the request. Errors describe an unusable base address.
pub(crate) fn endpoint_url<I>(base: &str, segments: I) -> Result<reqwest::Url, String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut url = reqwest::Url::parse(base).map_err(|e| format!("Invalid server address '{}': {}", base, e))?;
    url.path_segments_mut()
        .map_err(|_| format!("Server address '{}' cannot carry a path", base))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Register every built-in provider type
///
/// Names that are already registered are left untouched, so calling this
/// more than once is harmless.
pub fn register_builtin_providers(registry: &ProviderRegistry) -> RegistryResult<()> {
    let builtins = [
        ProviderDescriptor::of::<EnvironmentProvider>(),
        ProviderDescriptor::of::<FileProvider>(),
        ProviderDescriptor::of::<HashiCorpVaultProvider>(),
        ProviderDescriptor::of::<OnePasswordConnectProvider>(),
    ];

    for descriptor in builtins {
        let already = descriptor
            .info()
            .map(|info| registry.is_registered(&info.name))
            .unwrap_or(false);
        if !already {
            registry.register(descriptor, None)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_providers_registered() {
        let registry = ProviderRegistry::with_builtin_providers().unwrap();
        assert_eq!(
            registry.names(),
            vec!["1password", "env", "file", "vault"]
        );
        assert!(!registry.is_registered("fallback"));
    }

    #[test]
    fn test_register_builtins_is_idempotent() {
        let registry = ProviderRegistry::new();
        register_builtin_providers(&registry).unwrap();
        register_builtin_providers(&registry).unwrap();
        assert_eq!(registry.list().len(), 4);
    }

    #[test]
    fn test_builtin_metadata() {
        let registry = ProviderRegistry::with_builtin_providers().unwrap();
        for info in registry.list() {
            assert_eq!(info.version, "1.0.0");
            assert_eq!(info.author, "use-env contributors");
            assert!(info.reference_pattern().is_some());
        }
    }

    #[test]
    fn test_endpoint_url_encodes_segments() {
        let url = endpoint_url("http://127.0.0.1:8200", ["v1", "secret", "my app?x#y", "a/b"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8200/v1/secret/my%20app%3Fx%23y/a%2Fb");
        assert_eq!(url.query(), None);

        let url = endpoint_url("https://op.example.com/connect/", ["v1", "vaults"]).unwrap();
        assert_eq!(url.path(), "/connect/v1/vaults");
    }

    #[test]
    fn test_endpoint_url_rejects_bad_base() {
        assert!(endpoint_url("not a url", ["v1"]).is_err());
        assert!(endpoint_url("mailto:ops@example.com", ["v1"]).is_err());
    }
}
