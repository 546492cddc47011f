//! Core traits for secret providers
//!
//! This module defines the contract every provider implements. A provider
//! turns the opaque payload of a `${name:payload}` token into a value. Only
//! `resolve` is required; validation, batching, configuration and cleanup
//! have default implementations that concrete providers may override.

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Settings handed to [`Provider::configure`], taken verbatim from the
/// `config` block of a provider entry.
pub type ProviderSettings = serde_json::Map<String, serde_json::Value>;

/// Progress callback for batch resolution: `(reference, index, total)`
pub type ProgressCallback = dyn Fn(&str, usize, usize) + Send + Sync;

/// Categories of provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The referenced secret does not exist in the backend
    NotFound,
    /// The provider is not available or not registered
    Unavailable,
    /// Authentication or authorization failed
    AuthenticationFailed,
    /// Network or transport error (for remote providers)
    ConnectionError,
    /// Missing or invalid provider configuration
    ConfigurationError,
    /// The payload is not well-formed for this provider
    InvalidReference,
    /// I/O error (for file-based providers)
    Io,
    /// Anything else
    Other,
}

/// Error raised by a provider while resolving a reference
///
/// Every failure inside a provider, including transport and library errors,
/// is wrapped into this one type so it always names the provider and the
/// payload that failed.
#[derive(Error, Debug, Clone)]
#[error("[{provider}] {message} (reference: {reference})")]
pub struct ProviderError {
    /// Category of the failure
    pub kind: ProviderErrorKind,
    /// Name of the provider that failed
    pub provider: String,
    /// The payload that was being resolved
    pub reference: String,
    /// Human readable description
    pub message: String,
}

impl ProviderError {
    /// Create an error of the given kind
    pub fn new(
        kind: ProviderErrorKind,
        provider: impl Into<String>,
        reference: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            provider: provider.into(),
            reference: reference.into(),
            message: message.into(),
        }
    }

    pub fn not_found(
        provider: impl Into<String>,
        reference: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ProviderErrorKind::NotFound, provider, reference, message)
    }

    pub fn unavailable(
        provider: impl Into<String>,
        reference: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ProviderErrorKind::Unavailable, provider, reference, message)
    }

    pub fn configuration(
        provider: impl Into<String>,
        reference: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ProviderErrorKind::ConfigurationError, provider, reference, message)
    }

    /// The payload failed the provider's format check
    pub fn invalid_reference(provider: impl Into<String>, reference: impl Into<String>) -> Self {
        let provider = provider.into();
        let reference = reference.into();
        let message = format!("Invalid reference format for provider '{}': {}", provider, reference);
        Self::new(ProviderErrorKind::InvalidReference, provider, reference, message)
    }

    /// Check whether this error is of the given kind
    pub fn is(&self, kind: ProviderErrorKind) -> bool {
        self.kind == kind
    }
}

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Metadata describing a provider type
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    /// Unique provider name, used as the token prefix
    pub name: String,
    /// Short description
    pub description: String,
    /// Semantic version of the provider
    pub version: String,
    /// Provider author
    pub author: String,
    /// Optional regular expression a payload must match from its start
    reference_pattern: Option<String>,
    #[serde(skip)]
    compiled_pattern: Option<Regex>,
}

impl PartialEq for ProviderInfo {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.version == other.version
            && self.author == other.author
            && self.reference_pattern == other.reference_pattern
    }
}

impl Eq for ProviderInfo {}

impl ProviderInfo {
    /// Create metadata with a default version of `1.0.0`
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: "1.0.0".to_string(),
            author: String::new(),
            reference_pattern: None,
            compiled_pattern: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Declare the pattern payloads must match
    ///
    /// The pattern is compiled once here and anchored at the start of the
    /// payload.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        self.compiled_pattern = Regex::new(&format!("^(?:{})", pattern)).ok();
        self.reference_pattern = Some(pattern);
        self
    }

    /// The declared pattern, as written
    pub fn reference_pattern(&self) -> Option<&str> {
        self.reference_pattern.as_deref()
    }

    /// Check a payload against the declared pattern
    ///
    /// Without a pattern every payload is accepted. A pattern that fails to
    /// compile accepts nothing; the registry rejects such patterns up front.
    pub fn matches(&self, reference: &str) -> bool {
        match (&self.reference_pattern, &self.compiled_pattern) {
            (None, _) => true,
            (Some(_), Some(re)) => re.is_match(reference),
            (Some(pattern), None) => {
                tracing::warn!(provider = %self.name, pattern = %pattern, "Invalid reference pattern");
                false
            }
        }
    }
}

/// Static metadata attached to a provider type
///
/// Implemented by provider types that can be registered through
/// [`ProviderDescriptor::of`](super::registry::ProviderDescriptor::of).
pub trait ProviderMetadata {
    fn metadata() -> ProviderInfo;
}

/// Core trait for secret providers
///
/// # Async Design
///
/// Resolution is a suspension point: remote providers perform network calls
/// and local providers read the filesystem. Implementations must be
/// thread-safe because one instance may resolve several payloads at once.
///
/// # Caching
///
/// Each instance owns its cache of resolved payloads. The cache is never
/// shared with other instances and is emptied by [`Provider::close`].
#[async_trait]
pub trait Provider: Send + Sync + fmt::Debug {
    /// Metadata for this provider
    fn info(&self) -> &ProviderInfo;

    /// Resolve a payload to its value
    async fn resolve(&self, reference: &str) -> ProviderResult<String>;

    /// Check that a payload is well-formed for this provider
    ///
    /// The default implementation matches the declared reference pattern,
    /// accepting everything when none is declared.
    fn validate_reference(&self, reference: &str) -> bool {
        self.info().matches(reference)
    }

    /// Apply settings from the provider configuration
    fn configure(&mut self, settings: &ProviderSettings) -> ProviderResult<()> {
        let _ = settings;
        Ok(())
    }

    /// Resolve several payloads
    ///
    /// The default implementation resolves sequentially, reporting progress
    /// before each payload. The first failure is returned.
    async fn resolve_batch(
        &self,
        references: &[String],
        progress: Option<&ProgressCallback>,
    ) -> ProviderResult<HashMap<String, String>> {
        let mut results = HashMap::with_capacity(references.len());
        let total = references.len();

        for (index, reference) in references.iter().enumerate() {
            if let Some(callback) = progress {
                callback(reference, index, total);
            }
            let value = self.resolve(reference).await?;
            results.insert(reference.clone(), value);
        }

        Ok(results)
    }

    /// Release instance-held resources (caches, network sessions)
    async fn close(&self) -> ProviderResult<()> {
        Ok(())
    }
}

/// Read a string setting
pub(crate) fn setting_str<'a>(settings: &'a ProviderSettings, key: &str) -> Option<&'a str> {
    settings.get(key).and_then(|v| v.as_str())
}

/// Read a boolean setting, rejecting values of the wrong type
pub(crate) fn setting_bool(
    settings: &ProviderSettings,
    provider: &str,
    key: &str,
) -> ProviderResult<Option<bool>> {
    match settings.get(key) {
        None => Ok(None),
        Some(serde_json::Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(ProviderError::configuration(
            provider,
            "",
            format!("Setting '{}' must be a boolean, got {}", key, other),
        )),
    }
}
