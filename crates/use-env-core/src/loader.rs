//! Environment file loader
//!
//! [`EnvLoader`] drives a whole load: read the input, parse it, extract
//! references, provision providers, resolve each unique reference once,
//! rewrite the text and persist it.
//!
//! # Failure policy
//!
//! In strict mode the first failing reference, in file order, aborts the
//! load and nothing is written. In lenient mode failures are collected as
//! [`ResolutionError`] diagnostics and their tokens stay literal in the
//! output.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use use_env_core::{ContentSource, EnvLoader, LoadOptions, OutputTarget, ProviderRegistry, UseEnvConfig};
//!
//! let registry = Arc::new(ProviderRegistry::with_builtin_providers()?);
//! let loader = EnvLoader::new(registry, UseEnvConfig::load(None)?);
//!
//! let result = loader
//!     .load(ContentSource::Path(".env.dev".into()), OutputTarget::Default, LoadOptions::default())
//!     .await?;
//! println!("{} secret(s) resolved", result.secrets_resolved);
//! ```

use crate::config::UseEnvConfig;
use crate::error::LoadError;
use crate::parser::{self, EnvVariable};
use crate::providers::{Provider, ProviderError, ProviderRegistry};
use crate::reference::{self, SecretReference};
use crate::rewriter;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default number of unique references resolved concurrently
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Where the input text comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    /// Read from a file, which must exist
    Path(PathBuf),
    /// Literal text, e.g. piped from stdin
    Text(String),
}

impl ContentSource {
    /// Build a source from optional parts; exactly one must be present
    pub fn from_parts(path: Option<PathBuf>, text: Option<String>) -> Result<Self, LoadError> {
        match (path, text) {
            (Some(path), None) => Ok(ContentSource::Path(path)),
            (None, Some(text)) => Ok(ContentSource::Text(text)),
            (None, None) => Err(LoadError::MissingInput),
            (Some(_), Some(_)) => Err(LoadError::ConflictingInput),
        }
    }

    async fn read(self) -> Result<(String, Option<PathBuf>), LoadError> {
        match self {
            ContentSource::Text(text) => Ok((text, None)),
            ContentSource::Path(path) => match tokio::fs::read_to_string(&path).await {
                Ok(content) => Ok((content, Some(path))),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(LoadError::NotFound(path)),
                Err(e) => Err(LoadError::io(path, e)),
            },
        }
    }
}

/// Where the rewritten text goes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputTarget {
    /// Write to this file
    Path(PathBuf),
    /// Do not write; the text is only returned in [`LoadResult::content`]
    Caller,
    /// `.env` next to the input file, or in the current directory for text
    #[default]
    Default,
}

impl OutputTarget {
    fn location(&self, input: Option<&Path>) -> OutputLocation {
        match self {
            OutputTarget::Path(path) => OutputLocation::File(path.clone()),
            OutputTarget::Caller => OutputLocation::Caller,
            OutputTarget::Default => {
                let dir = input.and_then(Path::parent).unwrap_or_else(|| Path::new(""));
                OutputLocation::File(dir.join(".env"))
            }
        }
    }
}

/// Where the rewritten text ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OutputLocation {
    File(PathBuf),
    Caller,
}

impl OutputLocation {
    /// The written file, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            OutputLocation::File(path) => Some(path),
            OutputLocation::Caller => None,
        }
    }
}

impl fmt::Display for OutputLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputLocation::File(path) => write!(f, "{}", path.display()),
            OutputLocation::Caller => f.write_str("-"),
        }
    }
}

/// Options for a single load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Abort on the first resolution failure
    pub strict: bool,
    /// Upper bound on concurrently resolving references
    pub concurrency: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            strict: true,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl LoadOptions {
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the concurrency bound; values below 1 are treated as 1
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

/// A reference that failed to resolve in lenient mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionError {
    /// Variable holding the first occurrence of the reference
    pub key: String,
    /// Provider name from the token
    pub provider: String,
    /// Payload from the token
    pub reference: String,
    /// Description of the failure
    pub message: String,
}

/// Outcome of a successful load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadResult {
    /// Input file, or `None` for literal text
    pub input_path: Option<PathBuf>,
    /// Where the rewritten text was written
    pub output: OutputLocation,
    /// The rewritten text
    pub content: String,
    /// Number of parsed variables
    pub variables_count: usize,
    /// Number of distinct references resolved
    pub secrets_resolved: usize,
    /// Lenient-mode diagnostics, one per failing distinct reference
    pub errors: Vec<ResolutionError>,
}

/// One distinct canonical key to resolve
#[derive(Debug)]
struct ResolutionJob {
    canonical_key: String,
    provider_name: String,
    reference: String,
    /// Variable of the first occurrence
    key: String,
    occurrences: usize,
}

/// Group references by canonical key, keeping first-occurrence order
fn plan_jobs(references: &[SecretReference]) -> Vec<ResolutionJob> {
    let mut jobs: Vec<ResolutionJob> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for reference in references {
        let canonical_key = reference.canonical_key();
        match index.get(&canonical_key) {
            Some(&i) => jobs[i].occurrences += 1,
            None => {
                index.insert(canonical_key.clone(), jobs.len());
                jobs.push(ResolutionJob {
                    canonical_key,
                    provider_name: reference.provider_name.clone(),
                    reference: reference.reference.clone(),
                    key: reference.key.clone(),
                    occurrences: 1,
                });
            }
        }
    }

    jobs
}

/// Provider instances obtained for one load
///
/// Every distinct instance is closed exactly once: explicitly through
/// [`ProvisionedProviders::close`], or from `Drop` when the load future is
/// cancelled before reaching it.
#[derive(Default)]
struct ProvisionedProviders {
    by_name: HashMap<String, Arc<dyn Provider>>,
}

impl ProvisionedProviders {
    fn insert(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.by_name.insert(name.into(), provider);
    }

    fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.by_name.get(name).cloned()
    }

    /// Take every distinct instance, leaving the set empty
    fn take_distinct(&mut self) -> Vec<Arc<dyn Provider>> {
        let mut distinct: Vec<Arc<dyn Provider>> = Vec::with_capacity(self.by_name.len());
        for (_, provider) in self.by_name.drain() {
            if !distinct.iter().any(|p| Arc::ptr_eq(p, &provider)) {
                distinct.push(provider);
            }
        }
        distinct
    }

    async fn close(mut self) {
        close_all(self.take_distinct()).await;
    }
}

impl Drop for ProvisionedProviders {
    fn drop(&mut self) {
        let instances = self.take_distinct();
        if instances.is_empty() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(providers = instances.len(), "Load cancelled, closing providers in background");
                handle.spawn(close_all(instances));
            }
            Err(_) => {
                tracing::warn!(providers = instances.len(), "No async runtime available, providers were not closed");
            }
        }
    }
}

async fn close_all(instances: Vec<Arc<dyn Provider>>) {
    for provider in instances {
        if let Err(e) = provider.close().await {
            tracing::warn!(provider = %provider.info().name, error = %e, "Failed to close provider");
        }
    }
}

async fn resolve_job(provider: Option<Arc<dyn Provider>>, job: &ResolutionJob) -> Result<String, ProviderError> {
    let provider = provider.ok_or_else(|| {
        ProviderError::unavailable(
            &job.provider_name,
            &job.reference,
            format!("Unknown provider: {}", job.provider_name),
        )
    })?;

    if !provider.validate_reference(&job.reference) {
        return Err(ProviderError::invalid_reference(&job.provider_name, &job.reference));
    }

    provider.resolve(&job.reference).await
}

/// Loads environment files and resolves their secret references
#[derive(Debug, Clone)]
pub struct EnvLoader {
    registry: Arc<ProviderRegistry>,
    config: UseEnvConfig,
}

impl EnvLoader {
    /// Create a loader resolving through `registry` with the given provider configuration
    pub fn new(registry: Arc<ProviderRegistry>, config: UseEnvConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &UseEnvConfig {
        &self.config
    }

    /// Parse environment file content into variables
    pub fn parse(content: &str) -> Vec<EnvVariable> {
        parser::parse(content)
    }

    /// Extract every reference from the variables' values
    pub fn find_references(variables: &[EnvVariable]) -> Vec<SecretReference> {
        reference::find_references(variables)
    }

    /// Substitute resolved values, keyed by canonical key, into `content`
    pub fn rewrite(content: &str, resolved: &HashMap<String, String>) -> String {
        rewriter::rewrite(content, resolved).into_owned()
    }

    /// Load, resolve and persist an environment file
    pub async fn load(
        &self,
        source: ContentSource,
        output: OutputTarget,
        options: LoadOptions,
    ) -> Result<LoadResult, LoadError> {
        self.load_until(source, output, options, std::future::pending::<()>()).await
    }

    /// Like [`EnvLoader::load`], but stops when `cancel` completes first
    ///
    /// On cancellation no further references are resolved, every provisioned
    /// provider is closed before returning, nothing is written, and the
    /// result is [`LoadError::Cancelled`].
    pub async fn load_until<F>(
        &self,
        source: ContentSource,
        output: OutputTarget,
        options: LoadOptions,
        cancel: F,
    ) -> Result<LoadResult, LoadError>
    where
        F: Future<Output = ()>,
    {
        let (content, input_path) = source.read().await?;

        let variables = Self::parse(&content);
        let references = Self::find_references(&variables);
        tracing::debug!(
            variables = variables.len(),
            references = references.len(),
            "Parsed environment content"
        );

        let mut providers = ProvisionedProviders::default();
        let outcome = tokio::select! {
            outcome = self.resolve_all(&mut providers, &references, options) => outcome,
            _ = cancel => {
                tracing::info!("Load cancelled, closing providers");
                Err(LoadError::Cancelled)
            }
        };
        providers.close().await;

        let (resolved, errors) = outcome?;
        let output_location = output.location(input_path.as_deref());
        let rewritten = Self::rewrite(&content, &resolved);

        if let OutputLocation::File(path) = &output_location {
            tokio::fs::write(path, &rewritten)
                .await
                .map_err(|e| LoadError::io(path.clone(), e))?;
        }

        tracing::info!(
            output = %output_location,
            variables = variables.len(),
            resolved = resolved.len(),
            errors = errors.len(),
            "Loaded environment file"
        );

        Ok(LoadResult {
            input_path,
            output: output_location,
            content: rewritten,
            variables_count: variables.len(),
            secrets_resolved: resolved.len(),
            errors,
        })
    }

    async fn resolve_all(
        &self,
        providers: &mut ProvisionedProviders,
        references: &[SecretReference],
        options: LoadOptions,
    ) -> Result<(HashMap<String, String>, Vec<ResolutionError>), LoadError> {
        self.provision(providers, references)?;

        let jobs = plan_jobs(references);
        let mut resolved = HashMap::with_capacity(jobs.len());
        let mut errors = Vec::new();

        let providers = &*providers;
        let mut outcomes = stream::iter(jobs.iter().map(|job| {
            let provider = providers.get(&job.provider_name);
            async move { (job, resolve_job(provider, job).await) }
        }))
        .buffered(options.concurrency.max(1));

        while let Some((job, outcome)) = outcomes.next().await {
            match outcome {
                Ok(value) => {
                    tracing::debug!(key = %job.key, provider = %job.provider_name, "Resolved reference");
                    resolved.insert(job.canonical_key.clone(), value);
                }
                Err(error) if options.strict => {
                    return Err(LoadError::Resolution {
                        failed: job.occurrences,
                        key: job.key.clone(),
                        source: Box::new(error),
                    });
                }
                Err(error) => {
                    tracing::warn!(key = %job.key, provider = %job.provider_name, error = %error, "Failed to resolve reference");
                    errors.push(ResolutionError {
                        key: job.key.clone(),
                        provider: job.provider_name.clone(),
                        reference: job.reference.clone(),
                        message: error.to_string(),
                    });
                }
            }
        }

        Ok((resolved, errors))
    }

    /// Obtain configured providers, then registered providers named by tokens
    fn provision(&self, providers: &mut ProvisionedProviders, references: &[SecretReference]) -> Result<(), LoadError> {
        for entry in self.config.enabled_providers() {
            let instance = self.registry.get(&entry.provider_type, Some(&entry.settings))?;
            tracing::debug!(name = %entry.name, provider_type = %entry.provider_type, "Provisioned configured provider");
            providers.insert(entry.name.clone(), instance);
        }

        for reference in references {
            let name = reference.provider_name.as_str();
            if providers.contains(name) || !self.registry.is_registered(name) {
                continue;
            }
            match self.registry.get(name, None) {
                Ok(instance) => providers.insert(name, instance),
                Err(e) => tracing::warn!(provider = %name, error = %e, "Failed to obtain provider"),
            }
        }

        Ok(())
    }
}
