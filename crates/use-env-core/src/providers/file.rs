//! File Provider
//!
//! Reads secret values from files on the local filesystem: Docker secrets,
//! mounted Kubernetes secrets, or plain local files. File content is
//! trimmed of surrounding whitespace.
//!
//! # Reference Format
//!
//! ```text
//! DB_PASSWORD=${file:/run/secrets/db_password}
//! API_KEY=${file:./secrets/api_key.txt}
//! ```
//!
//! # Settings
//!
//! - `base_path` (string, default: current directory): base for relative paths

use super::traits::{
    setting_str, Provider, ProviderError, ProviderErrorKind, ProviderInfo, ProviderMetadata,
    ProviderResult, ProviderSettings,
};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const NAME: &str = "file";

/// Provider that reads secrets from files
#[derive(Debug)]
pub struct FileProvider {
    info: ProviderInfo,
    base_path: PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

impl FileProvider {
    /// Create a provider resolving relative paths against the current directory
    pub fn new() -> Self {
        Self::with_base_path(std::env::current_dir().unwrap_or_default())
    }

    /// Create a provider resolving relative paths against `base_path`
    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            info: Self::metadata(),
            base_path: base_path.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Base directory for relative references
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn resolve_path(&self, reference: &str) -> PathBuf {
        let reference = reference.strip_prefix("file://").unwrap_or(reference);
        let path = Path::new(reference);

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}

impl Default for FileProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderMetadata for FileProvider {
    fn metadata() -> ProviderInfo {
        ProviderInfo::new(NAME, "File-based secret provider")
            .with_author("use-env contributors")
            .with_pattern(r"^.+$")
    }
}

#[async_trait::async_trait]
impl Provider for FileProvider {
    fn info(&self) -> &ProviderInfo {
        &self.info
    }

    async fn resolve(&self, reference: &str) -> ProviderResult<String> {
        if let Some(value) = self.cache.read().ok().and_then(|c| c.get(reference).cloned()) {
            return Ok(value);
        }

        let path = self.resolve_path(reference);
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            let (kind, message) = match e.kind() {
                ErrorKind::NotFound => (
                    ProviderErrorKind::NotFound,
                    format!("Secret file not found: {}", path.display()),
                ),
                ErrorKind::PermissionDenied => (
                    ProviderErrorKind::Io,
                    format!("Permission denied reading secret file: {}", path.display()),
                ),
                _ => (
                    ProviderErrorKind::Io,
                    format!("Error reading secret file {}: {}", path.display(), e),
                ),
            };
            ProviderError::new(kind, NAME, reference, message)
        })?;

        let value = content.trim().to_string();
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(reference.to_string(), value.clone());
        }

        Ok(value)
    }

    fn configure(&mut self, settings: &ProviderSettings) -> ProviderResult<()> {
        if let Some(base) = setting_str(settings, "base_path") {
            self.base_path = PathBuf::from(base);
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
