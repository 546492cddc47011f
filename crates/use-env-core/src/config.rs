//! Tool configuration
//!
//! Loads the optional YAML file that declares provider instances and global
//! options:
//!
//! ```yaml
//! providers:
//!   - name: secrets          # name used in tokens: ${secrets:...}
//!     type: vault            # registered provider type
//!     enabled: true
//!     config:                # handed to Provider::configure
//!       url: https://vault.example.com:8200
//! options:
//!   concurrency: 4
//! ```
//!
//! When no path is given the file is searched for in the current directory
//! (`.use-env.yaml`, `.use-env.yml`, `use-env.yaml`, `use-env.yml`) and then
//! in the home directory (`~/.config/use-env.yaml`, `~/.use-env.yaml`).

use crate::providers::ProviderSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const LOCAL_CONFIG_NAMES: [&str; 4] = [".use-env.yaml", ".use-env.yml", "use-env.yaml", "use-env.yml"];

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file is not valid YAML or has the wrong shape
    #[error("Invalid YAML in config file: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),

    /// The YAML parsed but an entry is malformed
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A configured provider instance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderConfig {
    /// Name used as the token prefix
    pub name: String,
    /// Registered provider type to instantiate
    #[serde(rename = "type")]
    pub provider_type: String,
    /// Disabled entries are ignored
    pub enabled: bool,
    /// Opaque settings for [`Provider::configure`](crate::providers::Provider::configure)
    #[serde(rename = "config")]
    pub settings: ProviderSettings,
}

impl ProviderConfig {
    /// Create an enabled entry with no settings
    pub fn new(name: impl Into<String>, provider_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider_type: provider_type.into(),
            enabled: true,
            settings: ProviderSettings::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UseEnvConfig {
    /// Provider instances, in declaration order
    pub providers: Vec<ProviderConfig>,
    /// Free-form options from the `options` block
    #[serde(rename = "options")]
    pub global_options: serde_json::Map<String, serde_json::Value>,
}

// File shape; every field may be missing or null
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    providers: Option<Vec<RawProviderConfig>>,
    #[serde(default)]
    options: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct RawProviderConfig {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    provider_type: Option<String>,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    config: Option<ProviderSettings>,
}

impl RawProviderConfig {
    fn validate(self, index: usize) -> ConfigResult<ProviderConfig> {
        let name = self.name.unwrap_or_default();
        if name.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "provider entry {} is missing a 'name'",
                index + 1
            )));
        }

        let provider_type = self.provider_type.unwrap_or_default();
        if provider_type.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "provider '{}' is missing a 'type'",
                name
            )));
        }

        Ok(ProviderConfig {
            name,
            provider_type,
            enabled: self.enabled.unwrap_or(true),
            settings: self.config.unwrap_or_default(),
        })
    }
}

impl UseEnvConfig {
    /// Load configuration from `path`, or from the first file found in the
    /// standard locations
    ///
    /// A missing file yields the empty default configuration.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::find_config_file() {
                Some(found) => found,
                None => {
                    tracing::debug!("No configuration file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            tracing::warn!(path = %path.display(), "Configuration file does not exist, using defaults");
            return Ok(Self::default());
        }

        Self::from_file(&path)
    }

    /// Parse a configuration file
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_yaml_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            providers = config.providers.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse configuration from YAML text
    ///
    /// An empty document yields the default configuration.
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let raw: Option<RawConfig> = serde_yaml::from_str(content)?;
        let raw = raw.unwrap_or_default();

        let providers = raw
            .providers
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, entry)| entry.validate(index))
            .collect::<ConfigResult<Vec<_>>>()?;

        let config = Self {
            providers,
            global_options: raw.options.unwrap_or_default(),
        };
        config.concurrency()?;
        Ok(config)
    }

    /// The `options.concurrency` bound, if set
    ///
    /// The value must be a positive integer.
    pub fn concurrency(&self) -> ConfigResult<Option<usize>> {
        match self.global_options.get("concurrency") {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => value
                .as_u64()
                .filter(|n| *n > 0)
                .and_then(|n| usize::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "options.concurrency must be a positive integer, got {}",
                        value
                    ))
                }),
        }
    }

    /// Candidate configuration paths, in search order
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(6);

        if let Ok(cwd) = std::env::current_dir() {
            paths.extend(LOCAL_CONFIG_NAMES.iter().map(|name| cwd.join(name)));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("use-env.yaml"));
            paths.push(home.join(".use-env.yaml"));
        }

        paths
    }

    /// First existing file among [`UseEnvConfig::search_paths`]
    pub fn find_config_file() -> Option<PathBuf> {
        Self::search_paths().into_iter().find(|p| p.is_file())
    }

    /// Add a provider entry (builder pattern)
    pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
        self.providers.push(provider);
        self
    }

    /// Look up a provider entry by name
    pub fn get_provider_config(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Enabled provider entries, in declaration order
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter().filter(|p| p.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
providers:
  - name: secrets
    type: vault
    config:
      url: https://vault.example.com:8200
      timeout_secs: 10
  - name: local
    type: file
    enabled: false
options:
  concurrency: 4
"#;
        let config = UseEnvConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.providers.len(), 2);
        let secrets = config.get_provider_config("secrets").unwrap();
        assert_eq!(secrets.provider_type, "vault");
        assert!(secrets.enabled);
        assert_eq!(secrets.settings["url"], json!("https://vault.example.com:8200"));
        assert_eq!(secrets.settings["timeout_secs"], json!(10));

        let local = config.get_provider_config("local").unwrap();
        assert!(!local.enabled);
        assert!(local.settings.is_empty());

        let enabled: Vec<&str> = config.enabled_providers().map(|p| p.name.as_str()).collect();
        assert_eq!(enabled, vec!["secrets"]);
        assert_eq!(config.global_options["concurrency"], json!(4));
        assert_eq!(config.concurrency().unwrap(), Some(4));
    }

    #[test]
    fn test_concurrency_option() {
        assert_eq!(UseEnvConfig::default().concurrency().unwrap(), None);
        assert_eq!(UseEnvConfig::from_yaml_str("options:\n  concurrency:\n").unwrap().concurrency().unwrap(), None);

        for bad in ["0", "-2", "fast", "1.5"] {
            let err = UseEnvConfig::from_yaml_str(&format!("options:\n  concurrency: {}\n", bad)).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("options.concurrency")));
        }
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(UseEnvConfig::from_yaml_str("").unwrap(), UseEnvConfig::default());
        assert_eq!(UseEnvConfig::from_yaml_str("providers:\n").unwrap(), UseEnvConfig::default());
    }

    #[test]
    fn test_null_config_block() {
        let config = UseEnvConfig::from_yaml_str("providers:\n  - name: e\n    type: env\n    config:\n").unwrap();
        assert!(config.providers[0].settings.is_empty());
    }

    #[test]
    fn test_invalid_yaml() {
        let err = UseEnvConfig::from_yaml_str("providers: [unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidYaml(_)));
    }

    #[test]
    fn test_entry_without_type_is_invalid() {
        let err = UseEnvConfig::from_yaml_str("providers:\n  - name: orphan\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("orphan")));

        let err = UseEnvConfig::from_yaml_str("providers:\n  - type: env\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "providers:\n  - name: e\n    type: env\n").unwrap();

        let config = UseEnvConfig::load(Some(&path)).unwrap();
        assert_eq!(config.providers, vec![ProviderConfig::new("e", "env")]);
    }

    #[test]
    fn test_load_missing_path_is_default() {
        let dir = TempDir::new().unwrap();
        let config = UseEnvConfig::load(Some(&dir.path().join("absent.yaml"))).unwrap();
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_search_paths_order() {
        let paths = UseEnvConfig::search_paths();
        let names: Vec<String> = paths
            .iter()
            .take(4)
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(names, LOCAL_CONFIG_NAMES.to_vec());
    }

    #[test]
    fn test_builder() {
        let config = UseEnvConfig::default().with_provider(
            ProviderConfig::new("files", "file")
                .with_setting("base_path", "/run/secrets")
                .with_enabled(false),
        );
        assert_eq!(config.providers[0].settings["base_path"], json!("/run/secrets"));
        assert_eq!(config.enabled_providers().count(), 0);
    }
}
