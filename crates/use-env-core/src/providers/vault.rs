//! HashiCorp Vault Provider
//!
//! Resolves secrets from the KV secrets engine of a HashiCorp Vault server
//! over its HTTP API.
//!
//! # Secret Engines
//!
//! Both versions of the KV engine are supported. KV v2 is tried first and
//! the provider falls back to KV v1 when the v2 path does not exist:
//! - v2: `GET /v1/{mount}/data/{path}`
//! - v1: `GET /v1/{mount}/{path}`
//!
//! # Reference Format
//!
//! ```text
//! DATABASE_PASSWORD=${vault:secret/my-app/database/password}
//! API_KEY=${vault:secret/my-app/api-key}
//! ```
//!
//! The first segment is the mount point. When the remaining path has more
//! than one segment the last one names the field to read. Without a field,
//! a secret holding a single entry yields that entry's value and any other
//! secret yields its JSON encoding.
//!
//! # Settings
//!
//! - `url`: server address (falls back to `VAULT_ADDR`, then `http://127.0.0.1:8200`)
//! - `token`: client token (falls back to `VAULT_TOKEN`)
//! - `namespace`: Vault Enterprise namespace (falls back to `VAULT_NAMESPACE`)
//! - `timeout_secs`: request timeout in seconds (default 30)

use super::traits::{
    setting_str, Provider, ProviderError, ProviderErrorKind, ProviderInfo, ProviderMetadata,
    ProviderResult, ProviderSettings,
};
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

const NAME: &str = "vault";
const DEFAULT_ADDRESS: &str = "http://127.0.0.1:8200";

/// Connection settings for a Vault server
///
/// Unset fields fall back to the standard `VAULT_*` environment variables
/// at request time.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Server address (e.g., "https://vault.example.com:8200")
    pub address: Option<String>,
    /// Client token
    pub token: Option<String>,
    /// Namespace for Vault Enterprise
    pub namespace: Option<String>,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: None,
            token: None,
            namespace: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl VaultConfig {
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn effective_address(&self) -> String {
        self.address
            .clone()
            .or_else(|| std::env::var("VAULT_ADDR").ok())
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    fn effective_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var("VAULT_TOKEN").ok())
            .filter(|t| !t.is_empty())
    }

    fn effective_namespace(&self) -> Option<String> {
        self.namespace
            .clone()
            .or_else(|| std::env::var("VAULT_NAMESPACE").ok())
            .filter(|n| !n.is_empty())
    }
}

/// A parsed `mount/path[/field]` payload
#[derive(Debug, PartialEq, Eq)]
struct SecretLocation<'a> {
    mount: &'a str,
    path: String,
    field: Option<&'a str>,
}

impl<'a> SecretLocation<'a> {
    fn parse(reference: &'a str) -> Option<Self> {
        let (mount, rest) = reference.split_once('/')?;
        if mount.is_empty() || rest.is_empty() {
            return None;
        }

        match rest.rsplit_once('/') {
            Some((path, field)) => Some(Self {
                mount,
                path: path.to_string(),
                field: Some(field),
            }),
            None => Some(Self {
                mount,
                path: rest.to_string(),
                field: None,
            }),
        }
    }
}

/// Provider for HashiCorp Vault KV secrets
#[derive(Debug)]
pub struct HashiCorpVaultProvider {
    info: ProviderInfo,
    config: VaultConfig,
    client: Mutex<Option<Client>>,
    cache: RwLock<HashMap<String, String>>,
}

impl HashiCorpVaultProvider {
    pub fn new() -> Self {
        Self::with_config(VaultConfig::default())
    }

    pub fn with_config(config: VaultConfig) -> Self {
        Self {
            info: Self::metadata(),
            config,
            client: Mutex::new(None),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    fn http_client(&self, reference: &str) -> ProviderResult<Client> {
        let mut guard = self.client.lock().map_err(|_| {
            ProviderError::new(ProviderErrorKind::Other, NAME, reference, "HTTP client lock poisoned")
        })?;

        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .timeout(self.config.timeout)
            .build()
            .map_err(|e| {
                ProviderError::configuration(NAME, reference, format!("Failed to build HTTP client: {}", e))
            })?;
        *guard = Some(client.clone());
        Ok(client)
    }

    /// Read one secret; `Ok(None)` when the path does not exist
    async fn read(
        &self,
        client: &Client,
        url: reqwest::Url,
        token: &str,
        reference: &str,
    ) -> ProviderResult<Option<Value>> {
        let mut request = client.get(url).header("X-Vault-Token", token);
        if let Some(namespace) = self.config.effective_namespace() {
            request = request.header("X-Vault-Namespace", namespace);
        }

        let response = request.send().await.map_err(|e| {
            ProviderError::new(
                ProviderErrorKind::ConnectionError,
                NAME,
                reference,
                format!("Failed to fetch secret from HashiCorp Vault: {}", e),
            )
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProviderError::new(
                ProviderErrorKind::AuthenticationFailed,
                NAME,
                reference,
                format!("Vault rejected the token ({})", response.status()),
            )),
            status if !status.is_success() => Err(ProviderError::new(
                ProviderErrorKind::ConnectionError,
                NAME,
                reference,
                format!("Vault API error: {}", status),
            )),
            _ => response.json::<Value>().await.map(Some).map_err(|e| {
                ProviderError::new(
                    ProviderErrorKind::Other,
                    NAME,
                    reference,
                    format!("Invalid response from Vault: {}", e),
                )
            }),
        }
    }

    async fn fetch(&self, location: &SecretLocation<'_>, reference: &str) -> ProviderResult<String> {
        let token = self.config.effective_token().ok_or_else(|| {
            ProviderError::configuration(
                NAME,
                reference,
                "Vault token not configured. Set VAULT_TOKEN or the provider 'token' setting",
            )
        })?;
        let address = self.config.effective_address();
        let client = self.http_client(reference)?;

        // KV v2 puts `data` between the mount and the secret path
        let url = |kv_data: Option<&'static str>| {
            let segments = ["v1", location.mount]
                .into_iter()
                .chain(kv_data)
                .chain(location.path.split('/'));
            super::endpoint_url(&address, segments)
                .map_err(|message| ProviderError::configuration(NAME, reference, message))
        };

        let data = match self.read(&client, url(Some("data"))?, &token, reference).await? {
            Some(body) => body.pointer("/data/data").cloned(),
            None => {
                tracing::debug!(provider = NAME, reference = reference, "KV v2 path not found, trying KV v1");
                let body = self
                    .read(&client, url(None)?, &token, reference)
                    .await?
                    .ok_or_else(|| {
                        ProviderError::not_found(
                            NAME,
                            reference,
                            format!("Secret not found at {}/{}", location.mount, location.path),
                        )
                    })?;
                body.get("data").cloned()
            }
        };

        let data = match data {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };

        select_value(&data, location, reference)
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn select_value(
    data: &Map<String, Value>,
    location: &SecretLocation<'_>,
    reference: &str,
) -> ProviderResult<String> {
    if let Some(field) = location.field {
        return data.get(field).map(value_to_string).ok_or_else(|| {
            ProviderError::not_found(
                NAME,
                reference,
                format!(
                    "Field '{}' not found in secret at {}/{}",
                    field, location.mount, location.path
                ),
            )
        });
    }

    if data.len() == 1 {
        if let Some(value) = data.values().next() {
            return Ok(value_to_string(value));
        }
    }

    serde_json::to_string(data).map_err(|e| {
        ProviderError::new(ProviderErrorKind::Other, NAME, reference, e.to_string())
    })
}

impl Default for HashiCorpVaultProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderMetadata for HashiCorpVaultProvider {
    fn metadata() -> ProviderInfo {
        ProviderInfo::new(NAME, "HashiCorp Vault provider")
            .with_author("use-env contributors")
            .with_pattern(r"^[^/]+/.+$")
    }
}

#[async_trait::async_trait]
impl Provider for HashiCorpVaultProvider {
    fn info(&self) -> &ProviderInfo {
        &self.info
    }

    async fn resolve(&self, reference: &str) -> ProviderResult<String> {
        if let Some(value) = self.cache.read().ok().and_then(|c| c.get(reference).cloned()) {
            return Ok(value);
        }

        let location = SecretLocation::parse(reference)
            .ok_or_else(|| ProviderError::invalid_reference(NAME, reference))?;

        let value = self.fetch(&location, reference).await?;
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(reference.to_string(), value.clone());
        }

        Ok(value)
    }

    fn configure(&mut self, settings: &ProviderSettings) -> ProviderResult<()> {
        if let Some(url) = setting_str(settings, "url") {
            self.config.address = Some(url.to_string());
        }
        if let Some(token) = setting_str(settings, "token") {
            self.config.token = Some(token.to_string());
        }
        if let Some(namespace) = setting_str(settings, "namespace") {
            self.config.namespace = Some(namespace.to_string());
        }
        if let Some(timeout) = settings.get("timeout_secs") {
            let secs = timeout.as_u64().ok_or_else(|| {
                ProviderError::configuration(
                    NAME,
                    "",
                    format!("Setting 'timeout_secs' must be a positive integer, got {}", timeout),
                )
            })?;
            self.config.timeout = Duration::from_secs(secs);
        }
        Ok(())
    }

    async fn close(&self) -> ProviderResult<()> {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
        if let Ok(mut client) = self.client.lock() {
            client.take();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> HashiCorpVaultProvider {
        HashiCorpVaultProvider::with_config(
            VaultConfig::default()
                .with_address(server.uri())
                .with_token("test-token"),
        )
    }

    #[test]
    fn test_parse_location() {
        let loc = SecretLocation::parse("secret/my-app/database/password").unwrap();
        assert_eq!(loc.mount, "secret");
        assert_eq!(loc.path, "my-app/database");
        assert_eq!(loc.field, Some("password"));

        let loc = SecretLocation::parse("secret/api-key").unwrap();
        assert_eq!(loc.path, "api-key");
        assert_eq!(loc.field, None);

        assert!(SecretLocation::parse("no-slash").is_none());
        assert!(SecretLocation::parse("/leading").is_none());
    }

    #[test]
    fn test_reference_pattern() {
        let provider = HashiCorpVaultProvider::new();
        assert!(provider.validate_reference("secret/my-app/key"));
        assert!(!provider.validate_reference("secret"));
    }

    #[tokio::test]
    async fn test_kv_v2_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/my-app/database"))
            .and(header("X-Vault-Token", "test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "data": { "password": "hunter2", "user": "admin" } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let value = provider.resolve("secret/my-app/database/password").await.unwrap();
        assert_eq!(value, "hunter2");

        // Served from the cache on the second call
        let again = provider.resolve("secret/my-app/database/password").await.unwrap();
        assert_eq!(again, "hunter2");
    }

    #[tokio::test]
    async fn test_payload_characters_stay_in_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/my%20app%3Fv=1/db%23main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "data": { "password": "odd-but-fine" } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let value = provider.resolve("secret/my app?v=1/db#main/password").await.unwrap();
        assert_eq!(value, "odd-but-fine");
    }

    #[tokio::test]
    async fn test_single_entry_secret_returns_value() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/api-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "data": { "value": "abc123" } }
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        assert_eq!(provider.resolve("secret/api-key").await.unwrap(), "abc123");
    }

    #[tokio::test]
    async fn test_multi_entry_secret_returns_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/creds"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "data": { "user": "admin", "port": 5432 } }
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let value = provider.resolve("secret/creds").await.unwrap();
        let parsed: Value = serde_json::from_str(&value).unwrap();
        assert_eq!(parsed, json!({ "user": "admin", "port": 5432 }));
    }

    #[tokio::test]
    async fn test_falls_back_to_kv_v1() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/kv/data/legacy"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/kv/legacy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "token": "v1-token" }
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        assert_eq!(provider.resolve("kv/legacy").await.unwrap(), "v1-token");
    }

    #[tokio::test]
    async fn test_missing_secret_and_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/app"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "data": { "user": "admin" } }
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);

        let err = provider.resolve("secret/app/password").await.unwrap_err();
        assert!(err.is(ProviderErrorKind::NotFound));
        assert!(err.message.contains("Field 'password'"));

        let err = provider.resolve("secret/missing").await.unwrap_err();
        assert!(err.is(ProviderErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider.resolve("secret/app/key").await.unwrap_err();
        assert!(err.is(ProviderErrorKind::AuthenticationFailed));
        assert_eq!(err.provider, "vault");
        assert_eq!(err.reference, "secret/app/key");
    }

    #[tokio::test]
    async fn test_namespace_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/app"))
            .and(header("X-Vault-Namespace", "team-a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "data": { "key": "namespaced" } }
            })))
            .mount(&server)
            .await;

        let mut provider = HashiCorpVaultProvider::new();
        let mut settings = ProviderSettings::new();
        settings.insert("url".into(), json!(server.uri()));
        settings.insert("token".into(), json!("test-token"));
        settings.insert("namespace".into(), json!("team-a"));
        provider.configure(&settings).unwrap();

        assert_eq!(provider.resolve("secret/app/key").await.unwrap(), "namespaced");
    }

    #[tokio::test]
    async fn test_missing_token() {
        if std::env::var("VAULT_TOKEN").is_ok() {
            return;
        }
        let provider = HashiCorpVaultProvider::with_config(
            VaultConfig::default().with_address("http://127.0.0.1:1"),
        );
        let err = provider.resolve("secret/app/key").await.unwrap_err();
        assert!(err.is(ProviderErrorKind::ConfigurationError));
    }

    #[test]
    fn test_invalid_timeout_setting() {
        let mut provider = HashiCorpVaultProvider::new();
        let mut settings = ProviderSettings::new();
        settings.insert("timeout_secs".into(), json!("soon"));
        assert!(provider.configure(&settings).is_err());

        settings.insert("timeout_secs".into(), json!(5));
        provider.configure(&settings).unwrap();
        assert_eq!(provider.config().timeout, Duration::from_secs(5));
    }
}
