//! 1Password Connect Provider
//!
//! Resolves item fields through a 1Password Connect server.
//!
//! # Reference Format
//!
//! Token provider names must start with a letter, so the provider is
//! referenced through a configured name:
//!
//! ```yaml
//! providers:
//!   - name: op
//!     type: 1password
//! ```
//!
//! ```text
//! DATABASE_PASSWORD=${op:vault-id/item-id/section/password}
//! API_KEY=${op:vault-id/item-id/api-key}
//! ```
//!
//! Fields are matched by label or id. When a section is given, only fields
//! belonging to the section with that label or id are considered.
//!
//! # Settings
//!
//! - `connect_url`: Connect server URL (falls back to `OP_CONNECT_HOST`)
//! - `connect_token`: Connect access token (falls back to `OP_CONNECT_TOKEN`)

use super::traits::{
    setting_str, Provider, ProviderError, ProviderErrorKind, ProviderInfo, ProviderMetadata,
    ProviderResult, ProviderSettings,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

const NAME: &str = "1password";

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    sections: Vec<Section>,
    #[serde(default)]
    fields: Vec<Field>,
}

#[derive(Debug, Deserialize)]
struct Section {
    id: String,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SectionRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Field {
    id: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    section: Option<SectionRef>,
}

impl Field {
    fn is_named(&self, name: &str) -> bool {
        self.id == name || self.label.as_deref() == Some(name)
    }
}

/// A parsed `vault/item[/section]/field` payload
#[derive(Debug)]
struct ItemLocation<'a> {
    vault: &'a str,
    item: &'a str,
    section: Option<&'a str>,
    field: &'a str,
}

impl<'a> ItemLocation<'a> {
    fn parse(reference: &'a str) -> Option<Self> {
        let mut parts = reference.splitn(3, '/');
        let vault = parts.next().filter(|s| !s.is_empty())?;
        let item = parts.next().filter(|s| !s.is_empty())?;
        let rest = parts.next().filter(|s| !s.is_empty())?;

        let (section, field) = match rest.split_once('/') {
            Some((section, field)) if !section.is_empty() && !field.is_empty() => {
                (Some(section), field)
            }
            Some(_) => return None,
            None => (None, rest),
        };

        Some(Self {
            vault,
            item,
            section,
            field,
        })
    }
}

/// Provider for 1Password Connect
#[derive(Debug)]
pub struct OnePasswordConnectProvider {
    info: ProviderInfo,
    connect_url: Option<String>,
    connect_token: Option<String>,
    client: Mutex<Option<Client>>,
    cache: RwLock<HashMap<String, String>>,
}

impl OnePasswordConnectProvider {
    pub fn new() -> Self {
        Self {
            info: Self::metadata(),
            connect_url: None,
            connect_token: None,
            client: Mutex::new(None),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Point the provider at a Connect server (builder pattern)
    pub fn with_connect(mut self, url: impl Into<String>, token: impl Into<String>) -> Self {
        self.connect_url = Some(url.into());
        self.connect_token = Some(token.into());
        self
    }

    fn credentials(&self, reference: &str) -> ProviderResult<(String, String)> {
        let url = self
            .connect_url
            .clone()
            .or_else(|| std::env::var("OP_CONNECT_HOST").ok());
        let token = self
            .connect_token
            .clone()
            .or_else(|| std::env::var("OP_CONNECT_TOKEN").ok());

        match (url, token) {
            (Some(url), Some(token)) if !url.is_empty() && !token.is_empty() => {
                Ok((url.trim_end_matches('/').to_string(), token))
            }
            _ => Err(ProviderError::configuration(
                NAME,
                reference,
                "1Password Connect not configured. Set OP_CONNECT_HOST and OP_CONNECT_TOKEN \
                 or the provider 'connect_url' and 'connect_token' settings",
            )),
        }
    }

    fn http_client(&self, reference: &str) -> ProviderResult<Client> {
        let mut guard = self.client.lock().map_err(|_| {
            ProviderError::new(ProviderErrorKind::Other, NAME, reference, "HTTP client lock poisoned")
        })?;

        match guard.as_ref() {
            Some(client) => Ok(client.clone()),
            None => {
                let client = Client::new();
                *guard = Some(client.clone());
                Ok(client)
            }
        }
    }

    async fn fetch_item(&self, location: &ItemLocation<'_>, reference: &str) -> ProviderResult<Item> {
        let (base_url, token) = self.credentials(reference)?;
        let client = self.http_client(reference)?;
        let url = super::endpoint_url(&base_url, ["v1", "vaults", location.vault, "items", location.item])
            .map_err(|message| ProviderError::configuration(NAME, reference, message))?;

        let response = client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(
                    ProviderErrorKind::ConnectionError,
                    NAME,
                    reference,
                    format!("Failed to fetch secret from 1Password: {}", e),
                )
            })?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(ProviderError::new(
                ProviderErrorKind::AuthenticationFailed,
                NAME,
                reference,
                "1Password Connect authentication failed - check your token",
            )),
            StatusCode::NOT_FOUND => Err(ProviderError::not_found(
                NAME,
                reference,
                format!("1Password item not found: {}/{}", location.vault, location.item),
            )),
            status if !status.is_success() => Err(ProviderError::new(
                ProviderErrorKind::ConnectionError,
                NAME,
                reference,
                format!("1Password API error: {}", status),
            )),
            _ => response.json::<Item>().await.map_err(|e| {
                ProviderError::new(
                    ProviderErrorKind::Other,
                    NAME,
                    reference,
                    format!("Invalid response from 1Password Connect: {}", e),
                )
            }),
        }
    }
}

fn select_field(item: &Item, location: &ItemLocation<'_>, reference: &str) -> ProviderResult<String> {
    let section_id = match location.section {
        None => None,
        Some(name) => {
            let section = item
                .sections
                .iter()
                .find(|s| s.id == name || s.label.as_deref() == Some(name))
                .ok_or_else(|| {
                    ProviderError::not_found(
                        NAME,
                        reference,
                        format!("Section '{}' not found in item {}", name, location.item),
                    )
                })?;
            Some(section.id.as_str())
        }
    };

    item.fields
        .iter()
        .filter(|f| match section_id {
            Some(id) => f.section.as_ref().map(|s| s.id.as_str()) == Some(id),
            None => true,
        })
        .find(|f| f.is_named(location.field))
        .map(|f| f.value.clone().unwrap_or_default())
        .ok_or_else(|| {
            ProviderError::not_found(
                NAME,
                reference,
                format!("Field '{}' not found in item {}", location.field, location.item),
            )
        })
}

impl Default for OnePasswordConnectProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderMetadata for OnePasswordConnectProvider {
    fn metadata() -> ProviderInfo {
        ProviderInfo::new(NAME, "1Password Connect provider")
            .with_author("use-env contributors")
            .with_pattern(r"^[^/]+/[^/]+(/[^/]+)?/.+$")
    }
}

#[async_trait::async_trait]
impl Provider for OnePasswordConnectProvider {
    fn info(&self) -> &ProviderInfo {
        &self.info
    }

    async fn resolve(&self, reference: &str) -> ProviderResult<String> {
        if let Some(value) = self.cache.read().ok().and_then(|c| c.get(reference).cloned()) {
            return Ok(value);
        }

        let location = ItemLocation::parse(reference)
            .ok_or_else(|| ProviderError::invalid_reference(NAME, reference))?;

        let item = self.fetch_item(&location, reference).await?;
        let value = select_field(&item, &location, reference)?;

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(reference.to_string(), value.clone());
        }
        Ok(value)
    }

    fn configure(&mut self, settings: &ProviderSettings) -> ProviderResult<()> {
        if let Some(url) = setting_str(settings, "connect_url") {
            self.connect_url = Some(url.to_string());
        }
        if let Some(token) = setting_str(settings, "connect_token") {
            self.connect_token = Some(token.to_string());
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

    fn item_body() -> serde_json::Value {
        json!({
            "id": "item-id",
            "sections": [
                { "id": "sec-prod", "label": "production" },
                { "id": "sec-dev", "label": "development" }
            ],
            "fields": [
                { "id": "f1", "label": "password", "value": "prod-pass", "section": { "id": "sec-prod" } },
                { "id": "f2", "label": "password", "value": "dev-pass", "section": { "id": "sec-dev" } },
                { "id": "f3", "label": "api-key", "value": "key-123" }
            ]
        })
    }

    async fn server_with_item() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/vaults/vault-id/items/item-id"))
            .and(header("Authorization", "Bearer op-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(item_body()))
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_parse_location() {
        let loc = ItemLocation::parse("v/i/s/f").unwrap();
        assert_eq!((loc.vault, loc.item, loc.section, loc.field), ("v", "i", Some("s"), "f"));

        let loc = ItemLocation::parse("v/i/f").unwrap();
        assert_eq!(loc.section, None);
        assert_eq!(loc.field, "f");

        assert!(ItemLocation::parse("v/i").is_none());
        assert!(ItemLocation::parse("v//f").is_none());
    }

    #[test]
    fn test_reference_pattern() {
        let provider = OnePasswordConnectProvider::new();
        assert!(provider.validate_reference("vault/item/field"));
        assert!(provider.validate_reference("vault/item/section/field"));
        assert!(!provider.validate_reference("vault/item"));
    }

    #[tokio::test]
    async fn test_field_by_label() {
        let server = server_with_item().await;
        let provider = OnePasswordConnectProvider::new().with_connect(server.uri(), "op-token");

        assert_eq!(provider.resolve("vault-id/item-id/api-key").await.unwrap(), "key-123");
    }

    #[tokio::test]
    async fn test_field_restricted_to_section() {
        let server = server_with_item().await;
        let provider = OnePasswordConnectProvider::new().with_connect(server.uri(), "op-token");

        assert_eq!(
            provider.resolve("vault-id/item-id/development/password").await.unwrap(),
            "dev-pass"
        );
        assert_eq!(
            provider.resolve("vault-id/item-id/sec-prod/password").await.unwrap(),
            "prod-pass"
        );
    }

    #[tokio::test]
    async fn test_missing_field_and_section() {
        let server = server_with_item().await;
        let provider = OnePasswordConnectProvider::new().with_connect(server.uri(), "op-token");

        let err = provider.resolve("vault-id/item-id/username").await.unwrap_err();
        assert!(err.is(ProviderErrorKind::NotFound));

        let err = provider.resolve("vault-id/item-id/staging/password").await.unwrap_err();
        assert!(err.message.contains("Section 'staging'"));
    }

    #[tokio::test]
    async fn test_payload_characters_stay_in_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/vaults/team%20vault/items/db%3Fprod%231"))
            .respond_with(ResponseTemplate::new(200).set_body_json(item_body()))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OnePasswordConnectProvider::new().with_connect(server.uri(), "op-token");
        let value = provider.resolve("team vault/db?prod#1/api-key").await.unwrap();
        assert_eq!(value, "key-123");
    }

    #[tokio::test]
    async fn test_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/vaults/v/items/locked"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/vaults/v/items/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = OnePasswordConnectProvider::new().with_connect(server.uri(), "op-token");

        let err = provider.resolve("v/locked/field").await.unwrap_err();
        assert!(err.is(ProviderErrorKind::AuthenticationFailed));

        let err = provider.resolve("v/missing/field").await.unwrap_err();
        assert!(err.is(ProviderErrorKind::NotFound));

        let err = provider.resolve("v/broken/field").await.unwrap_err();
        assert!(err.is(ProviderErrorKind::ConnectionError));
    }

    #[tokio::test]
    async fn test_configure_from_settings() {
        let server = server_with_item().await;
        let mut provider = OnePasswordConnectProvider::new();
        let mut settings = ProviderSettings::new();
        settings.insert("connect_url".into(), json!(server.uri()));
        settings.insert("connect_token".into(), json!("op-token"));
        provider.configure(&settings).unwrap();

        assert_eq!(provider.resolve("vault-id/item-id/f3").await.unwrap(), "key-123");
    }
}
