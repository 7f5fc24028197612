// # Hetzner DNS Provider
//
// This crate provides the Hetzner DNS API client for hdns.
//
// ## Behavior
//
// - One HTTP request per trait call; no retries, backoff or caching
//   (scheduling belongs to the engine)
// - HTTP timeout configured (30 seconds)
// - Specific error handling for HTTP status codes (401/403, 404, 409, 429, 5xx)
// - Error payloads in a 200 response are errors too
// - Dry-run mode: lookups are performed, writes are logged and skipped
//
// ## Security
//
// - Credentials are per record and passed in on every call
// - A credential NEVER appears in logs or error messages
// - A blank credential fails before any request is made
//
// ## API Reference
//
// - Hetzner DNS API: https://dns.hetzner.com/api-docs
// - List Zones: GET `/zones`
// - List Records: GET `/records?zone_id=...`
// - Create Record: POST `/records`
// - Update Record: PUT `/records/:record_id`

use async_trait::async_trait;
use hdns_core::config::{HETZNER_API_BASE, ProviderConfig};
use hdns_core::model::{Credential, RecordType};
use hdns_core::traits::{ProviderClient, ProviderClientFactory, ProviderRecord, Zone};
use hdns_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Provider name used in errors and logs
const PROVIDER: &str = "hetzner";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Record as the Hetzner API represents it
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    zone_id: String,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ttl: Option<u32>,
}

impl ApiRecord {
    fn from_record(record: &ProviderRecord) -> Self {
        Self {
            id: record.id.clone(),
            zone_id: record.zone_id.clone(),
            record_type: record.record_type.as_str().to_string(),
            name: record.name.clone(),
            value: record.value.clone(),
            ttl: Some(record.ttl),
        }
    }

    fn into_record(self, record_type: RecordType, default_ttl: u32) -> ProviderRecord {
        ProviderRecord {
            id: self.id,
            zone_id: self.zone_id,
            record_type,
            name: self.name,
            value: self.value,
            ttl: self.ttl.unwrap_or(default_ttl),
        }
    }
}

/// `error` field of a response body; a plain string or an object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiError {
    Text(String),
    Detail {
        #[serde(default)]
        message: String,
        #[serde(default)]
        code: Option<u16>,
    },
}

impl ApiError {
    /// The message, or `None` when the field carries no error
    fn message(&self) -> Option<String> {
        match self {
            ApiError::Text(text) if text.is_empty() => None,
            ApiError::Text(text) => Some(text.clone()),
            ApiError::Detail { message, .. } if message.is_empty() => None,
            ApiError::Detail { message, code: Some(code) } => Some(format!("{} (code {})", message, code)),
            ApiError::Detail { message, code: None } => Some(message.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecordsResponse {
    #[serde(default)]
    records: Vec<ApiRecord>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct RecordResponse {
    #[serde(default)]
    record: Option<ApiRecord>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ZonesResponse {
    #[serde(default)]
    zones: Vec<Zone>,
    #[serde(default)]
    error: Option<ApiError>,
}

/// Response bodies that may carry an `error` field
trait ApiResponse {
    fn api_error(&self) -> Option<String>;
}

impl ApiResponse for RecordsResponse {
    fn api_error(&self) -> Option<String> {
        self.error.as_ref().and_then(ApiError::message)
    }
}

impl ApiResponse for RecordResponse {
    fn api_error(&self) -> Option<String> {
        self.error.as_ref().and_then(ApiError::message)
    }
}

impl ApiResponse for ZonesResponse {
    fn api_error(&self) -> Option<String> {
        self.error.as_ref().and_then(ApiError::message)
    }
}

/// Hetzner DNS API client
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the client will:
/// - Perform all GET requests (zone listing, record lookup)
/// - Log the intended POST/PUT payload
/// - **NOT** actually modify DNS records
///
/// # Security
///
/// Credentials are not stored on the client; they arrive with each call.
pub struct HetznerClient {
    /// API base URL, without a trailing slash
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, perform GET requests but skip writes
    dry_run: bool,
}

// Debug implementation that leaves out the HTTP client internals
impl std::fmt::Debug for HetznerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HetznerClient")
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl HetznerClient {
    /// Create a new Hetzner client
    ///
    /// # Parameters
    ///
    /// - `base_url`: API base URL (normally [`HETZNER_API_BASE`])
    /// - `dry_run`: If true, perform GET requests but skip writes
    pub fn new(base_url: impl Into<String>, dry_run: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .user_agent(concat!("hdns/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            dry_run,
        })
    }

    /// Client against the public API (live mode)
    pub fn new_live() -> Result<Self> {
        Self::new(HETZNER_API_BASE, false)
    }

    /// Client against the public API (dry-run mode)
    pub fn new_dry_run() -> Result<Self> {
        Self::new(HETZNER_API_BASE, true)
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach authentication and send
    ///
    /// Status codes other than 200 are mapped to errors; a 200 body with an
    /// `error` field is an error too.
    async fn send<T>(&self, request: reqwest::RequestBuilder, credential: &Credential, action: &str) -> Result<T>
    where
        T: DeserializeOwned + ApiResponse,
    {
        if credential.is_blank() {
            return Err(Error::invalid_input("Hetzner API token cannot be empty"));
        }

        let response = request
            .header("Auth-API-Token", credential.expose())
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::http(format!("Hetzner {} request failed: {}", action, e.without_url())))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(match status.as_u16() {
                401 | 403 => Error::provider(
                    PROVIDER,
                    format!("Authentication failed: invalid API token or insufficient permissions. Status: {}", status),
                ),
                404 => Error::not_found(format!("Hetzner {} target not found: {}", action, error_text)),
                409 => Error::provider(PROVIDER, format!("Conflict during {}: {}", action, error_text)),
                429 => Error::provider(
                    PROVIDER,
                    format!("Rate limit exceeded. Please retry later. Status: {}", status),
                ),
                500..=599 => Error::provider(
                    PROVIDER,
                    format!("Hetzner server error (transient): {} - {}", status, error_text),
                ),
                _ => Error::provider(PROVIDER, format!("{} failed: {} - {}", action, status, error_text)),
            });
        }

        let body: T = response
            .json()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("Failed to parse {} response: {}", action, e)))?;

        if let Some(message) = body.api_error() {
            return Err(Error::provider(PROVIDER, format!("{} rejected: {}", action, message)));
        }

        Ok(body)
    }

    /// Reject records the API would refuse anyway
    fn validate(record: &ProviderRecord) -> Result<()> {
        if record.zone_id.is_empty() {
            return Err(Error::invalid_input("zone ID is required"));
        }
        if record.name.is_empty() {
            return Err(Error::invalid_input("record name is required"));
        }
        if record.value.is_empty() {
            return Err(Error::invalid_input("record value is required"));
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderClient for HetznerClient {
    /// # API Call
    ///
    /// ```http
    /// GET /records?zone_id=<zone>&name=<name>
    /// Auth-API-Token: <token>
    /// ```
    ///
    /// The listing is filtered by name and type on this side as well.
    async fn find_record(
        &self,
        credential: &Credential,
        zone_id: &str,
        name: &str,
        record_type: RecordType,
    ) -> Result<Option<ProviderRecord>> {
        tracing::debug!("Looking up Hetzner record: {} (type: {}) in zone {}", name, record_type, zone_id);

        let request = self
            .client
            .get(self.url("/records"))
            .query(&[("zone_id", zone_id), ("name", name)]);
        let body: RecordsResponse = self.send(request, credential, "record lookup").await?;

        let found = body
            .records
            .into_iter()
            .find(|r| r.name == name && r.record_type == record_type.as_str())
            .map(|r| r.into_record(record_type, hdns_core::model::DEFAULT_TTL));

        if let Some(record) = &found {
            tracing::debug!("Found Hetzner record ID: {:?}", record.id);
        }
        Ok(found)
    }

    /// # API Call
    ///
    /// ```http
    /// POST /records
    /// {"zone_id": "...", "type": "A", "name": "...", "value": "1.2.3.4", "ttl": 300}
    /// ```
    async fn create_record(&self, credential: &Credential, record: &ProviderRecord) -> Result<ProviderRecord> {
        Self::validate(record)?;
        let payload = ApiRecord::from_record(record);

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send POST request to {} with payload: {}",
                self.url("/records"),
                serde_json::to_string(&payload)?
            );
            return Ok(record.clone());
        }

        let request = self.client.post(self.url("/records")).json(&payload);
        let body: RecordResponse = self.send(request, credential, "record create").await?;

        tracing::info!("Hetzner record created: {} -> {}", record.name, record.value);
        Ok(body
            .record
            .map(|r| r.into_record(record.record_type, record.ttl))
            .unwrap_or_else(|| record.clone()))
    }

    /// # API Call
    ///
    /// ```http
    /// PUT /records/:record_id
    /// {"zone_id": "...", "type": "A", "name": "...", "value": "1.2.3.4", "ttl": 300}
    /// ```
    async fn update_record(&self, credential: &Credential, record: &ProviderRecord) -> Result<ProviderRecord> {
        Self::validate(record)?;
        let id = record
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::invalid_input("record ID is required for an update"))?;

        let url = self.url(&format!("/records/{}", id));
        let payload = ApiRecord::from_record(record);

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send PUT request to {} with payload: {}",
                url,
                serde_json::to_string(&payload)?
            );
            return Ok(record.clone());
        }

        let request = self.client.put(&url).json(&payload);
        let body: RecordResponse = self.send(request, credential, "record update").await?;

        tracing::info!("Hetzner record updated: {} -> {}", record.name, record.value);
        Ok(body
            .record
            .map(|r| r.into_record(record.record_type, record.ttl))
            .unwrap_or_else(|| record.clone()))
    }

    /// # API Call
    ///
    /// ```http
    /// GET /zones
    /// ```
    async fn list_zones(&self, credential: &Credential) -> Result<Vec<Zone>> {
        let request = self.client.get(self.url("/zones"));
        let body: ZonesResponse = self.send(request, credential, "zone listing").await?;
        Ok(body.zones)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Factory for creating Hetzner clients
pub struct HetznerFactory;

impl ProviderClientFactory for HetznerFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn ProviderClient>> {
        match config {
            ProviderConfig::Hetzner { base_url, dry_run } => {
                if *dry_run {
                    tracing::warn!("Hetzner provider running in DRY-RUN mode - no changes will be made");
                }
                Ok(Box::new(HetznerClient::new(base_url.clone(), *dry_run)?))
            }
        }
    }
}

/// Register the Hetzner provider with a registry
///
/// # Example
///
/// ```rust
/// use hdns_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// hdns_provider_hetzner::register(&registry);
/// assert!(registry.has_provider("hetzner"));
/// ```
pub fn register(registry: &hdns_core::ProviderRegistry) {
    registry.register_provider(PROVIDER, Box::new(HetznerFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::Ipv4Addr;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "secret_token_12345";

    fn credential() -> Credential {
        Credential::new(TOKEN)
    }

    async fn client(server: &MockServer, dry_run: bool) -> HetznerClient {
        HetznerClient::new(server.uri(), dry_run).unwrap()
    }

    #[test]
    fn test_factory_creation() {
        let factory = HetznerFactory;

        let provider = factory.create(&ProviderConfig::default());
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().provider_name(), "hetzner");
    }

    #[test]
    fn test_dry_run_mode() {
        assert!(HetznerClient::new_dry_run().unwrap().is_dry_run());
        assert!(!HetznerClient::new_live().unwrap().is_dry_run());
    }

    #[test]
    fn test_api_error_shapes() {
        let text: RecordResponse = serde_json::from_str(r#"{"error": "zone not found"}"#).unwrap();
        assert_eq!(text.api_error(), Some("zone not found".to_string()));

        let detail: RecordResponse =
            serde_json::from_str(r#"{"error": {"message": "invalid ttl", "code": 422}}"#).unwrap();
        assert_eq!(detail.api_error(), Some("invalid ttl (code 422)".to_string()));

        let empty: RecordResponse =
            serde_json::from_str(r#"{"record": null, "error": {"message": "", "code": 0}}"#).unwrap();
        assert_eq!(empty.api_error(), None);
    }

    #[tokio::test]
    async fn test_find_record_filters_by_name_and_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/records"))
            .and(query_param("zone_id", "zone-1"))
            .and(header("Auth-API-Token", TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [
                    {"id": "r1", "zone_id": "zone-1", "type": "AAAA", "name": "home", "value": "2001:db8::1", "ttl": 60},
                    {"id": "r2", "zone_id": "zone-1", "type": "A", "name": "office", "value": "198.51.100.2"},
                    {"id": "r3", "zone_id": "zone-1", "type": "A", "name": "home", "value": "198.51.100.1", "ttl": 60}
                ]
            })))
            .mount(&server)
            .await;

        let hetzner = client(&server, false).await;
        let found = hetzner
            .find_record(&credential(), "zone-1", "home", RecordType::A)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.id.as_deref(), Some("r3"));
        assert_eq!(found.value, "198.51.100.1");
        assert_eq!(found.ttl, 60);

        let missing = hetzner
            .find_record(&credential(), "zone-1", "nas", RecordType::A)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_create_record_posts_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/records"))
            .and(header("Auth-API-Token", TOKEN))
            .and(body_partial_json(json!({
                "zone_id": "zone-1", "type": "A", "name": "home", "value": "203.0.113.7", "ttl": 300
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "record": {"id": "new-1", "zone_id": "zone-1", "type": "A", "name": "home", "value": "203.0.113.7", "ttl": 300}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let desired = ProviderRecord::desired("zone-1", RecordType::A, "home", Ipv4Addr::new(203, 0, 113, 7), 300);
        let created = client(&server, false)
            .await
            .create_record(&credential(), &desired)
            .await
            .unwrap();

        assert_eq!(created.id.as_deref(), Some("new-1"));
    }

    #[tokio::test]
    async fn test_update_record_puts_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/records/r3"))
            .and(body_partial_json(json!({"value": "203.0.113.8", "ttl": 120})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "record": {"id": "r3", "zone_id": "zone-1", "type": "A", "name": "home", "value": "203.0.113.8", "ttl": 120}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let existing = ProviderRecord {
            id: Some("r3".to_string()),
            zone_id: "zone-1".to_string(),
            record_type: RecordType::A,
            name: "home".to_string(),
            value: "198.51.100.1".to_string(),
            ttl: 60,
        };
        let updated = client(&server, false)
            .await
            .update_record(&credential(), &existing.with_value(Ipv4Addr::new(203, 0, 113, 8), 120))
            .await
            .unwrap();

        assert_eq!(updated.value, "203.0.113.8");
        assert_eq!(updated.ttl, 120);
    }

    #[tokio::test]
    async fn test_update_without_id_is_rejected() {
        let server = MockServer::start().await;
        let desired = ProviderRecord::desired("zone-1", RecordType::A, "home", Ipv4Addr::new(203, 0, 113, 7), 300);

        let result = client(&server, false).await.update_record(&credential(), &desired).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_list_zones() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "zones": [
                    {"id": "zone-1", "name": "example.com", "records_count": 4, "ttl": 86400},
                    {"id": "zone-2", "name": "example.org"}
                ]
            })))
            .mount(&server)
            .await;

        let zones = client(&server, false).await.list_zones(&credential()).await.unwrap();

        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0].records_count, 4);
        assert_eq!(zones[1].records_count, 0);
    }

    #[tokio::test]
    async fn test_error_payload_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"zones": [], "error": "token expired"})))
            .mount(&server)
            .await;

        let result = client(&server, false).await.list_zones(&credential()).await;
        match result {
            Err(Error::Provider { provider, message }) => {
                assert_eq!(provider, "hetzner");
                assert!(message.contains("token expired"));
                assert!(!message.contains(TOKEN));
            }
            other => panic!("expected provider error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/records"))
            .respond_with(ResponseTemplate::new(404).set_body_string("zone not found"))
            .mount(&server)
            .await;

        let hetzner = client(&server, false).await;
        assert!(matches!(
            hetzner.list_zones(&credential()).await,
            Err(Error::Provider { .. })
        ));
        assert!(matches!(
            hetzner.find_record(&credential(), "zone-x", "home", RecordType::A).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_dry_run_skips_writes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let hetzner = client(&server, true).await;
        let desired = ProviderRecord::desired("zone-1", RecordType::A, "home", Ipv4Addr::new(203, 0, 113, 7), 300);

        let created = hetzner.create_record(&credential(), &desired).await.unwrap();
        assert_eq!(created, desired);

        let existing = ProviderRecord {
            id: Some("r3".to_string()),
            ..desired
        };
        assert!(hetzner.update_record(&credential(), &existing).await.is_ok());
    }

    #[tokio::test]
    async fn test_blank_credential_fails_before_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"zones": []})))
            .expect(0)
            .mount(&server)
            .await;

        let result = client(&server, false).await.list_zones(&Credential::new("  ")).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_debug_does_not_leak() {
        let hetzner = HetznerClient::new_live().unwrap();
        let debug_str = format!("{:?}", hetzner);
        assert!(debug_str.contains("HetznerClient"));
        assert!(debug_str.contains("dns.hetzner.com"));
    }
}
