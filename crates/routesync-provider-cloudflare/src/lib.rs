// # Cloudflare DNS Client
//
// `DnsClient` implementation over the Cloudflare API v4.
//
// - One HTTP request per call (listing: one request per page, capped)
// - No retry, no backoff; every failure goes back to the saga executor
// - HTTP timeout of 30 seconds
// - Error payloads (`errors[].code`) surface as `Error::Provider` with the code
// - The API token never appears in logs or `Debug` output
//
// ## API Reference
//
// - List DNS Records: GET `/zones/:zone_id/dns_records?page=&per_page=&type=`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use routesync_core::config::ProviderConfig;
use routesync_core::model::{DnsRecord, RecordType, TTL_AUTO};
use routesync_core::registry::ClientRegistry;
use routesync_core::traits::{DnsClient, DnsClientFactory};
use routesync_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Records per page (Cloudflare maximum for dns_records)
const PAGE_SIZE: u32 = 100;

/// Listing stops after this many pages
pub const MAX_PAGES: u32 = 50;

const PROVIDER: &str = "cloudflare";

/// Response envelope shared by every v4 endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    total_pages: u32,
}

/// A record as sent to / received from the API
#[derive(Debug, Serialize, Deserialize)]
struct ApiRecord {
    #[serde(default, skip_serializing)]
    id: String,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    content: String,
    #[serde(default)]
    proxied: bool,
    #[serde(default = "ttl_auto")]
    ttl: u32,
    #[serde(default, skip_serializing)]
    zone_id: Option<String>,
}

fn ttl_auto() -> u32 {
    TTL_AUTO
}

impl ApiRecord {
    fn from_record(record: &DnsRecord) -> Self {
        Self {
            id: String::new(),
            record_type: record.record_type.as_str().to_string(),
            name: record.name.clone(),
            content: record.content.clone(),
            proxied: record.proxied,
            ttl: record.ttl,
            zone_id: None,
        }
    }

    fn into_record(self, zone_id: &str) -> DnsRecord {
        DnsRecord {
            id: self.id,
            record_type: RecordType::parse(&self.record_type),
            name: self.name,
            content: self.content,
            proxied: self.proxied,
            ttl: self.ttl,
            zone_id: self.zone_id.unwrap_or_else(|| zone_id.to_string()),
        }
    }
}

/// Cloudflare DNS client
///
/// The Debug implementation does not expose the API token.
pub struct CloudflareClient {
    /// ⚠️ NEVER log this value
    api_token: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for CloudflareClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareClient")
            .field("api_token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl CloudflareClient {
    /// Create a client for the public API
    pub fn new(api_token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_token, CLOUDFLARE_API_BASE)
    }

    /// Create a client talking to `base_url` instead of the public API
    pub fn with_base_url(api_token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.trim().is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn records_url(&self, zone_id: &str) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, zone_id)
    }

    /// Send a request and unwrap the v4 envelope
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<Envelope<T>> {
        let response = request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::network(format!("{} failed: {}", what, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::network(format!("{}: failed to read response: {}", what, e)))?;
        tracing::debug!("{} -> {}", what, status);

        decode(status.as_u16(), &body, what)
    }
}

/// Map an HTTP status and body to the envelope or a provider error
fn decode<T: DeserializeOwned>(status: u16, body: &str, what: &str) -> Result<Envelope<T>> {
    let envelope = serde_json::from_str::<Envelope<T>>(body);

    match envelope {
        Ok(envelope) if envelope.success && (200..300).contains(&status) => Ok(envelope),
        Ok(envelope) => match envelope.errors.into_iter().next() {
            Some(first) => Err(Error::provider_code(
                PROVIDER,
                first.code,
                format!("{}: {}", what, first.message),
            )),
            None => Err(status_error(status, what)),
        },
        Err(e) if (200..300).contains(&status) => Err(Error::provider(
            PROVIDER,
            format!("{}: failed to parse response: {}", what, e),
        )),
        Err(_) => Err(status_error(status, what)),
    }
}

fn status_error(status: u16, what: &str) -> Error {
    let reason = match status {
        401 | 403 => "authentication failed: invalid API token or insufficient permissions",
        404 => "zone or record not found",
        429 => "rate limit exceeded",
        500..=599 => "Cloudflare server error",
        _ => "unexpected response",
    };
    Error::provider(PROVIDER, format!("{}: {} (HTTP {})", what, reason, status))
}

#[async_trait]
impl DnsClient for CloudflareClient {
    async fn list_records(
        &self,
        zone_id: &str,
        record_type: Option<&RecordType>,
    ) -> Result<Vec<DnsRecord>> {
        let mut records = Vec::new();
        let mut page = 1;

        loop {
            let mut query = vec![
                ("page", page.to_string()),
                ("per_page", PAGE_SIZE.to_string()),
            ];
            if let Some(record_type) = record_type {
                query.push(("type", record_type.as_str().to_string()));
            }

            let request = self.client.get(self.records_url(zone_id)).query(&query);
            let envelope: Envelope<Vec<ApiRecord>> = self.send(request, "list DNS records").await?;

            let batch = envelope.result.unwrap_or_default();
            let fetched = batch.len();
            records.extend(batch.into_iter().map(|r| r.into_record(zone_id)));

            let total_pages = envelope.result_info.map_or(1, |info| info.total_pages);
            if fetched == 0 || page >= total_pages {
                break;
            }
            if page >= MAX_PAGES {
                tracing::warn!(
                    "Stopping after {} pages of DNS records ({} of {} pages read)",
                    MAX_PAGES,
                    page,
                    total_pages
                );
                break;
            }
            page += 1;
        }

        tracing::debug!("Listed {} DNS records in zone {}", records.len(), zone_id);
        Ok(records)
    }

    async fn create_record(&self, zone_id: &str, record: &DnsRecord) -> Result<DnsRecord> {
        let request = self
            .client
            .post(self.records_url(zone_id))
            .json(&ApiRecord::from_record(record));
        let envelope: Envelope<ApiRecord> = self.send(request, "create DNS record").await?;

        let created = envelope
            .result
            .ok_or_else(|| Error::provider(PROVIDER, "create DNS record: response has no result"))?;
        tracing::info!("Created {} record {}", record.record_type, record.name);
        Ok(created.into_record(zone_id))
    }

    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &DnsRecord,
    ) -> Result<DnsRecord> {
        let url = format!("{}/{}", self.records_url(zone_id), record_id);
        let request = self.client.put(url).json(&ApiRecord::from_record(record));
        let envelope: Envelope<ApiRecord> = self.send(request, "update DNS record").await?;

        let updated = envelope
            .result
            .ok_or_else(|| Error::provider(PROVIDER, "update DNS record: response has no result"))?;
        tracing::info!("Updated {} record {}", record.record_type, record.name);
        Ok(updated.into_record(zone_id))
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        let url = format!("{}/{}", self.records_url(zone_id), record_id);
        let _: Envelope<serde_json::Value> =
            self.send(self.client.delete(url), "delete DNS record").await?;
        tracing::info!("Deleted DNS record {}", record_id);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Factory for creating Cloudflare clients
pub struct CloudflareFactory;

impl DnsClientFactory for CloudflareFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsClient>> {
        match config {
            ProviderConfig::Cloudflare { api_token } => {
                Ok(Box::new(CloudflareClient::new(api_token.clone())?))
            }
            _ => Err(Error::config("Invalid config for Cloudflare provider")),
        }
    }
}

/// Register the Cloudflare client with a registry
///
/// # Example
///
/// ```rust
/// use routesync_core::ClientRegistry;
///
/// let registry = ClientRegistry::new();
/// routesync_provider_cloudflare::register(&registry);
/// assert!(registry.has_client("cloudflare"));
/// ```
pub fn register(registry: &ClientRegistry) {
    registry.register_client(PROVIDER, Box::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_creation() {
        let config = ProviderConfig::Cloudflare {
            api_token: "test_token".to_string(),
        };
        let client = CloudflareFactory.create(&config).unwrap();
        assert_eq!(client.provider_name(), "cloudflare");
    }

    #[test]
    fn test_factory_missing_token() {
        let config = ProviderConfig::Cloudflare {
            api_token: "".to_string(),
        };
        assert!(CloudflareFactory.create(&config).is_err());
    }

    #[test]
    fn test_factory_rejects_other_provider() {
        let config = ProviderConfig::Custom {
            factory: "other".to_string(),
            config: serde_json::Value::Null,
        };
        assert!(CloudflareFactory.create(&config).is_err());
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let client = CloudflareClient::new("secret_token_12345").unwrap();

        let debug_str = format!("{:?}", client);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareClient"));
    }

    #[test]
    fn test_error_payload_keeps_code() {
        let body = r#"{"success":false,"errors":[{"code":81057,"message":"Record already exists."}],"result":null}"#;
        let err = decode::<ApiRecord>(400, body, "create DNS record").unwrap_err();
        match err {
            Error::Provider { code, message, .. } => {
                assert_eq!(code, Some(81057));
                assert!(message.contains("Record already exists"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_status_without_payload() {
        let err = decode::<ApiRecord>(429, "too many", "list DNS records").unwrap_err();
        assert!(err.to_string().contains("rate limit"));
        assert!(matches!(err, Error::Provider { code: None, .. }));
    }

    #[test]
    fn test_record_payload() {
        let record = DnsRecord::draft("z", "app.x.com", RecordType::Cname, "proxy.x.com")
            .with_proxied(true);
        let json = serde_json::to_value(ApiRecord::from_record(&record)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "CNAME",
                "name": "app.x.com",
                "content": "proxy.x.com",
                "proxied": true,
                "ttl": 1
            })
        );
    }
}
