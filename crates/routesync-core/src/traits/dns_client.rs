// # DNS Client Trait
//
// Defines the interface to the remote DNS provider.
//
// ## Implementations
//
// - Cloudflare: `routesync-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use routesync_core::traits::DnsClient;
// use routesync_core::model::{DnsRecord, RecordType};
//
// async fn add(client: &dyn DnsClient) -> routesync_core::Result<()> {
//     let draft = DnsRecord::draft("zone-id", "app.example.com", RecordType::Cname, "proxy.example.com");
//     let created = client.create_record("zone-id", &draft).await?;
//     println!("created {}", created.id);
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::model::{DnsRecord, RecordType};

/// Trait for DNS provider clients
///
/// Every call is a single unary request (or, for listing, a bounded sequence
/// of page requests). Implementations must not retry: the saga executor
/// reports failures and the user decides whether to re-issue the intent.
///
/// Provider-side error payloads are surfaced as
/// [`Error::Provider`](crate::Error::Provider) with the provider's code.
#[async_trait]
pub trait DnsClient: Send + Sync {
    /// List records of a zone, optionally filtered by type
    ///
    /// Implementations follow pagination until exhausted or until the
    /// provider's page cap is reached. Order is the provider's order.
    async fn list_records(
        &self,
        zone_id: &str,
        record_type: Option<&RecordType>,
    ) -> Result<Vec<DnsRecord>, crate::Error>;

    /// Create a record; the returned record carries the provider-assigned id
    async fn create_record(
        &self,
        zone_id: &str,
        record: &DnsRecord,
    ) -> Result<DnsRecord, crate::Error>;

    /// Replace the record identified by `record_id`
    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &DnsRecord,
    ) -> Result<DnsRecord, crate::Error>;

    /// Delete the record identified by `record_id`
    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), crate::Error>;

    /// Provider name (for logging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS clients from configuration
pub trait DnsClientFactory: Send + Sync {
    /// Create a DnsClient instance from configuration
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn DnsClient>, crate::Error>;
}
