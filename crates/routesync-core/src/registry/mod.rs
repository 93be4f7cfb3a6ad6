//! Plugin-based DNS client registry
//!
//! DNS client implementations register a factory under a type name. The
//! binary picks the factory matching [`ProviderConfig::type_name`] instead of
//! hardcoding a match on provider kinds.
//!
//! ```rust,ignore
//! use routesync_core::registry::ClientRegistry;
//!
//! let registry = ClientRegistry::new();
//! routesync_provider_cloudflare::register(&registry);
//!
//! let client = registry.create_client(&config.dns.provider)?;
//! ```

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::traits::{DnsClient, DnsClientFactory};
use std::collections::HashMap;
use std::sync::RwLock;

/// Registry of DNS client factories keyed by provider type name
///
/// Uses interior mutability so registration works through a shared reference.
#[derive(Default)]
pub struct ClientRegistry {
    factories: RwLock<HashMap<String, Box<dyn DnsClientFactory>>>,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any previous one
    pub fn register_client(&self, name: impl Into<String>, factory: Box<dyn DnsClientFactory>) {
        let name = name.into();
        match self.factories.write() {
            Ok(mut factories) => {
                factories.insert(name, factory);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(name, factory);
            }
        }
    }

    /// Instantiate the client matching the provider configuration
    pub fn create_client(&self, config: &ProviderConfig) -> Result<Box<dyn DnsClient>> {
        let provider_type = config.type_name();
        let factories = self
            .factories
            .read()
            .map_err(|_| Error::Other("client registry lock poisoned".into()))?;

        let factory = factories
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config)
    }

    /// Registered provider type names, sorted
    pub fn list_clients(&self) -> Vec<String> {
        let mut names: Vec<String> = match self.factories.read() {
            Ok(factories) => factories.keys().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().keys().cloned().collect(),
        };
        names.sort();
        names
    }

    /// Check if a provider type is registered
    pub fn has_client(&self, name: &str) -> bool {
        match self.factories.read() {
            Ok(factories) => factories.contains_key(name),
            Err(poisoned) => poisoned.into_inner().contains_key(name),
        }
    }
}
