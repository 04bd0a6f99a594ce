//! DNS configurations pushed to nodes.

use serde::{Deserialize, Serialize};

use super::validate::{require_id, require_ip, require_non_empty};
use super::{Entity, ValidationError};

/// Local DNS records and upstream forwarders for a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Unique configuration identifier.
    pub id: String,
    /// Configuration name.
    pub name: String,
    /// Static A records served by the node.
    pub a_records: Vec<DnsARecord>,
    /// Upstream resolvers.
    pub forwarders: Vec<DnsForwarder>,
}

/// A static A record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsARecord {
    /// Fully qualified name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Addresses the name resolves to.
    pub ips: Vec<String>,
}

/// An upstream resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsForwarder {
    /// Resolver name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Resolver address.
    pub ip: String,
}

impl Entity for DnsConfig {
    const COLLECTION: &'static str = "dns_configs";
    const FILTER_FIELDS: &'static [&'static str] = &["name"];

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_id("id", &self.id)?;
        require_non_empty("name", &self.name)?;
        for record in &self.a_records {
            require_non_empty("a_records.name", &record.name)?;
            for ip in &record.ips {
                require_ip("a_records.ips", ip)?;
            }
        }
        for forwarder in &self.forwarders {
            require_ip("forwarders.ip", &forwarder.ip)?;
        }
        Ok(())
    }
}
