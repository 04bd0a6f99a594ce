//! Traffic policies applied to deployed apps.

use serde::{Deserialize, Serialize};

use super::validate::{
    require_id, require_ip_or_cidr, require_non_empty, require_one_of, require_range,
};
use super::{Entity, ValidationError};

const ACTIONS: &[&str] = &["accept", "reject", "drop"];
const PROTOCOLS: &[&str] = &["tcp", "udp", "icmp", "all"];

/// An ordered set of rules steering app traffic on a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficPolicy {
    /// Unique policy identifier.
    pub id: String,
    /// Policy name.
    pub name: String,
    /// Rules, evaluated by priority.
    pub rules: Vec<TrafficRule>,
}

/// A single match/action rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficRule {
    /// Free-form description.
    pub description: String,
    /// Lower values are evaluated first.
    pub priority: u32,
    /// `accept`, `reject` or `drop`.
    pub action: String,
    /// Protocol to match, any when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Source address or CIDR, any when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Destination address or CIDR, any when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

impl Entity for TrafficPolicy {
    const COLLECTION: &'static str = "traffic_policies";
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
        if self.rules.is_empty() {
            return Err(ValidationError::new("rules must contain at least one rule"));
        }
        for rule in &self.rules {
            rule.validate()?;
        }
        Ok(())
    }
}

impl TrafficRule {
    fn validate(&self) -> Result<(), ValidationError> {
        require_range("priority", self.priority, 1..=65_535)?;
        require_one_of("action", &self.action, ACTIONS)?;
        if let Some(protocol) = &self.protocol {
            require_one_of("protocol", protocol, PROTOCOLS)?;
        }
        if let Some(source) = &self.source {
            require_ip_or_cidr("source", source)?;
        }
        if let Some(destination) = &self.destination {
            require_ip_or_cidr("destination", destination)?;
        }
        Ok(())
    }
}
