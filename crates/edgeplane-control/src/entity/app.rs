//! Deployable applications.

use serde::{Deserialize, Serialize};

use super::validate::{require_id, require_non_empty, require_one_of, require_range};
use super::{Entity, ValidationError};

const APP_TYPES: &[&str] = &["container", "vm"];
const PORT_PROTOCOLS: &[&str] = &["tcp", "udp", "icmp", "all"];

/// An application image that can be bound to nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct App {
    /// Unique app identifier.
    pub id: String,
    /// Packaging: `container` or `vm`.
    #[serde(rename = "type")]
    pub app_type: String,
    /// App name.
    pub name: String,
    /// Publisher.
    pub vendor: String,
    /// Free-form description.
    pub description: String,
    /// Release version.
    pub version: String,
    /// CPU cores requested.
    pub cores: u32,
    /// Memory requested in MiB.
    pub memory: u32,
    /// Ports the app listens on.
    pub ports: Vec<PortSpec>,
    /// Image location the node pulls from.
    pub source: String,
}

/// A port exposed by an app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortSpec {
    /// Port number.
    pub port: u32,
    /// `tcp`, `udp`, `icmp` or `all`.
    pub protocol: String,
}

impl Entity for App {
    const COLLECTION: &'static str = "apps";
    const FILTER_FIELDS: &'static [&'static str] = &["type", "name", "vendor", "version"];

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_id("id", &self.id)?;
        require_one_of("type", &self.app_type, APP_TYPES)?;
        require_non_empty("name", &self.name)?;
        require_non_empty("vendor", &self.vendor)?;
        require_non_empty("version", &self.version)?;
        require_range("cores", self.cores, 1..=8)?;
        require_range("memory", self.memory, 1..=16_384)?;
        for port in &self.ports {
            require_range("port", port.port, 1..=65_535)?;
            require_one_of("protocol", &port.protocol, PORT_PROTOCOLS)?;
        }
        require_non_empty("source", &self.source)
    }
}
