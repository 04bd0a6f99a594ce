//! Managed edge nodes.

use serde::{Deserialize, Serialize};

use super::validate::{require_host_port, require_id, require_non_empty};
use super::{Entity, ValidationError};

/// An edge-computing endpoint that apps and configuration are deployed to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    /// Unique node identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Physical or logical site.
    pub location: String,
    /// Hardware serial, presented to the node agent as the node's credential.
    pub serial: String,
    /// Node agent RPC endpoint (`host:port`).
    pub address: String,
}

impl Entity for Node {
    const COLLECTION: &'static str = "nodes";
    const FILTER_FIELDS: &'static [&'static str] = &["name", "location", "serial"];

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_id("id", &self.id)?;
        require_non_empty("name", &self.name)?;
        require_non_empty("location", &self.location)?;
        require_non_empty("serial", &self.serial)?;
        require_host_port("address", &self.address)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn node() -> Node {
        Node {
            id: crate::entity::generate_id(),
            name: "edge-7".to_owned(),
            location: "rack 3".to_owned(),
            serial: "SN-0007".to_owned(),
            address: "10.1.2.7:42101".to_owned(),
        }
    }

    #[test]
    fn valid_node() {
        assert!(node().validate().is_ok());
    }

    #[test]
    fn first_failing_field_is_reported() {
        let mut n = node();
        n.name.clear();
        n.serial.clear();
        assert_eq!(n.validate().unwrap_err().message(), "name cannot be empty");
    }

    #[test]
    fn address_needs_port() {
        let mut n = node();
        n.address = "10.1.2.7".to_owned();
        assert_eq!(
            n.validate().unwrap_err().message(),
            "address not a valid host:port"
        );
    }

    #[test]
    fn empty_object_decodes_to_defaults() {
        let n: Node = serde_json::from_str("{}").unwrap();
        assert_eq!(n, Node::default());
        assert_eq!(
            n.validate().unwrap_err().message(),
            "id not a valid identifier"
        );
    }
}
