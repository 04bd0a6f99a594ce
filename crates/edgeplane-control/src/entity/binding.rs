//! Bindings between nodes and the resources deployed to them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::validate::require_id;
use super::{Entity, RequestShape, ValidationError};

/// An app deployed to a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeApp {
    /// Unique binding identifier.
    pub id: String,
    /// Node the app runs on.
    pub node_id: String,
    /// App deployed.
    pub app_id: String,
}

impl Entity for NodeApp {
    const COLLECTION: &'static str = "nodes_apps";
    const FILTER_FIELDS: &'static [&'static str] = &["node_id", "app_id"];

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_id("id", &self.id)?;
        require_id("node_id", &self.node_id)?;
        require_id("app_id", &self.app_id)
    }
}

/// Lifecycle command sent to a deployed app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleCommand {
    /// Start a stopped app.
    Start,
    /// Stop a running app.
    Stop,
    /// Stop then start.
    Restart,
}

impl LifecycleCommand {
    /// Wire name of the command.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

impl fmt::Display for LifecycleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LifecycleCommand {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            _ => Err(ValidationError::new("cmd not a valid lifecycle command")),
        }
    }
}

/// Update shape for [`NodeApp`]: the binding plus the command to apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAppRequest {
    /// The binding addressed.
    #[serde(flatten)]
    pub binding: NodeApp,
    /// `start`, `stop` or `restart`.
    #[serde(default)]
    pub cmd: String,
}

impl NodeAppRequest {
    /// The parsed lifecycle command.
    pub fn command(&self) -> Result<LifecycleCommand, ValidationError> {
        self.cmd.parse()
    }
}

impl RequestShape<NodeApp> for NodeAppRequest {
    fn validate_request(&self) -> Result<(), ValidationError> {
        self.binding.validate()?;
        self.command().map(|_| ())
    }

    fn into_entity(self) -> NodeApp {
        self.binding
    }
}

/// Read shape for [`NodeApp`]: the binding plus the status its node reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAppResponse {
    /// The binding read.
    #[serde(flatten)]
    pub binding: NodeApp,
    /// App status as reported by the node agent.
    #[serde(default)]
    pub status: String,
}

/// A traffic policy applied to a deployed app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeAppTrafficPolicy {
    /// Unique binding identifier.
    pub id: String,
    /// The node/app binding the policy applies to.
    pub nodes_apps_id: String,
    /// Policy applied.
    pub traffic_policy_id: String,
}

impl Entity for NodeAppTrafficPolicy {
    const COLLECTION: &'static str = "nodes_apps_traffic_policies";
    const FILTER_FIELDS: &'static [&'static str] = &["nodes_apps_id", "traffic_policy_id"];

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_id("id", &self.id)?;
        require_id("nodes_apps_id", &self.nodes_apps_id)?;
        require_id("traffic_policy_id", &self.traffic_policy_id)
    }
}

/// The DNS configuration assigned to a node. A node has at most one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeDnsConfig {
    /// Unique binding identifier.
    pub id: String,
    /// Node configured.
    pub node_id: String,
    /// Configuration assigned.
    pub dns_config_id: String,
}

impl Entity for NodeDnsConfig {
    const COLLECTION: &'static str = "nodes_dns_configs";
    const FILTER_FIELDS: &'static [&'static str] = &["node_id", "dns_config_id"];

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_id("id", &self.id)?;
        require_id("node_id", &self.node_id)?;
        require_id("dns_config_id", &self.dns_config_id)
    }
}
