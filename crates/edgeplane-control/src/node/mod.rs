//! Node connection and deployment dispatch.
//!
//! [`NodeDispatcher`] turns a node id into a live [`NodeConnection`]: it loads
//! the node record, then reuses or opens a channel to the node agent through a
//! [`NodeConnector`]. Channels are cached per [`NodeTarget`] and evicted when a
//! call fails below the RPC layer, so the next attempt opens a fresh one.

mod http;
mod mock;

pub use self::http::{HttpNodeClient, HttpNodeConnector};
pub use self::mock::{MockConnector, MockFailure, NodeCall};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::entity::{App, LifecycleCommand, Node};
use crate::error::{ControlError, ControlResult};
use crate::store::{PersistenceService, StoreExt};

/// Cache key for a node channel: where the agent listens and the serial it
/// expects to be presented.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeTarget {
    /// Agent endpoint (`host:port`).
    pub address: String,
    /// Node serial, sent as the node credential.
    pub serial: String,
}

impl From<&Node> for NodeTarget {
    fn from(node: &Node) -> Self {
        Self {
            address: node.address.clone(),
            serial: node.serial.clone(),
        }
    }
}

impl fmt::Display for NodeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.address, self.serial)
    }
}

/// Failure of a single node call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeCallError {
    /// The agent could not be reached or did not answer in time.
    #[error("{0}")]
    Unreachable(String),

    /// The agent answered with an error.
    #[error("{0}")]
    Rejected(String),
}

/// Typed stubs for the node agent RPC surface.
#[async_trait]
pub trait NodeClient: Send + Sync + fmt::Debug {
    /// Install and start an app.
    async fn deploy(&self, app: &App) -> Result<(), NodeCallError>;

    /// Remove an app. Removing an app the node does not have succeeds.
    async fn undeploy(&self, app_id: &str) -> Result<(), NodeCallError>;

    /// Apply a lifecycle command to a deployed app.
    async fn lifecycle(&self, app_id: &str, cmd: LifecycleCommand) -> Result<(), NodeCallError>;

    /// Current status of a deployed app.
    async fn status(&self, app_id: &str) -> Result<String, NodeCallError>;
}

/// Opens channels to node agents.
#[async_trait]
pub trait NodeConnector: Send + Sync + fmt::Debug {
    /// Open a channel to the given node.
    async fn connect(&self, node: &Node) -> ControlResult<Arc<dyn NodeClient>>;
}

type Channels = DashMap<NodeTarget, Arc<dyn NodeClient>>;

/// Resolves nodes to live channels, caching one channel per target.
#[derive(Debug, Clone)]
pub struct NodeDispatcher {
    connector: Arc<dyn NodeConnector>,
    channels: Arc<Channels>,
}

impl NodeDispatcher {
    /// Create a dispatcher opening channels through `connector`.
    #[must_use]
    pub fn new(connector: Arc<dyn NodeConnector>) -> Self {
        Self {
            connector,
            channels: Arc::new(DashMap::new()),
        }
    }

    /// Load the node record and return a connection to it.
    pub async fn connect(
        &self,
        store: &dyn PersistenceService,
        node_id: &str,
    ) -> ControlResult<NodeConnection> {
        let node: Node = store
            .read_entity(node_id)
            .await?
            .ok_or_else(|| ControlError::NodeNotFound(node_id.to_owned()))?;

        let target = NodeTarget::from(&node);
        let client = self.channel(&node, &target).await?;

        Ok(NodeConnection {
            node,
            target,
            client,
            channels: Arc::clone(&self.channels),
        })
    }

    /// Number of cached channels.
    #[must_use]
    pub fn cached_channels(&self) -> usize {
        self.channels.len()
    }

    /// Drop the cached channel to `node`, if any. Called when the node record
    /// is deleted or its address or serial changes.
    pub fn forget(&self, node: &Node) -> bool {
        let target = NodeTarget::from(node);
        let forgotten = self.channels.remove(&target).is_some();
        if forgotten {
            debug!(node_id = %node.id, target = %target, "node channel dropped");
        }
        forgotten
    }

    /// Drop every cached channel.
    pub fn clear(&self) {
        self.channels.clear();
    }

    async fn channel(&self, node: &Node, target: &NodeTarget) -> ControlResult<Arc<dyn NodeClient>> {
        if let Some(client) = self.channels.get(target) {
            return Ok(Arc::clone(client.value()));
        }

        debug!(node_id = %node.id, target = %target, "opening node channel");
        let client = self.connector.connect(node).await?;

        // Another request may have opened a channel to the same target meanwhile.
        let entry = self.channels.entry(target.clone()).or_insert(client);
        Ok(Arc::clone(entry.value()))
    }
}

/// A node record paired with a live channel to its agent.
#[derive(Debug)]
pub struct NodeConnection {
    node: Node,
    target: NodeTarget,
    client: Arc<dyn NodeClient>,
    channels: Arc<Channels>,
}

impl NodeConnection {
    /// The connected node.
    #[must_use]
    pub const fn node(&self) -> &Node {
        &self.node
    }

    /// Deploy an app to the node.
    pub async fn deploy(&self, app: &App) -> ControlResult<()> {
        let result = self.client.deploy(app).await;
        self.settle("deploy", result)?;
        info!(node_id = %self.node.id, app_id = %app.id, "app deployed");
        Ok(())
    }

    /// Remove an app from the node.
    pub async fn undeploy(&self, app_id: &str) -> ControlResult<()> {
        let result = self.client.undeploy(app_id).await;
        self.settle("undeploy", result)?;
        info!(node_id = %self.node.id, app_id, "app undeployed");
        Ok(())
    }

    /// Apply a lifecycle command to an app on the node.
    pub async fn lifecycle(&self, app_id: &str, cmd: LifecycleCommand) -> ControlResult<()> {
        let result = self.client.lifecycle(app_id, cmd).await;
        self.settle("lifecycle", result)?;
        info!(node_id = %self.node.id, app_id, cmd = %cmd, "lifecycle command applied");
        Ok(())
    }

    /// Status of an app on the node.
    pub async fn status(&self, app_id: &str) -> ControlResult<String> {
        let result = self.client.status(app_id).await;
        self.settle("status", result)
    }

    fn settle<T>(&self, call: &'static str, result: Result<T, NodeCallError>) -> ControlResult<T> {
        result.map_err(|e| match e {
            NodeCallError::Unreachable(message) => {
                // Only drop the channel this connection used; a newer one may
                // already have replaced it.
                let evicted = self
                    .channels
                    .remove_if(&self.target, |_, cached| Arc::ptr_eq(cached, &self.client))
                    .is_some();
                warn!(
                    node_id = %self.node.id,
                    call,
                    evicted,
                    error = %message,
                    "node unreachable"
                );
                ControlError::NodeUnreachable {
                    node_id: self.node.id.clone(),
                    message,
                }
            }
            NodeCallError::Rejected(message) => {
                warn!(node_id = %self.node.id, call, error = %message, "node rejected call");
                ControlError::Node {
                    node_id: self.node.id.clone(),
                    call,
                    message,
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entity::generate_id;
    use crate::store::MemoryStore;

    fn node(address: &str) -> Node {
        Node {
            id: generate_id(),
            name: "edge".to_owned(),
            location: "lab".to_owned(),
            serial: "SN-1".to_owned(),
            address: address.to_owned(),
        }
    }

    fn app() -> App {
        App {
            id: generate_id(),
            ..App::default()
        }
    }

    async fn setup() -> (MemoryStore, Arc<MockConnector>, NodeDispatcher, Node) {
        let store = MemoryStore::new();
        let n = node("10.0.0.1:42101");
        store.create_entity(&n).await.unwrap();
        let connector = Arc::new(MockConnector::new());
        let dispatcher = NodeDispatcher::new(Arc::clone(&connector) as Arc<dyn NodeConnector>);
        (store, connector, dispatcher, n)
    }

    #[tokio::test]
    async fn missing_node_cannot_connect() {
        let (store, _, dispatcher, _) = setup().await;
        let err = dispatcher.connect(&store, "nope").await.unwrap_err();
        assert!(matches!(err, ControlError::NodeNotFound(id) if id == "nope"));
        assert_eq!(dispatcher.cached_channels(), 0);
    }

    #[tokio::test]
    async fn channels_are_reused() {
        let (store, connector, dispatcher, n) = setup().await;
        dispatcher.connect(&store, &n.id).await.unwrap();
        dispatcher.connect(&store, &n.id).await.unwrap();
        assert_eq!(connector.connects(), 1);
        assert_eq!(dispatcher.cached_channels(), 1);
    }

    #[tokio::test]
    async fn transport_failure_evicts_channel() {
        let (store, connector, dispatcher, n) = setup().await;
        connector.fail("deploy", MockFailure::Unreachable);

        let conn = dispatcher.connect(&store, &n.id).await.unwrap();
        let err = conn.deploy(&app()).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(dispatcher.cached_channels(), 0);

        connector.clear_failures();
        let conn = dispatcher.connect(&store, &n.id).await.unwrap();
        conn.deploy(&app()).await.unwrap();
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn forgotten_node_reconnects() {
        let (store, connector, dispatcher, n) = setup().await;
        dispatcher.connect(&store, &n.id).await.unwrap();

        assert!(dispatcher.forget(&n));
        assert!(!dispatcher.forget(&n));
        assert_eq!(dispatcher.cached_channels(), 0);

        dispatcher.connect(&store, &n.id).await.unwrap();
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn rejection_keeps_channel() {
        let (store, connector, dispatcher, n) = setup().await;
        connector.fail("lifecycle", MockFailure::Rejected);

        let conn = dispatcher.connect(&store, &n.id).await.unwrap();
        let err = conn
            .lifecycle("some-app", LifecycleCommand::Restart)
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Node { call: "lifecycle", .. }));
        assert_eq!(dispatcher.cached_channels(), 1);
    }

    #[tokio::test]
    async fn status_is_reported() {
        let (store, connector, dispatcher, n) = setup().await;
        connector.set_status("stopped");
        let conn = dispatcher.connect(&store, &n.id).await.unwrap();
        assert_eq!(conn.status("a").await.unwrap(), "stopped");
        assert_eq!(
            connector.calls(),
            vec![NodeCall::Status {
                address: n.address.clone(),
                app_id: "a".to_owned(),
            }]
        );
    }
}
