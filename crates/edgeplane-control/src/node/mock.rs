//! In-process node agent for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::entity::{App, LifecycleCommand, Node};
use crate::error::ControlResult;

use super::{NodeCallError, NodeClient, NodeConnector};

/// A call received by a mock node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCall {
    /// `deploy(app)`.
    Deploy {
        /// Node address the call went to.
        address: String,
        /// App deployed.
        app_id: String,
    },
    /// `undeploy(app_id)`.
    Undeploy {
        /// Node address the call went to.
        address: String,
        /// App removed.
        app_id: String,
    },
    /// `lifecycle(app_id, cmd)`.
    Lifecycle {
        /// Node address the call went to.
        address: String,
        /// App addressed.
        app_id: String,
        /// Command applied.
        cmd: LifecycleCommand,
    },
    /// `status(app_id)`.
    Status {
        /// Node address the call went to.
        address: String,
        /// App queried.
        app_id: String,
    },
}

/// How a failing mock call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// As if the agent could not be reached.
    Unreachable,
    /// As if the agent answered with an error.
    Rejected,
}

#[derive(Debug)]
struct MockState {
    calls: Mutex<Vec<NodeCall>>,
    failures: Mutex<HashMap<&'static str, MockFailure>>,
    status: Mutex<String>,
    connects: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connector whose channels record every call and fail on demand.
///
/// All channels opened by one connector share its state, so a test can set
/// failures and inspect calls through the connector it handed out.
#[derive(Debug, Clone)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    /// A connector whose calls all succeed and report `running`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState {
                calls: Mutex::new(Vec::new()),
                failures: Mutex::new(HashMap::new()),
                status: Mutex::new("running".to_owned()),
                connects: AtomicUsize::new(0),
            }),
        }
    }

    /// Make every subsequent `call` (`deploy`, `undeploy`, `lifecycle` or
    /// `status`) fail.
    pub fn fail(&self, call: &'static str, failure: MockFailure) {
        lock(&self.state.failures).insert(call, failure);
    }

    /// Let every call succeed again.
    pub fn clear_failures(&self) {
        lock(&self.state.failures).clear();
    }

    /// Status reported by `status` calls.
    pub fn set_status(&self, status: impl Into<String>) {
        *lock(&self.state.status) = status.into();
    }

    /// Calls received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<NodeCall> {
        lock(&self.state.calls).clone()
    }

    /// Number of channels opened.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeConnector for MockConnector {
    async fn connect(&self, node: &Node) -> ControlResult<Arc<dyn NodeClient>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockClient {
            address: node.address.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

#[derive(Debug)]
struct MockClient {
    address: String,
    state: Arc<MockState>,
}

impl MockClient {
    fn record(&self, call: &'static str, entry: NodeCall) -> Result<(), NodeCallError> {
        lock(&self.state.calls).push(entry);
        match lock(&self.state.failures).get(call) {
            Some(MockFailure::Unreachable) => Err(NodeCallError::Unreachable(format!(
                "connection to {} refused",
                self.address
            ))),
            Some(MockFailure::Rejected) => {
                Err(NodeCallError::Rejected(format!("{call} refused by agent")))
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NodeClient for MockClient {
    async fn deploy(&self, app: &App) -> Result<(), NodeCallError> {
        self.record(
            "deploy",
            NodeCall::Deploy {
                address: self.address.clone(),
                app_id: app.id.clone(),
            },
        )
    }

    async fn undeploy(&self, app_id: &str) -> Result<(), NodeCallError> {
        self.record(
            "undeploy",
            NodeCall::Undeploy {
                address: self.address.clone(),
                app_id: app_id.to_owned(),
            },
        )
    }

    async fn lifecycle(&self, app_id: &str, cmd: LifecycleCommand) -> Result<(), NodeCallError> {
        self.record(
            "lifecycle",
            NodeCall::Lifecycle {
                address: self.address.clone(),
                app_id: app_id.to_owned(),
                cmd,
            },
        )
    }

    async fn status(&self, app_id: &str) -> Result<String, NodeCallError> {
        self.record(
            "status",
            NodeCall::Status {
                address: self.address.clone(),
                app_id: app_id.to_owned(),
            },
        )?;
        Ok(lock(&self.state.status).clone())
    }
}
