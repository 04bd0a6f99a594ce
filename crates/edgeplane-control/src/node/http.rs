//! HTTP/JSON client for node agents.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

use crate::config::NodesConfig;
use crate::entity::{App, LifecycleCommand, Node};
use crate::error::{ControlError, ControlResult};

use super::{NodeCallError, NodeClient, NodeConnector};

/// Header carrying the node serial on every call.
pub const NODE_SERIAL_HEADER: &str = "x-node-serial";

#[derive(Deserialize)]
struct StatusBody {
    status: String,
}

/// Opens one HTTP client per node agent.
#[derive(Debug, Clone)]
pub struct HttpNodeConnector {
    config: NodesConfig,
}

impl HttpNodeConnector {
    /// Create a connector from configuration.
    #[must_use]
    pub const fn new(config: NodesConfig) -> Self {
        Self { config }
    }

    fn headers(&self, node: &Node) -> ControlResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let serial = HeaderValue::from_str(&node.serial).map_err(|e| {
            ControlError::Config(format!("serial of node {} is not a valid header: {e}", node.id))
        })?;
        headers.insert(NODE_SERIAL_HEADER, serial);

        if let Some(token) = &self.config.auth_token {
            let mut bearer = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ControlError::Config(format!("invalid nodes.auth_token: {e}")))?;
            bearer.set_sensitive(true);
            headers.insert(AUTHORIZATION, bearer);
        }

        Ok(headers)
    }
}

#[async_trait]
impl NodeConnector for HttpNodeConnector {
    async fn connect(&self, node: &Node) -> ControlResult<Arc<dyn NodeClient>> {
        let client = Client::builder()
            .timeout(self.config.rpc_timeout())
            .connect_timeout(self.config.connect_timeout())
            .default_headers(self.headers(node)?)
            .build()
            .map_err(ControlError::Http)?;

        Ok(Arc::new(HttpNodeClient {
            client,
            base_url: format!("{}://{}", self.config.scheme, node.address),
        }))
    }
}

/// HTTP client bound to one node agent.
#[derive(Debug, Clone)]
pub struct HttpNodeClient {
    client: Client,
    base_url: String,
}

impl HttpNodeClient {
    /// Base URL of the agent.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Anything that stops a request or its response body from arriving.
#[allow(clippy::needless_pass_by_value)]
fn unreachable(e: reqwest::Error) -> NodeCallError {
    NodeCallError::Unreachable(e.to_string())
}

async fn rejected(response: Response) -> NodeCallError {
    let status = response.status();
    match response.text().await {
        Ok(body) if !body.trim().is_empty() => {
            NodeCallError::Rejected(format!("{status}: {}", body.trim()))
        }
        _ => NodeCallError::Rejected(status.to_string()),
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn deploy(&self, app: &App) -> Result<(), NodeCallError> {
        let url = format!("{}/apps", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(app)
            .send()
            .await
            .map_err(unreachable)?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        Ok(())
    }

    async fn undeploy(&self, app_id: &str) -> Result<(), NodeCallError> {
        let url = format!("{}/apps/{}", self.base_url, app_id);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(unreachable)?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            _ => Err(rejected(response).await),
        }
    }

    async fn lifecycle(&self, app_id: &str, cmd: LifecycleCommand) -> Result<(), NodeCallError> {
        let url = format!("{}/apps/{}/{}", self.base_url, app_id, cmd);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(unreachable)?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        Ok(())
    }

    async fn status(&self, app_id: &str) -> Result<String, NodeCallError> {
        let url = format!("{}/apps/{}/status", self.base_url, app_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(unreachable)?;

        if response.status() != StatusCode::OK {
            return Err(rejected(response).await);
        }

        let bytes = response.bytes().await.map_err(unreachable)?;
        let body: StatusBody = serde_json::from_slice(&bytes)
            .map_err(|e| NodeCallError::Rejected(format!("malformed status response: {e}")))?;
        Ok(body.status)
    }
}
