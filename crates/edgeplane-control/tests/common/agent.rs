//! In-process node agent speaking the HTTP/JSON node RPC contract.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

/// A request received by the fake agent.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub method: Method,
    pub path: String,
    pub serial: Option<String>,
    pub authorization: Option<String>,
    pub body: Option<Value>,
}

#[derive(Default)]
struct AgentState {
    requests: Mutex<Vec<AgentRequest>>,
    fail_with: Mutex<Option<StatusCode>>,
    deployed: Mutex<Vec<String>>,
}

/// A node agent listening on a local TCP port until dropped.
pub struct FakeAgent {
    pub addr: SocketAddr,
    state: Arc<AgentState>,
    cancel: CancellationToken,
}

impl FakeAgent {
    /// Starts an agent on an ephemeral port.
    pub async fn start() -> Self {
        let state = Arc::new(AgentState::default());
        let app = Router::new()
            .route("/apps", post(deploy))
            .route("/apps/{id}", delete(undeploy))
            .route("/apps/{id}/{action}", get(status).post(lifecycle))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            cancel,
        }
    }

    /// Agent address as stored on a node.
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Answer every subsequent request with `status`.
    pub fn fail_with(&self, status: StatusCode) {
        *self.state.fail_with.lock().unwrap() = Some(status);
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<AgentRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Drop every deployed app, as after an agent restart.
    pub fn forget_all(&self) {
        self.state.deployed.lock().unwrap().clear();
    }

    /// Ids of the apps currently deployed.
    pub fn deployed(&self) -> Vec<String> {
        self.state.deployed.lock().unwrap().clone()
    }
}

impl Drop for FakeAgent {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// An address nothing listens on.
pub async fn closed_address() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

impl AgentState {
    fn record(
        &self,
        method: Method,
        path: String,
        headers: &HeaderMap,
        body: Option<Value>,
    ) -> Option<Response> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        self.requests.lock().unwrap().push(AgentRequest {
            method,
            path,
            serial: header("x-node-serial"),
            authorization: header("authorization"),
            body,
        });

        let failure = *self.fail_with.lock().unwrap();
        failure.map(|status| (status, "agent failure").into_response())
    }
}

async fn deploy(
    State(state): State<Arc<AgentState>>,
    headers: HeaderMap,
    Json(app): Json<Value>,
) -> Response {
    let id = app["id"].as_str().unwrap_or_default().to_owned();
    if let Some(failure) = state.record(Method::POST, "/apps".to_owned(), &headers, Some(app)) {
        return failure;
    }
    state.deployed.lock().unwrap().push(id);
    StatusCode::OK.into_response()
}

async fn undeploy(
    State(state): State<Arc<AgentState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Some(failure) = state.record(Method::DELETE, format!("/apps/{id}"), &headers, None) {
        return failure;
    }
    let mut deployed = state.deployed.lock().unwrap();
    match deployed.iter().position(|d| d == &id) {
        Some(index) => {
            deployed.remove(index);
            StatusCode::NO_CONTENT.into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn lifecycle(
    State(state): State<Arc<AgentState>>,
    headers: HeaderMap,
    Path((id, action)): Path<(String, String)>,
) -> Response {
    let path = format!("/apps/{id}/{action}");
    if let Some(failure) = state.record(Method::POST, path, &headers, None) {
        return failure;
    }
    match action.as_str() {
        "start" | "stop" | "restart" => StatusCode::OK.into_response(),
        _ => (StatusCode::BAD_REQUEST, "unknown command").into_response(),
    }
}

async fn status(
    State(state): State<Arc<AgentState>>,
    headers: HeaderMap,
    Path((id, action)): Path<(String, String)>,
) -> Response {
    let path = format!("/apps/{id}/{action}");
    if let Some(failure) = state.record(Method::GET, path, &headers, None) {
        return failure;
    }
    if action != "status" {
        return StatusCode::NOT_FOUND.into_response();
    }
    if state.deployed.lock().unwrap().contains(&id) {
        Json(json!({"status": "running"})).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}
