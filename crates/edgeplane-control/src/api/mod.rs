//! HTTP API for the control service.
//!
//! Every entity collection is exposed through the same five endpoints:
//!
//! ```text
//! POST   /<collection>        create
//! GET    /<collection>        list, filtered by query parameters
//! GET    /<collection>/{id}   fetch one
//! PUT    /<collection>        bulk update
//! DELETE /<collection>/{id}   delete
//! ```
//!
//! Plus `/health` and `/ready`.

mod collection;

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::engine::{Handler, RequestContext};
use crate::entity::{
    App, DnsConfig, Node, NodeApp, NodeAppRequest, NodeAppTrafficPolicy, NodeDnsConfig,
    TrafficPolicy,
};
use crate::hooks::{
    app_guard, dns_config_guard, traffic_policy_guard, NodeAppHooks, NodeAppTrafficPolicyHooks,
    NodeDnsConfigHooks, NodeHooks,
};
use crate::node::NodeDispatcher;
use crate::store::PersistenceService;

pub use collection::CreatedResponse;

/// Shared application state for the control service.
#[derive(Clone)]
pub struct AppState {
    /// Entity store.
    pub store: Arc<dyn PersistenceService>,
    /// Node channel cache shared by all deployment hooks.
    pub dispatcher: NodeDispatcher,
    /// Cancelled on shutdown; checked before every store write.
    pub cancel: CancellationToken,
}

impl AppState {
    /// Context for one request.
    #[must_use]
    pub fn context(&self) -> RequestContext {
        RequestContext::new(Arc::clone(&self.store), self.cancel.clone())
    }
}

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    let dispatcher = state.dispatcher.clone();

    Router::new()
        // Health endpoints
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Inventory
        .merge(collection::routes(Handler::<Node>::with_hooks(Arc::new(
            NodeHooks::new(dispatcher.clone()),
        ))))
        .merge(collection::routes(Handler::<App>::with_hooks(Arc::new(
            app_guard(),
        ))))
        .merge(collection::routes(Handler::<TrafficPolicy>::with_hooks(
            Arc::new(traffic_policy_guard()),
        )))
        .merge(collection::routes(Handler::<DnsConfig>::with_hooks(
            Arc::new(dns_config_guard()),
        )))
        // Bindings
        .merge(collection::routes(
            Handler::<NodeApp, NodeAppRequest>::with_hooks(Arc::new(NodeAppHooks::new(
                dispatcher.clone(),
            ))),
        ))
        .merge(collection::routes(
            Handler::<NodeAppTrafficPolicy>::with_hooks(Arc::new(NodeAppTrafficPolicyHooks)),
        ))
        .merge(collection::routes(Handler::<NodeDnsConfig>::with_hooks(
            Arc::new(NodeDnsConfigHooks::new(dispatcher)),
        )))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// Readiness check endpoint.
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(ReadyResponse { ready: true })),
        Err(e) => {
            warn!(error = %e, "store not ready");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyResponse { ready: false }),
            )
        }
    }
}

/// Health response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Readiness response.
#[derive(Serialize)]
struct ReadyResponse {
    ready: bool,
}
