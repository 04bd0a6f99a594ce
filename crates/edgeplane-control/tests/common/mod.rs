//! Common test utilities for control integration tests.

#![allow(dead_code, clippy::unwrap_used)]

pub mod agent;
pub mod fixtures;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use edgeplane_control::api::{router, AppState};
use edgeplane_control::node::{MockConnector, NodeConnector, NodeDispatcher};
use edgeplane_control::store::{MemoryStore, PersistenceService};
use http_body_util::BodyExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Complete test control plane with all components wired together.
pub struct TestControl {
    pub store: Arc<MemoryStore>,
    pub connector: MockConnector,
    pub dispatcher: NodeDispatcher,
    pub cancel: CancellationToken,
    pub app: Router,
}

/// A response with its body read to the end.
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl TestResponse {
    /// Body as UTF-8 text.
    pub fn text(&self) -> String {
        String::from_utf8(self.body.clone()).unwrap()
    }

    /// Body as JSON.
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    /// The `id` of a create response.
    pub fn id(&self) -> String {
        self.json()["id"].as_str().unwrap().to_owned()
    }
}

impl TestControl {
    /// Creates a control plane whose node agents are mocked.
    pub fn new() -> Self {
        let connector = MockConnector::new();
        Self::assemble(Arc::new(connector.clone()), connector)
    }

    /// Creates a control plane reaching node agents through `connector`.
    ///
    /// The `connector` field is then an unused mock.
    pub fn with_connector(connector: Arc<dyn NodeConnector>) -> Self {
        Self::assemble(connector, MockConnector::new())
    }

    fn assemble(connector: Arc<dyn NodeConnector>, mock: MockConnector) -> Self {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = NodeDispatcher::new(connector);
        let cancel = CancellationToken::new();

        let app = router(AppState {
            store: Arc::clone(&store) as Arc<dyn PersistenceService>,
            dispatcher: dispatcher.clone(),
            cancel: cancel.clone(),
        });

        Self {
            store,
            connector: mock,
            dispatcher,
            cancel,
            app,
        }
    }

    /// Sends a request, with `body` serialised as JSON when given.
    pub async fn send(&self, method: Method, uri: &str, body: Option<&Value>) -> TestResponse {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(body).unwrap()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        TestResponse {
            status,
            body: body.to_vec(),
        }
    }

    pub async fn post(&self, uri: &str, body: &Value) -> TestResponse {
        self.send(Method::POST, uri, Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: &Value) -> TestResponse {
        self.send(Method::PUT, uri, Some(body)).await
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Method::GET, uri, None).await
    }

    pub async fn delete(&self, uri: &str) -> TestResponse {
        self.send(Method::DELETE, uri, None).await
    }

    /// Creates an entity, asserting success, and returns its id.
    pub async fn create(&self, collection: &str, body: &Value) -> String {
        let response = self.post(&format!("/{collection}"), body).await;
        assert_eq!(
            response.status,
            StatusCode::CREATED,
            "creating {collection} failed: {}",
            response.text()
        );
        response.id()
    }

    /// Number of rows in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        let response = self.get(&format!("/{collection}")).await;
        assert_eq!(response.status, StatusCode::OK);
        response.json().as_array().unwrap().len()
    }
}

impl Default for TestControl {
    fn default() -> Self {
        Self::new()
    }
}
