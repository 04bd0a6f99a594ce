//! Edgeplane Control Plane
//!
//! This crate provides the control plane for a fleet of edge-computing
//! nodes. It keeps an inventory of nodes, apps, traffic policies and DNS
//! configurations, and deploys apps to nodes when they are bound together.
//!
//! # Architecture
//!
//! - **Entities** ([`entity`]): plain serde structs, one per collection, each
//!   validating itself and naming its filterable fields
//! - **Engine** ([`engine`]): a generic CRUD [`Handler`] shared by every
//!   collection, extended per collection through [`EntityHooks`]
//! - **Hooks** ([`hooks`]): referential and uniqueness constraints, plus the
//!   node calls that binding a node to an app triggers
//! - **Node dispatch** ([`node`]): resolves a node id to a cached channel to
//!   its agent and maps agent failures onto [`ControlError`]
//! - **Persistence** ([`store`]): JSON records keyed by collection, in memory
//!   or in PostgreSQL
//! - **API surface** ([`api`]): the same five HTTP endpoints for every
//!   collection
//!
//! # Deployment ordering
//!
//! Side effects on a node always happen before the store write they guard:
//!
//! ```text
//! POST /nodes_apps    check node, app, uniqueness ──▶ deploy ──▶ persist
//! DELETE /nodes_apps  check references ──▶ fetch ──▶ undeploy ──▶ delete
//! ```
//!
//! A failed node call therefore never leaves a binding that does not match
//! what the node runs.

#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod hooks;
pub mod node;
pub mod service;
pub mod store;
pub mod transport;

// Re-export commonly used types at the crate root
pub use config::ControlConfig;
pub use engine::{EntityHooks, Handler, RequestContext};
pub use entity::{Collection, Entity, RequestShape};
pub use error::{ControlError, ControlResult, ErrorKind};
pub use node::{NodeConnector, NodeDispatcher};
pub use service::ControlService;
pub use store::{MemoryStore, PersistenceService, PostgresStore, StoreExt};
pub use transport::Transport;
