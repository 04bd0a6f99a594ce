//! Per-variant constraint and business-logic hooks.
//!
//! Bindings check that what they point at exists and that they are unique;
//! referenced rows refuse deletion while bindings remain. Node/app bindings
//! additionally drive the node agent: deploy on create, status on read,
//! lifecycle commands on update and undeploy on delete.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::engine::{EntityHooks, RequestContext};
use crate::entity::{
    App, Collection, DnsConfig, Entity, Node, NodeApp, NodeAppRequest, NodeAppResponse,
    NodeAppTrafficPolicy, NodeDnsConfig, TrafficPolicy,
};
use crate::error::{ControlError, ControlResult};
use crate::node::{NodeDispatcher, NodeTarget};
use crate::store::{Filter, StoreExt};

async fn require_exists<E: Entity>(
    ctx: &RequestContext,
    field: &'static str,
    id: &str,
) -> ControlResult<()> {
    if ctx.store.read(E::collection(), id).await?.is_none() {
        return Err(ControlError::MissingReference {
            field,
            id: id.to_owned(),
        });
    }
    Ok(())
}

/// The stored row an update addresses.
async fn load_stored<E: Entity>(ctx: &RequestContext, id: &str) -> ControlResult<E> {
    ctx.store
        .read_entity::<E>(id)
        .await?
        .ok_or_else(|| ControlError::NotFound {
            collection: E::COLLECTION,
            id: id.to_owned(),
        })
}

/// Binding keys are fixed at create time, where existence and uniqueness
/// were checked.
fn require_same_key<E: Entity>(
    stored: &E,
    field: &'static str,
    current: &str,
    requested: &str,
) -> ControlResult<()> {
    if current == requested {
        return Ok(());
    }
    debug!(
        collection = E::COLLECTION,
        id = %stored.id(),
        field,
        "update rejected: binding key changed"
    );
    Err(ControlError::KeyChanged {
        collection: E::COLLECTION,
        id: stored.id().to_owned(),
        field,
    })
}

/// Check-then-insert uniqueness. Two concurrent creates can both pass.
async fn require_unique<E: Entity>(
    ctx: &RequestContext,
    keys: Vec<(&'static str, String)>,
) -> ControlResult<()> {
    let filters: Vec<Filter> = keys
        .iter()
        .map(|(field, value)| Filter::new(*field, value.clone()))
        .collect();

    if ctx.store.filter(E::collection(), &filters).await?.is_empty() {
        Ok(())
    } else {
        Err(ControlError::Duplicate {
            collection: E::COLLECTION,
            keys,
        })
    }
}

/// Vetoes deleting a row while bindings still reference it.
#[derive(Debug, Clone, Default)]
pub struct ReferenceGuard {
    referrers: Vec<(Collection, &'static str)>,
}

impl ReferenceGuard {
    /// A guard with no referrers.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            referrers: Vec::new(),
        }
    }

    /// Refuse deletion while any `B` has `field` equal to the id.
    #[must_use]
    pub fn referenced_by<B: Entity>(mut self, field: &'static str) -> Self {
        self.referrers.push((B::collection(), field));
        self
    }

    async fn check<E: Entity>(&self, ctx: &RequestContext, id: &str) -> ControlResult<()> {
        for (referrer, field) in &self.referrers {
            let refs = ctx
                .store
                .filter(*referrer, &[Filter::new(*field, id)])
                .await?;
            if !refs.is_empty() {
                return Err(ControlError::Referenced {
                    collection: E::COLLECTION,
                    id: id.to_owned(),
                    referenced_by: referrer.name,
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<E: Entity> EntityHooks<E> for ReferenceGuard {
    async fn check_delete(&self, ctx: &RequestContext, id: &str) -> ControlResult<()> {
        self.check::<E>(ctx, id).await
    }
}

/// Guard for [`Node`] rows.
#[must_use]
pub fn node_guard() -> ReferenceGuard {
    ReferenceGuard::new()
        .referenced_by::<NodeApp>("node_id")
        .referenced_by::<NodeDnsConfig>("node_id")
}

/// Keeps the channel cache in step with [`Node`] rows.
#[derive(Debug, Clone)]
pub struct NodeHooks {
    dispatcher: NodeDispatcher,
    guard: ReferenceGuard,
}

impl NodeHooks {
    /// Hooks evicting channels from `dispatcher`.
    #[must_use]
    pub fn new(dispatcher: NodeDispatcher) -> Self {
        Self {
            dispatcher,
            guard: node_guard(),
        }
    }
}

#[async_trait]
impl EntityHooks<Node> for NodeHooks {
    async fn check_delete(&self, ctx: &RequestContext, id: &str) -> ControlResult<()> {
        self.guard.check::<Node>(ctx, id).await
    }

    async fn on_update(&self, ctx: &RequestContext, node: &Node) -> ControlResult<()> {
        let stored: Node = load_stored(ctx, &node.id).await?;
        if NodeTarget::from(&stored) != NodeTarget::from(node) {
            self.dispatcher.forget(&stored);
        }
        Ok(())
    }

    async fn on_delete(&self, _ctx: &RequestContext, node: &Node) -> ControlResult<()> {
        self.dispatcher.forget(node);
        Ok(())
    }
}

/// Guard for [`App`] rows.
#[must_use]
pub fn app_guard() -> ReferenceGuard {
    ReferenceGuard::new().referenced_by::<NodeApp>("app_id")
}

/// Guard for [`TrafficPolicy`] rows.
#[must_use]
pub fn traffic_policy_guard() -> ReferenceGuard {
    ReferenceGuard::new().referenced_by::<NodeAppTrafficPolicy>("traffic_policy_id")
}

/// Guard for [`DnsConfig`] rows.
#[must_use]
pub fn dns_config_guard() -> ReferenceGuard {
    ReferenceGuard::new().referenced_by::<NodeDnsConfig>("dns_config_id")
}

/// Deploys apps to nodes and keeps them in step with the `nodes_apps` rows.
#[derive(Debug, Clone)]
pub struct NodeAppHooks {
    dispatcher: NodeDispatcher,
    guard: ReferenceGuard,
}

impl NodeAppHooks {
    /// Hooks issuing node calls through `dispatcher`.
    #[must_use]
    pub fn new(dispatcher: NodeDispatcher) -> Self {
        Self {
            dispatcher,
            guard: ReferenceGuard::new()
                .referenced_by::<NodeAppTrafficPolicy>("nodes_apps_id"),
        }
    }
}

#[async_trait]
impl EntityHooks<NodeApp, NodeAppRequest> for NodeAppHooks {
    async fn check_create(&self, ctx: &RequestContext, binding: &NodeApp) -> ControlResult<()> {
        require_exists::<Node>(ctx, "node_id", &binding.node_id).await?;
        require_exists::<App>(ctx, "app_id", &binding.app_id).await?;
        require_unique::<NodeApp>(
            ctx,
            vec![
                ("node_id", binding.node_id.clone()),
                ("app_id", binding.app_id.clone()),
            ],
        )
        .await
    }

    async fn on_create(&self, ctx: &RequestContext, binding: &NodeApp) -> ControlResult<()> {
        let app: App = ctx
            .store
            .read_entity(&binding.app_id)
            .await?
            .ok_or_else(|| ControlError::MissingReference {
                field: "app_id",
                id: binding.app_id.clone(),
            })?;

        let conn = self
            .dispatcher
            .connect(ctx.store.as_ref(), &binding.node_id)
            .await?;
        conn.deploy(&app).await
    }

    async fn on_read(&self, ctx: &RequestContext, binding: NodeApp) -> ControlResult<Value> {
        let conn = self
            .dispatcher
            .connect(ctx.store.as_ref(), &binding.node_id)
            .await?;
        let status = conn.status(&binding.app_id).await?;

        serde_json::to_value(NodeAppResponse { binding, status })
            .map_err(|e| ControlError::serialisation(e.to_string()))
    }

    async fn on_update(
        &self,
        ctx: &RequestContext,
        request: &NodeAppRequest,
    ) -> ControlResult<()> {
        let binding = &request.binding;
        let stored: NodeApp = load_stored(ctx, &binding.id).await?;
        require_same_key(&stored, "node_id", &stored.node_id, &binding.node_id)?;
        require_same_key(&stored, "app_id", &stored.app_id, &binding.app_id)?;

        let cmd = request.command()?;
        let conn = self
            .dispatcher
            .connect(ctx.store.as_ref(), &stored.node_id)
            .await?;
        conn.lifecycle(&stored.app_id, cmd).await
    }

    async fn check_delete(&self, ctx: &RequestContext, id: &str) -> ControlResult<()> {
        self.guard.check::<NodeApp>(ctx, id).await
    }

    async fn on_delete(&self, ctx: &RequestContext, binding: &NodeApp) -> ControlResult<()> {
        let conn = self
            .dispatcher
            .connect(ctx.store.as_ref(), &binding.node_id)
            .await?;
        conn.undeploy(&binding.app_id).await
    }
}

/// Constraint checks for traffic policies applied to node/app bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeAppTrafficPolicyHooks;

#[async_trait]
impl EntityHooks<NodeAppTrafficPolicy> for NodeAppTrafficPolicyHooks {
    async fn check_create(
        &self,
        ctx: &RequestContext,
        binding: &NodeAppTrafficPolicy,
    ) -> ControlResult<()> {
        require_exists::<NodeApp>(ctx, "nodes_apps_id", &binding.nodes_apps_id).await?;
        require_exists::<TrafficPolicy>(ctx, "traffic_policy_id", &binding.traffic_policy_id)
            .await?;
        require_unique::<NodeAppTrafficPolicy>(
            ctx,
            vec![
                ("nodes_apps_id", binding.nodes_apps_id.clone()),
                ("traffic_policy_id", binding.traffic_policy_id.clone()),
            ],
        )
        .await
    }

    async fn on_update(
        &self,
        ctx: &RequestContext,
        binding: &NodeAppTrafficPolicy,
    ) -> ControlResult<()> {
        let stored: NodeAppTrafficPolicy = load_stored(ctx, &binding.id).await?;
        require_same_key(
            &stored,
            "nodes_apps_id",
            &stored.nodes_apps_id,
            &binding.nodes_apps_id,
        )?;
        require_same_key(
            &stored,
            "traffic_policy_id",
            &stored.traffic_policy_id,
            &binding.traffic_policy_id,
        )
    }
}

/// Assigns DNS configurations to nodes, one per node.
#[derive(Debug, Clone)]
pub struct NodeDnsConfigHooks {
    dispatcher: NodeDispatcher,
}

impl NodeDnsConfigHooks {
    /// Hooks connecting through `dispatcher`.
    #[must_use]
    pub const fn new(dispatcher: NodeDispatcher) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl EntityHooks<NodeDnsConfig> for NodeDnsConfigHooks {
    async fn check_create(
        &self,
        ctx: &RequestContext,
        binding: &NodeDnsConfig,
    ) -> ControlResult<()> {
        require_exists::<Node>(ctx, "node_id", &binding.node_id).await?;
        require_exists::<DnsConfig>(ctx, "dns_config_id", &binding.dns_config_id).await?;
        require_unique::<NodeDnsConfig>(ctx, vec![("node_id", binding.node_id.clone())]).await
    }

    async fn on_create(
        &self,
        ctx: &RequestContext,
        binding: &NodeDnsConfig,
    ) -> ControlResult<()> {
        self.reach(ctx, binding).await
    }

    /// The node stays fixed; the configuration may be swapped for another
    /// existing one.
    async fn on_update(
        &self,
        ctx: &RequestContext,
        binding: &NodeDnsConfig,
    ) -> ControlResult<()> {
        let stored: NodeDnsConfig = load_stored(ctx, &binding.id).await?;
        require_same_key(&stored, "node_id", &stored.node_id, &binding.node_id)?;
        if stored.dns_config_id == binding.dns_config_id {
            return Ok(());
        }
        require_exists::<DnsConfig>(ctx, "dns_config_id", &binding.dns_config_id).await?;
        self.reach(ctx, binding).await
    }
}

impl NodeDnsConfigHooks {
    async fn reach(&self, ctx: &RequestContext, binding: &NodeDnsConfig) -> ControlResult<()> {
        // Confirms the node is addressable. Pushing the configuration itself
        // needs a DNS call on the agent, which it does not expose yet.
        let conn = self
            .dispatcher
            .connect(ctx.store.as_ref(), &binding.node_id)
            .await?;
        debug!(
            node_id = %conn.node().id,
            dns_config_id = %binding.dns_config_id,
            "node reachable for DNS configuration"
        );
        Ok(())
    }
}
