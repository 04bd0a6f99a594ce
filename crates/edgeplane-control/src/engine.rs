//! Generic CRUD handling for every entity variant.
//!
//! A [`Handler`] drives one variant through create, list, get, bulk update
//! and delete. The order of checks is fixed: decode, validate, constraint
//! hook, business-logic hook, then persist. Variant-specific behaviour lives
//! in [`EntityHooks`], whose methods all default to no-ops.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::entity::{generate_id, Entity, RequestShape, ValidationError};
use crate::error::{ControlError, ControlResult};
use crate::store::{to_record, Filter, PersistenceService, StoreExt};

/// Everything an operation may touch, passed explicitly.
#[derive(Clone)]
pub struct RequestContext {
    /// Persistence backend.
    pub store: Arc<dyn PersistenceService>,
    /// Cancelled when the service shuts down.
    pub cancel: CancellationToken,
}

impl RequestContext {
    /// Create a context.
    #[must_use]
    pub fn new(store: Arc<dyn PersistenceService>, cancel: CancellationToken) -> Self {
        Self { store, cancel }
    }

    /// Fail if the request was cancelled. Checked before every store write.
    pub fn ensure_active(&self, before: &'static str) -> ControlResult<()> {
        if self.cancel.is_cancelled() {
            return Err(ControlError::Cancelled(before));
        }
        Ok(())
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Variant-specific constraint and business-logic steps.
///
/// Constraint hooks (`check_*`) run before business logic and should only
/// read. Business-logic hooks (`on_*`) may have remote side effects; a
/// failure aborts the operation before anything is persisted.
#[async_trait]
pub trait EntityHooks<E: Entity, R: RequestShape<E> = E>: Send + Sync {
    /// Constraints on a validated entity about to be created.
    async fn check_create(&self, _ctx: &RequestContext, _entity: &E) -> ControlResult<()> {
        Ok(())
    }

    /// Constraints on deleting the entity with this id.
    async fn check_delete(&self, _ctx: &RequestContext, _id: &str) -> ControlResult<()> {
        Ok(())
    }

    /// Side effects of creating the entity.
    async fn on_create(&self, _ctx: &RequestContext, _entity: &E) -> ControlResult<()> {
        Ok(())
    }

    /// Produce the response for a fetched entity.
    async fn on_read(&self, _ctx: &RequestContext, entity: E) -> ControlResult<Value> {
        to_record(&entity)
    }

    /// Side effects of one bulk update item.
    async fn on_update(&self, _ctx: &RequestContext, _request: &R) -> ControlResult<()> {
        Ok(())
    }

    /// Side effects of deleting the fetched entity.
    async fn on_delete(&self, _ctx: &RequestContext, _entity: &E) -> ControlResult<()> {
        Ok(())
    }
}

/// CRUD engine for entity variant `E`, updated through request shape `R`.
pub struct Handler<E: Entity, R: RequestShape<E> = E> {
    hooks: Option<Arc<dyn EntityHooks<E, R>>>,
    _shape: PhantomData<fn() -> (E, R)>,
}

impl<E: Entity, R: RequestShape<E>> Clone for Handler<E, R> {
    fn clone(&self) -> Self {
        Self {
            hooks: self.hooks.clone(),
            _shape: PhantomData,
        }
    }
}

impl<E: Entity, R: RequestShape<E>> Default for Handler<E, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity, R: RequestShape<E>> fmt::Debug for Handler<E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("collection", &E::COLLECTION)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

impl<E: Entity, R: RequestShape<E>> Handler<E, R> {
    /// A handler with no hooks.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hooks: None,
            _shape: PhantomData,
        }
    }

    /// A handler running `hooks`.
    #[must_use]
    pub fn with_hooks(hooks: Arc<dyn EntityHooks<E, R>>) -> Self {
        Self {
            hooks: Some(hooks),
            _shape: PhantomData,
        }
    }

    /// Create an entity from a JSON body and return its assigned id.
    pub async fn create(&self, ctx: &RequestContext, body: &[u8]) -> ControlResult<String> {
        let collection = E::COLLECTION;
        let mut entity: E = decode(body)?;

        if !entity.id().is_empty() {
            debug!(collection, "create rejected: client supplied an id");
            return Err(ValidationError::new("id cannot be specified in POST request").into());
        }

        entity.set_id(generate_id());
        if let Err(e) = entity.validate() {
            debug!(collection, error = %e, "create rejected: validation failed");
            return Err(e.into());
        }

        if let Some(hooks) = &self.hooks {
            hooks.check_create(ctx, &entity).await.inspect_err(|e| {
                debug!(collection, error = %e, "create rejected by constraint");
            })?;
            hooks.on_create(ctx, &entity).await.inspect_err(|e| {
                error!(collection, id = %entity.id(), error = %e, "create aborted");
            })?;
        }

        ctx.ensure_active("create")?;
        ctx.store.create_entity(&entity).await.inspect_err(|e| {
            error!(collection, id = %entity.id(), error = %e, "failed to persist entity");
        })?;

        info!(collection, id = %entity.id(), "entity created");
        Ok(entity.id().to_owned())
    }

    /// List entities, filtered by `query` when it is non-empty.
    ///
    /// A repeated field keeps its first value.
    pub async fn list(
        &self,
        ctx: &RequestContext,
        query: &[(String, String)],
    ) -> ControlResult<Vec<E>> {
        let mut filters: Vec<Filter> = Vec::new();
        for (field, value) in query {
            if !filters.iter().any(|f| &f.field == field) {
                filters.push(Filter::new(field.clone(), value.clone()));
            }
        }

        let result = if filters.is_empty() {
            ctx.store.read_all_entities::<E>().await
        } else {
            ctx.store.filter_entities::<E>(&filters).await
        };

        result.inspect_err(|e| match e {
            ControlError::DisallowedFilter { field } => {
                debug!(
                    collection = E::COLLECTION,
                    field = %field,
                    "list rejected: disallowed filter"
                );
            }
            _ => error!(collection = E::COLLECTION, error = %e, "failed to list entities"),
        })
    }

    /// Fetch one entity, shaped for the response by `on_read`.
    pub async fn get(&self, ctx: &RequestContext, id: &str) -> ControlResult<Value> {
        if id.is_empty() {
            return Err(ControlError::MissingId);
        }

        let entity: E = ctx
            .store
            .read_entity::<E>(id)
            .await
            .inspect_err(|e| {
                error!(collection = E::COLLECTION, id, error = %e, "failed to read entity");
            })?
            .ok_or_else(|| ControlError::NotFound {
                collection: E::COLLECTION,
                id: id.to_owned(),
            })?;

        match &self.hooks {
            Some(hooks) => hooks.on_read(ctx, entity).await,
            None => to_record(&entity),
        }
    }

    /// Apply a JSON array of updates in one store call.
    ///
    /// Every item is decoded and validated before any hook runs. Hook side
    /// effects already applied for earlier items are not rolled back when a
    /// later item's hook fails.
    pub async fn bulk_update(&self, ctx: &RequestContext, body: &[u8]) -> ControlResult<()> {
        let collection = E::COLLECTION;
        let items: Vec<Value> = serde_json::from_slice(body).map_err(|e| {
            debug!(collection, error = %e, "bulk update rejected: body is not an array");
            ControlError::InvalidBody(format!("expected a JSON array: {e}"))
        })?;

        let mut requests: Vec<R> = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let request: R = serde_json::from_value(item)
                .map_err(|e| ControlError::InvalidBody(format!("item {index}: {e}")))?;
            if let Err(e) = request.validate_request() {
                debug!(collection, index, error = %e, "bulk update rejected: validation failed");
                return Err(e.into());
            }
            requests.push(request);
        }

        if requests.is_empty() {
            debug!(collection, "empty bulk update");
            return Ok(());
        }

        if let Some(hooks) = &self.hooks {
            for (applied, request) in requests.iter().enumerate() {
                if let Err(e) = hooks.on_update(ctx, request).await {
                    if applied > 0 {
                        warn!(
                            collection,
                            applied,
                            error = %e,
                            "bulk update aborted; side effects of earlier items were not rolled back"
                        );
                    } else {
                        error!(collection, error = %e, "bulk update aborted");
                    }
                    return Err(e);
                }
            }
        }

        let count = requests.len();
        let entities: Vec<E> = requests.into_iter().map(|r| r.into_entity()).collect();

        ctx.ensure_active("bulk update")?;
        ctx.store
            .bulk_update_entities(entities)
            .await
            .inspect_err(|e| match e {
                ControlError::NotFound { id, .. } => {
                    debug!(collection, id = %id, "bulk update rejected: unknown id");
                }
                _ => error!(collection, error = %e, "failed to persist bulk update"),
            })?;

        info!(collection, count, "entities updated");
        Ok(())
    }

    /// Delete one entity.
    pub async fn delete(&self, ctx: &RequestContext, id: &str) -> ControlResult<()> {
        let collection = E::COLLECTION;
        if id.is_empty() {
            return Err(ControlError::MissingId);
        }

        if let Some(hooks) = &self.hooks {
            hooks.check_delete(ctx, id).await.inspect_err(|e| {
                debug!(collection, id, error = %e, "delete rejected by constraint");
            })?;
        }

        let entity: E = ctx
            .store
            .read_entity::<E>(id)
            .await?
            .ok_or_else(|| ControlError::NotFound {
                collection,
                id: id.to_owned(),
            })?;

        if let Some(hooks) = &self.hooks {
            hooks.on_delete(ctx, &entity).await.inspect_err(|e| {
                error!(collection, id, error = %e, "delete aborted");
            })?;
        }

        ctx.ensure_active("delete")?;
        if !ctx.store.delete_entity::<E>(id).await? {
            error!(collection, id, "entity vanished between fetch and delete");
            return Err(ControlError::Inconsistent(format!(
                "{collection} {id} vanished between fetch and delete"
            )));
        }

        info!(collection, id, "entity deleted");
        Ok(())
    }
}

fn decode<E: Entity>(body: &[u8]) -> ControlResult<E> {
    serde_json::from_slice(body).map_err(|e| {
        debug!(collection = E::COLLECTION, error = %e, "request body rejected");
        ControlError::InvalidBody(e.to_string())
    })
}
