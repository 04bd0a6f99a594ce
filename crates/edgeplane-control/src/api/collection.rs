//! Uniform CRUD endpoints for one entity collection.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use serde_json::Value;

use crate::engine::Handler;
use crate::entity::{Entity, RequestShape};
use crate::error::ControlResult;

use super::AppState;

/// Response for a created entity.
#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    /// The assigned entity ID.
    pub id: String,
}

/// Routes `/<collection>` and `/<collection>/{id}` to `handler`.
pub fn routes<E: Entity, R: RequestShape<E>>(handler: Handler<E, R>) -> Router<AppState> {
    let base = format!("/{}", E::COLLECTION);
    let item = format!("/{}/{{id}}", E::COLLECTION);

    Router::new()
        .route(
            &base,
            post(create::<E, R>)
                .get(list::<E, R>)
                .put(bulk_update::<E, R>),
        )
        .route(&item, get(get_one::<E, R>).delete(delete_one::<E, R>))
        .layer(Extension(Arc::new(handler)))
}

/// Create an entity.
async fn create<E: Entity, R: RequestShape<E>>(
    State(state): State<AppState>,
    Extension(handler): Extension<Arc<Handler<E, R>>>,
    body: Bytes,
) -> ControlResult<(StatusCode, Json<CreatedResponse>)> {
    let id = handler.create(&state.context(), &body).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// List entities, filtered by the query string.
async fn list<E: Entity, R: RequestShape<E>>(
    State(state): State<AppState>,
    Extension(handler): Extension<Arc<Handler<E, R>>>,
    Query(query): Query<Vec<(String, String)>>,
) -> ControlResult<Json<Vec<E>>> {
    let entities = handler.list(&state.context(), &query).await?;
    Ok(Json(entities))
}

/// Fetch one entity.
async fn get_one<E: Entity, R: RequestShape<E>>(
    State(state): State<AppState>,
    Extension(handler): Extension<Arc<Handler<E, R>>>,
    Path(id): Path<String>,
) -> ControlResult<Json<Value>> {
    let entity = handler.get(&state.context(), &id).await?;
    Ok(Json(entity))
}

/// Apply a batch of updates.
async fn bulk_update<E: Entity, R: RequestShape<E>>(
    State(state): State<AppState>,
    Extension(handler): Extension<Arc<Handler<E, R>>>,
    body: Bytes,
) -> ControlResult<StatusCode> {
    handler.bulk_update(&state.context(), &body).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete one entity.
async fn delete_one<E: Entity, R: RequestShape<E>>(
    State(state): State<AppState>,
    Extension(handler): Extension<Arc<Handler<E, R>>>,
    Path(id): Path<String>,
) -> ControlResult<StatusCode> {
    handler.delete(&state.context(), &id).await?;
    Ok(StatusCode::OK)
}
