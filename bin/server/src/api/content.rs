//! CRUD handlers shared by the editable collections.

use crate::auth::RequireOperator;
use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use serde::{Serialize, de::DeserializeOwned};
use sos_admin_content::{ContentRecord, Entry};
use sos_admin_core::DocumentId;
use std::sync::Arc;

/// Collection and item routes for one record type.
pub fn routes<T>() -> Router<Arc<AppState>>
where
    T: ContentRecord + Serialize + DeserializeOwned,
{
    Router::new()
        .route("/", get(list::<T>).post(create::<T>))
        .route("/{id}", get(get_one::<T>).put(update::<T>).delete(delete::<T>))
}

async fn list<T>(
    _operator: RequireOperator,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Entry<T>>>, ApiError>
where
    T: ContentRecord + Serialize,
{
    Ok(Json(state.content.collection::<T>().list().await?))
}

async fn get_one<T>(
    _operator: RequireOperator,
    State(state): State<Arc<AppState>>,
    Path(id): Path<DocumentId>,
) -> Result<Json<Entry<T>>, ApiError>
where
    T: ContentRecord + Serialize,
{
    Ok(Json(state.content.collection::<T>().get(&id).await?))
}

async fn create<T>(
    RequireOperator(session): RequireOperator,
    State(state): State<Arc<AppState>>,
    Json(record): Json<T>,
) -> Result<(StatusCode, Json<Entry<T>>), ApiError>
where
    T: ContentRecord + Serialize + DeserializeOwned,
{
    let entry = state.content.collection::<T>().create(record).await?;
    tracing::info!(
        kind = T::KIND,
        id = %entry.id,
        operator = ?session.identity().map(|i| i.email().to_string()),
        "created record"
    );
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn update<T>(
    RequireOperator(session): RequireOperator,
    State(state): State<Arc<AppState>>,
    Path(id): Path<DocumentId>,
    Json(record): Json<T>,
) -> Result<Json<Entry<T>>, ApiError>
where
    T: ContentRecord + Serialize + DeserializeOwned,
{
    let entry = state.content.collection::<T>().update(&id, record).await?;
    tracing::info!(
        kind = T::KIND,
        id = %entry.id,
        operator = ?session.identity().map(|i| i.email().to_string()),
        "updated record"
    );
    Ok(Json(entry))
}

async fn delete<T>(
    RequireOperator(session): RequireOperator,
    State(state): State<Arc<AppState>>,
    Path(id): Path<DocumentId>,
) -> Result<StatusCode, ApiError>
where
    T: ContentRecord,
{
    state.content.collection::<T>().delete(&id).await?;
    tracing::info!(
        kind = T::KIND,
        id = %id,
        operator = ?session.identity().map(|i| i.email().to_string()),
        "deleted record"
    );
    Ok(StatusCode::NO_CONTENT)
}
