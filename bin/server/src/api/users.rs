//! Read-only views of mobile app users.

use crate::auth::RequireOperator;
use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use sos_admin_content::{AppUser, Contact, Entry, SosRecord};
use sos_admin_core::DocumentId;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    limit: Option<usize>,
}

pub async fn list(
    _operator: RequireOperator,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Entry<AppUser>>>, ApiError> {
    Ok(Json(state.content.users().list().await?))
}

pub async fn get(
    _operator: RequireOperator,
    State(state): State<Arc<AppState>>,
    Path(id): Path<DocumentId>,
) -> Result<Json<Entry<AppUser>>, ApiError> {
    Ok(Json(state.content.users().get(&id).await?))
}

pub async fn contacts(
    _operator: RequireOperator,
    State(state): State<Arc<AppState>>,
    Path(id): Path<DocumentId>,
) -> Result<Json<Vec<Entry<Contact>>>, ApiError> {
    Ok(Json(state.content.users().contacts(&id).await?))
}

pub async fn sos_history(
    _operator: RequireOperator,
    State(state): State<Arc<AppState>>,
    Path(id): Path<DocumentId>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Entry<SosRecord>>>, ApiError> {
    Ok(Json(
        state.content.users().sos_history(&id, query.limit).await?,
    ))
}
