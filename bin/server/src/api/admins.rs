//! Administrator registry management.

use crate::auth::{RequireOperator, RequireSuperAdmin};
use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use sos_admin_core::IdentityId;
use sos_admin_platform_access::{AdminInput, AdminRecord};
use std::sync::Arc;

/// Lists every registry entry. Any operator may read the registry.
pub async fn list(
    _operator: RequireOperator,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AdminRecord>>, ApiError> {
    Ok(Json(state.registry.list().await?))
}

/// Creates or replaces the entry for an identity.
pub async fn save(
    RequireSuperAdmin(session): RequireSuperAdmin,
    State(state): State<Arc<AppState>>,
    Path(uid): Path<IdentityId>,
    Json(input): Json<AdminInput>,
) -> Result<Json<AdminRecord>, ApiError> {
    let record = state.registry.save(&uid, input).await?;
    tracing::info!(
        admin_id = %record.admin_id,
        role = record.role.as_str(),
        operator = ?session.identity().map(|i| i.email().to_string()),
        "saved administrator"
    );
    Ok(Json(record))
}
