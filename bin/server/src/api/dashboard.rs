//! Dashboard overview.

use crate::auth::RequireOperator;
use crate::error::ApiError;
use crate::state::AppState;
use axum::{Json, extract::State};
use serde::Serialize;
use sos_admin_content::ContentStats;
use sos_admin_platform_access::Role;
use std::sync::Arc;

/// Signed-in operator as shown in the dashboard header.
#[derive(Debug, Serialize)]
pub struct Operator {
    email: String,
    role: Role,
}

/// Counts shown on the dashboard landing page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    operator: Option<Operator>,
    #[serde(flatten)]
    stats: ContentStats,
}

pub async fn overview(
    RequireOperator(session): RequireOperator,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Overview>, ApiError> {
    let stats = state.content.stats().await?;
    Ok(Json(Overview {
        operator: session.identity().map(|identity| Operator {
            email: identity.email().to_string(),
            role: session.role(),
        }),
        stats,
    }))
}
