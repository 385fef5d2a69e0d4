//! Guarded JSON API for the dashboard.
//!
//! Every handler here takes a guard extractor from [`crate::auth`], so none
//! of them run unless the operator session allows it.

pub mod admins;
pub mod content;
pub mod dashboard;
pub mod users;

use crate::state::AppState;
use axum::{
    Router,
    routing::{get, put},
};
use sos_admin_content::{EmergencyGuide, EmergencyNumber, FirstAid};
use std::sync::Arc;

/// Routes mounted under `/api`.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dashboard", get(dashboard::overview))
        .nest("/emergency-numbers", content::routes::<EmergencyNumber>())
        .nest("/emergency-guides", content::routes::<EmergencyGuide>())
        .nest("/first-aid", content::routes::<FirstAid>())
        .route("/users", get(users::list))
        .route("/users/{id}", get(users::get))
        .route("/users/{id}/contacts", get(users::contacts))
        .route("/users/{id}/sos-history", get(users::sos_history))
        .route("/admins", get(admins::list))
        .route("/admins/{id}", put(admins::save))
}
