//! Authentication module for the SOS admin server.
//!
//! This module provides:
//! - Login, logout and session routes backed by the session manager
//! - Route guard extractors for protected Axum routes
//!
//! # Authorization Model
//!
//! The server follows one operator session, owned by the
//! [`SessionManager`](sos_admin_platform_access::SessionManager). Protected
//! routes are gated on its current state: while a resolution is in flight
//! they answer `503`, signed-out requests are redirected to `/login`, and
//! signed-in identities without an operator role get `403`.

pub mod middleware;
pub mod routes;

pub use middleware::{GuardRejection, RequireOperator, RequireSuperAdmin};
pub use routes::{clear_error, login, logout, refresh, session, sign_in_page};
