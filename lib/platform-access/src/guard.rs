//! Route guard.
//!
//! Maps a session onto what a protected route should do. The decision is a
//! pure function of the session, so every surface (HTTP handlers, tests)
//! gates content the same way.

use crate::session::Session;

/// Where unauthenticated visitors are sent.
pub const SIGN_IN_PATH: &str = "/login";

/// Message shown when an identity is signed in but has no operator role and
/// no more specific error was recorded.
pub const DEFAULT_DENIAL: &str = "your account is not authorized to use the admin dashboard";

/// What a protected route should do for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// A resolution is in flight; show a loading indicator, not content.
    Pending,
    /// Nobody is signed in.
    RedirectToSignIn,
    /// Signed in without an operator role.
    AccessDenied { reason: String },
    /// Render the protected content.
    Allow,
}

/// Decides how a protected route handles a session.
///
/// Precedence is loading, then signed out, then unauthorized, then allow.
#[must_use]
pub fn evaluate(session: &Session) -> RouteDecision {
    if session.is_loading() {
        return RouteDecision::Pending;
    }
    if !session.is_authenticated() {
        return RouteDecision::RedirectToSignIn;
    }
    if !session.is_authorized() {
        return RouteDecision::AccessDenied {
            reason: session.error().unwrap_or(DEFAULT_DENIAL).to_string(),
        };
    }
    RouteDecision::Allow
}

/// Like [`evaluate`], but additionally requires the super-admin role.
#[must_use]
pub fn evaluate_super_admin(session: &Session) -> RouteDecision {
    match evaluate(session) {
        RouteDecision::Allow if !session.is_super_admin() => RouteDecision::AccessDenied {
            reason: "super admin access required".to_string(),
        },
        decision => decision,
    }
}
