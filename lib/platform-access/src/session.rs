//! Observable session state.

use crate::identity::Identity;
use crate::role::Role;

/// Snapshot of the authentication state, as published by the session manager.
///
/// `role` is always derived from `identity`: without an identity it is
/// `Unauthenticated`, and with one it is never `Unauthenticated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    identity: Option<Identity>,
    role: Role,
    loading: bool,
    error: Option<String>,
}

impl Session {
    /// State before the first resolution completes.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            identity: None,
            role: Role::Unauthenticated,
            loading: true,
            error: None,
        }
    }

    pub(crate) fn signed_out() -> Self {
        Self {
            loading: false,
            ..Self::initial()
        }
    }

    /// Replaces identity and role together.
    pub(crate) fn set_resolved(&mut self, identity: Option<Identity>, role: Role) {
        self.role = match identity {
            None => Role::Unauthenticated,
            Some(_) if role == Role::Unauthenticated => Role::Unauthorized,
            Some(_) => role,
        };
        self.identity = identity;
    }

    pub(crate) fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub(crate) fn set_error(&mut self, error: Option<String>) {
        self.error = error;
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// True while a resolution newer than the applied state is outstanding.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Check if an identity is signed in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// Check if the session may operate the dashboard.
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.role.is_authorized()
    }

    /// Check if the session holds the super-admin role.
    #[must_use]
    pub fn is_super_admin(&self) -> bool {
        self.role.is_super_admin()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::initial()
    }
}
