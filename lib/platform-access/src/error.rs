//! Error types for the platform-access crate.
//!
//! - `AuthenticationError`: the identity provider refused or could not be reached
//! - `AuthorizationError`: a valid identity without an operator role
//! - `RegistryError`: the administrator registry could not be read or written
//! - `LoginError`: what an explicit login reports to its caller

use sos_admin_core::IdentityId;
use std::fmt;

/// Errors from the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// Email or password is wrong, or the account does not exist.
    InvalidCredentials,
    /// The account exists but has been disabled by an administrator.
    AccountDisabled,
    /// The provider refused the request for another reason.
    ProviderRejected { code: String },
    /// The provider could not be reached.
    ProviderUnavailable { details: String },
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "invalid email or password"),
            Self::AccountDisabled => write!(f, "this account has been disabled"),
            Self::ProviderRejected { code } => {
                write!(f, "sign-in was rejected by the identity provider: {code}")
            }
            Self::ProviderUnavailable { details } => {
                write!(f, "identity provider unavailable: {details}")
            }
        }
    }
}

impl std::error::Error for AuthenticationError {}

/// Errors from authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// The identity is authenticated but holds no operator role.
    NotAnOperator { uid: IdentityId, email: String },
    /// The operation requires the super-admin role.
    SuperAdminRequired,
}

impl fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnOperator { email, .. } => {
                write!(
                    f,
                    "{email} is not authorized to use the admin dashboard"
                )
            }
            Self::SuperAdminRequired => write!(f, "super admin access required"),
        }
    }
}

impl std::error::Error for AuthorizationError {}

/// Errors from the administrator registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry could not be read. Retryable.
    Unavailable { details: String },
    /// A registry write failed.
    WriteFailed { details: String },
    /// A record failed validation before being written.
    InvalidRecord { issues: Vec<String> },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { details } => {
                write!(f, "administrator registry unavailable: {details}")
            }
            Self::WriteFailed { details } => {
                write!(f, "administrator registry write failed: {details}")
            }
            Self::InvalidRecord { issues } => {
                write!(f, "invalid administrator record: {}", issues.join(", "))
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Errors reported by an explicit login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    /// The provider rejected the credentials.
    Authentication(AuthenticationError),
    /// The identity is valid but not an operator; the provider session was ended.
    Authorization(AuthorizationError),
    /// The registry could not be consulted; the provider session was ended.
    RegistryUnavailable(RegistryError),
}

impl fmt::Display for LoginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication(e) => write!(f, "{e}"),
            Self::Authorization(e) => write!(f, "{e}"),
            Self::RegistryUnavailable(e) => write!(f, "{e}; please try again"),
        }
    }
}

impl std::error::Error for LoginError {}

impl LoginError {
    /// Returns true if repeating the same login may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RegistryUnavailable(_)
                | Self::Authentication(AuthenticationError::ProviderUnavailable { .. })
        )
    }
}
