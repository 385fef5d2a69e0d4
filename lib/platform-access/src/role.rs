//! Authorization roles.
//!
//! Every session carries exactly one [`Role`]. Only the two operator roles
//! may be persisted in the administrator registry; they are modelled
//! separately as [`AdminRole`] so a registry entry can never claim one of the
//! transient roles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Authorization level of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// No identity is signed in.
    Unauthenticated,
    /// An identity is signed in but may not operate the dashboard.
    Unauthorized,
    /// Operator.
    Admin,
    /// Operator with registry management rights.
    SuperAdmin,
}

impl Role {
    /// Returns true for the operator roles.
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }

    /// Returns true only for the super-admin role.
    #[must_use]
    pub fn is_super_admin(&self) -> bool {
        matches!(self, Self::SuperAdmin)
    }

    /// Returns the wire name of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Unauthorized => "unauthorized",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator role stored in a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    #[default]
    Admin,
    SuperAdmin,
}

impl AdminRole {
    /// Returns the wire name of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }
}

impl From<AdminRole> for Role {
    fn from(role: AdminRole) -> Self {
        match role {
            AdminRole::Admin => Self::Admin,
            AdminRole::SuperAdmin => Self::SuperAdmin,
        }
    }
}

impl fmt::Display for AdminRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdminRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "super_admin" => Ok(Self::SuperAdmin),
            other => Err(format!("unknown admin role '{other}'")),
        }
    }
}
