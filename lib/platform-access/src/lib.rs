//! Authentication and authorization for the SOS admin dashboard.
//!
//! This crate provides:
//! - Identity provider adapters (`IdentityProvider`, Firebase and in-memory)
//! - The administrator registry (`AdminRegistry`, `AdminRecord`)
//! - Role resolution from identity plus registry (`RoleResolver`)
//! - The observable session and its manager (`Session`, `SessionManager`)
//! - The route guard (`evaluate`, `RouteDecision`)
//!
//! # Access Control Model
//!
//! Operators sign in with email and password. A signed-in identity is an
//! operator when it has an active entry in the `admins` collection, or when
//! its email is the configured bootstrap email. Everyone else is signed back
//! out at login.
//!
//! # Example
//!
//! ```
//! use sos_admin_core::IdentityId;
//! use sos_admin_platform_access::{
//!     AccessConfig, AdminRegistry, MemoryIdentityProvider, Role, RoleResolver, SessionManager,
//! };
//! use sos_admin_store::MemoryDocumentStore;
//! use std::sync::Arc;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let provider = Arc::new(MemoryIdentityProvider::new());
//! provider.add_account(IdentityId::new("U1").unwrap(), "admin@sos.com", "secret");
//!
//! let registry = AdminRegistry::new(Arc::new(MemoryDocumentStore::new()));
//! let resolver = RoleResolver::new(registry, &AccessConfig::default());
//! let manager = SessionManager::new(provider, resolver);
//!
//! let role = manager.login("admin@sos.com", "secret").await.unwrap();
//! assert_eq!(role, Role::SuperAdmin);
//! assert!(manager.session().is_authorized());
//! # });
//! ```

pub mod config;
pub mod error;
pub mod firebase;
pub mod guard;
pub mod identity;
pub mod manager;
pub mod memory;
pub mod registry;
pub mod resolver;
pub mod role;
pub mod session;

// Re-export main types at crate root
pub use config::AccessConfig;
pub use error::{AuthenticationError, AuthorizationError, LoginError, RegistryError};
pub use firebase::{FirebaseAuthConfig, FirebaseIdentityProvider};
pub use guard::{RouteDecision, SIGN_IN_PATH, evaluate, evaluate_super_admin};
pub use identity::{Identity, IdentityProvider, IdentityState, IdentitySubscription};
pub use manager::{SessionListener, SessionManager};
pub use memory::MemoryIdentityProvider;
pub use registry::{ADMINS_COLLECTION, AdminInput, AdminRecord, AdminRegistry};
pub use resolver::{RESOLUTION_RULES, Resolution, ResolutionRule, RoleResolver};
pub use role::{AdminRole, Role};
pub use session::Session;
