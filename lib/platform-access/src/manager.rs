//! Session manager.
//!
//! Owns the single [`Session`] and is the only writer to it. Every
//! resolution takes an attempt number when it starts; a result is applied
//! only if its attempt is newer than the one that produced the current
//! state, so a slow lookup for an earlier identity can never overwrite the
//! result for a later one.
//!
//! Errors follow two rules. An explicit `login` or `logout` clears the error
//! when it starts and records its own failure even if its identity outcome
//! was superseded. Background resolutions leave an existing error in place
//! unless they fail themselves.

use crate::error::{AuthenticationError, AuthorizationError, LoginError};
use crate::identity::{Identity, IdentityProvider};
use crate::resolver::RoleResolver;
use crate::role::Role;
use crate::session::Session;
use futures::future::BoxFuture;
use rootcause::prelude::Report;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy)]
struct Attempt {
    id: u64,
    explicit: bool,
}

enum Outcome {
    /// Replace identity and role. An error, if given, is recorded.
    Resolved {
        identity: Option<Identity>,
        role: Role,
        error: Option<String>,
    },
    /// Record an error and leave identity and role as they are.
    Failed { error: String },
}

#[derive(Debug)]
struct Ledger {
    session: Session,
    next_attempt: u64,
    /// Attempt that produced the current identity and role.
    applied: u64,
    outstanding: BTreeSet<u64>,
    latest_explicit: u64,
}

impl Ledger {
    fn may_record_error(&self, attempt: Attempt) -> bool {
        if attempt.explicit {
            attempt.id >= self.latest_explicit
        } else {
            attempt.id > self.applied
        }
    }
}

struct Inner {
    provider: Arc<dyn IdentityProvider>,
    resolver: RoleResolver,
    ledger: Mutex<Ledger>,
    updates: watch::Sender<Session>,
}

/// Coordinates the identity provider, the role resolver, and the session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Creates a manager in the initial loading state.
    ///
    /// Nothing is resolved until [`attach`](Self::attach) is called or an
    /// explicit operation runs.
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>, resolver: RoleResolver) -> Self {
        let (updates, _) = watch::channel(Session::initial());
        Self {
            inner: Arc::new(Inner {
                provider,
                resolver,
                ledger: Mutex::new(Ledger {
                    session: Session::initial(),
                    next_attempt: 0,
                    applied: 0,
                    outstanding: BTreeSet::new(),
                    latest_explicit: 0,
                }),
                updates,
            }),
        }
    }

    /// Returns the current session.
    #[must_use]
    pub fn session(&self) -> Session {
        self.inner.updates.borrow().clone()
    }

    /// Returns a receiver that observes every session change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.inner.updates.subscribe()
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.inner.provider
    }

    #[must_use]
    pub fn resolver(&self) -> &RoleResolver {
        &self.inner.resolver
    }

    /// Subscribes to the identity provider and resolves every change.
    ///
    /// The provider's current state is numbered before this returns, so it
    /// is ordered before any explicit operation started afterwards. A
    /// signed-out state is also applied before returning; a signed-in one
    /// resolves in a spawned task and the session stays loading until then.
    pub fn attach(&self) -> SessionListener {
        let mut subscription = self.inner.provider.subscribe();
        let detached = Arc::new(AtomicBool::new(false));

        if let Some(state) = subscription.try_next() {
            tokio::spawn(self.start_resolution(
                state.into_identity(),
                false,
                Some(detached.clone()),
            ));
        }

        let manager = self.clone();
        let flag = detached.clone();
        let task = tokio::spawn(async move {
            while let Some(state) = subscription.next().await {
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                debug!(signed_in = state.identity().is_some(), "identity changed");
                tokio::spawn(manager.start_resolution(
                    state.into_identity(),
                    false,
                    Some(flag.clone()),
                ));
            }
            debug!("identity subscription closed");
        });

        SessionListener { detached, task }
    }

    /// Resolves an identity outside of any explicit operation.
    ///
    /// The attempt is numbered when this is called, not when the returned
    /// future is first polled. The future resolves to the role computed for
    /// this attempt, whether or not it was applied.
    pub fn resolve_identity(&self, identity: Option<Identity>) -> BoxFuture<'static, Role> {
        self.start_resolution(identity, false, None)
    }

    /// Re-resolves the provider's current identity, for example after a
    /// registry outage.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Role {
        let identity = self.inner.provider.current();
        self.start_resolution(identity, true, None).await
    }

    /// Signs in and resolves the role.
    ///
    /// An identity that resolves to `unauthorized`, or whose role cannot be
    /// determined because the registry is unavailable, is signed out of the
    /// provider before this returns.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Role, Report<LoginError>> {
        let attempt = self.begin(true);

        let identity = match self.inner.provider.sign_in(email, password).await {
            Ok(identity) => identity,
            Err(e) => {
                let err = e.current_context().clone();
                info!(error = %err, "sign-in rejected");
                self.finish(
                    attempt,
                    Outcome::Failed {
                        error: err.to_string(),
                    },
                    None,
                );
                return Err(LoginError::Authentication(err).into());
            }
        };

        let denial = match self.inner.resolver.resolve(Some(&identity)).await {
            Ok(resolution) if resolution.role.is_authorized() => {
                info!(uid = %identity.uid(), role = %resolution.role, "signed in");
                self.finish(
                    attempt,
                    Outcome::Resolved {
                        identity: Some(identity),
                        role: resolution.role,
                        error: None,
                    },
                    None,
                );
                return Ok(resolution.role);
            }
            Ok(_) => LoginError::Authorization(AuthorizationError::NotAnOperator {
                uid: identity.uid().clone(),
                email: identity.email().to_string(),
            }),
            Err(e) => LoginError::RegistryUnavailable(e.current_context().clone()),
        };

        warn!(uid = %identity.uid(), error = %denial, "login denied, ending provider session");
        if let Err(e) = self.inner.provider.sign_out().await {
            warn!(error = %e, "failed to end provider session");
        }
        self.finish(
            attempt,
            Outcome::Resolved {
                identity: None,
                role: Role::Unauthenticated,
                error: Some(denial.to_string()),
            },
            None,
        );
        Err(denial.into())
    }

    /// Signs out. The session ends up signed out even if the provider
    /// reports a failure; the failure is recorded and returned.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), Report<AuthenticationError>> {
        let attempt = self.begin(true);
        let result = self.inner.provider.sign_out().await;
        let error = result
            .as_ref()
            .err()
            .map(|e| e.current_context().to_string());
        if let Some(error) = &error {
            warn!(%error, "sign-out failed");
        }
        self.finish(
            attempt,
            Outcome::Resolved {
                identity: None,
                role: Role::Unauthenticated,
                error,
            },
            None,
        );
        result
    }

    /// Clears the recorded error.
    pub fn clear_error(&self) {
        let mut ledger = self.lock();
        ledger.session.set_error(None);
        self.publish(&ledger);
    }

    fn start_resolution(
        &self,
        identity: Option<Identity>,
        explicit: bool,
        detached: Option<Arc<AtomicBool>>,
    ) -> BoxFuture<'static, Role> {
        let attempt = self.begin(explicit);

        let Some(identity) = identity else {
            self.finish(
                attempt,
                Outcome::Resolved {
                    identity: None,
                    role: Role::Unauthenticated,
                    error: None,
                },
                detached.as_deref(),
            );
            return Box::pin(async { Role::Unauthenticated });
        };

        let manager = self.clone();
        Box::pin(async move {
            let (role, error) = match manager.inner.resolver.resolve(Some(&identity)).await {
                Ok(resolution) => (resolution.role, None),
                Err(e) => {
                    warn!(uid = %identity.uid(), error = %e, "role resolution failed");
                    (Role::Unauthorized, Some(e.current_context().to_string()))
                }
            };
            manager.finish(
                attempt,
                Outcome::Resolved {
                    identity: Some(identity),
                    role,
                    error,
                },
                detached.as_deref(),
            );
            role
        })
    }

    fn begin(&self, explicit: bool) -> Attempt {
        let mut ledger = self.lock();
        ledger.next_attempt += 1;
        let attempt = Attempt {
            id: ledger.next_attempt,
            explicit,
        };
        ledger.outstanding.insert(attempt.id);
        if explicit {
            ledger.latest_explicit = attempt.id;
            ledger.session.set_error(None);
        }
        ledger.session.set_loading(true);
        self.publish(&ledger);
        attempt
    }

    /// Applies an outcome. Returns whether identity and role were replaced.
    fn finish(&self, attempt: Attempt, outcome: Outcome, detached: Option<&AtomicBool>) -> bool {
        let mut ledger = self.lock();
        ledger.outstanding.remove(&attempt.id);

        let mut applied = false;
        if detached.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
            debug!(attempt = attempt.id, "discarding result after detach");
        } else {
            let may_record_error = ledger.may_record_error(attempt);
            match outcome {
                Outcome::Resolved {
                    identity,
                    role,
                    error,
                } => {
                    if attempt.id > ledger.applied {
                        ledger.applied = attempt.id;
                        ledger.session.set_resolved(identity, role);
                        applied = true;
                    } else {
                        debug!(
                            attempt = attempt.id,
                            applied = ledger.applied,
                            "discarding stale resolution"
                        );
                    }
                    if error.is_some() && (applied || may_record_error) {
                        ledger.session.set_error(error);
                    }
                }
                Outcome::Failed { error } => {
                    if may_record_error {
                        ledger.session.set_error(Some(error));
                    }
                }
            }
        }

        let loading = ledger.outstanding.iter().any(|id| *id > ledger.applied);
        ledger.session.set_loading(loading);
        self.publish(&ledger);
        applied
    }

    fn publish(&self, ledger: &Ledger) {
        self.inner.updates.send_replace(ledger.session.clone());
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.inner
            .ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to an attached identity subscription.
///
/// Dropping the handle detaches it: no further events are processed and
/// results of resolutions still in flight are discarded.
pub struct SessionListener {
    detached: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl SessionListener {
    /// Detaches from the identity provider.
    pub fn detach(self) {
        drop(self);
    }
}

impl Drop for SessionListener {
    fn drop(&mut self) {
        self.detached.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccessConfig;
    use crate::memory::MemoryIdentityProvider;
    use crate::registry::{ADMINS_COLLECTION, AdminRegistry};
    use sos_admin_core::{DocumentId, IdentityId};
    use sos_admin_store::{DocumentStore, FieldValue, Fields, MemoryDocumentStore};

    struct Fixture {
        store: Arc<MemoryDocumentStore>,
        provider: Arc<MemoryIdentityProvider>,
        manager: SessionManager,
    }

    fn uid(raw: &str) -> IdentityId {
        IdentityId::new(raw).expect("valid id")
    }

    fn identity(raw: &str, email: &str) -> Identity {
        Identity::new(uid(raw), email)
    }

    async fn seed_admin(store: &MemoryDocumentStore, raw: &str, role: &str) {
        let mut fields = Fields::new();
        fields.insert("email".to_string(), FieldValue::from("seed@sos.com"));
        fields.insert("role".to_string(), FieldValue::from(role));
        fields.insert("isActive".to_string(), FieldValue::from(true));
        store
            .set(ADMINS_COLLECTION, &DocumentId::new(raw).expect("valid id"), fields)
            .await
            .expect("seed");
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryDocumentStore::new());
        seed_admin(&store, "X", "admin").await;
        seed_admin(&store, "Y", "super_admin").await;

        let provider = Arc::new(MemoryIdentityProvider::new());
        provider.add_account(uid("U1"), "admin@sos.com", "secret");
        provider.add_account(uid("U9"), "user@example.com", "secret");
        provider.add_account(uid("X"), "x@sos.com", "secret");

        let resolver = RoleResolver::new(AdminRegistry::new(store.clone()), &AccessConfig::default());
        let manager = SessionManager::new(provider.clone(), resolver);
        Fixture {
            store,
            provider,
            manager,
        }
    }

    /// Lets spawned listener and resolution tasks run to completion.
    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn starts_loading() {
        let f = fixture().await;
        let session = f.manager.session();
        assert!(session.is_loading());
        assert_eq!(session.role(), Role::Unauthenticated);
    }

    #[tokio::test]
    async fn later_resolution_wins_when_earlier_finishes_last() {
        let f = fixture().await;
        let first = f.manager.resolve_identity(Some(identity("X", "x@sos.com")));
        let second = f.manager.resolve_identity(Some(identity("Y", "y@sos.com")));
        assert!(f.manager.session().is_loading());

        assert_eq!(second.await, Role::SuperAdmin);
        let session = f.manager.session();
        assert!(!session.is_loading());
        assert_eq!(session.role(), Role::SuperAdmin);

        assert_eq!(first.await, Role::Admin);
        let session = f.manager.session();
        assert_eq!(session.identity().map(|i| i.uid().as_str()), Some("Y"));
        assert_eq!(session.role(), Role::SuperAdmin);
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn stays_loading_until_latest_attempt_completes() {
        let f = fixture().await;
        let first = f.manager.resolve_identity(Some(identity("X", "x@sos.com")));
        let second = f.manager.resolve_identity(Some(identity("Y", "y@sos.com")));

        first.await;
        let session = f.manager.session();
        assert_eq!(session.role(), Role::Admin);
        assert!(session.is_loading());

        second.await;
        assert!(!f.manager.session().is_loading());
    }

    #[tokio::test]
    async fn null_identity_resolves_immediately() {
        let f = fixture().await;
        let pending = f.manager.resolve_identity(None);
        let session = f.manager.session();
        assert!(!session.is_loading());
        assert!(!session.is_authenticated());
        assert_eq!(pending.await, Role::Unauthenticated);
    }

    #[tokio::test]
    async fn bootstrap_login_is_super_admin() {
        let f = fixture().await;
        let role = f.manager.login("admin@sos.com", "secret").await.expect("login");
        assert_eq!(role, Role::SuperAdmin);

        let session = f.manager.session();
        assert_eq!(session.role(), Role::SuperAdmin);
        assert_eq!(session.identity().map(Identity::email), Some("admin@sos.com"));
        assert!(session.error().is_none());
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn unauthorized_login_is_rejected_and_signed_out() {
        let f = fixture().await;
        let _listener = f.manager.attach();

        let err = f
            .manager
            .login("user@example.com", "secret")
            .await
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            LoginError::Authorization(AuthorizationError::NotAnOperator { .. })
        ));
        assert!(f.provider.current().is_none());

        settle().await;
        let session = f.manager.session();
        assert!(!session.is_authenticated());
        assert_eq!(session.role(), Role::Unauthenticated);
        assert!(!session.is_loading());
        assert!(
            session
                .error()
                .is_some_and(|e| e.contains("not authorized")),
            "denial must survive the provider's sign-in and sign-out events"
        );
    }

    #[tokio::test]
    async fn invalid_credentials_surface_provider_message() {
        let f = fixture().await;
        let err = f.manager.login("admin@sos.com", "wrong").await.unwrap_err();
        assert_eq!(
            err.current_context(),
            &LoginError::Authentication(AuthenticationError::InvalidCredentials)
        );
        assert_eq!(f.manager.session().error(), Some("invalid email or password"));
    }

    #[tokio::test]
    async fn failed_login_keeps_existing_session() {
        let f = fixture().await;
        f.manager.login("x@sos.com", "secret").await.expect("login");
        assert!(f.manager.login("x@sos.com", "wrong").await.is_err());

        let session = f.manager.session();
        assert_eq!(session.role(), Role::Admin);
        assert!(session.error().is_some());
    }

    #[tokio::test]
    async fn registry_outage_during_login_signs_out() {
        let f = fixture().await;
        f.store.fail_reads(true);

        let err = f.manager.login("admin@sos.com", "secret").await.unwrap_err();
        assert!(matches!(
            err.current_context(),
            LoginError::RegistryUnavailable(_)
        ));
        assert!(err.current_context().is_retryable());
        assert!(f.provider.current().is_none());

        let session = f.manager.session();
        assert!(!session.is_authenticated());
        assert_eq!(session.role(), Role::Unauthenticated);
        assert!(!session.is_loading());
        assert!(session.error().is_some());
    }

    #[tokio::test]
    async fn background_outage_keeps_identity_until_refresh() {
        let f = fixture().await;
        f.store.fail_reads(true);
        let role = f
            .manager
            .resolve_identity(Some(identity("X", "x@sos.com")))
            .await;
        assert_eq!(role, Role::Unauthorized);

        let session = f.manager.session();
        assert!(session.is_authenticated());
        assert_eq!(session.role(), Role::Unauthorized);
        assert!(session.error().is_some());

        f.store.fail_reads(false);
        f.provider.restore_session(&uid("X"));
        assert_eq!(f.manager.refresh().await, Role::Admin);
        let session = f.manager.session();
        assert!(session.is_authorized());
        assert!(session.error().is_none());
    }

    #[tokio::test]
    async fn logout_always_clears_identity() {
        let f = fixture().await;
        f.manager.login("x@sos.com", "secret").await.expect("login");
        f.provider.set_fail_sign_out(true);

        assert!(f.manager.logout().await.is_err());
        let session = f.manager.session();
        assert!(!session.is_authenticated());
        assert_eq!(session.role(), Role::Unauthenticated);
        assert!(session.error().is_some());
    }

    #[tokio::test]
    async fn clear_error_resets_message() {
        let f = fixture().await;
        let _ = f.manager.login("nobody@sos.com", "secret").await;
        assert!(f.manager.session().error().is_some());
        f.manager.clear_error();
        assert!(f.manager.session().error().is_none());
    }

    #[tokio::test]
    async fn attached_listener_follows_provider() {
        let f = fixture().await;
        let _listener = f.manager.attach();
        settle().await;
        assert!(!f.manager.session().is_loading());

        let mut updates = f.manager.watch();
        f.provider.restore_session(&uid("X"));
        let session = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            updates.wait_for(|s| s.is_authorized() && !s.is_loading()),
        )
        .await
        .expect("resolved in time")
        .expect("manager alive")
        .clone();
        assert_eq!(session.role(), Role::Admin);

        f.provider.sign_out().await.expect("sign out");
        settle().await;
        assert!(!f.manager.session().is_authenticated());
    }

    #[tokio::test]
    async fn detached_listener_ignores_events() {
        let f = fixture().await;
        let listener = f.manager.attach();
        settle().await;
        listener.detach();

        f.provider.restore_session(&uid("X"));
        settle().await;
        assert!(!f.manager.session().is_authenticated());
    }

    #[tokio::test]
    async fn deactivated_entry_is_unauthorized_after_refresh() {
        let f = fixture().await;
        assert_eq!(
            f.manager.login("x@sos.com", "secret").await.expect("login"),
            Role::Admin
        );

        f.store
            .set_field(
                ADMINS_COLLECTION,
                &DocumentId::new("X").expect("valid id"),
                "isActive",
                FieldValue::from(false),
            )
            .await
            .expect("deactivate");

        assert_eq!(f.manager.refresh().await, Role::Unauthorized);
        let session = f.manager.session();
        assert!(session.is_authenticated());
        assert!(!session.is_authorized());
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn resolution_in_flight_at_detach_is_discarded() {
        let f = fixture().await;
        let listener = f.manager.attach();
        settle().await;

        f.store.hold_reads(true);
        f.provider.restore_session(&uid("X"));
        settle().await;
        assert!(f.manager.session().is_loading());

        listener.detach();
        f.store.hold_reads(false);
        settle().await;

        let session = f.manager.session();
        assert!(!session.is_authenticated());
        assert_eq!(session.role(), Role::Unauthenticated);
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn background_event_preserves_login_error() {
        let f = fixture().await;
        let _ = f.manager.login("admin@sos.com", "wrong").await;
        f.manager
            .resolve_identity(Some(identity("X", "x@sos.com")))
            .await;

        let session = f.manager.session();
        assert!(session.is_authorized());
        assert_eq!(session.error(), Some("invalid email or password"));
    }
}
