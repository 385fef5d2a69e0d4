//! In-process identity provider for development and tests.

use crate::error::AuthenticationError;
use crate::identity::{Identity, IdentityBroadcast, IdentityProvider, IdentitySubscription};
use async_trait::async_trait;
use rootcause::prelude::Report;
use sos_admin_core::IdentityId;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
struct Account {
    uid: IdentityId,
    password: String,
    disabled: bool,
}

/// Identity provider backed by an in-memory account table.
///
/// Behaves like the hosted provider from the caller's point of view: failed
/// sign-ins leave the current identity untouched, and every transition is
/// delivered to subscribers.
#[derive(Debug, Default)]
pub struct MemoryIdentityProvider {
    accounts: RwLock<HashMap<String, Account>>,
    broadcast: IdentityBroadcast,
    unavailable: AtomicBool,
    fail_sign_out: AtomicBool,
}

impl MemoryIdentityProvider {
    /// Creates a provider with no accounts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account. An existing account with the same email is replaced.
    pub fn add_account(&self, uid: IdentityId, email: impl Into<String>, password: impl Into<String>) {
        let account = Account {
            uid,
            password: password.into(),
            disabled: false,
        };
        self.write_accounts().insert(email.into(), account);
    }

    /// Disables or re-enables an account.
    pub fn set_disabled(&self, email: &str, disabled: bool) {
        if let Some(account) = self.write_accounts().get_mut(email) {
            account.disabled = disabled;
        }
    }

    /// Makes sign-in fail as if the provider could not be reached.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes sign-out fail after clearing the local session.
    pub fn set_fail_sign_out(&self, fail: bool) {
        self.fail_sign_out.store(fail, Ordering::SeqCst);
    }

    /// Signs in an account without credentials, as a persisted session being
    /// restored at startup would. Returns `false` if no account has that uid.
    pub fn restore_session(&self, uid: &IdentityId) -> bool {
        let identity = self
            .read_accounts()
            .iter()
            .find(|(_, account)| &account.uid == uid)
            .map(|(email, account)| Identity::new(account.uid.clone(), email.clone()));
        match identity {
            Some(identity) => {
                self.broadcast.signed_in(identity);
                true
            }
            None => false,
        }
    }

    fn read_accounts(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Account>> {
        self.accounts
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_accounts(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Account>> {
        self.accounts
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    #[instrument(skip(self, password))]
    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, Report<AuthenticationError>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AuthenticationError::ProviderUnavailable {
                details: "provider offline".to_string(),
            }
            .into());
        }

        let account = self
            .read_accounts()
            .get(email)
            .cloned()
            .ok_or(AuthenticationError::InvalidCredentials)?;
        if account.password != password {
            return Err(AuthenticationError::InvalidCredentials.into());
        }
        if account.disabled {
            return Err(AuthenticationError::AccountDisabled.into());
        }

        let identity = Identity::new(account.uid, email);
        debug!(uid = %identity.uid(), "signed in");
        self.broadcast.signed_in(identity.clone());
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), Report<AuthenticationError>> {
        self.broadcast.signed_out();
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(AuthenticationError::ProviderUnavailable {
                details: "sign-out could not be confirmed".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn subscribe(&self) -> IdentitySubscription {
        self.broadcast.subscribe()
    }

    fn current(&self) -> Option<Identity> {
        self.broadcast.current()
    }
}
