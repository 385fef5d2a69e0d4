//! Identity provider seam.
//!
//! An [`IdentityProvider`] verifies credentials and notifies subscribers every
//! time the signed-in identity changes. Subscribers receive the current state
//! on subscription and then one [`IdentityState`] per transition, in order.

use crate::error::AuthenticationError;
use async_trait::async_trait;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use sos_admin_core::IdentityId;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// An authenticated principal as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    uid: IdentityId,
    email: String,
}

impl Identity {
    /// Creates an identity.
    #[must_use]
    pub fn new(uid: IdentityId, email: impl Into<String>) -> Self {
        Self {
            uid,
            email: email.into(),
        }
    }

    /// Returns the provider's unique id for this identity.
    #[must_use]
    pub fn uid(&self) -> &IdentityId {
        &self.uid
    }

    /// Returns the identity's email.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }
}

/// Authentication state delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityState {
    SignedOut,
    SignedIn(Identity),
}

impl IdentityState {
    /// Returns the signed-in identity, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::SignedOut => None,
            Self::SignedIn(identity) => Some(identity),
        }
    }

    /// Converts into the signed-in identity, if any.
    #[must_use]
    pub fn into_identity(self) -> Option<Identity> {
        match self {
            Self::SignedOut => None,
            Self::SignedIn(identity) => Some(identity),
        }
    }
}

impl From<Option<Identity>> for IdentityState {
    fn from(identity: Option<Identity>) -> Self {
        identity.map_or(Self::SignedOut, Self::SignedIn)
    }
}

/// A live subscription to identity changes.
///
/// Dropping the subscription unsubscribes it.
#[derive(Debug)]
pub struct IdentitySubscription {
    receiver: mpsc::UnboundedReceiver<IdentityState>,
}

impl IdentitySubscription {
    /// Waits for the next state. Returns `None` once the provider is gone.
    pub async fn next(&mut self) -> Option<IdentityState> {
        self.receiver.recv().await
    }

    /// Returns the next state if one is already queued.
    pub fn try_next(&mut self) -> Option<IdentityState> {
        self.receiver.try_recv().ok()
    }

    /// Stops delivery. States already queued are discarded.
    pub fn unsubscribe(mut self) {
        self.receiver.close();
    }
}

/// Adapter over an external identity service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verifies credentials and makes the identity the signed-in one.
    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, Report<AuthenticationError>>;

    /// Ends the provider session. Signing out while signed out succeeds.
    async fn sign_out(&self) -> Result<(), Report<AuthenticationError>>;

    /// Subscribes to identity changes. The current state is delivered first.
    fn subscribe(&self) -> IdentitySubscription;

    /// Returns the currently signed-in identity.
    fn current(&self) -> Option<Identity>;
}

/// Current identity plus the subscribers to notify when it changes.
///
/// State changes and deliveries happen under one lock, so every subscriber
/// sees transitions in the order they were made.
#[derive(Debug, Default)]
pub(crate) struct IdentityBroadcast {
    inner: Mutex<BroadcastState>,
}

#[derive(Debug, Default)]
struct BroadcastState {
    current: Option<Identity>,
    subscribers: Vec<mpsc::UnboundedSender<IdentityState>>,
}

impl IdentityBroadcast {
    pub(crate) fn current(&self) -> Option<Identity> {
        self.lock().current.clone()
    }

    pub(crate) fn subscribe(&self) -> IdentitySubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.lock();
        // A fresh receiver cannot be closed yet.
        let _ = sender.send(IdentityState::from(state.current.clone()));
        state.subscribers.push(sender);
        IdentitySubscription { receiver }
    }

    /// Records a sign-in and notifies subscribers.
    pub(crate) fn signed_in(&self, identity: Identity) {
        let mut state = self.lock();
        state.current = Some(identity.clone());
        Self::deliver(&mut state, &IdentityState::SignedIn(identity));
    }

    /// Records a sign-out. Subscribers are notified only if someone was
    /// signed in. Returns whether a session was ended.
    pub(crate) fn signed_out(&self) -> bool {
        let mut state = self.lock();
        if state.current.take().is_none() {
            return false;
        }
        Self::deliver(&mut state, &IdentityState::SignedOut);
        true
    }

    fn deliver(state: &mut BroadcastState, event: &IdentityState) {
        state
            .subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BroadcastState> {
        // Poisoning only follows a panic in `deliver`, which leaves the
        // state consistent.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(uid: &str, email: &str) -> Identity {
        Identity::new(IdentityId::new(uid).expect("valid id"), email)
    }

    #[test]
    fn subscription_receives_current_state_first() {
        let broadcast = IdentityBroadcast::default();
        let mut sub = broadcast.subscribe();
        assert_eq!(sub.try_next(), Some(IdentityState::SignedOut));
        assert_eq!(sub.try_next(), None);

        broadcast.signed_in(identity("U1", "a@sos.com"));
        let mut late = broadcast.subscribe();
        assert_eq!(
            late.try_next(),
            Some(IdentityState::SignedIn(identity("U1", "a@sos.com")))
        );
    }

    #[test]
    fn one_event_per_transition_in_order() {
        let broadcast = IdentityBroadcast::default();
        let mut sub = broadcast.subscribe();
        let _ = sub.try_next();

        broadcast.signed_in(identity("U1", "a@sos.com"));
        assert!(broadcast.signed_out());
        // Already signed out: no transition, no event.
        assert!(!broadcast.signed_out());
        broadcast.signed_in(identity("U2", "b@sos.com"));

        assert_eq!(
            sub.try_next().and_then(IdentityState::into_identity),
            Some(identity("U1", "a@sos.com"))
        );
        assert_eq!(sub.try_next(), Some(IdentityState::SignedOut));
        assert_eq!(
            sub.try_next().and_then(IdentityState::into_identity),
            Some(identity("U2", "b@sos.com"))
        );
        assert_eq!(sub.try_next(), None);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let broadcast = IdentityBroadcast::default();
        let sub = broadcast.subscribe();
        sub.unsubscribe();
        broadcast.signed_in(identity("U1", "a@sos.com"));
        assert!(broadcast.lock().subscribers.is_empty());
    }

    #[test]
    fn state_conversions() {
        assert_eq!(IdentityState::from(None), IdentityState::SignedOut);
        let state = IdentityState::from(Some(identity("U1", "a@sos.com")));
        assert_eq!(state.identity().map(Identity::email), Some("a@sos.com"));
    }
}
