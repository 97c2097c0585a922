// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Single source of truth for the signed-in identity and its profile.
//!
//! The store is the only writer of its [`SessionSnapshot`]; consumers read
//! it through [`SessionStore::current`], a watch receiver, or an
//! [`SessionStore::on_change`] callback.
//!
//! Every asynchronous result (persisted-session restore, profile fetch) is
//! tagged with the session epoch at the time it started. The epoch is
//! bumped whenever the identity changes or the user signs out, so a result
//! that resolves after either is dropped instead of resurrecting stale
//! state.

use super::ListenerHandle;
use crate::config::Config;
use crate::error::AuthError;
use crate::models::{AuthChangeEvent, AuthEvent, Identity, Profile, ProfileKey, SignOutScope};
use crate::services::provider::{IdentityProvider, ProfileRepository};
use crate::storage::SessionPersistence;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// What consumers see.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    /// True until the persisted session (and its profile) has been resolved
    pub loading: bool,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn email(&self) -> Option<&str> {
        self.identity.as_ref().and_then(|i| i.email.as_deref())
    }
}

/// Timeouts applied by the store.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub profile_fetch_timeout: Duration,
    pub sign_out_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for StoreOptions {
    fn from(config: &Config) -> Self {
        Self {
            profile_fetch_timeout: config.profile_fetch_timeout,
            sign_out_timeout: config.sign_out_timeout,
        }
    }
}

/// Bookkeeping guarded by one lock, taken before the watch channel's.
#[derive(Debug, Default)]
struct Book {
    /// Bumped on identity switch and sign-out
    epoch: u64,
    /// A profile fetch for the current epoch is running
    fetch_in_flight: bool,
    /// Identity fields the loaded profile was fetched for
    loaded_key: Option<ProfileKey>,
    /// Set by a local sign-out. Provider events carrying a session are
    /// ignored until the provider confirms with `SignedOut` or the user
    /// signs in through the store.
    signed_out_locally: bool,
}

struct StoreInner {
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileRepository>,
    persistence: SessionPersistence,
    options: StoreOptions,
    state: watch::Sender<SessionSnapshot>,
    alive: AtomicBool,
    book: Mutex<Book>,
}

/// Session store backed by an identity provider.
pub struct SessionStore {
    inner: Arc<StoreInner>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    /// Create the store and start resolving the persisted session.
    ///
    /// Must be called inside a tokio runtime. The snapshot reports
    /// `loading == true` until the persisted session and, if there is one,
    /// its profile have been resolved.
    pub fn start(
        provider: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileRepository>,
        persistence: SessionPersistence,
        options: StoreOptions,
    ) -> Self {
        let (state, _) = watch::channel(SessionSnapshot {
            loading: true,
            ..Default::default()
        });

        // Subscribe before the initial load so no transition is missed
        let events = provider.subscribe();

        let inner = Arc::new(StoreInner {
            provider,
            profiles,
            persistence,
            options,
            state,
            alive: AtomicBool::new(true),
            book: Mutex::new(Book::default()),
        });

        let task = tokio::spawn(inner.clone().run(events));

        Self {
            inner,
            event_task: Mutex::new(Some(task)),
        }
    }

    /// Synchronous snapshot of the current state.
    pub fn current(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    /// Call `listener` on every state transition from now on.
    pub fn on_change<F>(&self, listener: F) -> ListenerHandle
    where
        F: FnMut(&SessionSnapshot) + Send + 'static,
    {
        ListenerHandle::spawn(self.subscribe(), listener)
    }

    /// Wait until the initial load has settled and return that snapshot.
    pub async fn wait_until_settled(&self) -> SessionSnapshot {
        let mut rx = self.subscribe();
        let settled = rx.wait_for(|snapshot| !snapshot.loading).await;
        match settled {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.current(),
        }
    }

    /// Sign in with email and password.
    ///
    /// The identity is applied as soon as the provider accepts the
    /// credentials; the profile follows asynchronously.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, AuthError> {
        let session = self
            .inner
            .provider
            .sign_in_with_password(email, password)
            .await?;
        let identity = session.user.clone();

        self.inner
            .set_identity(AuthChangeEvent::SignedIn, identity.clone(), true);
        Ok(identity)
    }

    /// Local-scope sign-out. See [`SessionStore::sign_out_with_scope`].
    pub async fn sign_out(&self) {
        self.sign_out_with_scope(SignOutScope::Local).await
    }

    /// Sign out.
    ///
    /// Local state is cleared before anything else happens. The remote
    /// revoke runs in its own task and is awaited for at most
    /// `sign_out_timeout`; past that it keeps running detached. Both
    /// persisted session keys are removed. Never fails.
    pub async fn sign_out_with_scope(&self, scope: SignOutScope) {
        self.inner.clear_local(true);

        if let Err(e) = self.inner.persistence.clear().await {
            tracing::warn!(error = %e, "Failed to clear persisted session");
        }

        let provider = self.inner.provider.clone();
        let revoke = tokio::spawn(async move { provider.revoke_session(scope).await });

        match tokio::time::timeout(self.inner.options.sign_out_timeout, revoke).await {
            Ok(Ok(Ok(()))) => tracing::info!(scope = scope.as_str(), "Session revoked"),
            Ok(Ok(Err(e))) => {
                tracing::warn!(error = %e, scope = scope.as_str(), "Session revoke failed")
            }
            Ok(Err(e)) => tracing::warn!(error = %e, "Session revoke task failed"),
            Err(_) => tracing::warn!(
                timeout_ms = self.inner.options.sign_out_timeout.as_millis() as u64,
                "Session revoke still pending, continuing in background"
            ),
        }
    }

    /// Refetch the current identity's profile.
    ///
    /// Returns false when there is no identity or a fetch is already
    /// running (the running fetch covers this request).
    pub fn refresh_profile(&self) -> bool {
        let Some(identity) = self.inner.state.borrow().identity.clone() else {
            return false;
        };
        self.inner.start_profile_fetch(identity)
    }

    /// Stop listening to the provider and drop any late results.
    pub fn dispose(&self) {
        if !self.inner.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        let task = self
            .event_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
        tracing::debug!("Session store disposed");
    }

    pub fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl StoreInner {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn book(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(self: Arc<Self>, mut events: broadcast::Receiver<AuthEvent>) {
        self.initial_load().await;

        loop {
            match events.recv().await {
                Ok(event) => {
                    if !self.is_alive() {
                        break;
                    }
                    self.apply_event(event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Session store lagged behind auth events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn initial_load(self: &Arc<Self>) {
        let epoch = self.book().epoch;

        let restored = self.provider.get_persisted_session().await;

        if !self.is_alive() || self.book().epoch != epoch {
            tracing::debug!("Dropping persisted session resolved after a state change");
            return;
        }

        match restored {
            Ok(Some(session)) => {
                tracing::info!(identity_id = %session.user.id, "Restored persisted session");
                let fetching =
                    self.set_identity(AuthChangeEvent::InitialSession, session.user, false);
                if !fetching {
                    self.settle_loading();
                }
            }
            Ok(None) => {
                tracing::debug!("No persisted session");
                self.settle_loading();
            }
            Err(e) => {
                // Fail open to "signed out" rather than spinning forever
                tracing::warn!(error = %e, "Failed to restore persisted session");
                self.settle_loading();
            }
        }
    }

    fn apply_event(self: &Arc<Self>, event: AuthEvent) {
        tracing::debug!(event = ?event.kind, has_session = event.session.is_some(), "Auth event");
        match (event.kind, event.session) {
            (AuthChangeEvent::SignedOut, _) | (_, None) => {
                self.clear_local(false);
                self.book().signed_out_locally = false;
            }
            (kind, Some(session)) => {
                self.set_identity(kind, session.user, false);
            }
        }
    }

    /// Make `identity` current. `direct` is set for user actions on the
    /// store itself, as opposed to provider events.
    ///
    /// Returns whether a profile fetch is running afterwards.
    fn set_identity(
        self: &Arc<Self>,
        kind: AuthChangeEvent,
        identity: Identity,
        direct: bool,
    ) -> bool {
        let needs_fetch = {
            let mut book = self.book();

            if book.signed_out_locally && !direct {
                tracing::debug!(event = ?kind, "Ignoring session event after local sign-out");
                return false;
            }
            book.signed_out_locally = false;

            let switched = self
                .state
                .borrow()
                .identity
                .as_ref()
                .map_or(true, |current| current.id != identity.id);

            if switched {
                book.epoch += 1;
                book.fetch_in_flight = false;
                book.loaded_key = None;
            }

            let needs_fetch = book.loaded_key.as_ref() != Some(&identity.profile_key());

            self.state.send_if_modified(|snapshot| {
                let mut changed = false;
                if snapshot.identity.as_ref() != Some(&identity) {
                    snapshot.identity = Some(identity.clone());
                    changed = true;
                }
                if switched && snapshot.profile.is_some() {
                    snapshot.profile = None;
                    changed = true;
                }
                changed
            });

            if switched {
                tracing::info!(identity_id = %identity.id, event = ?kind, "Identity changed");
            }
            needs_fetch
        };

        if needs_fetch {
            self.start_profile_fetch(identity);
        }
        self.book().fetch_in_flight
    }

    /// Clear identity and profile. Idempotent: only the first call after a
    /// sign-in produces a state transition.
    fn clear_local(&self, local_sign_out: bool) {
        let mut book = self.book();
        book.epoch += 1;
        book.fetch_in_flight = false;
        book.loaded_key = None;
        if local_sign_out {
            book.signed_out_locally = true;
        }

        let cleared = self.state.send_if_modified(|snapshot| {
            let changed =
                snapshot.identity.is_some() || snapshot.profile.is_some() || snapshot.loading;
            snapshot.identity = None;
            snapshot.profile = None;
            snapshot.loading = false;
            changed
        });

        if cleared {
            tracing::info!(local = local_sign_out, "Signed out");
        }
    }

    fn settle_loading(&self) {
        self.state.send_if_modified(|snapshot| {
            let was_loading = snapshot.loading;
            snapshot.loading = false;
            was_loading
        });
    }

    /// Start a profile fetch unless one is already running.
    fn start_profile_fetch(self: &Arc<Self>, identity: Identity) -> bool {
        let epoch = {
            let mut book = self.book();
            if book.fetch_in_flight {
                tracing::debug!(identity_id = %identity.id, "Profile fetch already in flight");
                return false;
            }
            book.fetch_in_flight = true;
            book.epoch
        };

        let inner = self.clone();
        tokio::spawn(async move {
            let key = identity.profile_key();
            let limit = inner.options.profile_fetch_timeout;

            let fetched = tokio::time::timeout(limit, inner.profiles.fetch_profile(&identity.id))
                .await
                .unwrap_or(Err(AuthError::Timeout(limit)));

            let profile = match fetched {
                Ok(Some(profile)) => Some(profile),
                Ok(None) => {
                    tracing::info!(identity_id = %identity.id, "No profile row yet");
                    None
                }
                Err(AuthError::Timeout(_)) => {
                    tracing::warn!(
                        identity_id = %identity.id,
                        timeout_ms = limit.as_millis() as u64,
                        "Profile fetch timed out, continuing without profile"
                    );
                    None
                }
                Err(e) => {
                    tracing::warn!(error = %e, identity_id = %identity.id, "Profile fetch failed");
                    None
                }
            };

            inner.finish_profile_fetch(epoch, key, profile);
        });

        true
    }

    fn finish_profile_fetch(self: &Arc<Self>, epoch: u64, key: ProfileKey, profile: Option<Profile>) {
        if !self.is_alive() {
            return;
        }

        let follow_up = {
            let mut book = self.book();
            if book.epoch != epoch {
                tracing::debug!(identity_id = %key.identity_id, "Dropping stale profile result");
                return;
            }
            book.fetch_in_flight = false;
            book.loaded_key = Some(key.clone());

            let mut follow_up = None;
            self.state.send_if_modified(|snapshot| {
                let Some(identity) = snapshot.identity.as_ref() else {
                    return false;
                };
                if identity.profile_key() != key {
                    // Photo metadata changed while we were fetching
                    follow_up = Some(identity.clone());
                }
                let changed = snapshot.profile != profile || snapshot.loading;
                snapshot.profile = profile;
                snapshot.loading = false;
                changed
            });
            follow_up
        };

        if let Some(identity) = follow_up {
            self.start_profile_fetch(identity);
        }
    }
}
