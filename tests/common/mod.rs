// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use pitchdesk_auth::config::Config;
use pitchdesk_auth::error::{AuthError, Result};
use pitchdesk_auth::models::{AuthChangeEvent, AuthEvent, Identity, Profile, Session, SignOutScope};
use pitchdesk_auth::services::{IdentityProvider, ProfileRepository};
use pitchdesk_auth::session::{SessionStore, StoreOptions};
use pitchdesk_auth::storage::SessionPersistence;
use serde_json::{json, Map};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Password the mock provider rejects.
#[allow(dead_code)]
pub const WRONG_PASSWORD: &str = "wrong-password";

/// Scriptable identity provider and profile repository.
///
/// Every call is counted; latencies are plain `tokio::time::sleep`s so tests
/// can run on a paused clock.
pub struct MockProvider {
    events: broadcast::Sender<AuthEvent>,
    persisted: Mutex<Option<Session>>,
    persisted_fails: AtomicBool,
    persisted_delay: Mutex<Duration>,
    profiles: Mutex<HashMap<String, Profile>>,
    profile_delay: Mutex<Duration>,
    profile_fails: AtomicBool,
    revoke_delay: Mutex<Duration>,
    fetch_calls: AtomicUsize,
    revoke_calls: AtomicUsize,
    revoke_completed: AtomicUsize,
}

#[allow(dead_code)]
impl MockProvider {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            events,
            persisted: Mutex::new(None),
            persisted_fails: AtomicBool::new(false),
            persisted_delay: Mutex::new(Duration::ZERO),
            profiles: Mutex::new(HashMap::new()),
            profile_delay: Mutex::new(Duration::ZERO),
            profile_fails: AtomicBool::new(false),
            revoke_delay: Mutex::new(Duration::ZERO),
            fetch_calls: AtomicUsize::new(0),
            revoke_calls: AtomicUsize::new(0),
            revoke_completed: AtomicUsize::new(0),
        })
    }

    pub fn set_persisted(&self, session: Option<Session>) {
        *self.persisted.lock().unwrap() = session;
    }

    pub fn fail_persisted(&self) {
        self.persisted_fails.store(true, Ordering::SeqCst);
    }

    pub fn set_persisted_delay(&self, delay: Duration) {
        *self.persisted_delay.lock().unwrap() = delay;
    }

    pub fn insert_profile(&self, profile: Profile) {
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.id.clone(), profile);
    }

    pub fn set_profile_delay(&self, delay: Duration) {
        *self.profile_delay.lock().unwrap() = delay;
    }

    pub fn fail_profiles(&self) {
        self.profile_fails.store(true, Ordering::SeqCst);
    }

    pub fn set_revoke_delay(&self, delay: Duration) {
        *self.revoke_delay.lock().unwrap() = delay;
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn revoke_calls(&self) -> usize {
        self.revoke_calls.load(Ordering::SeqCst)
    }

    pub fn revoke_completed(&self) -> usize {
        self.revoke_completed.load(Ordering::SeqCst)
    }

    /// Push a provider event to every subscriber.
    pub fn emit(&self, kind: AuthChangeEvent, session: Option<Session>) {
        let _ = self.events.send(AuthEvent::new(kind, session));
    }
}

#[async_trait]
impl IdentityProvider for MockProvider {
    async fn get_persisted_session(&self) -> Result<Option<Session>> {
        let delay = *self.persisted_delay.lock().unwrap();
        tokio::time::sleep(delay).await;

        if self.persisted_fails.load(Ordering::SeqCst) {
            return Err(AuthError::Network("connection refused".to_string()));
        }
        Ok(self.persisted.lock().unwrap().clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn revoke_session(&self, _scope: SignOutScope) -> Result<()> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.revoke_delay.lock().unwrap();
        tokio::time::sleep(delay).await;

        self.revoke_completed.fetch_add(1, Ordering::SeqCst);
        self.emit(AuthChangeEvent::SignedOut, None);
        Ok(())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        if password == WRONG_PASSWORD {
            return Err(AuthError::InvalidCredentials);
        }
        let id = format!("id-{}", email.trim().to_lowercase());
        let session = session_for(identity(&id, email));
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }
}

#[async_trait]
impl ProfileRepository for MockProvider {
    async fn fetch_profile(&self, identity_id: &str) -> Result<Option<Profile>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.profile_delay.lock().unwrap();
        tokio::time::sleep(delay).await;

        if self.profile_fails.load(Ordering::SeqCst) {
            return Err(AuthError::Api {
                status: 500,
                message: "internal".to_string(),
            });
        }
        Ok(self.profiles.lock().unwrap().get(identity_id).cloned())
    }
}

/// Identity with no metadata.
#[allow(dead_code)]
pub fn identity(id: &str, email: &str) -> Identity {
    Identity {
        id: id.to_string(),
        email: Some(email.to_string()),
        app_metadata: Map::new(),
        user_metadata: Map::new(),
        role: Some("authenticated".to_string()),
        created_at: None,
    }
}

/// Same identity with a different photo in its metadata.
#[allow(dead_code)]
pub fn with_avatar(mut identity: Identity, url: &str) -> Identity {
    identity
        .user_metadata
        .insert("avatar_url".to_string(), json!(url));
    identity
}

#[allow(dead_code)]
pub fn session_for(user: Identity) -> Session {
    Session {
        access_token: format!("access-{}", user.id),
        token_type: "bearer".to_string(),
        expires_in: 3600,
        expires_at: Some(chrono::Utc::now().timestamp() + 3600),
        refresh_token: format!("refresh-{}", user.id),
        user,
    }
}

#[allow(dead_code)]
pub fn profile_for(id: &str, full_name: &str) -> Profile {
    Profile {
        id: id.to_string(),
        full_name: Some(full_name.to_string()),
        avatar_url: None,
        user_type: Some("founder".to_string()),
        locale: Some("en".to_string()),
        updated_at: None,
    }
}

#[allow(dead_code)]
pub fn test_persistence() -> SessionPersistence {
    SessionPersistence::in_memory(Config::default().storage_key())
}

/// Start a store over the mock with default timeouts.
#[allow(dead_code)]
pub fn start_store(provider: &Arc<MockProvider>) -> SessionStore {
    start_store_with(provider, StoreOptions::default())
}

#[allow(dead_code)]
pub fn start_store_with(provider: &Arc<MockProvider>, options: StoreOptions) -> SessionStore {
    SessionStore::start(provider.clone(), provider.clone(), test_persistence(), options)
}
