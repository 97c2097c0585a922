// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Contract between the session core and the backing auth/database service.

use crate::error::Result;
use crate::models::{AuthEvent, Profile, Session, SignOutScope};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Identity provider (GoTrue in production).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Restore the session persisted by a previous run, refreshing it if
    /// the access token has expired.
    async fn get_persisted_session(&self) -> Result<Option<Session>>;

    /// Push-based stream of session transitions.
    ///
    /// Each call returns an independent receiver; dropping it unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    /// Revoke the current session on the server.
    async fn revoke_session(&self, scope: SignOutScope) -> Result<()>;

    /// Password sign-in. Emits `SignedIn` on success.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session>;
}

/// Lookup of display profiles by identity ID.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Single-row lookup by primary key. `Ok(None)` when no row exists yet.
    async fn fetch_profile(&self, identity_id: &str) -> Result<Option<Profile>>;
}
