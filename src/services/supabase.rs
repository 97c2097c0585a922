// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Supabase client: GoTrue auth endpoints and PostgREST profile lookup.
//!
//! Handles:
//! - Password sign-in and refresh-token grants
//! - Session persistence (durable blob + legacy mirror)
//! - Restoring and refreshing the persisted session at startup
//! - Server-side session revoke
//! - User metadata / password updates for settings screens
//! - Profile row lookup

use crate::config::Config;
use crate::error::{AuthError, Result};
use crate::models::{AuthChangeEvent, AuthEvent, Identity, Profile, Session, SignOutScope};
use crate::services::provider::{IdentityProvider, ProfileRepository};
use crate::storage::SessionPersistence;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;

const DEFAULT_HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Refresh the access token when it expires within this margin.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Buffered auth events per subscriber before it starts lagging.
const EVENT_CHANNEL_CAPACITY: usize = 32;

// ─────────────────────────────────────────────────────────────────────────────
// GoTrueClient - raw HTTP calls
// ─────────────────────────────────────────────────────────────────────────────

/// Thin HTTP client for the Supabase REST surface.
#[derive(Clone)]
pub struct GoTrueClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    profiles_table: String,
}

impl GoTrueClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building Supabase HTTP client")?;

        Ok(Self {
            http,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            profiles_table: config.profiles_table.clone(),
        })
    }

    /// POST /auth/v1/token?grant_type=password
    pub async fn password_grant(&self, email: &str, password: &str) -> Result<Session> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        match self.check_response_json::<Session>(response).await {
            Ok(session) => Ok(session.with_expiry_from(Utc::now())),
            Err(AuthError::Api { status: 400, message })
                if message.contains("invalid_grant")
                    || message.contains("invalid_credentials")
                    || message.contains("Invalid login credentials") =>
            {
                Err(AuthError::InvalidCredentials)
            }
            Err(e) => Err(e),
        }
    }

    /// POST /auth/v1/token?grant_type=refresh_token
    pub async fn refresh_grant(&self, refresh_token: &str) -> Result<Session> {
        let url = format!("{}/auth/v1/token?grant_type=refresh_token", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        let session: Session = self.check_response_json(response).await?;
        Ok(session.with_expiry_from(Utc::now()))
    }

    /// POST /auth/v1/logout?scope={scope}
    ///
    /// 401/403/404 mean the session is already gone server-side, which is
    /// what the caller wanted.
    pub async fn logout(&self, access_token: &str, scope: SignOutScope) -> Result<()> {
        let url = format!("{}/auth/v1/logout?scope={}", self.base_url, scope.as_str());
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status().as_u16() {
            401 | 403 | 404 => {
                tracing::debug!(status = %response.status(), "Session already revoked");
                Ok(())
            }
            _ => self.check_response(response).await,
        }
    }

    /// GET /auth/v1/user
    pub async fn get_user(&self, access_token: &str) -> Result<Identity> {
        let url = format!("{}/auth/v1/user", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        self.check_response_json(response).await
    }

    /// PUT /auth/v1/user
    pub async fn update_user(&self, access_token: &str, body: &Value) -> Result<Identity> {
        let url = format!("{}/auth/v1/user", self.base_url);
        let response = self
            .http
            .put(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .json(body)
            .send()
            .await?;

        self.check_response_json(response).await
    }

    /// GET /rest/v1/{table}?id=eq.{id}&select=*&limit=1
    pub async fn select_profile(
        &self,
        bearer: Option<&str>,
        identity_id: &str,
    ) -> Result<Option<Profile>> {
        let url = format!(
            "{}/rest/v1/{}?id=eq.{}&select=*&limit=1",
            self.base_url,
            self.profiles_table,
            urlencoding::encode(identity_id)
        );
        let response = self
            .http
            .get(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer.unwrap_or(&self.anon_key))
            .send()
            .await?;

        let rows: Vec<Profile> = self.check_response_json(response).await?;
        Ok(rows.into_iter().next())
    }

    /// Check response status and return error if not successful.
    async fn check_response(&self, response: reqwest::Response) -> Result<()> {
        if response.status().is_success() {
            return Ok(());
        }
        Err(Self::api_error(response).await)
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        response.json().await.map_err(|e| AuthError::Decode(e.to_string()))
    }

    async fn api_error(response: reqwest::Response) -> AuthError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        if status == 429 {
            tracing::warn!("Supabase rate limit hit (429)");
        }

        AuthError::Api {
            status,
            message: error_message(&body),
        }
    }
}

/// Pull a readable message out of a GoTrue/PostgREST error body.
///
/// GoTrue has used both `{error, error_description}` and
/// `{error_code, msg}` shapes; PostgREST uses `{code, message}`.
fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };

    let parts: Vec<&str> = ["error_code", "error", "code", "msg", "message", "error_description"]
        .iter()
        .filter_map(|field| value.get(*field).and_then(Value::as_str))
        .collect();

    if parts.is_empty() {
        body.to_string()
    } else {
        parts.join(": ")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SupabaseClient - session lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Supabase-backed identity provider and profile repository.
///
/// Owns the current session, persists it on every change and broadcasts
/// an [`AuthEvent`] for each transition.
pub struct SupabaseClient {
    api: GoTrueClient,
    persistence: SessionPersistence,
    current: RwLock<Option<Session>>,
    /// Serializes refresh-token grants; a refresh token is single-use.
    refresh_lock: Mutex<()>,
    events: broadcast::Sender<AuthEvent>,
}

impl SupabaseClient {
    pub fn new(config: &Config, persistence: SessionPersistence) -> Result<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            api: GoTrueClient::new(config)?,
            persistence,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            events,
        })
    }

    /// Session currently held in memory.
    pub async fn current_session(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    /// Exchange the current refresh token for a new session.
    ///
    /// Concurrent callers are serialized; whoever waited on the lock reuses
    /// the session the winner obtained.
    pub async fn refresh_session(&self) -> Result<Session> {
        let stale = self
            .current_session()
            .await
            .ok_or(AuthError::NotAuthenticated)?;

        let _guard = self.refresh_lock.lock().await;

        // Double-check: another task may have refreshed (or signed out)
        // while we waited
        let current = self
            .current_session()
            .await
            .ok_or(AuthError::NotAuthenticated)?;
        if current.refresh_token != stale.refresh_token {
            return Ok(current);
        }

        let session = self.api.refresh_grant(&stale.refresh_token).await?;

        // Signed out (or signed in again) while the grant was out
        let committed = self
            .commit_if_current(
                &stale.refresh_token,
                Some(AuthChangeEvent::TokenRefreshed),
                Some(session.clone()),
            )
            .await;
        if !committed {
            tracing::info!("Session replaced during refresh, discarding new tokens");
            return Err(AuthError::NotAuthenticated);
        }

        tracing::info!(identity_id = %session.user.id, "Access token refreshed");
        Ok(session)
    }

    /// Fetch the identity from the server with the current access token.
    pub async fn get_user(&self) -> Result<Identity> {
        let session = self
            .current_session()
            .await
            .ok_or(AuthError::NotAuthenticated)?;
        self.api.get_user(&session.access_token).await
    }

    /// Merge `data` into the identity's user metadata.
    pub async fn update_user_metadata(&self, data: Map<String, Value>) -> Result<Identity> {
        self.update_user(json!({ "data": Value::Object(data) })).await
    }

    /// Change the signed-in user's password.
    pub async fn update_password(&self, new_password: &str) -> Result<Identity> {
        self.update_user(json!({ "password": new_password })).await
    }

    async fn update_user(&self, body: Value) -> Result<Identity> {
        let session = self
            .current_session()
            .await
            .ok_or(AuthError::NotAuthenticated)?;

        let identity = self.api.update_user(&session.access_token, &body).await?;

        let refresh_token = session.refresh_token.clone();
        let updated = Session {
            user: identity.clone(),
            ..session
        };
        let committed = self
            .commit_if_current(
                &refresh_token,
                Some(AuthChangeEvent::UserUpdated),
                Some(updated),
            )
            .await;
        if !committed {
            return Err(AuthError::NotAuthenticated);
        }

        Ok(identity)
    }

    /// Periodically refresh the session before it expires.
    ///
    /// The task stops on its own once the client is dropped.
    pub fn spawn_auto_refresh(self: &Arc<Self>, every: std::time::Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(client) = weak.upgrade() else {
                    break;
                };
                client.auto_refresh_tick().await;
            }
        })
    }

    async fn auto_refresh_tick(&self) {
        let Some(session) = self.current_session().await else {
            return;
        };
        if !session.expires_within(Utc::now(), Duration::seconds(TOKEN_REFRESH_MARGIN_SECS)) {
            return;
        }

        match self.refresh_session().await {
            Ok(_) => {}
            Err(e) if e.is_refresh_token_error() => {
                let cleared = self
                    .commit_if_current(
                        &session.refresh_token,
                        Some(AuthChangeEvent::SignedOut),
                        None,
                    )
                    .await;
                if cleared {
                    tracing::warn!(error = %e, "Refresh token rejected, signed out locally");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Background token refresh failed, will retry");
            }
        }
    }

    /// Replace the in-memory session, mirror it to storage and announce
    /// the change.
    ///
    /// All three happen under the session write lock so storage and event
    /// order always follow memory. Storage failures are logged; the
    /// in-memory session stays authoritative for this process.
    async fn commit(&self, kind: AuthChangeEvent, session: Option<Session>) {
        let mut current = self.current.write().await;
        self.persist(session.as_ref()).await;
        *current = session.clone();
        self.emit(kind, session);
    }

    /// Like [`SupabaseClient::commit`], but only while the current session still
    /// carries `refresh_token`. Returns whether the change was applied.
    async fn commit_if_current(
        &self,
        refresh_token: &str,
        kind: Option<AuthChangeEvent>,
        session: Option<Session>,
    ) -> bool {
        let mut current = self.current.write().await;
        if current.as_ref().map(|c| c.refresh_token.as_str()) != Some(refresh_token) {
            return false;
        }
        self.persist(session.as_ref()).await;
        *current = session.clone();
        if let Some(kind) = kind {
            self.emit(kind, session);
        }
        true
    }

    async fn persist(&self, session: Option<&Session>) {
        let persisted = match session {
            Some(session) => match serde_json::to_string(session) {
                Ok(blob) => self.persistence.save(&blob).await,
                Err(e) => Err(e.into()),
            },
            None => self.persistence.clear().await,
        };
        if let Err(e) = persisted {
            tracing::warn!(error = %e, "Failed to persist session");
        }
    }

    fn emit(&self, kind: AuthChangeEvent, session: Option<Session>) {
        // No receivers is fine: nobody is listening yet
        let _ = self.events.send(AuthEvent::new(kind, session));
    }

    async fn load_persisted(&self) -> Result<Option<Session>> {
        let Some(blob) = self.persistence.load().await? else {
            return Ok(None);
        };

        match serde_json::from_str::<Session>(&blob) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable persisted session");
                self.persistence.clear().await?;
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseClient {
    async fn get_persisted_session(&self) -> Result<Option<Session>> {
        let margin = Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);

        if let Some(session) = self.current_session().await {
            if !session.expires_within(Utc::now(), margin) {
                return Ok(Some(session));
            }
        }

        let Some(session) = self.load_persisted().await? else {
            return Ok(None);
        };

        if !session.expires_within(Utc::now(), margin) {
            *self.current.write().await = Some(session.clone());
            return Ok(Some(session));
        }

        tracing::info!(identity_id = %session.user.id, "Persisted session expired, refreshing");
        let refresh_token = session.refresh_token.clone();
        *self.current.write().await = Some(session);

        match self.refresh_session().await {
            Ok(session) => Ok(Some(session)),
            Err(e) if e.is_refresh_token_error() => {
                tracing::info!(error = %e, "Persisted session no longer valid");
                self.commit_if_current(&refresh_token, None, None).await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn revoke_session(&self, scope: SignOutScope) -> Result<()> {
        // Local sign-out first: a refresh that finishes during the logout
        // request finds no current session and is discarded.
        let revoked = {
            let mut current = self.current.write().await;
            self.persist(None).await;
            let revoked = current.take();
            self.emit(AuthChangeEvent::SignedOut, None);
            revoked
        };

        match revoked {
            Some(session) => self.api.logout(&session.access_token, scope).await,
            None => Ok(()),
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let session = self.api.password_grant(email.trim(), password).await?;

        self.commit(AuthChangeEvent::SignedIn, Some(session.clone()))
            .await;

        tracing::info!(identity_id = %session.user.id, "Signed in with password");
        Ok(session)
    }
}

#[async_trait]
impl ProfileRepository for SupabaseClient {
    async fn fetch_profile(&self, identity_id: &str) -> Result<Option<Profile>> {
        let session = self.current_session().await;
        self.api
            .select_profile(session.as_ref().map(|s| s.access_token.as_str()), identity_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_shapes() {
        assert_eq!(
            error_message(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#),
            "invalid_grant: Invalid login credentials"
        );
        assert_eq!(
            error_message(r#"{"code":400,"error_code":"refresh_token_not_found","msg":"Invalid Refresh Token: Refresh Token Not Found"}"#),
            "refresh_token_not_found: Invalid Refresh Token: Refresh Token Not Found"
        );
        assert_eq!(error_message("upstream timeout"), "upstream timeout");
        assert_eq!(error_message("{}"), "{}");
    }
}
