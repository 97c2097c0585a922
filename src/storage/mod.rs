// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Key-value storage for the persisted session blob.
//!
//! Two scopes are used: a durable store that survives restarts (the
//! session blob under `sb-<ref>-auth-token`) and a process-scoped store
//! that mirrors the blob under [`LEGACY_SESSION_KEY`] for older screens.

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Key of the session-scoped mirror read by legacy screens.
pub const LEGACY_SESSION_KEY: &str = "authUser";

/// String key-value store.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Durable and session-scoped storage plus the well-known key.
#[derive(Clone)]
pub struct SessionPersistence {
    pub local: Arc<dyn SessionStorage>,
    pub session: Arc<dyn SessionStorage>,
    pub storage_key: String,
}

impl SessionPersistence {
    pub fn new(
        local: Arc<dyn SessionStorage>,
        session: Arc<dyn SessionStorage>,
        storage_key: impl Into<String>,
    ) -> Self {
        Self {
            local,
            session,
            storage_key: storage_key.into(),
        }
    }

    /// In-memory persistence for tests and ephemeral CLI runs.
    pub fn in_memory(storage_key: impl Into<String>) -> Self {
        Self::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryStorage::new()),
            storage_key,
        )
    }

    /// Read the durable blob.
    pub async fn load(&self) -> Result<Option<String>> {
        self.local.get(&self.storage_key).await
    }

    /// Write the blob to the durable key and mirror it to the legacy key.
    pub async fn save(&self, blob: &str) -> Result<()> {
        self.local.set(&self.storage_key, blob).await?;
        self.session.set(LEGACY_SESSION_KEY, blob).await
    }

    /// Remove both copies.
    ///
    /// Both removals are attempted even if the first one fails; the first
    /// error is returned.
    pub async fn clear(&self) -> Result<()> {
        let local = self.local.remove(&self.storage_key).await;
        let session = self.session.remove(LEGACY_SESSION_KEY).await;
        local.and(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_mirrors_and_clear_removes_both_keys() {
        let persistence = SessionPersistence::in_memory("sb-test-auth-token");

        persistence.save("{\"access_token\":\"at\"}").await.unwrap();
        assert_eq!(
            persistence.local.get("sb-test-auth-token").await.unwrap(),
            Some("{\"access_token\":\"at\"}".to_string())
        );
        assert_eq!(
            persistence.session.get(LEGACY_SESSION_KEY).await.unwrap(),
            Some("{\"access_token\":\"at\"}".to_string())
        );

        persistence.clear().await.unwrap();
        assert!(persistence.load().await.unwrap().is_none());
        assert!(persistence
            .session
            .get(LEGACY_SESSION_KEY)
            .await
            .unwrap()
            .is_none());

        // Clearing twice is fine
        persistence.clear().await.unwrap();
    }
}
