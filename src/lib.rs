// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Pitchdesk auth: session store and admin gate for the Pitchdesk admin
//! dashboard.
//!
//! This crate resolves who is signed in against Supabase, keeps their
//! display profile alongside, and decides whether they may see the admin
//! screens, without flicker while sessions restore or refresh.

pub mod admin;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod session;
pub mod storage;

use admin::{AdminGate, AdminWatch, AllowList};
use config::Config;
use services::{IdentityProvider, ProfileRepository, SupabaseClient};
use session::{SessionStore, StoreOptions};
use std::sync::Arc;
use storage::{FileStorage, MemoryStorage, SessionPersistence};

/// Root composition: everything the dashboard shell needs, built once and
/// passed down explicitly.
pub struct AuthContext {
    pub config: Config,
    pub allow_list: Arc<AllowList>,
    pub store: SessionStore,
    pub admin: AdminWatch,
}

impl AuthContext {
    /// Wire the Supabase-backed stack from configuration.
    ///
    /// Returns the Supabase client too, for settings screens that update the
    /// user directly.
    pub fn from_config(config: Config) -> error::Result<(Self, Arc<SupabaseClient>)> {
        let local = FileStorage::new(config.session_dir.clone());
        tracing::debug!(dir = %local.dir().display(), key = %config.storage_key(), "Session storage");

        let persistence = SessionPersistence::new(
            Arc::new(local),
            Arc::new(MemoryStorage::new()),
            config.storage_key(),
        );
        let client = Arc::new(SupabaseClient::new(&config, persistence.clone())?);
        let context = Self::with_provider(config, client.clone(), client.clone(), persistence);
        Ok((context, client))
    }

    /// Wire the stack around any provider (tests, alternative backends).
    pub fn with_provider(
        config: Config,
        provider: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileRepository>,
        persistence: SessionPersistence,
    ) -> Self {
        let allow_list = Arc::new(AllowList::from_config(&config));
        let store = SessionStore::start(
            provider,
            profiles,
            persistence,
            StoreOptions::from(&config),
        );
        let gate = AdminGate::new(allow_list.clone(), config.admin_decision_timeout);
        let admin = AdminWatch::spawn(store.subscribe(), gate);

        Self {
            config,
            allow_list,
            store,
            admin,
        }
    }
}
