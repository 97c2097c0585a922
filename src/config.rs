// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Everything is read once at startup. The admin allow-list is parsed from
//! `ADMIN_EMAILS` by [`crate::admin::AllowList::from_config`].

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default upper bound for the profile lookup after sign-in.
pub const DEFAULT_PROFILE_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
/// Default upper bound before the admin gate forces a decision.
pub const DEFAULT_ADMIN_DECISION_TIMEOUT: Duration = Duration::from_secs(5);
/// Default upper bound for the remote session revoke on sign-out.
pub const DEFAULT_SIGN_OUT_TIMEOUT: Duration = Duration::from_secs(3);
/// Table holding one display profile per auth user.
pub const DEFAULT_PROFILES_TABLE: &str = "profiles";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Supabase project URL (`https://<ref>.supabase.co`)
    pub supabase_url: String,
    /// Public anon key sent as `apikey`
    pub supabase_anon_key: String,
    /// Raw comma-separated administrator emails
    pub admin_emails: String,
    /// PostgREST table with display profiles
    pub profiles_table: String,
    /// Directory for the persisted session blob
    pub session_dir: PathBuf,
    pub profile_fetch_timeout: Duration,
    pub admin_decision_timeout: Duration,
    pub sign_out_timeout: Duration,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test_anon_key".to_string(),
            admin_emails: String::new(),
            profiles_table: DEFAULT_PROFILES_TABLE.to_string(),
            session_dir: PathBuf::from(".pitchdesk"),
            profile_fetch_timeout: DEFAULT_PROFILE_FETCH_TIMEOUT,
            admin_decision_timeout: DEFAULT_ADMIN_DECISION_TIMEOUT,
            sign_out_timeout: DEFAULT_SIGN_OUT_TIMEOUT,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honored for local
    /// development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            supabase_url: env::var("SUPABASE_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_URL"))?,
            supabase_anon_key: env::var("SUPABASE_ANON_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_ANON_KEY"))?,
            admin_emails: env::var("ADMIN_EMAILS").unwrap_or_default(),
            profiles_table: env::var("PROFILES_TABLE")
                .unwrap_or_else(|_| DEFAULT_PROFILES_TABLE.to_string()),
            session_dir: env::var("SESSION_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".pitchdesk")),
            profile_fetch_timeout: duration_ms_var(
                "PROFILE_FETCH_TIMEOUT_MS",
                DEFAULT_PROFILE_FETCH_TIMEOUT,
            )?,
            admin_decision_timeout: duration_ms_var(
                "ADMIN_DECISION_TIMEOUT_MS",
                DEFAULT_ADMIN_DECISION_TIMEOUT,
            )?,
            sign_out_timeout: duration_ms_var("SIGN_OUT_TIMEOUT_MS", DEFAULT_SIGN_OUT_TIMEOUT)?,
        })
    }

    /// Supabase project reference (first label of the URL host).
    pub fn project_ref(&self) -> String {
        reqwest::Url::parse(&self.supabase_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .and_then(|host| host.split('.').next().map(str::to_string))
            .unwrap_or_else(|| "local".to_string())
    }

    /// Storage key of the persisted session blob.
    pub fn storage_key(&self) -> String {
        format!("sb-{}-auth-token", self.project_ref())
    }
}

fn duration_ms_var(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
