// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types for the identity provider and session storage.

/// Errors returned by provider calls and explicit user actions.
///
/// Session and admin-gate code paths never hand these to their callers;
/// they log them and settle into a fallback state instead.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("No active session")]
    NotAuthenticated,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Supabase API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// GoTrue error code for an unusable refresh token.
    pub const REFRESH_TOKEN_ERROR: &'static str = "refresh_token_not_found";

    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Network(_) | AuthError::Timeout(_) => true,
            AuthError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether the server rejected the refresh token (revoked, reused or
    /// expired). The persisted session is useless after this.
    pub fn is_refresh_token_error(&self) -> bool {
        match self {
            AuthError::Api { status, message } => {
                (*status == 400 || *status == 401)
                    && (message.contains(Self::REFRESH_TOKEN_ERROR)
                        || message.contains("Invalid Refresh Token")
                        || message.contains("invalid_grant"))
            }
            AuthError::NotAuthenticated => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AuthError::Decode(err.to_string())
        } else {
            AuthError::Network(err.to_string())
        }
    }
}

impl From<std::io::Error> for AuthError {
    fn from(err: std::io::Error) -> Self {
        AuthError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::Decode(err.to_string())
    }
}

/// Result type alias for provider calls
pub type Result<T> = std::result::Result<T, AuthError>;
