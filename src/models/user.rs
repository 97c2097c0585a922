// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity and profile models.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Authenticated account as returned by the identity provider.
///
/// Only `id` and `email` are interpreted by this crate; the metadata maps
/// are kept verbatim so settings screens can round-trip them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque account ID (GoTrue user UUID)
    pub id: String,
    /// Email address (absent for phone-only accounts)
    #[serde(default)]
    pub email: Option<String>,
    /// Provider-side metadata (`raw_app_meta_data`)
    #[serde(default)]
    pub app_metadata: Map<String, Value>,
    /// User-editable metadata (`raw_user_meta_data`)
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
    /// Auth role claim ("authenticated")
    #[serde(default)]
    pub role: Option<String>,
    /// When the account was created (ISO 8601)
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Identity {
    /// Photo URL carried in the user metadata, if any.
    ///
    /// Settings screens write the uploaded avatar here before the profile
    /// row is updated, so a change forces a profile refetch.
    pub fn avatar_url(&self) -> Option<&str> {
        self.user_metadata
            .get("avatar_url")
            .and_then(Value::as_str)
    }

    /// Key that decides whether a loaded profile is still current.
    pub fn profile_key(&self) -> ProfileKey {
        ProfileKey {
            identity_id: self.id.clone(),
            avatar_url: self.avatar_url().map(str::to_string),
        }
    }
}

/// Identity fields a profile depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileKey {
    pub identity_id: String,
    pub avatar_url: Option<String>,
}

/// Display record stored in the `profiles` table, keyed by identity ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Same as `Identity::id`
    pub id: String,
    /// Display name
    #[serde(default)]
    pub full_name: Option<String>,
    /// Profile picture URL
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Account type ("founder", "investor", "admin", ...)
    #[serde(default, alias = "role")]
    pub user_type: Option<String>,
    /// Preferred UI locale ("en", "fr", ...)
    #[serde(default, alias = "language")]
    pub locale: Option<String>,
    /// Last update timestamp (ISO 8601)
    #[serde(default)]
    pub updated_at: Option<String>,
}
