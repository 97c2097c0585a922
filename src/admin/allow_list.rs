// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Static administrator allow-list.

use super::AdminPolicy;
use crate::config::Config;
use std::collections::HashSet;

/// Trim and lowercase an email for comparison.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Set of administrator emails, normalized at parse time.
///
/// An empty list denies everyone.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    emails: HashSet<String>,
}

impl AllowList {
    /// Parse a comma-separated list. Blank entries are ignored.
    pub fn parse(raw: &str) -> Self {
        let emails = raw
            .split(',')
            .map(normalize_email)
            .filter(|email| !email.is_empty())
            .collect();
        Self { emails }
    }

    /// Build the process-wide list from configuration.
    ///
    /// Call once at startup: an empty list is logged here and nowhere else.
    pub fn from_config(config: &Config) -> Self {
        let list = Self::parse(&config.admin_emails);
        if list.is_empty() {
            tracing::warn!("ADMIN_EMAILS is empty; administrative access is denied to everyone");
        } else {
            tracing::info!(count = list.len(), "Admin allow-list loaded");
        }
        list
    }

    pub fn contains(&self, email: &str) -> bool {
        !self.emails.is_empty() && self.emails.contains(&normalize_email(email))
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }
}

impl AdminPolicy for AllowList {
    fn is_admin(&self, normalized_email: &str) -> bool {
        self.contains(normalized_email)
    }
}
