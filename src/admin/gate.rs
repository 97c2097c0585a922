// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Anti-flicker admin decision state machine.
//!
//! Session resolution upstream is asynchronous and multi-step: the
//! identity can disappear for a moment while a session is restored or
//! refreshed. The gate therefore:
//! - reuses the last decision when the normalized email is unchanged,
//!   without consulting the policy again;
//! - never settles to `false` while the identity is still loading, and
//!   keeps serving the previous decision (flagged `loading`) instead;
//! - arms a deadline when loading starts with no decision at all, and
//!   forces a decision once it passes so the gate cannot hang.
//!
//! The gate is pure: time is passed in, and [`super::AdminWatch`] drives it
//! from the session store.

use super::{normalize_email, AdminPolicy};
use crate::models::Identity;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Result consumers render from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminStatus {
    pub is_admin: bool,
    /// The decision is pending or may be stale
    pub loading: bool,
}

impl AdminStatus {
    pub const PENDING: AdminStatus = AdminStatus {
        is_admin: false,
        loading: true,
    };

    pub const fn settled(is_admin: bool) -> Self {
        Self {
            is_admin,
            loading: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    /// Nothing observed yet
    Unknown,
    /// Identity is loading and no decision exists; a decision is forced
    /// once `timeout` has passed since `since`
    Deciding { since: Instant },
    /// Decision for `email` (`None` when there is no identity)
    Decided {
        email: Option<String>,
        is_admin: bool,
    },
}

pub struct AdminGate {
    policy: Arc<dyn AdminPolicy>,
    timeout: Duration,
    state: GateState,
    last_email: Option<String>,
    status: AdminStatus,
}

impl AdminGate {
    pub fn new(policy: Arc<dyn AdminPolicy>, timeout: Duration) -> Self {
        Self {
            policy,
            timeout,
            state: GateState::Unknown,
            last_email: None,
            status: AdminStatus::PENDING,
        }
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn status(&self) -> AdminStatus {
        self.status
    }

    /// When [`AdminGate::on_timeout`] should be called, if at all.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            GateState::Deciding { since } => Some(since + self.timeout),
            _ => None,
        }
    }

    /// Feed the current identity and its loading flag.
    pub fn observe(
        &mut self,
        identity: Option<&Identity>,
        identity_loading: bool,
        now: Instant,
    ) -> AdminStatus {
        let email = identity
            .and_then(|identity| identity.email.as_deref())
            .map(normalize_email)
            .filter(|email| !email.is_empty());

        if let Some(email) = email {
            self.last_email = Some(email.clone());

            if let GateState::Decided {
                email: Some(cached),
                is_admin,
            } = &self.state
            {
                if *cached == email {
                    self.status = AdminStatus::settled(*is_admin);
                    return self.status;
                }
            }

            let is_admin = self.policy.is_admin(&email);
            tracing::debug!(email = %email, is_admin, "Admin decision computed");
            self.state = GateState::Decided {
                email: Some(email),
                is_admin,
            };
            self.status = AdminStatus::settled(is_admin);
            return self.status;
        }

        if !identity_loading {
            self.last_email = None;
            self.state = GateState::Decided {
                email: None,
                is_admin: false,
            };
            self.status = AdminStatus::settled(false);
            return self.status;
        }

        match &self.state {
            GateState::Decided { is_admin, .. } => {
                // Stale but available while the session resolves
                self.status = AdminStatus {
                    is_admin: *is_admin,
                    loading: true,
                };
            }
            GateState::Deciding { .. } => {
                self.status = AdminStatus::PENDING;
            }
            GateState::Unknown => {
                self.state = GateState::Deciding { since: now };
                self.status = AdminStatus::PENDING;
            }
        }
        self.status
    }

    /// Force a decision if the deadline has passed. Fires at most once per
    /// armed deadline.
    pub fn on_timeout(&mut self, now: Instant) -> Option<AdminStatus> {
        let deadline = self.deadline()?;
        if now < deadline {
            return None;
        }

        let email = self.last_email.clone();
        let is_admin = email
            .as_deref()
            .is_some_and(|email| self.policy.is_admin(email));

        tracing::warn!(
            timeout_ms = self.timeout.as_millis() as u64,
            is_admin,
            "Identity still loading, forcing admin decision"
        );

        self.state = GateState::Decided { email, is_admin };
        self.status = AdminStatus::settled(is_admin);
        Some(self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::AllowList;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Policy that counts how often it is consulted.
    struct CountingPolicy {
        inner: AllowList,
        calls: AtomicUsize,
    }

    impl AdminPolicy for CountingPolicy {
        fn is_admin(&self, email: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.is_admin(email)
        }
    }

    fn counting(raw: &str) -> Arc<CountingPolicy> {
        Arc::new(CountingPolicy {
            inner: AllowList::parse(raw),
            calls: AtomicUsize::new(0),
        })
    }

    fn identity(email: &str) -> Identity {
        Identity {
            id: format!("id-{email}"),
            email: Some(email.to_string()),
            app_metadata: Default::default(),
            user_metadata: Default::default(),
            role: None,
            created_at: None,
        }
    }

    #[test]
    fn allow_listed_email_is_admin_regardless_of_case() {
        let mut gate = AdminGate::new(Arc::new(AllowList::parse("admin@co.com")), TIMEOUT);
        let now = Instant::now();

        let status = gate.observe(Some(&identity("Admin@Co.com")), false, now);
        assert_eq!(status, AdminStatus::settled(true));
    }

    #[test]
    fn same_email_reuses_decision_without_policy_call() {
        let policy = counting("a@x.com");
        let mut gate = AdminGate::new(policy.clone(), TIMEOUT);
        let now = Instant::now();

        assert_eq!(
            gate.observe(Some(&identity("a@x.com")), false, now),
            AdminStatus::settled(true)
        );
        assert_eq!(policy.calls.load(Ordering::SeqCst), 1);

        let status = gate.observe(Some(&identity("A@X.com ")), false, now);
        assert_eq!(status, AdminStatus::settled(true));
        assert_eq!(policy.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn loading_pulse_keeps_previous_decision() {
        let policy = counting("a@x.com");
        let mut gate = AdminGate::new(policy.clone(), TIMEOUT);
        let now = Instant::now();

        gate.observe(Some(&identity("a@x.com")), false, now);

        // Identity disappears while the session refreshes
        let status = gate.observe(None, true, now);
        assert_eq!(
            status,
            AdminStatus {
                is_admin: true,
                loading: true
            }
        );
        assert!(gate.deadline().is_none());

        let status = gate.observe(Some(&identity("a@x.com")), false, now);
        assert_eq!(status, AdminStatus::settled(true));
        assert_eq!(policy.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_identity_and_not_loading_settles_false() {
        let mut gate = AdminGate::new(Arc::new(AllowList::parse("a@x.com")), TIMEOUT);
        let now = Instant::now();

        gate.observe(Some(&identity("a@x.com")), false, now);
        let status = gate.observe(None, false, now);
        assert_eq!(status, AdminStatus::settled(false));
        assert_eq!(
            gate.state(),
            &GateState::Decided {
                email: None,
                is_admin: false
            }
        );
    }

    #[test]
    fn timeout_forces_false_exactly_once() {
        let policy = counting("a@x.com");
        let mut gate = AdminGate::new(policy.clone(), TIMEOUT);
        let start = Instant::now();

        assert_eq!(gate.observe(None, true, start), AdminStatus::PENDING);
        assert_eq!(gate.deadline(), Some(start + TIMEOUT));
        assert_eq!(gate.state(), &GateState::Deciding { since: start });

        // Still loading: the deadline is not re-armed
        gate.observe(None, true, start + Duration::from_secs(2));
        assert_eq!(gate.deadline(), Some(start + TIMEOUT));

        assert_eq!(gate.on_timeout(start + Duration::from_secs(4)), None);
        assert_eq!(
            gate.on_timeout(start + TIMEOUT),
            Some(AdminStatus::settled(false))
        );
        assert_eq!(gate.deadline(), None);
        assert_eq!(gate.on_timeout(start + TIMEOUT * 2), None);
        assert_eq!(policy.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn identity_before_deadline_disarms_timer() {
        let mut gate = AdminGate::new(Arc::new(AllowList::parse("a@x.com")), TIMEOUT);
        let start = Instant::now();

        gate.observe(None, true, start);
        let status = gate.observe(Some(&identity("a@x.com")), true, start + Duration::from_secs(1));

        assert_eq!(status, AdminStatus::settled(true));
        assert_eq!(gate.deadline(), None);
        assert_eq!(gate.on_timeout(start + TIMEOUT), None);
    }

    #[test]
    fn empty_allow_list_denies_all() {
        let mut gate = AdminGate::new(Arc::new(AllowList::parse("")), TIMEOUT);
        let now = Instant::now();

        for email in ["admin@co.com", "", "  ", "ADMIN@CO.COM"] {
            let status = gate.observe(Some(&identity(email)), false, now);
            assert!(!status.is_admin, "{email:?} must not be admin");
        }
    }

    #[test]
    fn signed_out_while_deciding_disarms_timer() {
        let mut gate = AdminGate::new(Arc::new(AllowList::parse("a@x.com")), TIMEOUT);
        let start = Instant::now();

        gate.observe(None, true, start);
        assert_eq!(gate.observe(None, false, start), AdminStatus::settled(false));
        assert_eq!(gate.deadline(), None);
        assert_eq!(gate.on_timeout(start + TIMEOUT), None);
    }
}
