// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin authorization: allow-list policy and the anti-flicker gate.

pub mod allow_list;
pub mod gate;
pub mod watch;

pub use allow_list::{normalize_email, AllowList};
pub use gate::{AdminGate, AdminStatus, GateState};
pub use watch::AdminWatch;

/// Decides whether a (normalized) email belongs to an administrator.
pub trait AdminPolicy: Send + Sync {
    fn is_admin(&self, normalized_email: &str) -> bool;
}
