// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session store: who is signed in, and their display profile.

pub mod listener;
pub mod store;

pub use listener::ListenerHandle;
pub use store::{SessionSnapshot, SessionStore, StoreOptions};
