// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - external auth/database collaborators.

pub mod provider;
pub mod supabase;

pub use provider::{IdentityProvider, ProfileRepository};
pub use supabase::{GoTrueClient, SupabaseClient};
