// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Pitchdesk auth CLI
//!
//! Drives the session store and admin gate against the configured Supabase
//! project: inspect the persisted session, sign in or out, or follow state
//! transitions live.

use clap::{Parser, Subcommand};
use pitchdesk_auth::{config::Config, models::SignOutScope, AuthContext};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often the background task checks whether the token needs a refresh.
const AUTO_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "pitchdesk-auth", version, about = "Pitchdesk session and admin gate")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the restored session, profile and admin status
    Status,
    /// Sign in with email and password
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PITCHDESK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and clear the persisted session
    SignOut {
        #[arg(long, default_value = "local")]
        scope: SignOutScope,
    },
    /// Print every session and admin transition until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    tracing::info!(project = %config.project_ref(), "Starting Pitchdesk auth");

    let (context, client) = AuthContext::from_config(config)?;

    match cli.command {
        Command::Status => {
            let snapshot = context.store.wait_until_settled().await;
            let admin = context.admin.wait_until_decided().await;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "identity": snapshot.identity,
                    "profile": snapshot.profile,
                    "is_admin": admin.is_admin,
                }))?
            );
        }
        Command::SignIn { email, password } => {
            context.store.wait_until_settled().await;
            let identity = context.store.sign_in_with_password(&email, &password).await?;
            let admin = context.admin.wait_until_decided().await;
            println!(
                "Signed in as {} (admin: {})",
                identity.email.as_deref().unwrap_or(&identity.id),
                admin.is_admin
            );
        }
        Command::SignOut { scope } => {
            context.store.wait_until_settled().await;
            context.store.sign_out_with_scope(scope).await;
            println!("Signed out");
        }
        Command::Watch => {
            let _refresh = client.spawn_auto_refresh(AUTO_REFRESH_INTERVAL);
            let _listener = context.store.on_change(|snapshot| {
                tracing::info!(
                    identity = snapshot.email().unwrap_or("<none>"),
                    has_profile = snapshot.profile.is_some(),
                    loading = snapshot.loading,
                    "Session changed"
                );
            });
            let mut admin = context.admin.subscribe();
            loop {
                tokio::select! {
                    changed = admin.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let status = *admin.borrow_and_update();
                        tracing::info!(is_admin = status.is_admin, loading = status.loading, "Admin status changed");
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }

    context.store.dispose();
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pitchdesk_auth=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
