// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Drives an [`AdminGate`] from the session store.

use super::{AdminGate, AdminStatus};
use crate::session::SessionSnapshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Live admin status for the current session.
///
/// Stopping (or dropping) the watch drops the gate, and with it any
/// pending decision deadline.
pub struct AdminWatch {
    status: watch::Receiver<AdminStatus>,
    task: JoinHandle<()>,
}

/// Inputs the gate depends on; unchanged inputs are not re-fed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct GateInput {
    identity_id: Option<String>,
    email: Option<String>,
    loading: bool,
}

impl GateInput {
    fn of(snapshot: &SessionSnapshot) -> Self {
        Self {
            identity_id: snapshot.identity.as_ref().map(|i| i.id.clone()),
            email: snapshot.email().map(str::to_string),
            loading: snapshot.loading,
        }
    }
}

impl AdminWatch {
    /// Spawn the driver task. Must be called inside a tokio runtime.
    pub fn spawn(mut session: watch::Receiver<SessionSnapshot>, mut gate: AdminGate) -> Self {
        let (mut last_input, initial) = {
            let snapshot = session.borrow_and_update();
            let status = gate.observe(snapshot.identity.as_ref(), snapshot.loading, Instant::now());
            (GateInput::of(&snapshot), status)
        };

        let (tx, rx) = watch::channel(initial);

        let task = tokio::spawn(async move {
            loop {
                let deadline = gate.deadline();
                tokio::select! {
                    changed = session.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let status = {
                            let snapshot = session.borrow_and_update();
                            let input = GateInput::of(&snapshot);
                            if input == last_input {
                                continue;
                            }
                            last_input = input;
                            gate.observe(snapshot.identity.as_ref(), snapshot.loading, Instant::now())
                        };
                        publish(&tx, status);
                    }
                    _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                        if let Some(status) = gate.on_timeout(Instant::now()) {
                            publish(&tx, status);
                        }
                    }
                }
            }
            tracing::debug!("Admin watch stopped");
        });

        Self { status: rx, task }
    }

    pub fn status(&self) -> AdminStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AdminStatus> {
        self.status.clone()
    }

    /// Wait until the status is no longer loading.
    pub async fn wait_until_decided(&self) -> AdminStatus {
        let mut rx = self.subscribe();
        let decided = rx.wait_for(|status| !status.loading).await;
        match decided {
            Ok(status) => *status,
            Err(_) => self.status(),
        }
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for AdminWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn publish(tx: &watch::Sender<AdminStatus>, status: AdminStatus) {
    tx.send_if_modified(|current| {
        if *current == status {
            return false;
        }
        tracing::debug!(is_admin = status.is_admin, loading = status.loading, "Admin status");
        *current = status;
        true
    });
}
