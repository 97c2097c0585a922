// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Callback subscriptions on top of the store's watch channel.

use super::SessionSnapshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle returned by [`super::SessionStore::on_change`].
///
/// Dropping the handle unsubscribes as well.
#[derive(Debug)]
pub struct ListenerHandle {
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub(crate) fn spawn<F>(mut rx: watch::Receiver<SessionSnapshot>, mut listener: F) -> Self
    where
        F: FnMut(&SessionSnapshot) + Send + 'static,
    {
        // Only transitions after subscription are delivered
        rx.mark_unchanged();
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                listener(&snapshot);
            }
        });
        Self { task }
    }

    /// Stop delivering state transitions.
    pub fn unsubscribe(self) {
        // Drop does the work
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
