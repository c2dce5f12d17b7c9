//! Startup Coordination
//!
//! Migrations and the expired-record sweep run once, on a background task,
//! before any request may complete. The terminal state is fanned out through
//! a single-shot broadcast: waiters blocked before completion are all
//! released together, late subscribers observe the cached state immediately,
//! and a failure latches so every subsequent request sees it.

use tokio::sync::watch;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::migration::MigrationRunner;
use crate::sweeper::ExpiredRecordSweeper;

/// Terminal (or pending) state of the startup processes
#[derive(Debug, Clone)]
pub enum StartupState {
    /// Migrations or the sweep are still running
    Pending,
    /// Both processes completed; requests may proceed
    Ready,
    /// A migration step failed; requests fail with this latched cause
    Failed { version: u32, cause: String },
}

/// Single-shot broadcast gating all requests on startup completion
#[derive(Debug, Clone)]
pub struct StartupGate {
    state: watch::Receiver<StartupState>,
}

impl StartupGate {
    /// Run migrations, then the sweep, on a background task.
    pub fn spawn(runner: MigrationRunner, sweeper: ExpiredRecordSweeper) -> Self {
        let (tx, rx) = watch::channel(StartupState::Pending);

        tokio::spawn(async move {
            let state = match runner.run().await {
                Ok(report) => {
                    let swept = sweeper.sweep().await;
                    info!(
                        schema_version = report.to_version,
                        swept, "cache startup complete"
                    );
                    StartupState::Ready
                }
                Err(Error::MigrationFailed { version, cause }) => {
                    error!(version, %cause, "cache startup failed");
                    StartupState::Failed { version, cause }
                }
                Err(e) => {
                    error!(error = %e, "cache startup failed");
                    StartupState::Failed {
                        version: 0,
                        cause: e.to_string(),
                    }
                }
            };
            let _ = tx.send(state);
        });

        Self { state: rx }
    }

    /// Whether the gate has already released successfully.
    pub fn is_ready(&self) -> bool {
        matches!(*self.state.borrow(), StartupState::Ready)
    }

    /// Wait for the terminal state. Returns immediately once it is cached.
    pub async fn wait_ready(&self) -> Result<()> {
        let mut rx = self.state.clone();
        loop {
            let current = rx.borrow_and_update().clone();
            match current {
                StartupState::Ready => return Ok(()),
                StartupState::Failed { version, cause } => {
                    return Err(Error::MigrationFailed { version, cause });
                }
                StartupState::Pending => {}
            }

            if rx.changed().await.is_err() {
                // Startup task died without reporting; treat as latched failure
                return Err(Error::MigrationFailed {
                    version: 0,
                    cause: "startup task aborted".into(),
                });
            }
        }
    }

    /// Hand-driven gate for tests.
    #[cfg(test)]
    pub(crate) fn manual() -> (watch::Sender<StartupState>, Self) {
        let (tx, rx) = watch::channel(StartupState::Pending);
        (tx, Self { state: rx })
    }
}

// =============================================================================
// Tests
// =============================================================================
