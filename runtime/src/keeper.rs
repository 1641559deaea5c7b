//! Background drivers: the upkeep keeper and the oracle callback pump.
//!
//! The controller never schedules itself. These tasks stand in for the
//! external scheduler and the oracle network's delivery channel; both stop
//! when their [`DriverHandle`] is shut down.

use crate::controller::IssuanceController;
use rwa_issuer_core::{KeeperConfig, OracleResponse};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to a spawned driver task.
#[derive(Debug)]
pub struct DriverHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DriverHandle {
    /// Signal the task to stop and wait for it to finish.
    pub async fn shutdown(self) {
        self.shutdown.send(true).ok();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Driver task ended abnormally");
        }
    }

    /// Whether the task has already exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Poll `check_ready` every `poll_interval` and remediate when ready.
///
/// Benign races (the request changed between check and act) are logged at
/// debug level; other failures are logged as errors and retried next tick.
#[must_use]
pub fn spawn_keeper(controller: Arc<IssuanceController>, config: KeeperConfig) -> DriverHandle {
    let (shutdown_tx, mut shutdown) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(poll_interval = ?config.poll_interval, "Keeper started");

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => run_upkeep(&controller).await,

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Keeper stopped");
    });

    DriverHandle {
        shutdown: shutdown_tx,
        task,
    }
}

async fn run_upkeep(controller: &IssuanceController) {
    let check = controller.check_ready(&[]).await;
    if !check.ready {
        return;
    }

    match controller.perform_remediation(&check.payload).await {
        Ok(action) => tracing::info!(?action, "Upkeep performed"),
        Err(e) if e.is_benign_race() => tracing::debug!(error = %e, "Upkeep skipped"),
        Err(e) => tracing::error!(error = %e, "Upkeep failed"),
    }
}

/// Feed oracle responses from `responses` into `on_callback`.
///
/// The pump stops on shutdown or when every sender has been dropped.
#[must_use]
pub fn spawn_callback_pump(
    controller: Arc<IssuanceController>,
    mut responses: mpsc::Receiver<OracleResponse>,
) -> DriverHandle {
    let (shutdown_tx, mut shutdown) = watch::channel(false);

    let task = tokio::spawn(async move {
        while !*shutdown.borrow() {
            tokio::select! {
                response = responses.recv() => {
                    let Some(response) = response else {
                        tracing::info!("Oracle response channel closed");
                        break;
                    };
                    let request_id = response.request_id;
                    match controller.on_callback(response).await {
                        Ok(outcome) => tracing::debug!(%request_id, ?outcome, "Callback processed"),
                        Err(e) if e.is_benign_race() => {
                            tracing::warn!(%request_id, error = %e, "Callback rejected");
                        }
                        Err(e) => tracing::error!(%request_id, error = %e, "Callback failed"),
                    }
                }

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Callback pump stopped");
    });

    DriverHandle {
        shutdown: shutdown_tx,
        task,
    }
}
