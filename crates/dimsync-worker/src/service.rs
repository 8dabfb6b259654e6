//! Interval scheduling for the reconciliation loop.
//!
//! Ticks run on a single task and never overlap: a slow tick delays the next
//! one (missed ticks are skipped). Shutdown is observed between ticks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::reconcile::ReconciliationLoop;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub tick_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10),
        }
    }
}

pub struct ReconciliationService {
    reconciler: Arc<ReconciliationLoop>,
    config: ServiceConfig,
}

/// Handle to a running service. Dropping it also stops the service.
pub struct ServiceHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl ReconciliationService {
    pub fn new(reconciler: Arc<ReconciliationLoop>, config: ServiceConfig) -> Self {
        Self { reconciler, config }
    }

    /// Spawn the interval loop. The first tick fires immediately.
    pub fn start(self) -> ServiceHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            tracing::info!(
                tick_interval_secs = self.config.tick_interval.as_secs_f64(),
                "Reconciliation service started"
            );

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Reconciliation service shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        match self.reconciler.run_tick().await {
                            Ok(report) => {
                                tracing::debug!(selected = report.selected, "Tick finished");
                            }
                            Err(e) => {
                                // already logged at error level by run_tick
                                tracing::debug!(error = %e, "Tick abandoned, waiting for the next one");
                            }
                        }
                    }
                }
            }
        });

        ServiceHandle { shutdown_tx, join }
    }
}

impl ServiceHandle {
    /// Signal the loop to stop and wait for the current tick to finish.
    pub async fn shutdown(self) {
        tracing::info!("Initiating reconciliation service shutdown");
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "Reconciliation service task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
