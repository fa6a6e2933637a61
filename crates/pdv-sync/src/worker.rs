//! # Sync Worker
//!
//! Runs [`SyncPass`] in the background on a fixed interval, plus on demand.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SyncWorker loop                                │
//! │                                                                         │
//! │   interval.tick() ─────┐                                                │
//! │                        ├──► run_once() ──► last_report                  │
//! │   handle.trigger() ────┘        │                                       │
//! │                                 └─✗ store error: logged, loop goes on   │
//! │                                                                         │
//! │   handle.shutdown() ──► loop exits after the pass in progress           │
//! │                                                                         │
//! │  TIMING:                                                                │
//! │  • Interval: api.sync.interval_secs (default 60)                        │
//! │  • First pass runs immediately                                          │
//! │  • Missed ticks are delayed, never bunched                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info};

use crate::error::{SyncError, SyncResult};
use crate::pass::{SyncPass, SyncReport};

pub struct SyncWorker {
    pass: SyncPass,
    interval: Duration,
    trigger_rx: mpsc::Receiver<()>,
    shutdown_rx: mpsc::Receiver<()>,
    last_report: Arc<RwLock<Option<SyncReport>>>,
}

/// Controls a running [`SyncWorker`].
#[derive(Clone)]
pub struct SyncWorkerHandle {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
    last_report: Arc<RwLock<Option<SyncReport>>>,
}

impl SyncWorkerHandle {
    /// Asks for a pass now. A request made while one is already queued is
    /// folded into it.
    pub fn trigger(&self) -> SyncResult<()> {
        match self.trigger_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(SyncError::ChannelError("Sync worker stopped".into()))
            }
        }
    }

    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Shutdown channel closed".into()))
    }

    /// Report of the most recent finished pass.
    pub async fn last_report(&self) -> Option<SyncReport> {
        self.last_report.read().await.clone()
    }
}

impl SyncWorker {
    pub fn new(pass: SyncPass, interval: Duration) -> (Self, SyncWorkerHandle) {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let last_report = Arc::new(RwLock::new(None));

        let worker = SyncWorker {
            pass,
            interval,
            trigger_rx,
            shutdown_rx,
            last_report: last_report.clone(),
        };
        let handle = SyncWorkerHandle {
            trigger_tx,
            shutdown_tx,
            last_report,
        };
        (worker, handle)
    }

    /// Runs until shut down. Spawn this as a background task.
    pub async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs(), "Sync worker starting");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => self.run_pass("interval").await,

                Some(()) = self.trigger_rx.recv() => self.run_pass("trigger").await,

                _ = self.shutdown_rx.recv() => {
                    info!("Sync worker shutting down");
                    break;
                }
            }
        }

        info!("Sync worker stopped");
    }

    async fn run_pass(&self, reason: &str) {
        debug!(reason, "Sync pass requested");
        match self.pass.run_once().await {
            Ok(report) => *self.last_report.write().await = Some(report),
            Err(e) => error!(error = %e, reason, "Sync pass aborted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiSettings;
    use crate::remote::mock::MockRemote;
    use crate::retry::RetryPolicy;
    use pdv_core::{Money, ProductData};
    use pdv_db::{Database, DbConfig};

    async fn worker(interval: Duration) -> (Database, MockRemote, SyncWorker, SyncWorkerHandle) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let remote = MockRemote::new();
        let pass = SyncPass::new(db.clone(), Arc::new(remote.clone()), ApiSettings::default())
            .with_retry_policy(RetryPolicy::none());
        let (worker, handle) = SyncWorker::new(pass, interval);
        (db, remote, worker, handle)
    }

    async fn wait_for_report(handle: &SyncWorkerHandle) -> SyncReport {
        for _ in 0..200 {
            if let Some(report) = handle.last_report().await {
                return report;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no sync report");
    }

    #[tokio::test]
    async fn test_first_pass_runs_immediately() {
        let (db, remote, worker, handle) = worker(Duration::from_secs(3600)).await;
        db.products()
            .insert(ProductData {
                name: "Café 500g".into(),
                price: Money::from_cents(1890),
                is_active: true,
                ..Default::default()
            })
            .await
            .unwrap();

        let task = tokio::spawn(worker.run());
        let report = wait_for_report(&handle).await;
        assert_eq!(report.products.pushed, 1);
        assert_eq!(remote.calls_to("POST").len(), 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_trigger_runs_another_pass() {
        let (db, remote, worker, handle) = worker(Duration::from_secs(3600)).await;
        let task = tokio::spawn(worker.run());
        wait_for_report(&handle).await;
        let gets_before = remote.calls_to("GET").len();

        db.products()
            .insert(ProductData {
                name: "Leite 1L".into(),
                price: Money::from_cents(549),
                is_active: true,
                ..Default::default()
            })
            .await
            .unwrap();
        handle.trigger().unwrap();

        for _ in 0..200 {
            if remote.calls_to("POST").len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(remote.calls_to("POST").len(), 1);
        assert!(remote.calls_to("GET").len() > gets_before);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_trigger_after_stop_is_an_error() {
        let (_db, _remote, worker, handle) = worker(Duration::from_secs(3600)).await;
        let task = tokio::spawn(worker.run());
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert!(matches!(handle.trigger(), Err(SyncError::ChannelError(_))));
    }
}
