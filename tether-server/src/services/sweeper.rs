//! SweeperService - periodic reconciliation
//!
//! Runs `LifecycleManager::run_sweep` on a fixed interval, independent of
//! incoming notifications. On-demand passes (`POST /api/sweep`) share the
//! same manager, so per-template serialization still applies.

use std::sync::Arc;
use tether_core::{LifecycleManager, SweepReport};
use tokio::sync::{Mutex, RwLock};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

/// Handle for the running sweep task
struct SweeperHandle {
    abort_handle: tokio::task::AbortHandle,
    interval: Duration,
}

/// SweeperService owns the background sweep task
pub struct SweeperService {
    manager: Arc<LifecycleManager>,
    handle: RwLock<Option<SweeperHandle>>,
    last_report: RwLock<Option<SweepReport>>,
    /// Lock for starting/stopping operations
    operation_lock: Mutex<()>,
}

impl SweeperService {
    pub fn new(manager: Arc<LifecycleManager>) -> Self {
        Self {
            manager,
            handle: RwLock::new(None),
            last_report: RwLock::new(None),
            operation_lock: Mutex::new(()),
        }
    }

    /// Run one pass now and remember its report.
    pub async fn run_now(&self) -> tether_core::Result<SweepReport> {
        let report = self.manager.run_sweep().await?;
        *self.last_report.write().await = Some(report.clone());
        Ok(report)
    }

    /// Start sweeping every `every`. Restarts a running task.
    pub async fn start(self: Arc<Self>, every: Duration) {
        let _lock = self.operation_lock.lock().await;
        self.stop_inner().await;

        info!(interval_secs = every.as_secs(), "Starting sweeper");

        let service = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(e) = service.run_now().await {
                    error!(error = %e, "Sweep pass failed");
                }
            }
        });

        *self.handle.write().await = Some(SweeperHandle {
            abort_handle: handle.abort_handle(),
            interval: every,
        });
    }

    /// Stop sweeping (internal, assumes lock is held)
    async fn stop_inner(&self) {
        if let Some(handle) = self.handle.write().await.take() {
            handle.abort_handle.abort();
            info!("Stopped sweeper");
        }
    }

    pub async fn stop(&self) {
        let _lock = self.operation_lock.lock().await;
        self.stop_inner().await;
    }

    pub async fn is_running(&self) -> bool {
        self.handle.read().await.is_some()
    }

    /// Interval of the running task, if any.
    pub async fn interval(&self) -> Option<Duration> {
        self.handle.read().await.as_ref().map(|h| h.interval)
    }

    pub async fn last_report(&self) -> Option<SweepReport> {
        self.last_report.read().await.clone()
    }
}
