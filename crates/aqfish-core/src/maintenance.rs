use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::info;

use aqfish_domain::NodeUid;
use aqfish_store::StateStore;

use crate::error::CoreError;

/// Shared maintenance/shutdown intent for one node (§4.8). `PickupLoop`
/// reads `is_maintenance()` when casting Votes; a supervisor polls
/// `should_terminate()` to decide when to stop accepting new work and exit.
pub struct MaintenanceController {
    store: Arc<dyn StateStore>,
    node_uid: NodeUid,
    maintenance: Arc<AtomicBool>,
    shutdown_requested: AtomicBool,
    /// Unix millis of the shutdown request; `i64::MIN` means "none pending".
    requested_at_millis: AtomicI64,
    shutdown_delay_millis: AtomicI64,
    pub terminated: Notify,
}

const NO_REQUEST: i64 = i64::MIN;

impl MaintenanceController {
    pub fn new(store: Arc<dyn StateStore>, node_uid: NodeUid, maintenance: Arc<AtomicBool>) -> Self {
        Self {
            store,
            node_uid,
            maintenance,
            shutdown_requested: AtomicBool::new(false),
            requested_at_millis: AtomicI64::new(NO_REQUEST),
            shutdown_delay_millis: AtomicI64::new(0),
            terminated: Notify::new(),
        }
    }

    pub fn maintenance_flag(&self) -> Arc<AtomicBool> {
        self.maintenance.clone()
    }

    /// Toggle maintenance mode. Independent of shutdown intent (§4.8).
    pub fn set_maintenance(&self, enable: bool) {
        self.maintenance.store(enable, Ordering::Relaxed);
        info!(node_uid = %self.node_uid, enable, "maintenance mode toggled");
    }

    /// `shutdown=true` arms termination after `delay` elapses and this
    /// node's locally-owned work has drained; `shutdown=false` cancels any
    /// pending request (§4.8).
    pub fn request_shutdown(&self, shutdown: bool, delay: std::time::Duration) {
        if !shutdown {
            self.shutdown_requested.store(false, Ordering::Relaxed);
            self.requested_at_millis.store(NO_REQUEST, Ordering::Relaxed);
            info!(node_uid = %self.node_uid, "shutdown request cancelled");
            return;
        }
        self.shutdown_requested.store(true, Ordering::Relaxed);
        self.requested_at_millis
            .store(now_millis(), Ordering::Relaxed);
        self.shutdown_delay_millis
            .store(delay.as_millis() as i64, Ordering::Relaxed);
        info!(node_uid = %self.node_uid, delay_ms = delay.as_millis(), "shutdown requested");
    }

    fn delay_elapsed(&self) -> bool {
        let requested_at = self.requested_at_millis.load(Ordering::Relaxed);
        if requested_at == NO_REQUEST {
            return false;
        }
        let delay = self.shutdown_delay_millis.load(Ordering::Relaxed);
        now_millis() - requested_at >= delay
    }

    async fn has_owned_non_terminal_resources(&self) -> Result<bool, CoreError> {
        for resource in self
            .store
            .list_application_resources_by_node(&self.node_uid)
            .await?
        {
            if let Some(status) = self.store.current_status(&resource.application_uid).await? {
                if !status.is_terminal() {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Evaluate the two gates of §4.8 and notify `terminated` once, the
    /// first time both are satisfied.
    pub async fn poll(&self) -> Result<bool, CoreError> {
        if !self.shutdown_requested.load(Ordering::Relaxed) {
            return Ok(false);
        }
        if !self.delay_elapsed() {
            return Ok(false);
        }
        if self.has_owned_non_terminal_resources().await? {
            return Ok(false);
        }
        info!(node_uid = %self.node_uid, "shutdown gates satisfied, terminating");
        self.terminated.notify_waiters();
        Ok(true)
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
