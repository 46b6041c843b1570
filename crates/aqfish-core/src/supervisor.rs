use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::maintenance::MaintenanceController;
use crate::pickup::PickupLoop;
use crate::sweeper::CleanupSweeper;

const TICK_INTERVAL: Duration = Duration::from_secs(2);
const RESTART_BACKOFF: Duration = Duration::from_secs(1);
/// The sweeper only needs to run on the order of the cleanup interval, not
/// every pickup tick.
const SWEEP_EVERY_N_TICKS: u32 = 30;

/// Runs `pickup.tick()` on a timer forever, restarting after a short
/// back-off if a tick panics, sweeping terminal Applications and expired
/// Labels every `SWEEP_EVERY_N_TICKS` ticks, and stopping once
/// `maintenance.poll()` reports the shutdown gates of §4.8 are satisfied.
pub async fn run(pickup: Arc<PickupLoop>, maintenance: Arc<MaintenanceController>, sweeper: Arc<CleanupSweeper>) {
    if let Err(e) = pickup.recover_on_startup().await {
        error!(error = %e, "startup recovery failed");
    }

    let mut tick_count: u32 = 0;
    loop {
        let pickup = pickup.clone();
        let result = tokio::spawn(async move { pickup.tick().await }).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "pickup tick failed"),
            Err(panic) => {
                error!(%panic, "pickup tick panicked, restarting after back-off");
                tokio::time::sleep(RESTART_BACKOFF).await;
            }
        }

        tick_count = tick_count.wrapping_add(1);
        if tick_count % SWEEP_EVERY_N_TICKS == 0 {
            if let Err(e) = sweeper.sweep().await {
                error!(error = %e, "cleanup sweep failed");
            }
        }

        match maintenance.poll().await {
            Ok(true) => {
                info!("shutdown gates satisfied, stopping pickup loop");
                return;
            }
            Ok(false) => {}
            Err(e) => error!(error = %e, "maintenance poll failed"),
        }

        tokio::time::sleep(TICK_INTERVAL).await;
    }
}
