//! Lease expiry loop.
//!
//! Releases cells whose lease ran out so an unresponsive vehicle cannot hold
//! airspace indefinitely.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};

use crate::state::AppState;

pub const LOOP_NAME: &str = "lease-sweep";

pub async fn run_lease_sweep_loop(
    state: Arc<AppState>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    state.mark_loop_heartbeat(LOOP_NAME);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Lease sweep loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                state.mark_loop_heartbeat(LOOP_NAME);
                let expired = state.engine().sweep_expired_leases();
                for lease in &expired {
                    tracing::debug!(
                        "Lease on {} held by {} expired; cell now {}",
                        lease.cell_id,
                        lease.vehicle_id,
                        lease.status
                    );
                }
            }
        }
    }
}
