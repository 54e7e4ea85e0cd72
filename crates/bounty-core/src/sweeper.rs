use crate::arbitrator::ClaimArbitrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Periodically expires overdue claims until `shutdown` flips to `true` or
/// its sender is dropped. Lazy expiry on access still applies; the sweep
/// only makes reopened bounties visible sooner.
pub fn spawn_expiry_sweeper(
    arbitrator: Arc<ClaimArbitrator>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_ms = every.as_millis() as u64, "Claim expiry sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match arbitrator.sweep_expired().await {
                        Ok(expired) if !expired.is_empty() => {
                            debug!(expired = expired.len(), "Sweep released claims");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Claim sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Claim expiry sweeper stopped");
    })
}
