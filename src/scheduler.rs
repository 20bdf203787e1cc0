//! Background sweeps
//!
//! Two periodic tasks keep the registry honest: one forfeits turns that have
//! gone idle, the other expires stale challenges and drops ended battles once
//! their retention has passed. Both stop when the shutdown channel flips.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::battle::BattleService;

/// Handle to the running sweep tasks
pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn both sweeps using the intervals from the service's config
    pub fn start(service: Arc<BattleService>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let timing = service.config().scheduler.clone();

        let timeouts = {
            let service = service.clone();
            spawn_sweep(
                "turn-timeout",
                Duration::from_secs(timing.timeout_interval_secs),
                shutdown_rx.clone(),
                move || {
                    service.sweep_turn_timeouts();
                },
            )
        };

        let cleanup = spawn_sweep(
            "challenge-cleanup",
            Duration::from_secs(timing.cleanup_interval_secs),
            shutdown_rx,
            move || {
                service.clean_up_expired_challenges();
                service.sweep_ended();
                service.clean_up_expired_cooldowns();
            },
        );

        info!(
            timeout_interval_secs = timing.timeout_interval_secs,
            cleanup_interval_secs = timing.cleanup_interval_secs,
            "Schedulers started"
        );

        Self {
            shutdown_tx,
            tasks: vec![timeouts, cleanup],
        }
    }

    /// Stop both sweeps and wait for them to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("Schedulers stopped");
    }
}

fn spawn_sweep<F>(
    name: &'static str,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    mut sweep: F,
) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!(sweep = name, "Running sweep");
                    sweep();
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        debug!(sweep = name, "Sweep stopped");
    })
}
