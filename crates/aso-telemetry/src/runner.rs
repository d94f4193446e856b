//! ---
//! aso_section: "02-telemetry-core"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Tokio task driving the generator on a fixed period."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use aso_logging::{aso_debug, aso_warn, LogContext};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::info;

use crate::observatory::{Observatory, TickOutcome};

/// Periodic driver for [`Observatory::tick`].
pub struct GeneratorTask;

impl GeneratorTask {
    /// Spawn the tick loop on the current runtime. The first tick fires one
    /// `period` after spawning. A failed tick is logged and the loop keeps
    /// going; dropping the returned handle stops it.
    pub fn spawn(observatory: Arc<Observatory>, period: Duration) -> GeneratorHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let task: JoinHandle<u64> = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(period_ms = period.as_millis() as u64, "generator started");
            let mut ticks = 0u64;
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = interval.tick() => {
                        ticks += 1;
                        match observatory.tick() {
                            Ok(TickOutcome::Published(sample)) => aso_debug!(
                                context = LogContext::new()
                                    .with_status(sample.status().as_str())
                                    .with_tick(ticks),
                                "tick published {}",
                                sample.id()
                            ),
                            Ok(TickOutcome::Frozen) => {}
                            Err(err) => aso_warn!(
                                context = LogContext::new().with_tick(ticks),
                                "tick dropped: {}",
                                err
                            ),
                        }
                    }
                }
            }
            info!(ticks, "generator stopped");
            ticks
        });
        GeneratorHandle {
            period,
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Handle to a running generator loop.
#[derive(Debug)]
pub struct GeneratorHandle {
    period: Duration,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<u64>,
}

impl GeneratorHandle {
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stop ticking and wait for the loop to exit. Returns the number of
    /// ticks attempted.
    pub async fn shutdown(mut self) -> Result<u64> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.await.map_err(anyhow::Error::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ScriptedDraws;
    use crate::sample::{SampleOrigin, Status};

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_period() {
        let observatory = Observatory::builder().seed(5).build();
        let handle = GeneratorTask::spawn(Arc::clone(&observatory), Duration::from_millis(2000));

        time::sleep(Duration::from_millis(6500)).await;
        let ticks = handle.shutdown().await.unwrap();
        assert_eq!(ticks, 3);
        let history = observatory.history();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|s| s.origin() == SampleOrigin::Autonomous));
    }

    #[tokio::test(start_paused = true)]
    async fn halted_loop_keeps_running_without_samples() {
        let observatory = Observatory::builder().build();
        observatory.trigger_estop().unwrap();
        let handle = GeneratorTask::spawn(Arc::clone(&observatory), Duration::from_millis(2000));

        time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(observatory.history().len(), 1);
        observatory.trigger_reset().unwrap();
        time::sleep(Duration::from_millis(2000)).await;
        handle.shutdown().await.unwrap();
        let last = observatory.history().pop().unwrap();
        assert_eq!(last.origin(), SampleOrigin::Autonomous);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_does_not_stop_the_loop() {
        let observatory = Observatory::builder()
            .draws(ScriptedDraws::new([f64::NAN, 0.97]))
            .build();
        let handle = GeneratorTask::spawn(Arc::clone(&observatory), Duration::from_millis(100));

        time::sleep(Duration::from_millis(250)).await;
        assert_eq!(handle.shutdown().await.unwrap(), 2);
        let history = observatory.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status(), Status::Uncertain);
    }
}
