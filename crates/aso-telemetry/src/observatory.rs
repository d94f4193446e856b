//! ---
//! aso_section: "02-telemetry-core"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Observatory context tying status, generator, and bus together."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
use std::sync::Arc;

use aso_common::AppConfig;
use aso_logging::{aso_debug, aso_info, LogContext};
use parking_lot::Mutex;

use crate::bus::{DeliveryError, Subscription, TelemetryBus, DEFAULT_BACKFILL};
use crate::generator::{SampleFactory, SampleGenerator, TransitionSource};
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::metrics::TelemetryMetrics;
use crate::sample::{Sample, Status};
use crate::status::StatusMachine;
use crate::view::DEFAULT_WINDOW;
use crate::{Result, TelemetryError};

/// Result of a single generator tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A sample was produced and fanned out.
    Published(Arc<Sample>),
    /// The status is `HALTED`; autonomous telemetry is frozen.
    Frozen,
}

/// The one telemetry context of a process.
///
/// Construct it once at startup and hand the `Arc` to every consumer. Generator
/// ticks, operator overrides, publishes, subscribes and detaches are all
/// serialised on the bus dispatch lock, so the order of samples in history
/// always matches the order of status changes.
pub struct Observatory {
    status: StatusMachine,
    bus: TelemetryBus,
    generator: Mutex<SampleGenerator>,
    overrides: Mutex<SampleFactory>,
    metrics: Option<TelemetryMetrics>,
    window: usize,
}

impl Observatory {
    pub fn builder() -> ObservatoryBuilder {
        ObservatoryBuilder::default()
    }

    pub fn from_config(config: &AppConfig) -> Arc<Self> {
        Self::builder().config(config).build()
    }

    pub fn status(&self) -> Status {
        self.status.current()
    }

    pub fn bus(&self) -> &TelemetryBus {
        &self.bus
    }

    /// Window size views attach with by default.
    pub fn view_window(&self) -> usize {
        self.window
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<Sample>) -> std::result::Result<(), DeliveryError> + Send + Sync + 'static,
    {
        self.bus.subscribe(callback)
    }

    /// Publish a caller-built sample on the shared timeline.
    pub fn publish(&self, sample: Sample) -> Arc<Sample> {
        let _timeline = self.bus.timeline();
        self.bus.publish(sample)
    }

    /// Operator transition: always honoured, immediately followed by an
    /// override sample on the bus.
    ///
    /// The sample is built before the status changes, so an error leaves both
    /// status and history untouched.
    pub fn set_status(&self, status: Status) -> Result<Arc<Sample>> {
        let _timeline = self.bus.timeline();
        let sample = self.overrides.lock().manual_override(status)?;
        let previous = self.status.set(status);
        if let Some(metrics) = &self.metrics {
            metrics.observe_override(status);
        }
        aso_info!(
            context = LogContext::new().with_status(status.as_str()).with_origin("override"),
            "operator override {} -> {}",
            previous,
            status
        );
        Ok(self.bus.publish(sample))
    }

    /// [`Observatory::set_status`] for a status name received from outside.
    pub fn set_status_named(&self, name: &str) -> Result<Arc<Sample>> {
        let status = Status::parse_name(name)?;
        self.set_status(status)
    }

    /// Emergency stop: force `HALTED`.
    pub fn trigger_estop(&self) -> Result<Arc<Sample>> {
        self.set_status(Status::Halted)
    }

    /// Resume nominal operation: force `OPTIMAL`.
    pub fn trigger_reset(&self) -> Result<Arc<Sample>> {
        self.set_status(Status::Optimal)
    }

    /// Run one generator tick.
    ///
    /// A failed tick leaves status and history untouched and is counted as
    /// dropped; the caller decides whether to keep ticking.
    pub fn tick(&self) -> Result<TickOutcome> {
        let _timeline = self.bus.timeline();
        // Held across fan-out so a subscriber cannot start a nested tick.
        let Some(mut generator) = self.generator.try_lock() else {
            return Err(TelemetryError::TickInProgress);
        };
        let tick = generator.ticks() + 1;
        match generator.tick(&self.status) {
            Ok(Some(sample)) => Ok(TickOutcome::Published(self.bus.publish(sample))),
            Ok(None) => {
                if let Some(metrics) = &self.metrics {
                    metrics.observe_frozen_tick();
                }
                aso_debug!(
                    context = LogContext::new().with_status("HALTED").with_tick(tick),
                    "tick frozen while halted"
                );
                Ok(TickOutcome::Frozen)
            }
            Err(err) => {
                if let Some(metrics) = &self.metrics {
                    metrics.observe_dropped_tick();
                }
                Err(err)
            }
        }
    }

    /// Retained history, oldest first.
    pub fn history(&self) -> Vec<Arc<Sample>> {
        self.bus.history()
    }
}

impl std::fmt::Debug for Observatory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observatory")
            .field("status", &self.status.current())
            .field("bus", &self.bus)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Observatory`].
pub struct ObservatoryBuilder {
    history_capacity: usize,
    backfill: usize,
    window: usize,
    seed: Option<u64>,
    initial_status: Status,
    draws: Option<Box<dyn TransitionSource>>,
    metrics: Option<TelemetryMetrics>,
}

impl Default for ObservatoryBuilder {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            backfill: DEFAULT_BACKFILL,
            window: DEFAULT_WINDOW,
            seed: None,
            initial_status: Status::Optimal,
            draws: None,
            metrics: None,
        }
    }
}

impl ObservatoryBuilder {
    /// Take bus, view, and seed settings from configuration.
    pub fn config(mut self, config: &AppConfig) -> Self {
        self.history_capacity = config.bus.history_capacity;
        self.backfill = config.bus.backfill;
        self.window = config.view.window;
        self.seed = config.generator.seed;
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn backfill(mut self, backfill: usize) -> Self {
        self.backfill = backfill;
        self
    }

    pub fn window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn initial_status(mut self, status: Status) -> Self {
        self.initial_status = status;
        self
    }

    /// Replace the transition draw source, e.g. with scripted draws.
    pub fn draws(mut self, draws: impl TransitionSource + 'static) -> Self {
        self.draws = Some(Box::new(draws));
        self
    }

    pub fn metrics(mut self, metrics: TelemetryMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Arc<Observatory> {
        let bus = match &self.metrics {
            Some(metrics) => {
                TelemetryBus::with_metrics(self.history_capacity, self.backfill, metrics.clone())
            }
            None => TelemetryBus::new(self.history_capacity, self.backfill),
        };
        let generator = match self.draws {
            Some(draws) => SampleGenerator::new(draws, SampleFactory::new(self.seed)),
            None => SampleGenerator::seeded(self.seed),
        };
        let overrides = SampleFactory::new(self.seed.map(|seed| seed.wrapping_add(1)));
        Arc::new(Observatory {
            status: StatusMachine::new(self.initial_status),
            bus,
            generator: Mutex::new(generator),
            overrides: Mutex::new(overrides),
            metrics: self.metrics,
            window: self.window.max(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ScriptedDraws;
    use crate::sample::SampleOrigin;

    #[test]
    fn estop_then_reset_adds_two_override_samples() {
        let observatory = Observatory::builder().seed(3).build();
        let before = observatory.history().len();
        observatory.trigger_estop().unwrap();
        observatory.trigger_reset().unwrap();
        let history = observatory.history();
        assert_eq!(history.len(), before + 2);
        let tail = &history[history.len() - 2..];
        assert_eq!(tail[0].status(), Status::Halted);
        assert_eq!(tail[1].status(), Status::Optimal);
        for sample in tail {
            assert_eq!(sample.origin(), SampleOrigin::Override);
            assert!(sample.description().starts_with("Manual override"));
        }
    }

    #[test]
    fn halted_freezes_ticks_until_next_override() {
        let observatory = Observatory::builder().seed(11).build();
        observatory.tick().unwrap();
        observatory.trigger_estop().unwrap();
        let count = observatory.history().len();
        for _ in 0..25 {
            assert_eq!(observatory.tick().unwrap(), TickOutcome::Frozen);
        }
        assert_eq!(observatory.history().len(), count);
        assert_eq!(observatory.status(), Status::Halted);

        observatory.trigger_reset().unwrap();
        assert!(matches!(observatory.tick().unwrap(), TickOutcome::Published(_)));
    }

    #[test]
    fn named_status_is_validated() {
        let observatory = Observatory::builder().build();
        assert_eq!(
            observatory.set_status_named("exploded").unwrap_err(),
            TelemetryError::InvalidStatus("exploded".into())
        );
        assert!(observatory.history().is_empty());
        let sample = observatory.set_status_named("recovery").unwrap();
        assert_eq!(sample.status(), Status::Recovery);
        assert_eq!(observatory.status(), Status::Recovery);
    }

    #[test]
    fn failed_tick_is_dropped_without_side_effects() {
        let observatory = Observatory::builder()
            .draws(ScriptedDraws::new([f64::NAN, 0.97]))
            .build();
        assert!(observatory.tick().is_err());
        assert!(observatory.history().is_empty());
        assert_eq!(observatory.status(), Status::Optimal);
        let TickOutcome::Published(sample) = observatory.tick().unwrap() else {
            panic!("second tick should publish");
        };
        assert_eq!(sample.status(), Status::Uncertain);
    }

    #[test]
    fn subscriber_may_override_from_inside_a_callback() {
        let observatory = Observatory::builder()
            .draws(ScriptedDraws::new([0.995]))
            .build();
        let handle = Arc::clone(&observatory);
        let _guard = observatory.subscribe(move |sample| {
            if sample.status() == Status::Unsafe {
                handle.trigger_estop().unwrap();
            }
            Ok(())
        });
        observatory.tick().unwrap();
        let statuses: Vec<Status> = observatory.history().iter().map(|s| s.status()).collect();
        assert_eq!(statuses, [Status::Unsafe, Status::Halted]);
        assert_eq!(observatory.status(), Status::Halted);
    }

    #[test]
    fn tick_from_inside_a_tick_is_rejected() {
        let observatory = Observatory::builder().build();
        let handle = Arc::clone(&observatory);
        let nested = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&nested);
        let _guard = observatory.subscribe(move |sample| {
            if sample.origin() == crate::sample::SampleOrigin::Autonomous {
                *slot.lock() = Some(handle.tick());
            }
            Ok(())
        });
        observatory.tick().unwrap();
        assert_eq!(
            nested.lock().take(),
            Some(Err(TelemetryError::TickInProgress))
        );
    }
}
