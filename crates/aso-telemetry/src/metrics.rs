//! ---
//! aso_section: "02-telemetry-core"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Prometheus instrumentation for the telemetry core."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

use crate::sample::{SampleOrigin, Status};

/// Prometheus metric handles for bus and generator activity.
#[derive(Clone)]
pub struct TelemetryMetrics {
    published: IntCounterVec,
    delivery_failures: IntCounter,
    subscribers: IntGauge,
    overrides: IntCounterVec,
    ticks_frozen: IntCounter,
    ticks_dropped: IntCounter,
}

impl TelemetryMetrics {
    /// Register telemetry metrics with the provided registry.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let published = IntCounterVec::new(
            Opts::new(
                "aso_samples_published_total",
                "Samples appended to history and fanned out",
            ),
            &["origin"],
        )?;
        let delivery_failures = IntCounter::with_opts(Opts::new(
            "aso_delivery_failures_total",
            "Subscriber callbacks that returned an error or panicked",
        ))?;
        let subscribers = IntGauge::with_opts(Opts::new(
            "aso_subscribers",
            "Subscribers currently attached to the bus",
        ))?;
        let overrides = IntCounterVec::new(
            Opts::new("aso_overrides_total", "Operator status overrides"),
            &["status"],
        )?;
        let ticks_frozen = IntCounter::with_opts(Opts::new(
            "aso_ticks_frozen_total",
            "Generator ticks suppressed while HALTED",
        ))?;
        let ticks_dropped = IntCounter::with_opts(Opts::new(
            "aso_ticks_dropped_total",
            "Generator ticks dropped after a failure",
        ))?;

        registry.register(Box::new(published.clone()))?;
        registry.register(Box::new(delivery_failures.clone()))?;
        registry.register(Box::new(subscribers.clone()))?;
        registry.register(Box::new(overrides.clone()))?;
        registry.register(Box::new(ticks_frozen.clone()))?;
        registry.register(Box::new(ticks_dropped.clone()))?;

        Ok(Self {
            published,
            delivery_failures,
            subscribers,
            overrides,
            ticks_frozen,
            ticks_dropped,
        })
    }

    pub fn observe_published(&self, origin: SampleOrigin) {
        self.published.with_label_values(&[origin.as_str()]).inc();
    }

    pub fn observe_delivery_failure(&self) {
        self.delivery_failures.inc();
    }

    pub fn set_subscribers(&self, count: usize) {
        self.subscribers.set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub fn observe_override(&self, status: Status) {
        self.overrides.with_label_values(&[status.as_str()]).inc();
    }

    pub fn observe_frozen_tick(&self) {
        self.ticks_frozen.inc();
    }

    pub fn observe_dropped_tick(&self) {
        self.ticks_dropped.inc();
    }
}

impl std::fmt::Debug for TelemetryMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_records() {
        let registry = Registry::new();
        let metrics = TelemetryMetrics::register(&registry).expect("register metrics");
        metrics.observe_published(SampleOrigin::Autonomous);
        metrics.observe_override(Status::Halted);
        metrics.observe_delivery_failure();
        metrics.set_subscribers(2);
        metrics.observe_frozen_tick();
        metrics.observe_dropped_tick();

        let families = registry.gather();
        let published = families
            .iter()
            .find(|f| f.get_name() == "aso_samples_published_total")
            .expect("published family");
        assert_eq!(published.get_metric()[0].get_counter().get_value(), 1.0);
        assert!(families.iter().any(|f| f.get_name() == "aso_subscribers"));
    }

    #[test]
    fn double_registration_fails() {
        let registry = Registry::new();
        TelemetryMetrics::register(&registry).expect("first registration");
        assert!(TelemetryMetrics::register(&registry).is_err());
    }
}
