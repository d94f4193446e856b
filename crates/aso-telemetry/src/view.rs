//! ---
//! aso_section: "02-telemetry-core"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Consumer-side adapter exposing a bounded sample window."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bus::Subscription;
use crate::observatory::Observatory;
use crate::sample::Sample;
use crate::Result;

/// Number of samples a view keeps by default.
pub const DEFAULT_WINDOW: usize = 50;

/// Hook run by a view after it records a sample.
pub type UpdateHook = Arc<dyn Fn(&Arc<Sample>) + Send + Sync>;

#[derive(Debug)]
struct ViewState {
    window: VecDeque<Arc<Sample>>,
    capacity: usize,
    latest: Option<Arc<Sample>>,
    received: u64,
}

impl ViewState {
    fn record(&mut self, sample: &Arc<Sample>) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(Arc::clone(sample));
        self.latest = Some(Arc::clone(sample));
        self.received += 1;
    }
}

/// Bounded, read-on-demand view of the telemetry stream.
///
/// The window and `latest` are updated synchronously from the bus, so after
/// any publish returns they already reflect the new sample.
pub struct TelemetryView {
    observatory: Arc<Observatory>,
    state: Arc<Mutex<ViewState>>,
    subscription: Subscription,
}

impl TelemetryView {
    /// Attach with the observatory's configured window size.
    pub fn attach(observatory: &Arc<Observatory>) -> Self {
        Self::attach_with(observatory, observatory.view_window(), None)
    }

    /// Attach with an explicit window size and an optional hook run after
    /// each sample has been recorded.
    pub fn attach_with(
        observatory: &Arc<Observatory>,
        window: usize,
        on_update: Option<UpdateHook>,
    ) -> Self {
        let capacity = window.max(1);
        let state = Arc::new(Mutex::new(ViewState {
            window: VecDeque::with_capacity(capacity),
            capacity,
            latest: None,
            received: 0,
        }));
        let sink = Arc::clone(&state);
        let subscription = observatory.subscribe(move |sample| {
            sink.lock().record(sample);
            if let Some(hook) = &on_update {
                hook(sample);
            }
            Ok(())
        });
        Self {
            observatory: Arc::clone(observatory),
            state,
            subscription,
        }
    }

    /// The last `window` samples received, oldest first.
    pub fn window(&self) -> Vec<Arc<Sample>> {
        self.state.lock().window.iter().cloned().collect()
    }

    /// Most recent sample received, if any.
    pub fn latest(&self) -> Option<Arc<Sample>> {
        self.state.lock().latest.clone()
    }

    /// Samples received since attaching, backfill included.
    pub fn received(&self) -> u64 {
        self.state.lock().received
    }

    pub fn trigger_estop(&self) -> Result<Arc<Sample>> {
        self.observatory.trigger_estop()
    }

    pub fn trigger_reset(&self) -> Result<Arc<Sample>> {
        self.observatory.trigger_reset()
    }

    /// Stop receiving samples. The window keeps its last contents. Only the
    /// first call has an effect; later calls return `false`.
    pub fn detach(&self) -> bool {
        self.subscription.detach()
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_active()
    }
}

impl std::fmt::Debug for TelemetryView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TelemetryView")
            .field("window", &state.window.len())
            .field("capacity", &state.capacity)
            .field("received", &state.received)
            .field("attached", &self.subscription.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{SampleOrigin, Status};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn injected(n: usize) -> Sample {
        Sample::builder(Status::Optimal)
            .description(format!("injected-{}", n))
            .build()
            .unwrap()
    }

    #[test]
    fn window_holds_last_fifty_in_order() {
        let observatory = Observatory::builder().build();
        let view = TelemetryView::attach(&observatory);
        for n in 0..80 {
            observatory.publish(injected(n));
        }
        let window = view.window();
        assert_eq!(window.len(), 50);
        assert_eq!(window[0].description(), "injected-30");
        assert_eq!(window[49].description(), "injected-79");
        assert_eq!(view.latest().unwrap().description(), "injected-79");
        assert_eq!(view.received(), 80);
    }

    #[test]
    fn attach_starts_from_backfill() {
        let observatory = Observatory::builder().build();
        for n in 0..30 {
            observatory.publish(injected(n));
        }
        let view = TelemetryView::attach(&observatory);
        let window = view.window();
        assert_eq!(window.len(), 20);
        assert_eq!(window[0].description(), "injected-10");
        assert_eq!(view.latest().unwrap().description(), "injected-29");
    }

    #[test]
    fn controls_route_through_the_observatory() {
        let observatory = Observatory::builder().build();
        let view = TelemetryView::attach(&observatory);
        view.trigger_estop().unwrap();
        assert_eq!(observatory.status(), Status::Halted);
        assert_eq!(view.latest().unwrap().status(), Status::Halted);
        assert_eq!(view.latest().unwrap().confidence(), 0.0);

        view.trigger_reset().unwrap();
        let latest = view.latest().unwrap();
        assert_eq!(latest.status(), Status::Optimal);
        assert_eq!(latest.origin(), SampleOrigin::Override);
    }

    #[test]
    fn detach_runs_once_and_freezes_window() {
        let observatory = Observatory::builder().build();
        let view = TelemetryView::attach(&observatory);
        observatory.publish(injected(1));
        assert!(view.detach());
        assert!(!view.detach());
        assert!(!view.is_attached());
        observatory.publish(injected(2));
        assert_eq!(view.window().len(), 1);
        assert_eq!(observatory.bus().subscriber_count(), 0);
    }

    #[test]
    fn update_hook_sees_every_sample() {
        let observatory = Observatory::builder().build();
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let _view = TelemetryView::attach_with(
            &observatory,
            5,
            Some(Arc::new(move |_: &Arc<Sample>| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );
        for n in 0..12 {
            observatory.publish(injected(n));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 12);
    }
}
