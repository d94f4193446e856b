//! ---
//! aso_section: "02-telemetry-core"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Telemetry bus owning history and synchronous subscriber fan-out."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
//! The bus serialises `publish`, `subscribe` and detach behind one reentrant
//! dispatch lock, so history append plus fan-out is atomic with respect to
//! other threads while a subscriber callback may still call back into the bus
//! (or into the operator path) on its own thread. The observatory orders its
//! ticks and overrides on the same lock; no other lock is ever held while
//! waiting for it.
//!
//! The fan-out set is snapshotted when a publish starts: a subscriber that
//! attaches during an in-flight publish does not see that sample. A subscriber
//! detached during an in-flight publish receives nothing further.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use aso_common::BusConfig;
use aso_logging::{aso_debug, aso_warn, LogContext};
use indexmap::IndexMap;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

use crate::history::{History, DEFAULT_HISTORY_CAPACITY};
use crate::metrics::TelemetryMetrics;
use crate::sample::Sample;

/// Number of history entries replayed to a new subscriber by default.
pub const DEFAULT_BACKFILL: usize = 20;

/// Failure reported by a subscriber callback. Isolated by the bus.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct DeliveryError(String);

impl DeliveryError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Identifier of a registered subscriber.
pub type SubscriberId = u64;

type Callback = Arc<dyn Fn(&Arc<Sample>) -> Result<(), DeliveryError> + Send + Sync>;

struct BusState {
    history: History,
    subscribers: IndexMap<SubscriberId, Callback>,
    next_id: SubscriberId,
}

struct BusShared {
    dispatch: ReentrantMutex<()>,
    state: Mutex<BusState>,
    backfill: usize,
    metrics: Option<TelemetryMetrics>,
}

impl BusShared {
    fn is_registered(&self, id: SubscriberId) -> bool {
        self.state.lock().subscribers.contains_key(&id)
    }

    fn remove(&self, id: SubscriberId) -> bool {
        let _dispatch = self.dispatch.lock();
        let (removed, remaining) = {
            let mut state = self.state.lock();
            let removed = state.subscribers.shift_remove(&id).is_some();
            (removed, state.subscribers.len())
        };
        if removed {
            if let Some(metrics) = &self.metrics {
                metrics.set_subscribers(remaining);
            }
            aso_debug!(context = LogContext::new().with_subscriber(id), "subscriber detached");
        }
        removed
    }

    fn deliver(&self, id: SubscriberId, callback: &Callback, sample: &Arc<Sample>) {
        let failure = match catch_unwind(AssertUnwindSafe(|| callback(sample))) {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(payload) => format!("subscriber panicked: {}", panic_message(payload.as_ref())),
        };
        if let Some(metrics) = &self.metrics {
            metrics.observe_delivery_failure();
        }
        let ctx = LogContext::new()
            .with_subscriber(id)
            .with_status(sample.status().as_str())
            .with_origin(sample.origin().as_str());
        aso_warn!(context = ctx, "subscriber delivery failed: {}", failure);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Process-wide hub owning the bounded history and the live subscriber set.
#[derive(Clone)]
pub struct TelemetryBus {
    shared: Arc<BusShared>,
}

impl TelemetryBus {
    /// Build a bus retaining `history_capacity` samples and replaying the last
    /// `backfill` of them to each new subscriber. The capacity is raised to the
    /// backfill size when smaller.
    pub fn new(history_capacity: usize, backfill: usize) -> Self {
        Self::build(history_capacity, backfill, None)
    }

    pub fn from_config(config: &BusConfig) -> Self {
        Self::new(config.history_capacity, config.backfill)
    }

    /// Same as [`TelemetryBus::new`] but reporting into `metrics`.
    pub fn with_metrics(history_capacity: usize, backfill: usize, metrics: TelemetryMetrics) -> Self {
        Self::build(history_capacity, backfill, Some(metrics))
    }

    fn build(history_capacity: usize, backfill: usize, metrics: Option<TelemetryMetrics>) -> Self {
        let backfill = backfill.max(1);
        Self {
            shared: Arc::new(BusShared {
                dispatch: ReentrantMutex::new(()),
                state: Mutex::new(BusState {
                    history: History::with_capacity(history_capacity.max(backfill)),
                    subscribers: IndexMap::new(),
                    next_id: 1,
                }),
                backfill,
                metrics,
            }),
        }
    }

    /// Take the dispatch lock so a status change and its publish form one
    /// step on the bus timeline.
    pub(crate) fn timeline(&self) -> ReentrantMutexGuard<'_, ()> {
        self.shared.dispatch.lock()
    }

    /// Append `sample` to history and hand it to every registered subscriber
    /// before returning. A failing subscriber is logged and skipped; the rest
    /// still receive the sample.
    pub fn publish(&self, sample: Sample) -> Arc<Sample> {
        let _dispatch = self.shared.dispatch.lock();
        let sample = Arc::new(sample);
        let recipients: Vec<(SubscriberId, Callback)> = {
            let mut state = self.shared.state.lock();
            state.history.push(Arc::clone(&sample));
            state
                .subscribers
                .iter()
                .map(|(id, callback)| (*id, Arc::clone(callback)))
                .collect()
        };
        if let Some(metrics) = &self.shared.metrics {
            metrics.observe_published(sample.origin());
        }
        aso_debug!(
            context = LogContext::new()
                .with_status(sample.status().as_str())
                .with_origin(sample.origin().as_str()),
            "publishing sample {} to {} subscribers",
            sample.id(),
            recipients.len()
        );

        for (id, callback) in &recipients {
            if !self.shared.is_registered(*id) {
                continue;
            }
            self.shared.deliver(*id, callback, &sample);
        }
        sample
    }

    /// Register `callback` and synchronously replay the most recent history
    /// (oldest first) to it before returning. Dropping the returned
    /// [`Subscription`] detaches the callback.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<Sample>) -> Result<(), DeliveryError> + Send + Sync + 'static,
    {
        let _dispatch = self.shared.dispatch.lock();
        let callback: Callback = Arc::new(callback);
        let (id, backlog, count) = {
            let mut state = self.shared.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.insert(id, Arc::clone(&callback));
            let backlog = state.history.recent(self.shared.backfill);
            (id, backlog, state.subscribers.len())
        };
        if let Some(metrics) = &self.shared.metrics {
            metrics.set_subscribers(count);
        }
        aso_debug!(
            context = LogContext::new().with_subscriber(id),
            "subscriber attached, replaying {} samples",
            backlog.len()
        );

        for sample in &backlog {
            if !self.shared.is_registered(id) {
                break;
            }
            self.shared.deliver(id, &callback, sample);
        }

        Subscription {
            id,
            bus: Arc::downgrade(&self.shared),
            active: AtomicBool::new(true),
        }
    }

    /// Copy of the retained history, oldest first.
    pub fn history(&self) -> Vec<Arc<Sample>> {
        self.shared.state.lock().history.snapshot()
    }

    /// The last `count` retained samples, oldest first.
    pub fn recent(&self, count: usize) -> Vec<Arc<Sample>> {
        self.shared.state.lock().history.recent(count)
    }

    pub fn latest(&self) -> Option<Arc<Sample>> {
        self.shared.state.lock().history.latest().cloned()
    }

    /// Total samples ever published, including those evicted from history.
    pub fn published(&self) -> u64 {
        self.shared.state.lock().history.appended()
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.state.lock().subscribers.len()
    }

    pub fn backfill(&self) -> usize {
        self.shared.backfill
    }

    pub fn history_capacity(&self) -> usize {
        self.shared.state.lock().history.capacity()
    }
}

impl Default for TelemetryBus {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, DEFAULT_BACKFILL)
    }
}

impl std::fmt::Debug for TelemetryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("TelemetryBus")
            .field("history", &state.history.len())
            .field("subscribers", &state.subscribers.len())
            .field("backfill", &self.shared.backfill)
            .finish()
    }
}

/// Detachment handle returned by [`TelemetryBus::subscribe`].
///
/// Detaching is idempotent and remains safe after the bus itself is gone.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    bus: Weak<BusShared>,
    active: AtomicBool,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Remove the subscriber from the bus. Returns `true` only for the call
    /// that actually removed it.
    pub fn detach(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        match self.bus.upgrade() {
            Some(shared) => shared.remove(self.id),
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for BusShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusShared")
            .field("backfill", &self.backfill)
            .finish_non_exhaustive()
    }
}
