//! ---
//! aso_section: "02-telemetry-core"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Authoritative status holder with autonomous and override paths."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
use parking_lot::RwLock;
use tracing::debug;

use crate::sample::Status;
use crate::{Result, TelemetryError};

/// Draws above this value escalate to `Unsafe`.
pub const UNSAFE_THRESHOLD: f64 = 0.99;
/// Draws above this value (and not above [`UNSAFE_THRESHOLD`]) drift to `Uncertain`.
pub const UNCERTAIN_THRESHOLD: f64 = 0.95;
/// Draws below this value settle back to `Optimal`.
pub const OPTIMAL_THRESHOLD: f64 = 0.10;

/// Compute the autonomous successor of `current` for a draw in `[0, 1)`.
///
/// Returns `None` while halted: no transition is computed and no sample is due.
pub fn autonomous_transition(current: Status, draw: f64) -> Option<Status> {
    if current.is_halted() {
        return None;
    }
    let next = if draw > UNSAFE_THRESHOLD {
        Status::Unsafe
    } else if draw > UNCERTAIN_THRESHOLD {
        Status::Uncertain
    } else if draw < OPTIMAL_THRESHOLD {
        Status::Optimal
    } else {
        current
    };
    Some(next)
}

/// Single source of truth for the current status.
#[derive(Debug, Default)]
pub struct StatusMachine {
    current: RwLock<Status>,
}

impl StatusMachine {
    pub fn new(initial: Status) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    pub fn current(&self) -> Status {
        *self.current.read()
    }

    /// Operator transition. Always honoured, from any state to any state.
    /// Returns the previous status.
    pub fn set(&self, status: Status) -> Status {
        let mut guard = self.current.write();
        let previous = std::mem::replace(&mut *guard, status);
        debug!(from = %previous, to = %status, "operator status transition");
        previous
    }

    /// Autonomous transition driven by a generator tick.
    ///
    /// `draw` is only consulted when the machine is not halted, so a frozen
    /// tick consumes no randomness. `build` turns the computed successor into
    /// the tick's output before anything is committed: an out-of-range draw
    /// or a failed build leaves the status untouched and fails the tick.
    pub fn advance_with<F, B, T>(&self, draw: F, build: B) -> Result<Option<T>>
    where
        F: FnOnce() -> f64,
        B: FnOnce(Status) -> Result<T>,
    {
        let mut guard = self.current.write();
        if guard.is_halted() {
            return Ok(None);
        }
        let value = draw();
        if !(0.0..1.0).contains(&value) {
            return Err(TelemetryError::InvalidDraw(value));
        }
        let Some(next) = autonomous_transition(*guard, value) else {
            return Ok(None);
        };
        let output = build(next)?;
        *guard = next;
        Ok(Some(output))
    }
}
