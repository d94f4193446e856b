//! ---
//! aso_section: "03-logging"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Structured logging adapters for telemetry events."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Structured log context shared by the telemetry core and the daemon.

use tracing::Level;

pub mod macros;

/// Tracing target of operator command events. Subscribers route it to the
/// operator audit log.
pub const OPERATOR_AUDIT_TARGET: &str = "aso::operator";

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogContext<'a> {
    /// Status name the event relates to.
    pub status: Option<&'a str>,
    /// Subscriber identifier on the bus.
    pub subscriber: Option<u64>,
    /// Generator tick counter.
    pub tick: Option<u64>,
    /// Origin of the sample (autonomous, override, injected).
    pub origin: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a status name.
    pub fn with_status(mut self, status: &'a str) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach a subscriber identifier.
    pub fn with_subscriber(mut self, subscriber: u64) -> Self {
        self.subscriber = Some(subscriber);
        self
    }

    /// Attach a tick value.
    pub fn with_tick(mut self, tick: u64) -> Self {
        self.tick = Some(tick);
        self
    }

    /// Attach a sample origin.
    pub fn with_origin(mut self, origin: &'a str) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// Outcome attached to operator-facing events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorOutcome {
    /// The command was applied.
    Applied,
    /// The command was rejected at the call boundary.
    Rejected,
}

impl OperatorOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            OperatorOutcome::Applied => "applied",
            OperatorOutcome::Rejected => "rejected",
        }
    }
}

/// Emit a standardized operator command event.
pub fn log_operator_event(context: Option<&LogContext>, command: &str, outcome: OperatorOutcome) {
    let ctx = context.copied().unwrap_or_default();
    match outcome {
        OperatorOutcome::Applied => tracing::event!(
            target: OPERATOR_AUDIT_TARGET,
            Level::INFO,
            command,
            outcome = outcome.as_str(),
            status = ctx.status.unwrap_or(""),
            origin = ctx.origin.unwrap_or(""),
            "operator command"
        ),
        OperatorOutcome::Rejected => tracing::event!(
            target: OPERATOR_AUDIT_TARGET,
            Level::WARN,
            command,
            outcome = outcome.as_str(),
            status = ctx.status.unwrap_or(""),
            origin = ctx.origin.unwrap_or(""),
            "operator command"
        ),
    }
}
