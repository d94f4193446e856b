//! ---
//! aso_section: "02-telemetry-core"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Telemetry core module exports and shared error types."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---

/// Shared result type for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Failures surfaced by the telemetry core. None of them are fatal; shared
/// state is left untouched whenever one is returned.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TelemetryError {
    /// A status name outside the closed enumeration was supplied.
    #[error("invalid status '{0}': expected one of OPTIMAL, UNCERTAIN, UNSAFE, HALTED, RECOVERY")]
    InvalidStatus(String),
    /// A caller-built sample violated a field constraint.
    #[error("invalid sample field {field}: {reason}")]
    InvalidSample {
        /// Offending field name.
        field: &'static str,
        /// Human readable constraint description.
        reason: String,
    },
    /// A transition draw fell outside `[0, 1)`; the tick is dropped.
    #[error("transition draw {0} is outside [0, 1)")]
    InvalidDraw(f64),
    /// A tick was requested while another tick was still running on this thread.
    #[error("generator tick already in progress")]
    TickInProgress,
}
