//! ---
//! aso_section: "01-core-functionality"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Shared primitives and utilities for the observatory runtime."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
//! Shared primitives for the observatory workspace.
//! This crate exposes configuration loading, tracing initialisation, and
//! the monotonic clock used to stamp telemetry samples.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    AppConfig, BridgeConfig, BusConfig, GeneratorConfig, LoadedAppConfig, LoggingConfig,
    MetricsConfig, ViewConfig,
};
pub use logging::{audit_file_name, audit_layer, init_tracing, LogFormat};
pub use time::MonotonicClock;
