//! ---
//! aso_section: "02-telemetry-core"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Telemetry core module exports and shared error types."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
//! Telemetry core for the observatory.
//!
//! Samples flow from the [`generator`] (or an operator override) into the
//! [`bus`], which appends them to a bounded history and fans them out to
//! every attached subscriber. [`view::TelemetryView`] turns that push stream
//! into a bounded window a consumer can read on its own schedule. The
//! [`observatory::Observatory`] context ties the pieces together and is the
//! single instance handed to every consumer.

pub mod bridge;
pub mod bus;
pub mod error;
pub mod generator;
pub mod history;
pub mod metrics;
pub mod observatory;
pub mod role;
pub mod runner;
pub mod sample;
pub mod status;
pub mod view;

pub use bridge::{
    replay_bridge_events, BridgeAction, BridgeError, BridgeEvent, BridgeEventKind, BridgePolicy,
    BridgeReplay, BridgeReplayHandle, BridgeSource,
};
pub use bus::{DeliveryError, SubscriberId, Subscription, TelemetryBus};
pub use error::{Result, TelemetryError};
pub use generator::{RngDraws, SampleFactory, SampleGenerator, ScriptedDraws, TransitionSource};
pub use history::History;
pub use metrics::TelemetryMetrics;
pub use observatory::{Observatory, ObservatoryBuilder, TickOutcome};
pub use role::OperatorRole;
pub use runner::{GeneratorHandle, GeneratorTask};
pub use sample::{Sample, SampleBuilder, SampleOrigin, Severity, Status};
pub use status::{autonomous_transition, StatusMachine};
pub use view::{TelemetryView, UpdateHook};
