//! ---
//! aso_section: "02-telemetry-core"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Telemetry sample and status data model."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
use aso_common::time::MonotonicClock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{Result, TelemetryError};

static SAMPLE_CLOCK: MonotonicClock = MonotonicClock::new();

/// Lower bound of the latent projection axes.
pub const LATENT_MIN: f64 = 0.0;
/// Upper bound of the latent projection axes.
pub const LATENT_MAX: f64 = 100.0;

/// Operational state of the monitored process.
///
/// `Halted` is only ever entered or left through an operator override.
/// `Recovery` is reserved; nothing assigns it autonomously.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Status {
    #[default]
    Optimal,
    Uncertain,
    Unsafe,
    Halted,
    Recovery,
}

impl Status {
    /// Parse a status name at an external call boundary.
    pub fn parse_name(name: &str) -> Result<Self> {
        name.trim()
            .parse()
            .map_err(|_| TelemetryError::InvalidStatus(name.to_owned()))
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn is_halted(&self) -> bool {
        matches!(self, Status::Halted)
    }

    pub fn severity(&self) -> Severity {
        match self {
            Status::Optimal => Severity::Nominal,
            Status::Unsafe | Status::Halted => Severity::Critical,
            Status::Uncertain | Status::Recovery => Severity::Caution,
        }
    }
}

/// Coarse presentation class for a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Nominal,
    Caution,
    Critical,
}

/// Where a sample came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "lowercase")]
pub enum SampleOrigin {
    /// Produced by a generator tick.
    Autonomous,
    /// Produced by an operator status change.
    Override,
    /// Built by a caller and published directly.
    Injected,
}

impl SampleOrigin {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// One immutable telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    id: Uuid,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
    status: Status,
    confidence: f64,
    entropy: f64,
    latent_coordinates: [f64; 2],
    description: String,
    origin: SampleOrigin,
}

impl Sample {
    pub fn builder(status: Status) -> SampleBuilder {
        SampleBuilder::new(status)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn entropy(&self) -> f64 {
        self.entropy
    }

    pub fn latent_coordinates(&self) -> [f64; 2] {
        self.latent_coordinates
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn origin(&self) -> SampleOrigin {
        self.origin
    }
}

/// Validating constructor for [`Sample`].
///
/// The id and timestamp are assigned by [`SampleBuilder::build`]; the origin
/// defaults to [`SampleOrigin::Injected`].
#[derive(Debug, Clone)]
pub struct SampleBuilder {
    status: Status,
    confidence: f64,
    entropy: f64,
    latent_coordinates: [f64; 2],
    description: String,
    origin: SampleOrigin,
}

impl SampleBuilder {
    fn new(status: Status) -> Self {
        Self {
            status,
            confidence: 1.0,
            entropy: 0.0,
            latent_coordinates: [LATENT_MAX / 2.0, LATENT_MAX / 2.0],
            description: format!("Injected sample: {}", status),
            origin: SampleOrigin::Injected,
        }
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn entropy(mut self, entropy: f64) -> Self {
        self.entropy = entropy;
        self
    }

    pub fn latent_coordinates(mut self, x: f64, y: f64) -> Self {
        self.latent_coordinates = [x, y];
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn origin(mut self, origin: SampleOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn build(self) -> Result<Sample> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(invalid("confidence", format!("{} not in [0, 1]", self.confidence)));
        }
        if !self.entropy.is_finite() || self.entropy < 0.0 {
            return Err(invalid(
                "entropy",
                format!("{} is not a finite non-negative value", self.entropy),
            ));
        }
        for axis in self.latent_coordinates {
            if !(LATENT_MIN..=LATENT_MAX).contains(&axis) {
                return Err(invalid(
                    "latentCoordinates",
                    format!("{} not in [{}, {}]", axis, LATENT_MIN, LATENT_MAX),
                ));
            }
        }
        if self.description.trim().is_empty() {
            return Err(invalid("description", "must not be empty".to_owned()));
        }

        Ok(Sample {
            id: Uuid::new_v4(),
            timestamp: SAMPLE_CLOCK.now(),
            status: self.status,
            confidence: self.confidence,
            entropy: self.entropy,
            latent_coordinates: self.latent_coordinates,
            description: self.description,
            origin: self.origin,
        })
    }
}

fn invalid(field: &'static str, reason: String) -> TelemetryError {
    TelemetryError::InvalidSample { field, reason }
}
