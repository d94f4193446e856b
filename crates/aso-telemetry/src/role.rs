//! ---
//! aso_section: "02-telemetry-core"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Operator roles attached to sessions."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Role a session runs under.
///
/// Roles are informational: the observatory does not gate overrides on them.
/// [`OperatorRole::may_override`] reports what a policy layer would allow.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum OperatorRole {
    /// Full control surface.
    #[default]
    Operator,
    /// Read-only viewer.
    Observer,
}

impl OperatorRole {
    pub fn may_override(&self) -> bool {
        matches!(self, OperatorRole::Operator)
    }

    pub fn description(&self) -> &'static str {
        match self {
            OperatorRole::Operator => "may issue emergency stop, reset, and status overrides",
            OperatorRole::Observer => "read-only access to the telemetry stream",
        }
    }
}
