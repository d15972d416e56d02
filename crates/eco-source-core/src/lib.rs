//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Site telemetry model and power source decision policy."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Decision core for telecom tower power sites.
//!
//! A caller builds a [`TelemetryPayload`], the validator turns it into a
//! [`Telemetry`] (or a [`ValidationError`] listing every bad field), and the
//! [`PolicyEngine`] maps it to exactly one [`ControlCommand`]. Nothing is kept
//! between calls.

pub mod command;
pub mod errors;
pub mod policy;
pub mod telemetry;
pub mod validation;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub use command::{ControlAction, ControlCommand, SavingsEstimate};
pub use errors::{OptimizeError, PolicyError, Result};
pub use policy::{
    Decision, PolicyEngine, PolicyRule, BATTERY_FULL_ENOUGH, BATTERY_SAFE_LIMIT,
    PEAK_PRICE_THRESHOLD,
};
pub use telemetry::{GeneratorStatus, Telemetry, TelemetryPayload};
pub use validation::{FieldViolation, TelemetryField, ValidationError};

/// Request body accepted by the optimiser.
///
/// Both the bare telemetry object and the `{"telemetry": {...}}` envelope used
/// by older gateway integrations are accepted. A document carrying a
/// `telemetry` key is always read as the envelope, so decode errors name the
/// offending field (`telemetry.load_amps: missing field ...`).
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum OptimizationRequest {
    Envelope { telemetry: TelemetryPayload },
    Bare(TelemetryPayload),
}

#[derive(Deserialize)]
struct Envelope {
    telemetry: TelemetryPayload,
}

impl OptimizationRequest {
    /// Decode an already parsed JSON document.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        let request = if value.get("telemetry").is_some() {
            serde_path_to_error::deserialize(value)
                .map(|envelope: Envelope| OptimizationRequest::Envelope {
                    telemetry: envelope.telemetry,
                })
        } else {
            serde_path_to_error::deserialize(value).map(OptimizationRequest::Bare)
        };
        request.map_err(serde_json::Error::custom)
    }

    pub fn into_payload(self) -> TelemetryPayload {
        match self {
            OptimizationRequest::Envelope { telemetry } => telemetry,
            OptimizationRequest::Bare(payload) => payload,
        }
    }
}

impl<'de> Deserialize<'de> for OptimizationRequest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        OptimizationRequest::from_value(value).map_err(D::Error::custom)
    }
}

impl From<TelemetryPayload> for OptimizationRequest {
    fn from(payload: TelemetryPayload) -> Self {
        OptimizationRequest::Bare(payload)
    }
}

/// Validate `payload` and run it through the standard rule chain.
pub fn optimize(payload: TelemetryPayload) -> Result<ControlCommand> {
    optimize_with(&PolicyEngine::new(), payload)
}

pub fn optimize_with(engine: &PolicyEngine, payload: TelemetryPayload) -> Result<ControlCommand> {
    let telemetry = payload.validate()?;
    Ok(engine.evaluate(&telemetry)?)
}

/// Parse a JSON request document (bare or enveloped) and optimise it.
pub fn optimize_json(input: &str) -> Result<ControlCommand> {
    let value: Value = serde_json::from_str(input)?;
    let request = OptimizationRequest::from_value(value)?;
    optimize(request.into_payload())
}
