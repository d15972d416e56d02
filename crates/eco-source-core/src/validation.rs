//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Constraint checks applied to incoming site telemetry."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::telemetry::{GeneratorStatus, TelemetryPayload};

pub const BATTERY_SOC_MIN: i64 = 0;
pub const BATTERY_SOC_MAX: i64 = 100;

/// Telemetry fields in declaration order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryField {
    SiteId,
    GridPrice,
    BatterySoc,
    LoadAmps,
    GeneratorStatus,
}

impl TelemetryField {
    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryField::SiteId => "site_id",
            TelemetryField::GridPrice => "grid_price",
            TelemetryField::BatterySoc => "battery_soc",
            TelemetryField::LoadAmps => "load_amps",
            TelemetryField::GeneratorStatus => "generator_status",
        }
    }
}

impl fmt::Display for TelemetryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single violated constraint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: TelemetryField,
    pub reason: String,
}

impl FieldViolation {
    fn new(field: TelemetryField, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Every constraint a telemetry payload failed. Never empty.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("invalid telemetry: {}", render_violations(.violations))]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn fields(&self) -> impl Iterator<Item = TelemetryField> + '_ {
        self.violations.iter().map(|v| v.field)
    }

    pub fn contains(&self, field: TelemetryField) -> bool {
        self.fields().any(|f| f == field)
    }
}

fn render_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Values the validator had to convert while checking.
pub(crate) struct CheckedFields {
    pub battery_soc: u8,
    pub generator_status: GeneratorStatus,
}

/// Check every constraint on `payload` and report all failures together.
pub(crate) fn validate_payload(
    payload: &TelemetryPayload,
) -> Result<CheckedFields, ValidationError> {
    let mut violations = Vec::new();

    if payload.site_id.is_empty() {
        violations.push(FieldViolation::new(
            TelemetryField::SiteId,
            "must be a non-empty identifier",
        ));
    }

    check_non_negative(&mut violations, TelemetryField::GridPrice, payload.grid_price);

    let battery_soc = match u8::try_from(payload.battery_soc) {
        Ok(soc) if i64::from(soc) <= BATTERY_SOC_MAX => Some(soc),
        _ => {
            violations.push(FieldViolation::new(
                TelemetryField::BatterySoc,
                format!(
                    "value {} outside {}..={} percent",
                    payload.battery_soc, BATTERY_SOC_MIN, BATTERY_SOC_MAX
                ),
            ));
            None
        }
    };

    check_non_negative(&mut violations, TelemetryField::LoadAmps, payload.load_amps);

    let generator_status = match payload.generator_status.as_deref() {
        None => Some(GeneratorStatus::default()),
        Some(label) => match label.parse::<GeneratorStatus>() {
            Ok(status) => Some(status),
            Err(reason) => {
                violations.push(FieldViolation::new(TelemetryField::GeneratorStatus, reason));
                None
            }
        },
    };

    match (battery_soc, generator_status) {
        (Some(battery_soc), Some(generator_status)) if violations.is_empty() => Ok(CheckedFields {
            battery_soc,
            generator_status,
        }),
        _ => {
            warn!(
                site_id = %payload.site_id,
                violations = violations.len(),
                "telemetry rejected"
            );
            Err(ValidationError { violations })
        }
    }
}

fn check_non_negative(violations: &mut Vec<FieldViolation>, field: TelemetryField, value: f64) {
    if !value.is_finite() {
        violations.push(FieldViolation::new(field, "must be a finite number"));
    } else if value < 0.0 {
        violations.push(FieldViolation::new(
            field,
            format!("value {} must be greater than or equal to 0", value),
        ));
    }
}
