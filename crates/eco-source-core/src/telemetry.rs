//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Site telemetry snapshot consumed by the decision policy."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::validation::{validate_payload, ValidationError};

/// Generator state reported by the tower gateway.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum GeneratorStatus {
    On,
    #[default]
    Off,
    Cranking,
}

impl GeneratorStatus {
    pub const LABELS: [&'static str; 3] = ["ON", "OFF", "CRANKING"];

    pub fn as_str(&self) -> &'static str {
        match self {
            GeneratorStatus::On => "ON",
            GeneratorStatus::Off => "OFF",
            GeneratorStatus::Cranking => "CRANKING",
        }
    }
}

impl fmt::Display for GeneratorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeneratorStatus {
    type Err = String;

    /// Labels are matched exactly; `on` or `Off` are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ON" => Ok(GeneratorStatus::On),
            "OFF" => Ok(GeneratorStatus::Off),
            "CRANKING" => Ok(GeneratorStatus::Cranking),
            other => Err(format!(
                "unknown generator status '{}'; expected one of {}",
                other,
                Self::LABELS.join(", ")
            )),
        }
    }
}

/// Raw telemetry as it arrives on the wire, before any constraint is checked.
///
/// Numeric fields use wide types so out-of-range readings (a negative state of
/// charge, for instance) survive deserialisation and can be reported by the
/// validator instead of being lost in a type error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryPayload {
    pub site_id: String,
    pub grid_price: f64,
    #[serde(deserialize_with = "deserialize_whole_percent")]
    pub battery_soc: i64,
    pub load_amps: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator_status: Option<String>,
}

impl TelemetryPayload {
    pub fn new(
        site_id: impl Into<String>,
        grid_price: f64,
        battery_soc: i64,
        load_amps: f64,
    ) -> Self {
        Self {
            site_id: site_id.into(),
            grid_price,
            battery_soc,
            load_amps,
            generator_status: None,
        }
    }

    pub fn with_generator_status(mut self, status: impl Into<String>) -> Self {
        self.generator_status = Some(status.into());
        self
    }

    /// Run the validator, yielding a [`Telemetry`] only when every field passes.
    pub fn validate(self) -> Result<Telemetry, ValidationError> {
        Telemetry::try_from(self)
    }
}

/// Gateways sometimes emit the state of charge as `60.0`; accept any number
/// without a fractional part and leave range checks to the validator.
fn deserialize_whole_percent<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct WholePercent;

    impl<'de> Visitor<'de> for WholePercent {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a whole-number percentage")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            Ok(i64::try_from(v).unwrap_or(i64::MAX))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
            if v.is_finite() && v.fract() == 0.0 {
                // Saturates; anything this large fails the range check anyway.
                Ok(v as i64)
            } else {
                Err(E::invalid_value(de::Unexpected::Float(v), &self))
            }
        }
    }

    deserializer.deserialize_any(WholePercent)
}

/// One validated snapshot of a site's grid, battery, load, and generator state.
///
/// Fields are private: the only ways to obtain a value are [`Telemetry::new`],
/// [`TelemetryPayload::validate`], or deserialisation, all of which run the
/// validator first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "TelemetryPayload")]
pub struct Telemetry {
    site_id: String,
    grid_price: f64,
    battery_soc: u8,
    load_amps: f64,
    generator_status: GeneratorStatus,
}

impl Telemetry {
    pub fn new(
        site_id: impl Into<String>,
        grid_price: f64,
        battery_soc: i64,
        load_amps: f64,
        generator_status: GeneratorStatus,
    ) -> Result<Self, ValidationError> {
        TelemetryPayload::new(site_id, grid_price, battery_soc, load_amps)
            .with_generator_status(generator_status.as_str())
            .validate()
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    /// Grid price in currency per kWh.
    pub fn grid_price(&self) -> f64 {
        self.grid_price
    }

    /// Battery state of charge, percent in `0..=100`.
    pub fn battery_soc(&self) -> u8 {
        self.battery_soc
    }

    pub fn load_amps(&self) -> f64 {
        self.load_amps
    }

    pub fn generator_status(&self) -> GeneratorStatus {
        self.generator_status
    }
}

impl TryFrom<TelemetryPayload> for Telemetry {
    type Error = ValidationError;

    fn try_from(payload: TelemetryPayload) -> Result<Self, Self::Error> {
        let checked = validate_payload(&payload)?;
        Ok(Telemetry {
            site_id: payload.site_id,
            grid_price: payload.grid_price,
            battery_soc: checked.battery_soc,
            load_amps: payload.load_amps,
            generator_status: checked.generator_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_status_parses_exact_labels_only() {
        assert_eq!("ON".parse::<GeneratorStatus>(), Ok(GeneratorStatus::On));
        assert_eq!("OFF".parse::<GeneratorStatus>(), Ok(GeneratorStatus::Off));
        assert_eq!(
            "CRANKING".parse::<GeneratorStatus>(),
            Ok(GeneratorStatus::Cranking)
        );
        assert!("on".parse::<GeneratorStatus>().is_err());
        assert!("IDLE".parse::<GeneratorStatus>().is_err());
    }

    #[test]
    fn generator_status_defaults_to_off_when_absent() {
        let telemetry: Telemetry = serde_json::from_str(
            r#"{"site_id":"T9","grid_price":0.1,"battery_soc":50,"load_amps":4.0}"#,
        )
        .unwrap();
        assert_eq!(telemetry.generator_status(), GeneratorStatus::Off);
        assert_eq!(telemetry.battery_soc(), 50);
    }

    #[test]
    fn deserialising_telemetry_runs_the_validator() {
        let err = serde_json::from_str::<Telemetry>(
            r#"{"site_id":"T9","grid_price":0.1,"battery_soc":140,"load_amps":4.0}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("battery_soc"));
    }

    #[test]
    fn soc_accepts_whole_floats_and_rejects_fractions() {
        let payload: TelemetryPayload = serde_json::from_str(
            r#"{"site_id":"T9","grid_price":0.1,"battery_soc":60.0,"load_amps":4.0}"#,
        )
        .unwrap();
        assert_eq!(payload.battery_soc, 60);

        let payload: TelemetryPayload = serde_json::from_str(
            r#"{"site_id":"T9","grid_price":0.1,"battery_soc":-5,"load_amps":4.0}"#,
        )
        .unwrap();
        assert!(payload.validate().is_err());

        let err = serde_json::from_str::<TelemetryPayload>(
            r#"{"site_id":"T9","grid_price":0.1,"battery_soc":60.5,"load_amps":4.0}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("whole-number percentage"));
    }

    #[test]
    fn telemetry_serialises_generator_label() {
        let telemetry = Telemetry::new("T1", 0.25, 60, 10.0, GeneratorStatus::Cranking).unwrap();
        let value = serde_json::to_value(&telemetry).unwrap();
        assert_eq!(value["generator_status"], "CRANKING");
        assert_eq!(value["battery_soc"], 60);
    }
}
