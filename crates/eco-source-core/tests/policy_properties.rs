//! ---
//! ems_section: "15-testing-qa-runbook"
//! ems_subsection: "property-tests"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Property-based tests for the decision rule chain."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Property-based tests for the decision rule chain.

use eco_source_core::{
    ControlAction, GeneratorStatus, PolicyEngine, Telemetry, TelemetryPayload,
    BATTERY_SAFE_LIMIT, PEAK_PRICE_THRESHOLD,
};
use proptest::prelude::*;

fn generator_status() -> impl Strategy<Value = GeneratorStatus> {
    prop_oneof![
        Just(GeneratorStatus::On),
        Just(GeneratorStatus::Off),
        Just(GeneratorStatus::Cranking),
    ]
}

fn telemetry(price: f64, soc: i64, load: f64, status: GeneratorStatus) -> Telemetry {
    Telemetry::new("prop-site", price, soc, load, status).expect("strategy yields valid telemetry")
}

// ============================================================================
// TOTALITY: every valid snapshot yields exactly one command
// ============================================================================

proptest! {
    #[test]
    fn every_valid_snapshot_gets_a_command(
        price in 0.0f64..10.0,
        soc in 0i64..=100,
        load in 0.0f64..1_000.0,
        status in generator_status(),
    ) {
        let command = PolicyEngine::new().evaluate(&telemetry(price, soc, load, status));
        prop_assert!(command.is_ok());
        prop_assert_eq!(command.unwrap().site_id, "prop-site");
    }
}

// ============================================================================
// PRIORITY: peak price with spare charge always discharges the battery
// ============================================================================

proptest! {
    #[test]
    fn peak_price_with_spare_charge_uses_battery(
        price in PEAK_PRICE_THRESHOLD..5.0,
        soc in (i64::from(BATTERY_SAFE_LIMIT) + 1)..=100,
        load in 0.0f64..1_000.0,
        status in generator_status(),
    ) {
        let command = PolicyEngine::new()
            .evaluate(&telemetry(price, soc, load, status))
            .unwrap();
        prop_assert_eq!(command.action, ControlAction::SwitchToBattery);
    }

    #[test]
    fn low_charge_always_falls_back_to_grid(
        price in 0.0f64..5.0,
        soc in 0i64..i64::from(BATTERY_SAFE_LIMIT),
        load in 0.0f64..1_000.0,
        status in generator_status(),
    ) {
        let command = PolicyEngine::new()
            .evaluate(&telemetry(price, soc, load, status))
            .unwrap();
        prop_assert_eq!(command.action, ControlAction::SwitchToGrid);
    }

    #[test]
    fn normal_price_with_stable_charge_maintains(
        price in 0.0f64..PEAK_PRICE_THRESHOLD,
        soc in i64::from(BATTERY_SAFE_LIMIT)..=100,
        load in 0.0f64..1_000.0,
        status in generator_status(),
    ) {
        let command = PolicyEngine::new()
            .evaluate(&telemetry(price, soc, load, status))
            .unwrap();
        prop_assert_eq!(command.action, ControlAction::MaintainCurrent);
    }
}

// ============================================================================
// VALIDATION: out-of-range readings never reach the engine
// ============================================================================

proptest! {
    #[test]
    fn out_of_range_soc_is_rejected(soc in prop_oneof![i64::MIN..0i64, 101i64..i64::MAX]) {
        let result = TelemetryPayload::new("prop-site", 0.1, soc, 1.0).validate();
        prop_assert!(result.is_err());
    }

    #[test]
    fn validation_outcome_is_deterministic(
        price in -1.0f64..1.0,
        soc in -50i64..150,
        label in "[A-Z]{0,9}",
    ) {
        let raw = TelemetryPayload::new("prop-site", price, soc, 1.0).with_generator_status(label);
        let first = raw.clone().validate();
        let second = raw.validate();
        prop_assert_eq!(first, second);
    }
}
