//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Eco-Source rule chain mapping site telemetry to a control command."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! The rules form an ordered chain: the first rule returning a command wins
//! and later rules are never consulted. Order encodes priority.

use std::fmt;

use tracing::{debug, error};

use crate::{
    command::{ControlAction, ControlCommand, SavingsEstimate},
    errors::PolicyError,
    telemetry::Telemetry,
};

/// Grid price (per kWh) at or above which stored energy is preferred.
pub const PEAK_PRICE_THRESHOLD: f64 = 0.20;
/// State of charge (percent) below which the battery must not be discharged.
pub const BATTERY_SAFE_LIMIT: u8 = 30;
/// Reserved threshold; no rule reads it yet.
pub const BATTERY_FULL_ENOUGH: u8 = 80;

pub type RuleFn = fn(&Telemetry) -> Option<ControlCommand>;

/// A named step of the rule chain.
#[derive(Clone, Copy)]
pub struct PolicyRule {
    name: &'static str,
    decide: RuleFn,
}

impl PolicyRule {
    pub const fn new(name: &'static str, decide: RuleFn) -> Self {
        Self { name, decide }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn apply(&self, telemetry: &Telemetry) -> Option<ControlCommand> {
        (self.decide)(telemetry)
    }
}

impl fmt::Debug for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyRule").field("name", &self.name).finish()
    }
}

/// Standard chain: peak shaving, then low-battery safety, then hold.
pub static STANDARD_RULES: [PolicyRule; 3] = [
    PolicyRule::new("peak_shaving", peak_shaving),
    PolicyRule::new("low_battery_safety", low_battery_safety),
    PolicyRule::new("default_maintain", default_maintain),
];

fn peak_shaving(telemetry: &Telemetry) -> Option<ControlCommand> {
    if telemetry.grid_price() >= PEAK_PRICE_THRESHOLD
        && telemetry.battery_soc() > BATTERY_SAFE_LIMIT
    {
        return Some(ControlCommand::new(
            telemetry.site_id(),
            ControlAction::SwitchToBattery,
            format!(
                "Price ({:?}) is High. Battery has capacity ({}%).",
                telemetry.grid_price(),
                telemetry.battery_soc()
            ),
            Some(SavingsEstimate::High),
        ));
    }
    None
}

fn low_battery_safety(telemetry: &Telemetry) -> Option<ControlCommand> {
    if telemetry.battery_soc() < BATTERY_SAFE_LIMIT {
        return Some(ControlCommand::new(
            telemetry.site_id(),
            ControlAction::SwitchToGrid,
            format!(
                "Battery low ({}%). Must charge from Grid.",
                telemetry.battery_soc()
            ),
            Some(SavingsEstimate::SafetyPriority),
        ));
    }
    None
}

fn default_maintain(telemetry: &Telemetry) -> Option<ControlCommand> {
    Some(ControlCommand::new(
        telemetry.site_id(),
        ControlAction::MaintainCurrent,
        "Grid price is normal and battery is stable.",
        Some(SavingsEstimate::Standard),
    ))
}

/// Command together with the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub rule: &'static str,
    pub command: ControlCommand,
}

/// Stateless evaluator over an immutable rule chain.
///
/// Holds no mutable state, so one instance can be shared freely across
/// threads and requests.
#[derive(Debug, Clone, Copy)]
pub struct PolicyEngine {
    rules: &'static [PolicyRule],
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self {
            rules: &STANDARD_RULES,
        }
    }

    /// Build an engine over a custom chain, mainly for diagnostics and tests.
    pub const fn with_rules(rules: &'static [PolicyRule]) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &'static [PolicyRule] {
        self.rules
    }

    pub fn evaluate(&self, telemetry: &Telemetry) -> Result<ControlCommand, PolicyError> {
        self.evaluate_with_rule(telemetry)
            .map(|decision| decision.command)
    }

    /// Walk the chain top to bottom and stop at the first rule that fires.
    pub fn evaluate_with_rule(&self, telemetry: &Telemetry) -> Result<Decision, PolicyError> {
        for rule in self.rules {
            if let Some(command) = rule.apply(telemetry) {
                debug!(
                    rule = rule.name(),
                    site_id = %telemetry.site_id(),
                    grid_price = telemetry.grid_price(),
                    battery_soc = telemetry.battery_soc(),
                    action = %command.action,
                    "policy rule matched"
                );
                return Ok(Decision {
                    rule: rule.name(),
                    command,
                });
            }
        }

        error!(
            site_id = %telemetry.site_id(),
            grid_price = telemetry.grid_price(),
            battery_soc = telemetry.battery_soc(),
            rules = self.rules.len(),
            "policy rule chain exhausted without a decision"
        );
        Err(PolicyError::LogicExhaustion {
            site_id: telemetry.site_id().to_owned(),
            grid_price: telemetry.grid_price(),
            battery_soc: telemetry.battery_soc(),
        })
    }
}
