//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Control command emitted for a telemetry snapshot."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};

/// Power source action requested from the site controller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlAction {
    SwitchToBattery,
    SwitchToGrid,
    /// Part of the command vocabulary; no rule emits it yet.
    StartGenerator,
    MaintainCurrent,
}

impl ControlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::SwitchToBattery => "SWITCH_TO_BATTERY",
            ControlAction::SwitchToGrid => "SWITCH_TO_GRID",
            ControlAction::StartGenerator => "START_GENERATOR",
            ControlAction::MaintainCurrent => "MAINTAIN_CURRENT",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Qualitative savings label attached to a command.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SavingsEstimate {
    High,
    Standard,
    #[serde(rename = "None (Safety Priority)")]
    SafetyPriority,
}

impl SavingsEstimate {
    pub fn as_str(&self) -> &'static str {
        match self {
            SavingsEstimate::High => "High",
            SavingsEstimate::Standard => "Standard",
            SavingsEstimate::SafetyPriority => "None (Safety Priority)",
        }
    }
}

impl fmt::Display for SavingsEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single decision returned for one telemetry snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlCommand {
    pub site_id: String,
    pub action: ControlAction,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub savings_estimated: Option<SavingsEstimate>,
}

impl ControlCommand {
    pub fn new(
        site_id: impl Into<String>,
        action: ControlAction,
        reasoning: impl Into<String>,
        savings_estimated: Option<SavingsEstimate>,
    ) -> Self {
        Self {
            site_id: site_id.into(),
            action,
            reasoning: reasoning.into(),
            savings_estimated,
        }
    }
}
