//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Error taxonomy for telemetry validation and policy evaluation."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use thiserror::Error;

use crate::validation::ValidationError;

pub type Result<T> = std::result::Result<T, OptimizeError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PolicyError {
    #[error(
        "policy rule chain produced no decision for site {site_id} \
         (grid_price={grid_price}, battery_soc={battery_soc}%)"
    )]
    LogicExhaustion {
        site_id: String,
        grid_price: f64,
        battery_soc: u8,
    },
}

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("malformed telemetry payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

impl OptimizeError {
    /// True when resubmitting corrected input can succeed.
    pub fn is_client_error(&self) -> bool {
        matches!(self, OptimizeError::Payload(_) | OptimizeError::Validation(_))
    }

    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            OptimizeError::Validation(err) => Some(err),
            _ => None,
        }
    }
}
