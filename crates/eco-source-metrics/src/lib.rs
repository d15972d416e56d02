//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Metrics collection and export utilities."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use eco_source_core::{ControlAction, ControlCommand, OptimizeError};
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

/// Shared registry type used across services.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Prometheus scrape response for `registry`.
pub fn render_metrics(registry: &Registry) -> Response {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("metrics encoding error"),
            )
                .into_response()
        }
    }
}

/// Metrics recorded by the daemon process itself.
#[derive(Clone)]
pub struct DaemonMetrics {
    starts_total: IntCounter,
    config_load_seconds: Histogram,
}

impl DaemonMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "eco_sourced_starts_total",
            "Total number of times the Eco-Source daemon has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.001, 2.0, 12)
            .context("failed to construct histogram buckets")?;
        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "eco_sourced_config_load_seconds",
                "Time spent loading and validating configuration",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        Ok(Self {
            starts_total,
            config_load_seconds,
        })
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, seconds: f64) {
        self.config_load_seconds.observe(seconds);
    }
}

/// Outcome counters for optimisation requests.
#[derive(Clone)]
pub struct DecisionMetrics {
    decisions: IntCounterVec,
    validation_failures: IntCounter,
    malformed_requests: IntCounter,
    logic_exhaustion: IntCounter,
    evaluation_seconds: Histogram,
}

impl DecisionMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let decisions = IntCounterVec::new(
            Opts::new(
                "eco_source_decisions_total",
                "Control commands issued, by action",
            ),
            &["action"],
        )?;
        registry.register(Box::new(decisions.clone()))?;

        let validation_failures = IntCounter::with_opts(Opts::new(
            "eco_source_validation_failures_total",
            "Telemetry snapshots rejected by the validator",
        ))?;
        registry.register(Box::new(validation_failures.clone()))?;

        let malformed_requests = IntCounter::with_opts(Opts::new(
            "eco_source_malformed_requests_total",
            "Request bodies that could not be decoded as telemetry",
        ))?;
        registry.register(Box::new(malformed_requests.clone()))?;

        let logic_exhaustion = IntCounter::with_opts(Opts::new(
            "eco_source_logic_exhaustion_total",
            "Evaluations where no policy rule produced a decision",
        ))?;
        registry.register(Box::new(logic_exhaustion.clone()))?;

        let buckets = prometheus::exponential_buckets(0.000_001, 4.0, 10)
            .context("failed to construct histogram buckets")?;
        let evaluation_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "eco_source_evaluation_seconds",
                "Time spent validating and evaluating one telemetry snapshot",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(evaluation_seconds.clone()))?;

        // Pre-create every action series so dashboards see zeros.
        for action in [
            ControlAction::SwitchToBattery,
            ControlAction::SwitchToGrid,
            ControlAction::StartGenerator,
            ControlAction::MaintainCurrent,
        ] {
            decisions.with_label_values(&[action.as_str()]);
        }

        Ok(Self {
            decisions,
            validation_failures,
            malformed_requests,
            logic_exhaustion,
            evaluation_seconds,
        })
    }

    pub fn record(&self, outcome: &eco_source_core::Result<ControlCommand>, elapsed: Duration) {
        self.evaluation_seconds.observe(elapsed.as_secs_f64());
        match outcome {
            Ok(command) => self
                .decisions
                .with_label_values(&[command.action.as_str()])
                .inc(),
            Err(OptimizeError::Validation(_)) => self.validation_failures.inc(),
            Err(OptimizeError::Payload(_)) => self.malformed_requests.inc(),
            Err(OptimizeError::Policy(_)) => self.logic_exhaustion.inc(),
        }
    }

    pub fn record_malformed(&self) {
        self.malformed_requests.inc();
    }

    pub fn decisions(&self, action: ControlAction) -> u64 {
        self.decisions.with_label_values(&[action.as_str()]).get()
    }

    pub fn validation_failures(&self) -> u64 {
        self.validation_failures.get()
    }

    pub fn malformed_requests(&self) -> u64 {
        self.malformed_requests.get()
    }

    pub fn logic_exhaustion(&self) -> u64 {
        self.logic_exhaustion.get()
    }
}

pub use prometheus;
