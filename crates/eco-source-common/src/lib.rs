//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the core runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Shared runtime primitives for the Eco-Source workspace: configuration
//! loading and tracing initialisation.

pub mod config;
pub mod logging;

pub use config::{ApiConfig, AppConfig, LoadedAppConfig, LoggingConfig, MetricsConfig};
pub use logging::{init_cli_tracing, init_tracing, LogFormat, LogSinks};
