//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Binary entrypoint for the Eco-Source daemon."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use eco_source_api::{spawn_api_server, ApiState};
use eco_source_common::config::AppConfig;
use eco_source_common::logging::{init_cli_tracing, init_tracing, LogFormat};
use eco_source_core::PolicyEngine;
use eco_source_metrics::{new_registry, DaemonMetrics};
use tokio::signal;
use tracing::{info, warn};

mod evaluate;

const SERVICE_NAME: &str = "eco-sourced";

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Eco-Source site power decision daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", global = true, help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        value_name = "ADDR",
        global = true,
        help = "Override the API listen address"
    )]
    listen: Option<SocketAddr>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Serve the decision API until interrupted")]
    Run,
    #[command(about = "Evaluate one telemetry JSON document and print the command")]
    Evaluate {
        #[arg(long, short, value_name = "FILE", default_value = "-", help = "Input file, or - for stdin")]
        input: String,
    },
    #[command(about = "Load and validate configuration, then print the effective settings")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(cli.config, cli.listen).await,
        Commands::Evaluate { input } => {
            init_cli_tracing(LogFormat::Pretty);
            let document = evaluate::read_input(&input).await?;
            println!("{}", evaluate::evaluate_document(&document)?);
            Ok(())
        }
        Commands::CheckConfig => {
            init_cli_tracing(LogFormat::Pretty);
            let loaded =
                AppConfig::load_with_source(cli.config.as_deref(), &AppConfig::DEFAULT_CANDIDATES)?;
            match &loaded.source {
                Some(path) => eprintln!("configuration loaded from {}", path.display()),
                None => eprintln!("no configuration file found; showing defaults"),
            }
            print!("{}", loaded.config.to_toml()?);
            Ok(())
        }
    }
}

async fn run_daemon(config_path: Option<PathBuf>, listen: Option<SocketAddr>) -> Result<()> {
    let load_started = Instant::now();
    let loaded = AppConfig::load_with_source(config_path.as_deref(), &AppConfig::DEFAULT_CANDIDATES)?;
    let load_duration = load_started.elapsed();
    let mut config = loaded.config;
    if let Some(addr) = listen {
        config.api.listen = addr;
    }

    init_tracing(SERVICE_NAME, &config.logging)?;
    match &loaded.source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => warn!("no configuration file found; running with defaults"),
    }

    let engine = PolicyEngine::new();
    let state = if config.metrics.enabled {
        let registry = new_registry();
        let daemon_metrics = DaemonMetrics::new(&registry)?;
        daemon_metrics.inc_start();
        daemon_metrics.observe_config_load(load_duration.as_secs_f64());
        ApiState::new(engine).with_metrics(registry)?
    } else {
        info!("metrics disabled by configuration");
        ApiState::new(engine)
    };

    let server = spawn_api_server(
        Arc::new(state),
        config.api.listen,
        config.api.request_timeout,
    )?;
    info!(address = %server.addr(), rules = engine.rules().len(), "daemon running; waiting for termination signal");

    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    server.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn listen_is_accepted_after_the_run_subcommand() {
        let cli = Cli::try_parse_from(["eco-sourced", "run", "--listen", "127.0.0.1:9000"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Run)));
        assert_eq!(cli.listen, Some("127.0.0.1:9000".parse().unwrap()));

        let cli = Cli::try_parse_from(["eco-sourced", "--listen", "127.0.0.1:9001"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.listen.map(|addr| addr.port()), Some(9001));
    }

    #[test]
    fn config_path_is_shared_by_every_subcommand() {
        let cli = Cli::try_parse_from(["eco-sourced", "check-config", "--config", "site.toml"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::CheckConfig)));
        assert_eq!(cli.config, Some(PathBuf::from("site.toml")));
    }
}
