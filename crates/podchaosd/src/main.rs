//! podchaosd — the podchaos daemon.
//!
//! Single binary that wires every controller behind the HTTP surface:
//! - Memory pressure loop (sysinfo-backed)
//! - Stress controller (`stress` tool + process table)
//! - Liveness and readiness probes
//! - REST endpoints + Prometheus metrics
//!
//! # Usage
//!
//! ```text
//! podchaosd serve --port 8080 --config /etc/podchaos.toml
//! podchaosd config --json
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use podchaos_api::{ApiState, HostInfo, KillSwitch, RequestTimer, build_router};
use podchaos_core::ChaosConfig;
use podchaos_memory::{MemoryPressureController, SysinfoStats};
use podchaos_probe::{LivenessProbe, ReadinessProbe};
use podchaos_stress::{StressCommand, StressController, SysinfoRegistry};

const DEFAULT_FILTER: &str = "info,podchaosd=debug,podchaos_api=debug";

/// Exit status used by `/kill`.
const KILL_EXIT_CODE: i32 = -1;

#[derive(Parser)]
#[command(name = "podchaosd", about = "Chaos endpoints for a pod under an orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the chaos endpoints.
    Serve {
        /// Port to listen on (overrides the config file).
        #[arg(long, env = "PORT")]
        port: Option<u16>,

        /// Path to a podchaos.toml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Emit logs as JSON lines.
        #[arg(long)]
        log_json: bool,
    },
    /// Print the effective configuration.
    Config {
        /// Path to a podchaos.toml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print JSON instead of TOML.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            config,
            log_json,
        } => {
            init_tracing(log_json);
            let config = load_config(config.as_deref())?;
            serve(config, port).await
        }
        Command::Config { config, json } => {
            let config = load_config(config.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", config.to_toml_string()?);
            }
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ChaosConfig> {
    match path {
        Some(path) => ChaosConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(ChaosConfig::default()),
    }
}

async fn serve(config: ChaosConfig, port: Option<u16>) -> anyhow::Result<()> {
    info!("podchaos daemon starting");

    // ── Controllers ────────────────────────────────────────────

    let memory = Arc::new(MemoryPressureController::spawn(
        &config.memory,
        SysinfoStats::new(config.memory.limit_bytes),
    )?);

    let generator = Arc::new(StressCommand::new(config.stress.command.clone()));
    let registry = Arc::new(SysinfoRegistry::new());
    let stress = Arc::new(StressController::new(&config.stress, generator, registry));
    info!(command = %config.stress.command, "stress controller initialized");

    let readiness = Arc::new(ReadinessProbe::with_default_threshold(
        config.probes.healing_threshold,
    ));

    let kill: KillSwitch = Arc::new(|| {
        info!(code = KILL_EXIT_CODE, "exiting on request");
        std::process::exit(KILL_EXIT_CODE);
    });

    let state = ApiState {
        memory: memory.clone(),
        stress,
        liveness: Arc::new(LivenessProbe::new()),
        readiness,
        requests: Arc::new(RequestTimer::new()),
        host: Arc::new(HostInfo::detect()),
        kill,
    };

    // ── HTTP server ────────────────────────────────────────────

    let port = port.unwrap_or(config.server.port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    memory.shutdown().await;
    info!("podchaos daemon stopped");
    Ok(())
}
