//! Portal server host: configuration layering, logging, wiring, shutdown.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use mcp_portal::config::PortalConfig;
use portal_db::DbHandle;

/// Exit codes: `0` clean shutdown, `1` internal error, `2` configuration
/// missing/invalid, `3` dependency unreachable at startup.
const EXIT_INTERNAL: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_DEPENDENCY: u8 = 3;

/// MCP Portal - multi-tenant management portal for MCP servers
#[derive(Parser)]
#[command(name = "portal-server")]
#[command(about = "MCP Portal - multi-tenant management portal for MCP servers")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override for the HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Validate configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Layered config: defaults -> YAML (if provided) -> env (PORTAL__*)
    // -> CLI overrides.
    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    if let Err(message) = config.validate() {
        eprintln!("configuration error: {message}");
        return ExitCode::from(EXIT_CONFIG);
    }

    if cli.print_config {
        match serde_json::to_string_pretty(&config) {
            Ok(rendered) => {
                println!("{rendered}");
                return ExitCode::SUCCESS;
            }
            Err(e) => {
                eprintln!("failed to render configuration: {e}");
                return ExitCode::from(EXIT_INTERNAL);
            }
        }
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Check => {
            println!("Configuration is valid");
            ExitCode::SUCCESS
        }
        Commands::Run => run_server(config).await,
    }
}

fn init_logging(verbosity: u8) {
    let default_directive = match verbosity {
        0 => "warn,portal_server=info,mcp_portal=info",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<PortalConfig> {
    let mut figment = Figment::from(Serialized::defaults(PortalConfig::default()));
    if let Some(path) = path {
        if !path.is_file() {
            anyhow::bail!("config file does not exist: {}", path.display());
        }
        figment = figment.merge(Yaml::file(path));
    }
    figment = figment.merge(Env::prefixed("PORTAL__").split("__"));
    figment
        .extract()
        .context("failed to parse configuration")
}

async fn run_server(config: PortalConfig) -> ExitCode {
    tracing::info!("MCP Portal starting");

    // Root cancellation token for the whole process; drives the session
    // sweeper, the block sweeper, the audit writer and in-flight
    // executions.
    let cancel = CancellationToken::new();
    let cancel_for_signals = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown signal received"),
            Err(e) => tracing::warn!(error = %e, "failed to listen for shutdown signal"),
        }
        cancel_for_signals.cancel();
    });

    let db = match DbHandle::connect(&config.database.dsn).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, "database unreachable at startup");
            eprintln!("database unreachable: {e}");
            return ExitCode::from(EXIT_DEPENDENCY);
        }
    };

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let state = mcp_portal::build(config, db, &cancel);

    // Non-fatal probe: the container tool may come up after us; /health
    // keeps reporting it.
    if let Err(e) = state.executor.health().await {
        tracing::warn!(error = %e, "container tool probe failed at startup");
    }

    let router = mcp_portal::api::rest::router(state);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, addr = %bind_addr, "failed to bind listen address");
            eprintln!("failed to bind {bind_addr}: {e}");
            return ExitCode::from(EXIT_DEPENDENCY);
        }
    };
    tracing::info!(addr = %bind_addr, "listening");

    let shutdown = cancel.clone();
    let served = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await;

    // Give background tasks a chance to drain after the listener closes.
    cancel.cancel();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    match served {
        Ok(()) => {
            tracing::info!("clean shutdown");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "server error");
            ExitCode::from(EXIT_INTERNAL)
        }
    }
}
