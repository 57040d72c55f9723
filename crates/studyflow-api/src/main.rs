//! studyflow CLI and REST API entry point.
//!
//! Binary name: `studyflow`
//!
//! Parses CLI arguments, initializes database and services, then dispatches
//! to the appropriate command handler, starts the REST API server, or runs
//! the scheduler daemon.

mod cli;
mod http;
mod state;

use std::time::Duration;

use clap::Parser;
use clap_complete::generate;
use tracing_subscriber::EnvFilter;

use studyflow_core::workflow::scheduler::SchedulerDaemon;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli);

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "studyflow", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init().await?;

    match cli.command {
        Commands::Workflow { action } => {
            cli::workflow::handle_workflow_command(action, &state, &cli.user, cli.json).await?;
        }
        Commands::Schedule { action } => {
            cli::schedule::handle_schedule_command(action, &state, &cli.user, cli.json).await?;
        }
        Commands::Key { action } => {
            cli::key::handle_key_command(action, &state, &cli.user, cli.json).await?;
        }
        Commands::Serve { port, host } => serve(state, host, port).await?,
        Commands::Scheduler => run_scheduler(state).await?,
        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` overrides the verbosity flags.
fn init_tracing(cli: &Cli) {
    let default = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,studyflow=debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

async fn start_daemon(state: &AppState) -> anyhow::Result<SchedulerDaemon> {
    let daemon = SchedulerDaemon::new();
    daemon
        .start(
            state.task_scheduler.clone(),
            Duration::from_secs(state.config.scheduler.interval_secs.max(1)),
        )
        .await?;
    Ok(daemon)
}

/// `studyflow serve`: REST API plus the scheduler daemon.
async fn serve(state: AppState, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    state.recover_interrupted_runs().await?;

    if !http::extractors::auth::has_api_keys(&state).await? {
        println!();
        println!(
            "  {} No API keys yet. Create one with: {}",
            console::style("!").yellow().bold(),
            console::style("studyflow key create --user <id>").dim()
        );
    }

    let host = host.unwrap_or_else(|| state.config.server.host.clone());
    let port = port.unwrap_or(state.config.server.port);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let daemon = start_daemon(&state).await?;

    println!();
    println!(
        "  {} studyflow API listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}/api/v1")).cyan()
    );
    println!("  Data directory: {}", state.data_dir.display());
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let router = http::router::build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    daemon.stop().await?;
    println!("\n  Server stopped.");
    Ok(())
}

/// `studyflow scheduler`: only the scheduler daemon, until Ctrl+C.
async fn run_scheduler(state: AppState) -> anyhow::Result<()> {
    state.recover_interrupted_runs().await?;

    let daemon = start_daemon(&state).await?;
    println!(
        "  {} Scheduler running every {}s. {}",
        console::style("⏱").bold(),
        state.config.scheduler.interval_secs.max(1),
        console::style("Press Ctrl+C to stop").dim()
    );

    shutdown_signal().await;
    daemon.stop().await?;
    println!("\n  Scheduler stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
