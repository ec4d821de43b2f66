//! Autoflow CLI and REST API entry point.
//!
//! Binary name: `autoflow`
//!
//! Parses CLI arguments, installs tracing, opens the data directory, then
//! dispatches to a workflow command or starts the REST API server with every
//! enabled workflow's trigger armed.

mod cli;
mod http;
mod state;

use anyhow::Context;
use clap::Parser;
use clap_complete::generate;

use autoflow_infra::config::default_data_dir;
use autoflow_observe::{TracingOptions, init_tracing, shutdown_tracing};
use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Completions need neither tracing nor state.
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "autoflow", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(&TracingOptions {
        verbosity: cli.verbose,
        quiet: cli.quiet,
        json: cli.log_json,
        otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let state = AppState::init(data_dir).await?;

    let result = match cli.command {
        Commands::Serve { port, host } => serve(state, host, port, cli.quiet).await,
        Commands::Workflow { action } => cli::workflow::handle_workflow_command(action, &state, cli.json).await,
        Commands::Completions { .. } => Ok(()),
    };

    shutdown_tracing();
    result
}

/// Recover interrupted executions, arm triggers, and serve the API until
/// Ctrl+C or SIGTERM. All triggers are stopped before returning.
async fn serve(state: AppState, host: Option<String>, port: Option<u16>, quiet: bool) -> anyhow::Result<()> {
    let recovered = state
        .engine
        .recover_interrupted_executions()
        .await
        .context("failed to recover interrupted executions")?;
    let armed = state
        .scheduler
        .initialize_workflow_triggers()
        .await
        .context("failed to initialize workflow triggers")?;

    let host = host.unwrap_or_else(|| state.config.server.host.clone());
    let port = port.unwrap_or(state.config.server.port);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, armed, recovered, "autoflow server started");

    if !quiet {
        println!();
        println!(
            "  {} Autoflow API listening on {}",
            console::style(">").green().bold(),
            console::style(format!("http://{addr}/api/v1")).cyan()
        );
        println!("  {} trigger(s) armed, data in {}", armed, state.data_dir.display());
        if recovered > 0 {
            println!(
                "  {}",
                console::style(format!("{recovered} interrupted execution(s) marked failed")).yellow()
            );
        }
        println!("  {}", console::style("Press Ctrl+C to stop").dim());
    }

    let scheduler = state.scheduler.clone();
    let router = http::router::build_router(state);
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    let stopped = scheduler.stop_all_workflow_triggers();
    tracing::info!(stopped, "workflow triggers stopped");
    if !quiet {
        println!("\n  Server stopped.");
    }

    served.context("server error")
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
