//! CLI command definitions for the `autoflow` binary.
//!
//! Uses clap derive macros for argument parsing: `autoflow serve`,
//! `autoflow workflow <verb>`, `autoflow completions <shell>`.

pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Event-driven workflow automation engine.
#[derive(Parser)]
#[command(name = "autoflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Directory holding `config.toml` and `autoflow.db`.
    #[arg(long, env = "AUTOFLOW_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Arm every enabled workflow's trigger and start the REST API server.
    Serve {
        /// Port to listen on (default: `[server] port`).
        #[arg(short, long, env = "AUTOFLOW_PORT")]
        port: Option<u16>,

        /// Host to bind to (default: `[server] host`).
        #[arg(long, env = "AUTOFLOW_HOST")]
        host: Option<String>,
    },

    /// Manage workflow definitions and inspect executions.
    #[command(alias = "wf")]
    Workflow {
        #[command(subcommand)]
        action: workflow::WorkflowCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
