//! CLI workflow management subcommands.
//!
//! Provides list, show, import, validate, run, enable, disable, executions
//! and logs against the local database. Changes made here reach a running
//! server's triggers after `POST /api/v1/triggers/reload`.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use autoflow_core::repository::workflow::WorkflowStore;
use autoflow_core::trigger::describe_trigger;
use autoflow_infra::workflow_file::{read_definition, workflow_from_definition};
use autoflow_types::execution::{ExecutionStatus, LogLevel};
use autoflow_types::workflow::Workflow;

use crate::state::AppState;

/// Workflow management subcommands.
#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// List all workflows.
    #[command(alias = "ls")]
    List,

    /// Show one workflow's definition.
    Show {
        /// Workflow UUID or name.
        workflow: String,
    },

    /// Validate and save a workflow from a YAML or JSON file.
    Import {
        /// Path to the definition (`.json` is JSON, anything else YAML).
        file: PathBuf,
    },

    /// Validate a definition file without saving it.
    Validate {
        /// Path to the definition.
        file: PathBuf,
    },

    /// Run a workflow now and wait for it to finish.
    Run {
        /// Workflow UUID or name.
        workflow: String,

        /// JSON object passed as trigger data.
        #[arg(long)]
        data: Option<String>,
    },

    /// Enable a workflow.
    Enable {
        /// Workflow UUID or name.
        workflow: String,
    },

    /// Disable a workflow.
    Disable {
        /// Workflow UUID or name.
        workflow: String,
    },

    /// Show recent executions of a workflow.
    Executions {
        /// Workflow UUID or name.
        workflow: String,

        /// Maximum number of executions to display.
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Show the log trail of one execution.
    Logs {
        /// Execution UUID.
        execution_id: String,
    },
}

/// Handle a workflow subcommand.
pub async fn handle_workflow_command(cmd: WorkflowCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        WorkflowCommand::List => handle_list(state, json).await,
        WorkflowCommand::Show { workflow } => handle_show(&workflow, state, json).await,
        WorkflowCommand::Import { file } => handle_import(&file, state, json).await,
        WorkflowCommand::Validate { file } => handle_validate(&file, state, json).await,
        WorkflowCommand::Run { workflow, data } => handle_run(&workflow, data.as_deref(), state, json).await,
        WorkflowCommand::Enable { workflow } => handle_set_enabled(&workflow, true, state, json).await,
        WorkflowCommand::Disable { workflow } => handle_set_enabled(&workflow, false, state, json).await,
        WorkflowCommand::Executions { workflow, limit } => handle_executions(&workflow, limit, state, json).await,
        WorkflowCommand::Logs { execution_id } => handle_logs(&execution_id, state, json).await,
    }
}

/// Resolve a workflow by UUID, falling back to an exact name match.
async fn resolve_workflow(target: &str, state: &AppState) -> Result<Workflow> {
    let store = state.engine.workflow_store();
    if let Ok(id) = target.parse::<Uuid>() {
        if let Some(workflow) = store.get_workflow(&id).await? {
            return Ok(workflow);
        }
    }

    let mut matches: Vec<Workflow> = store
        .list_workflows()
        .await?
        .into_iter()
        .filter(|wf| wf.name == target)
        .collect();
    match matches.len() {
        0 => bail!("Workflow '{target}' not found"),
        1 => Ok(matches.remove(0)),
        n => bail!("{n} workflows are named '{target}'; use the UUID instead"),
    }
}

fn status_cell(status: ExecutionStatus) -> Cell {
    let color = match status {
        ExecutionStatus::Completed => Color::Green,
        ExecutionStatus::Failed => Color::Red,
        ExecutionStatus::Running => Color::Yellow,
        ExecutionStatus::Pending => Color::Grey,
    };
    Cell::new(status.as_str()).fg(color)
}

fn new_table(header: Vec<Cell>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

// ---------------------------------------------------------------------------
// List / show
// ---------------------------------------------------------------------------

async fn handle_list(state: &AppState, json: bool) -> Result<()> {
    let workflows = state.engine.workflow_store().list_workflows().await?;

    if json {
        let out: Vec<_> = workflows
            .iter()
            .map(|wf| {
                serde_json::json!({
                    "id": wf.id.to_string(),
                    "name": wf.name,
                    "trigger_type": wf.trigger_type,
                    "trigger": describe_trigger(wf),
                    "actions": wf.actions.len(),
                    "enabled": wf.enabled,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if workflows.is_empty() {
        println!();
        println!("  No workflows registered.");
        println!("  Import one with: {}", style("autoflow workflow import <file.yaml>").dim());
        println!();
        return Ok(());
    }

    let mut table = new_table(vec![
        Cell::new("Name").fg(Color::Cyan),
        Cell::new("Trigger"),
        Cell::new("Actions"),
        Cell::new("Enabled"),
        Cell::new("ID"),
    ]);
    for wf in &workflows {
        let enabled = if wf.enabled {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(&wf.name),
            Cell::new(describe_trigger(wf)),
            Cell::new(wf.actions.len()),
            enabled,
            Cell::new(wf.id),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn handle_show(target: &str, state: &AppState, json: bool) -> Result<()> {
    let workflow = resolve_workflow(target, state).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&workflow)?);
        return Ok(());
    }

    println!();
    println!("  {} {}", style(&workflow.name).cyan().bold(), style(workflow.id).dim());
    if let Some(description) = &workflow.description {
        println!("  {description}");
    }
    println!("  Trigger: {} ({})", workflow.trigger_type, describe_trigger(&workflow));
    println!("  Enabled: {}", workflow.enabled);
    println!("  Actions:");
    for (index, action) in workflow.actions.iter().enumerate() {
        println!(
            "    {}. {} {}",
            index + 1,
            style(action.kind.as_str()).yellow(),
            style(action.config.to_string()).dim()
        );
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Import / validate
// ---------------------------------------------------------------------------

async fn handle_import(file: &PathBuf, state: &AppState, json: bool) -> Result<()> {
    let definition = read_definition(file).await?;

    let report = state.engine.validate_workflow(&definition);
    if !report.valid {
        print_errors(&report.errors, json)?;
        bail!("Workflow definition in {} is invalid", file.display());
    }

    let workflow = workflow_from_definition(&definition)?;
    state
        .engine
        .workflow_store()
        .save_workflow(&workflow)
        .await
        .context("Failed to save workflow")?;

    if json {
        let out = serde_json::json!({
            "id": workflow.id.to_string(),
            "name": workflow.name,
            "actions": workflow.actions.len(),
            "trigger": describe_trigger(&workflow),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!("  {} Imported workflow '{}'", style("*").green().bold(), style(&workflow.name).cyan());
        println!("  ID: {}", workflow.id);
        println!("  Trigger: {}", describe_trigger(&workflow));
        println!("  Actions: {}", workflow.actions.len());
        println!();
    }
    Ok(())
}

async fn handle_validate(file: &PathBuf, state: &AppState, json: bool) -> Result<()> {
    let definition = read_definition(file).await?;
    let report = state.engine.validate_workflow(&definition);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.valid {
        println!("  {} {} is valid", style("*").green().bold(), file.display());
    } else {
        print_errors(&report.errors, false)?;
    }

    if !report.valid {
        bail!("{} validation error(s)", report.errors.len());
    }
    Ok(())
}

fn print_errors(errors: &[String], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "valid": false, "errors": errors }))?);
        return Ok(());
    }
    println!();
    for error in errors {
        println!("  {} {error}", style("x").red().bold());
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Run / enable / disable
// ---------------------------------------------------------------------------

async fn handle_run(target: &str, data: Option<&str>, state: &AppState, json: bool) -> Result<()> {
    let workflow = resolve_workflow(target, state).await?;
    let data: serde_json::Value = match data {
        Some(raw) => serde_json::from_str(raw).context("--data must be valid JSON")?,
        None => serde_json::json!({}),
    };
    if !data.is_object() {
        bail!("--data must be a JSON object");
    }

    let execution = state.engine.trigger_workflow_manually(&workflow.id, data).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&execution)?);
    } else {
        let marker = match execution.status {
            ExecutionStatus::Completed => style("*").green().bold(),
            _ => style("x").red().bold(),
        };
        println!();
        println!(
            "  {marker} {} {} in {}ms",
            style(&workflow.name).cyan(),
            execution.status.as_str(),
            execution.duration_ms().unwrap_or_default()
        );
        println!("  Execution: {}", execution.id);
        if let Some(error) = &execution.error_message {
            println!("  Error: {}", style(error).red());
        }
        println!("  Logs: {}", style(format!("autoflow workflow logs {}", execution.id)).dim());
        println!();
    }

    if execution.status == ExecutionStatus::Failed {
        bail!("Execution {} failed", execution.id);
    }
    Ok(())
}

async fn handle_set_enabled(target: &str, enabled: bool, state: &AppState, json: bool) -> Result<()> {
    let workflow = resolve_workflow(target, state).await?;
    state.engine.workflow_store().set_enabled(&workflow.id, enabled).await?;

    if json {
        let out = serde_json::json!({ "id": workflow.id.to_string(), "enabled": enabled });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        let verb = if enabled { "Enabled" } else { "Disabled" };
        println!("  {} {verb} workflow '{}'", style("*").green().bold(), style(&workflow.name).cyan());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Executions / logs
// ---------------------------------------------------------------------------

async fn handle_executions(target: &str, limit: Option<u32>, state: &AppState, json: bool) -> Result<()> {
    let workflow = resolve_workflow(target, state).await?;
    let executions = state.engine.get_workflow_executions(&workflow.id, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&executions)?);
        return Ok(());
    }

    if executions.is_empty() {
        println!("  No executions for '{}'.", workflow.name);
        return Ok(());
    }

    let mut table = new_table(vec![
        Cell::new("Execution").fg(Color::Cyan),
        Cell::new("Status"),
        Cell::new("Started"),
        Cell::new("Duration"),
        Cell::new("Error"),
    ]);
    for execution in &executions {
        table.add_row(vec![
            Cell::new(execution.id),
            status_cell(execution.status),
            Cell::new(execution.started_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(
                execution
                    .duration_ms()
                    .map(|ms| format!("{ms}ms"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(execution.error_message.as_deref().unwrap_or("")),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn handle_logs(execution_id: &str, state: &AppState, json: bool) -> Result<()> {
    let id: Uuid = execution_id
        .parse()
        .with_context(|| format!("'{execution_id}' is not a valid execution ID"))?;
    let execution = state.engine.get_execution(&id).await?;
    let logs = state.engine.get_workflow_logs(&id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&logs)?);
        return Ok(());
    }

    println!();
    println!("  Execution {} ({})", style(execution.id).cyan(), execution.status.as_str());
    println!();
    for entry in &logs {
        let level = match entry.level {
            LogLevel::Info => style("INFO ").blue(),
            LogLevel::Warning => style("WARN ").yellow(),
            LogLevel::Error => style("ERROR").red(),
        };
        println!(
            "  {} {level} {}",
            style(entry.timestamp.format("%H:%M:%S%.3f")).dim(),
            entry.message
        );
    }
    println!();
    Ok(())
}
