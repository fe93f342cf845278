//! Admissions Workflow Admin CLI
//!
//! Offline checks for workflow definition files before they are loaded by the
//! server: structural validation, a readable description of the state machine
//! and lint warnings for configurations that are legal but probably wrong.

use std::collections::HashSet;
use std::path::PathBuf;

use admissions_workflow::config::load_workflows;
use admissions_workflow::models::{Workflow, STAGE_ENTERED};
use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

#[derive(Parser)]
#[command(name = "admissions-admin")]
#[command(about = "Admissions Workflow Admin CLI - Inspect and check workflow definitions")]
#[command(version = "1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check structural rules for every workflow in a file
    Validate {
        /// JSON file holding one workflow or an array of them
        file: PathBuf,
    },

    /// Print stages and transitions
    Describe {
        file: PathBuf,

        /// Only describe this workflow id
        #[arg(long)]
        workflow_id: Option<String>,
    },

    /// Report suspicious but valid configuration
    Lint {
        file: PathBuf,

        /// Exit with an error when any warning is found
        #[arg(long)]
        deny_warnings: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    match cli.command {
        Commands::Validate { file } => {
            let workflows = load_workflows(&file)?;
            let mut failures = 0;
            for workflow in &workflows {
                match workflow.validate() {
                    Ok(()) => println!("{} {}", "✓".green().bold(), workflow.id),
                    Err(e) => {
                        failures += 1;
                        println!("{} {}: {}", "✗".red().bold(), workflow.id, e);
                    }
                }
            }
            if failures > 0 {
                anyhow::bail!("{} of {} workflow(s) failed validation", failures, workflows.len());
            }
        }

        Commands::Describe { file, workflow_id } => {
            let workflows = load_workflows(&file)?;
            let selected: Vec<&Workflow> = workflows
                .iter()
                .filter(|w| workflow_id.as_deref().map_or(true, |id| w.id.as_str() == id))
                .collect();
            if selected.is_empty() {
                anyhow::bail!("no matching workflow in {}", file.display());
            }
            for workflow in selected {
                describe(workflow);
            }
        }

        Commands::Lint { file, deny_warnings } => {
            let workflows = load_workflows(&file)?;
            let mut total = 0;
            for workflow in &workflows {
                let warnings = lint(workflow);
                if warnings.is_empty() {
                    println!("{} {}", "✓".green().bold(), workflow.id);
                    continue;
                }
                total += warnings.len();
                println!("{} {}", "!".yellow().bold(), workflow.id.to_string().bold());
                for warning in warnings {
                    println!("   {} {}", "warning:".yellow(), warning);
                }
            }
            if deny_warnings && total > 0 {
                anyhow::bail!("{} lint warning(s)", total);
            }
        }
    }

    Ok(())
}

fn describe(workflow: &Workflow) {
    let status = if workflow.is_active {
        "active".green()
    } else {
        "inactive".dimmed()
    };
    println!(
        "{} {} ({}) [{}]",
        workflow.id.to_string().bold(),
        workflow.name,
        workflow.application_type,
        status
    );

    let start = workflow.start_stage().map(|s| s.id.clone());
    println!("  {}", "Stages:".cyan());
    for stage in workflow.stages_in_order() {
        let mut marks = Vec::new();
        if Some(&stage.id) == start.as_ref() {
            marks.push("start");
        }
        if workflow.is_terminal(&stage.id) {
            marks.push("terminal");
        }
        let marks = if marks.is_empty() {
            String::new()
        } else {
            format!(" [{}]", marks.join(", "))
        };
        println!("    {:>3}. {} - {}{}", stage.sequence, stage.id, stage.name, marks.dimmed());

        if !stage.required_documents.is_empty() {
            let docs: Vec<&str> = stage.required_documents.iter().map(String::as_str).collect();
            println!("         documents: {}", docs.join(", "));
        }
        if !stage.required_actions.is_empty() {
            let actions: Vec<&str> = stage.required_actions.iter().map(String::as_str).collect();
            println!("         actions: {}", actions.join(", "));
        }
    }

    println!("  {}", "Transitions:".cyan());
    for transition in &workflow.transitions {
        let kind = if transition.is_automatic {
            format!("auto, {} condition(s)", transition.transition_conditions.len()).magenta()
        } else if transition.required_permissions.is_empty() {
            "manual".normal()
        } else {
            let perms: Vec<&str> = transition.required_permissions.iter().map(String::as_str).collect();
            format!("manual, needs {}", perms.join(" + ")).normal()
        };
        println!(
            "    {} -> {}  {} ({})",
            transition.source_stage_id, transition.target_stage_id, transition.id, kind
        );
    }
    println!();
}

/// Warnings for a workflow that may still pass validation
fn lint(workflow: &Workflow) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Err(e) = workflow.validate() {
        warnings.push(format!("invalid: {}", e));
        return warnings;
    }

    for stage in workflow.unreachable_stages() {
        warnings.push(format!("stage '{}' is unreachable from the start stage", stage.id));
    }

    // An unconditional automatic edge always wins, so later automatic edges
    // from the same source never fire
    let mut unconditional: HashSet<&str> = HashSet::new();
    for transition in workflow.transitions.iter().filter(|t| t.is_automatic) {
        let source = transition.source_stage_id.as_str();
        if unconditional.contains(source) {
            warnings.push(format!(
                "automatic transition '{}' is shadowed by an earlier unconditional one from '{}'",
                transition.id, source
            ));
        }
        if transition.transition_conditions.is_empty() {
            unconditional.insert(source);
        }
    }

    for transition in workflow.transitions.iter().filter(|t| !t.is_automatic) {
        if transition.required_permissions.is_empty() {
            warnings.push(format!(
                "manual transition '{}' requires no permissions; any user can fire it",
                transition.id
            ));
        }
    }

    for stage in &workflow.stages {
        for trigger in &stage.notification_triggers {
            if trigger.event != STAGE_ENTERED {
                warnings.push(format!(
                    "stage '{}' has a trigger for unknown event '{}'",
                    stage.id, trigger.event
                ));
            }
        }
    }

    warnings
}
