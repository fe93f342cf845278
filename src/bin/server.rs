// Admissions Workflow - REST Server
// Run with: cargo run --bin server -- --workflows config/workflows.json

//! # Admissions Workflow Server Binary
//!
//! Starts the HTTP API over an in-memory engine. Workflows are loaded from a
//! JSON file at startup (see `workflows_file` in the configuration) and
//! registered in order; any marked `is_active` become the active workflow for
//! their application type.
//!
//! ## Startup Sequence
//!
//! ```text
//! .env  ->  AppConfig::load  ->  tracing subscriber
//!   -> StageRegistry (seeded from workflows_file)
//!   -> WorkflowEngine  ->  ApiServer::run
//! ```
//!
//! ## Rust Learning Notes:
//!
//! `#[tokio::main]` turns the async `main` into a synchronous one that builds
//! the runtime first. `anyhow::Result` lets `main` propagate config, IO and
//! server errors through `?` without a shared error enum.

use std::path::PathBuf;
use std::sync::Arc;

use admissions_workflow::api::ApiServer;
use admissions_workflow::config::{load_workflows, AppConfig};
use admissions_workflow::engine::{EventBus, StageRegistry, WorkflowEngine};
use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "admissions-server")]
#[command(about = "Admissions workflow REST server")]
#[command(version)]
struct Cli {
    /// Config file (without extension); defaults to config/admissions
    #[arg(short, long, env = "ADMISSIONS_CONFIG")]
    config: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the workflows file
    #[arg(short, long)]
    workflows: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; the process environment may already be set
    let dotenv_result = dotenv();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(workflows) = cli.workflows {
        config.workflows_file = Some(workflows);
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = dotenv_result {
        info!("No .env file loaded: {}", e);
    }

    info!("🚀 Starting Admissions Workflow Server...");
    info!("=====================================");
    info!("Server: {}:{}", config.server.host, config.server.port);
    info!("Event buffer: {}", config.engine.event_buffer);
    info!("Workflow cache: {}", config.engine.cache_active_workflows);

    let mut registry = StageRegistry::in_memory();
    if !config.engine.cache_active_workflows {
        registry = registry.without_cache();
    }
    let registry = Arc::new(registry);

    match &config.workflows_file {
        Some(path) => {
            let workflows = load_workflows(path)?;
            info!("📄 Loading {} workflow(s) from {}", workflows.len(), path.display());
            for workflow in workflows {
                let registered = registry.register_workflow(workflow).await?;
                info!(
                    "✅ Registered '{}' v{} for {}{}",
                    registered.id,
                    registered.version,
                    registered.application_type,
                    if registered.is_active { " (active)" } else { "" }
                );
            }
        }
        None => warn!("⚠️  No workflows_file configured; applications will not enter a workflow"),
    }

    let engine = WorkflowEngine::builder()
        .registry(registry)
        .events(EventBus::new(config.engine.event_buffer))
        .build();

    ApiServer::new(config.api_config(), Arc::new(engine)).run().await
}
