// crates/relaycli/src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relaycore::{ExecutionEvent, NodeEvent, NodeResult, NodeSpec, RunStatus, Workflow};
use relayruntime::{Catalog, CatalogClient, RelayRuntime, RuntimeConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Relay workflow runtime CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Run input as a JSON value
        #[arg(short, long)]
        input: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Print the run outcome as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Check a workflow file without executing it
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List core processors
    Nodes,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },

    /// Browse the plugin host's event catalog
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
}

#[derive(Subcommand)]
enum CatalogCommand {
    /// List event sources
    Sources,
    /// List event types, optionally of one source
    Types {
        #[arg(short, long)]
        source: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            input,
            verbose,
            json,
        } => {
            init_tracing(verbose);
            run_workflow(file, input, json).await
        }

        Commands::Validate { file } => {
            init_tracing(false);
            validate_workflow(file)
        }

        Commands::Nodes => {
            list_nodes()?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Init { output } => {
            create_example_workflow(output)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Catalog { command } => {
            init_tracing(false);
            show_catalog(command).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn create_runtime() -> Result<RelayRuntime> {
    let config = RuntimeConfig::from_env().context("invalid runtime configuration")?;
    let registry = relaynodes::default_registry()?;
    tracing::debug!(
        "Plugin host at {} (timeout {}ms, {} retries), {} core processors",
        config.plugin_host.base_url,
        config.plugin_host.timeout.as_millis(),
        config.plugin_host.max_retries,
        registry.len()
    );
    Ok(RelayRuntime::new(registry, config))
}

async fn run_workflow(file: PathBuf, input: Option<String>, json: bool) -> Result<ExitCode> {
    println!("🚀 Loading workflow from: {}", file.display());

    let workflow = relayruntime::load_workflow(&file)?;

    println!("📋 Workflow: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Edges: {}", workflow.edges.len());
    println!();

    let input: serde_json::Value = match input {
        Some(raw) => serde_json::from_str(&raw).context("--input must be valid JSON")?,
        None => serde_json::Value::Null,
    };

    let runtime = create_runtime()?;

    // Ctrl-C cancels the run; pending nodes are skipped
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });

    // Subscribe to events for real-time output
    let mut events = runtime.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::RunStarted { .. } => {
                    println!("▶️  Workflow started");
                }
                ExecutionEvent::NodeStarted {
                    node_id, binding, ..
                } => {
                    println!("  ⚡ Starting node: {} ({})", node_id, binding);
                }
                ExecutionEvent::NodeSucceeded {
                    node_id,
                    duration_ms,
                    ..
                } => {
                    println!("  ✅ Node {} completed in {}ms", node_id, duration_ms);
                }
                ExecutionEvent::NodeFailed {
                    node_id,
                    kind,
                    error,
                    ..
                } => {
                    println!("  ❌ Node {} failed [{}]: {}", node_id, kind, error);
                }
                ExecutionEvent::NodeSkipped {
                    node_id, reason, ..
                } => {
                    println!("  ⏭️  Node {} skipped: {}", node_id, reason);
                }
                ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
                    NodeEvent::Info { message } => {
                        println!("     ℹ️  [{}] {}", node_id, message);
                    }
                    NodeEvent::Warning { message } => {
                        println!("     ⚠️  [{}] {}", node_id, message);
                    }
                    NodeEvent::Progress { percent, message } => {
                        if let Some(msg) = message {
                            println!("     📊 [{}] {}% - {}", node_id, percent, msg);
                        } else {
                            println!("     📊 [{}] {}%", node_id, percent);
                        }
                    }
                },
                ExecutionEvent::RunCompleted {
                    status,
                    duration_ms,
                    ..
                } => {
                    match status {
                        RunStatus::Completed => {
                            println!("✨ Workflow completed successfully in {}ms", duration_ms)
                        }
                        other => println!("💥 Workflow finished as {} after {}ms", other, duration_ms),
                    }
                    break;
                }
            }
        }
    });

    let outcome = match runtime.execute_with_cancel(&workflow, input, cancel).await {
        Ok(outcome) => outcome,
        Err(e) => {
            event_task.abort();
            tracing::error!("Workflow {} rejected: {}", workflow.id, e);
            return Err(e).context("workflow rejected before execution");
        }
    };
    // The listener stops on RunCompleted
    let _ = event_task.await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!();
        println!("📊 Execution Summary:");
        println!("   Execution ID: {}", outcome.execution_id);
        println!("   Status: {}", outcome.status);
        println!(
            "   Succeeded: {}  Failed: {}  Skipped: {}",
            outcome.succeeded(),
            outcome.failed(),
            outcome.skipped()
        );

        println!();
        println!("📤 Nodes:");
        for (node_id, report) in &outcome.nodes {
            let binding = report
                .binding
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unresolved".to_string());
            match &report.result {
                NodeResult::Success { output } => {
                    println!("   {} ({}): {}", node_id, binding, output)
                }
                NodeResult::Failed { kind, message } => {
                    println!("   {} ({}): {} - {}", node_id, binding, kind, message)
                }
                NodeResult::Skipped { reason } => {
                    println!("   {} ({}): skipped, {}", node_id, binding, reason)
                }
            }
        }
    }

    Ok(if outcome.status == RunStatus::Completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn validate_workflow(file: PathBuf) -> Result<ExitCode> {
    println!("🔍 Validating workflow: {}", file.display());

    let workflow = relayruntime::load_workflow(&file)?;
    let runtime = create_runtime()?;
    let report = runtime
        .validate(&workflow)
        .context("workflow graph is invalid")?;

    println!("   Name: {}", workflow.name);
    println!("   Execution order: {}", report.order.join(" → "));
    println!();

    for check in &report.nodes {
        match (&check.binding, &check.error) {
            (_, Some(error)) => println!("  ❌ {}: {} - {}", check.node_id, error.kind, error.message),
            (Some(binding), None) => println!("  ✅ {}: {}", check.node_id, binding),
            (None, None) => println!("  ✅ {}", check.node_id),
        }
    }

    if report.is_valid() {
        println!();
        println!("✅ Workflow is valid");
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn list_nodes() -> Result<()> {
    println!("📦 Core processors:");
    println!();

    let registry = relaynodes::default_registry()?;
    for info in registry.describe() {
        println!("  • {} ({})", info.name, info.metadata.category);
        println!("    {}", info.metadata.description);
        for field in &info.schema.fields {
            let required = if field.required { "required" } else { "optional" };
            println!("      - {} [{}]", field.name, required);
        }
    }

    println!();
    println!("Business processors are not listed here; bind them with a plugin.");
    Ok(())
}

fn create_example_workflow(output: PathBuf) -> Result<()> {
    let mut workflow = Workflow::new("Example Chat Workflow");
    workflow.description = Some("Answers a query with the offline model stub".to_string());

    let input = workflow.add_node(NodeSpec::new("input", "input_user").with_name("User Input"));
    let llm = workflow.add_node(
        NodeSpec::new("answer", "llm_stub")
            .with_name("Answer")
            .with_config("model", "stub"),
    );
    let out = workflow.add_node(
        NodeSpec::new("output", "output_text")
            .with_name("Format Answer")
            .with_config("field", "response"),
    );

    workflow.connect(input, llm.clone());
    workflow.connect(llm, out);

    let json = serde_json::to_string_pretty(&workflow)?;
    std::fs::write(&output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  relay run --file {} --input '{{\"query\": \"hello\"}}'",
        output.display()
    );

    Ok(())
}

async fn show_catalog(command: CatalogCommand) -> Result<()> {
    let config = RuntimeConfig::from_env().context("invalid runtime configuration")?;
    let client = CatalogClient::new(
        config.plugin_host.base_url.clone(),
        config.plugin_host.timeout,
        config.catalog_ttl,
    );

    match command {
        CatalogCommand::Sources => {
            let sources = client.sources().await;
            print_freshness(&sources);
            for source in sources.data() {
                println!("  • {} ({})", source.id, source.name);
                if !source.description.is_empty() {
                    println!("    {}", source.description);
                }
            }
        }
        CatalogCommand::Types { source } => {
            let types = match &source {
                Some(id) => client.event_types_for(id).await,
                None => client.event_types().await,
            };
            print_freshness(&types);
            for event_type in types.data() {
                println!("  • {} ({}) from {}", event_type.id, event_type.label, event_type.source_id);
            }
        }
    }
    Ok(())
}

fn print_freshness<T>(catalog: &Catalog<T>) {
    match catalog.stale_reason() {
        None => println!("📡 Live catalog"),
        Some(reason) => println!("⚠️  Plugin host unavailable, showing fallback data ({})", reason),
    }
}
