use anyhow::Result;
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use voxcore::{Node, NodeStatus, RunEvent, Workflow};
use voxnodes::AdapterSet;
use voxruntime::{EngineConfig, MemoryWorkflowStore, NodeRegistry, RegistryBuilder, RunManager};

#[derive(Parser)]
#[command(name = "vox")]
#[command(about = "Voxflow workflow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file against simulated adapters
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Compile a workflow file and report every issue
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

fn build_registry() -> NodeRegistry {
    let adapters = AdapterSet::simulated();
    let mut builder = RegistryBuilder::new();
    voxnodes::register_all(&mut builder, &adapters);
    builder.build()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file, verbose } => {
            let level = if verbose {
                tracing::Level::DEBUG
            } else {
                tracing::Level::INFO
            };
            tracing_subscriber::fmt().with_max_level(level).init();
            run_workflow(file).await?;
        }

        Commands::Validate { file } => {
            validate_workflow(file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_workflow(output)?;
        }
    }

    Ok(())
}

async fn run_workflow(file: PathBuf) -> Result<()> {
    println!("Loading workflow from: {}", file.display());

    let workflow_json = std::fs::read_to_string(&file)?;
    let workflow: Workflow = serde_json::from_str(&workflow_json)?;
    let workflow_id = workflow.id;

    println!("Workflow: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Edges: {}", workflow.edges.len());
    println!();

    let labels: HashMap<_, _> = workflow
        .nodes
        .iter()
        .map(|n| {
            (
                n.id,
                n.label.clone().unwrap_or_else(|| n.node_type.clone()),
            )
        })
        .collect();

    let store = Arc::new(MemoryWorkflowStore::new());
    store.insert(workflow).await;

    let manager = RunManager::new(
        Arc::new(build_registry()),
        store.clone(),
        EngineConfig::default(),
    );

    let run_id = manager.start(workflow_id).await?;
    let mut events = manager.subscribe(run_id, None)?;

    while let Some(envelope) = events.next().await {
        match envelope.event {
            RunEvent::RunStarted { .. } => println!("Run started ({})", run_id),
            RunEvent::NodeStatusChanged {
                node_id,
                status,
                output,
                error,
            } => {
                let label = labels
                    .get(&node_id)
                    .cloned()
                    .unwrap_or_else(|| node_id.to_string());
                match status {
                    NodeStatus::Running => println!("  > {} running", label),
                    NodeStatus::Succeeded => {
                        println!("  + {} succeeded", label);
                        if let Some(output) = output {
                            println!("      {}", output.to_json());
                        }
                    }
                    NodeStatus::Failed => {
                        println!("  ! {} failed: {}", label, error.unwrap_or_default())
                    }
                    NodeStatus::Skipped => println!("  - {} skipped", label),
                    _ => {}
                }
            }
            RunEvent::RunCompleted => println!("Run completed"),
            RunEvent::RunFailed { reason } => println!("Run failed: {}", reason),
            RunEvent::RunCancelled => println!("Run cancelled"),
        }
    }

    // The terminal event precedes the persistence hand-off; wait for it.
    for _ in 0..50 {
        if let Some(saved) = store.find_saved(run_id).await {
            println!();
            println!("Result persisted: status {:?}", saved.status);
            let succeeded = saved
                .node_states
                .values()
                .filter(|s| s.status == NodeStatus::Succeeded)
                .count();
            println!(
                "   {}/{} nodes succeeded",
                succeeded,
                saved.node_states.len()
            );
            return Ok(());
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
    }
    anyhow::bail!("run result was not persisted")
}

fn validate_workflow(file: PathBuf) -> Result<()> {
    println!("Validating workflow: {}", file.display());

    let workflow_json = std::fs::read_to_string(&file)?;
    let workflow: Workflow = serde_json::from_str(&workflow_json)?;

    let registry = build_registry();
    match voxruntime::compile(&workflow, &registry) {
        Ok(plan) => {
            println!("Workflow is valid:");
            println!("   Name: {}", plan.workflow.name);
            println!("   Nodes: {}", plan.workflow.nodes.len());
            println!("   Waves: {}", plan.waves.len());
            Ok(())
        }
        Err(err) => {
            println!("Workflow has {} issue(s):", err.issues.len());
            for issue in &err.issues {
                println!("   - {}", issue);
            }
            anyhow::bail!("validation failed")
        }
    }
}

fn list_nodes() {
    println!("Available node types:");
    println!();

    let registry = build_registry();
    for category in registry.categories() {
        println!("  [{}]", category);
        for definition in registry.list() {
            if definition.category.as_str() == category {
                println!("    {} - {}", definition.node_type, definition.label);
            }
        }
    }
}

fn create_example_workflow(output: PathBuf) -> Result<()> {
    let mut workflow = Workflow::new("Appointment Call");

    let trigger = Node::new("trigger.call")
        .with_label("Inbound Call")
        .with_config("speech", "I would like to book an appointment")
        .with_position(80.0, 100.0);
    let gather = Node::new("speech.gather")
        .with_label("Gather Intent")
        .with_position(260.0, 100.0);
    let branch = Node::new("branch.if")
        .with_label("Wants Appointment?")
        .with_config("field", "transcript")
        .with_config("operator", "contains")
        .with_config("value", "appointment")
        .with_position(440.0, 100.0);
    let schedule = Node::new("calendar.schedule")
        .with_label("Book Appointment")
        .with_config("title", "Caller appointment")
        .with_position(620.0, 40.0);
    let confirm = Node::new("speech.say")
        .with_label("Confirm")
        .with_config("text", "You are booked. Anything else?")
        .with_position(800.0, 40.0);
    let answer = Node::new("ai.generate")
        .with_label("Free-form Answer")
        .with_config("prompt", "Answer the caller: {{value}}")
        .with_position(620.0, 160.0);

    let trigger_id = workflow.add_node(trigger);
    let gather_id = workflow.add_node(gather);
    let branch_id = workflow.add_node(branch);
    let schedule_id = workflow.add_node(schedule);
    let confirm_id = workflow.add_node(confirm);
    let answer_id = workflow.add_node(answer);

    workflow.connect(trigger_id, gather_id);
    workflow.connect(gather_id, branch_id);
    workflow.connect_handle(branch_id, Some("true"), schedule_id);
    workflow.connect(schedule_id, confirm_id);
    workflow.connect_handle(branch_id, Some("false"), answer_id);

    let json = serde_json::to_string_pretty(&workflow)?;
    std::fs::write(&output, json)?;

    println!("Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  vox run --file {}", output.display());

    Ok(())
}
