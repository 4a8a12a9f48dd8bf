// crates/weavecli/src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use weavecore::{
    CropImageConfig, ExecutionEvent, GraphNode, NodeEvent, NodeId, RunStatus, Value, Workflow,
};
use weavenodes::{ServiceConfig, StandardDispatcher};
use weaveruntime::{
    create_execution_plan, validate_graph, ExecuteRequest, NodeCatalog, WeaveRuntime,
};

/// Owner recorded for workflows run from the command line.
const LOCAL_OWNER: &str = "local";

#[derive(Parser)]
#[command(name = "weave")]
#[command(about = "Weave workflow engine CLI", long_about = None)]
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

        /// Only run these nodes (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        nodes: Option<Vec<NodeId>>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// Show the execution order for a workflow file
    Plan {
        /// Path to workflow JSON file
        file: PathBuf,

        /// Plan only these nodes (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        nodes: Option<Vec<NodeId>>,
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

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file, nodes, verbose } => {
            let default_level = if verbose { "debug" } else { "info" };
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
                )
                .init();

            run_workflow(&file, nodes).await?;
        }

        Commands::Validate { file } => {
            validate_workflow(&file)?;
        }

        Commands::Plan { file, nodes } => {
            plan_workflow(&file, nodes)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_workflow(&output)?;
        }
    }

    Ok(())
}

fn load_workflow(file: &Path) -> Result<Workflow> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let workflow: Workflow = serde_json::from_str(&json)
        .with_context(|| format!("parsing {}", file.display()))?;
    tracing::debug!(workflow = %workflow.name, nodes = workflow.nodes.len(), "loaded workflow");
    Ok(workflow)
}

/// Short, single-line rendering of a value; data URLs are not worth printing in full.
fn preview(value: &Value) -> String {
    const MAX: usize = 80;
    let text = match value.as_str() {
        Some(s) => s.to_string(),
        None => serde_json::to_string(value).unwrap_or_default(),
    };
    let text = text.replace('\n', " ");
    if text.chars().count() > MAX {
        let cut: String = text.chars().take(MAX).collect();
        format!("{cut}...")
    } else {
        text
    }
}

async fn run_workflow(file: &Path, nodes: Option<Vec<NodeId>>) -> Result<()> {
    println!("Loading workflow from: {}", file.display());
    let workflow = load_workflow(file)?;

    println!("Workflow: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Edges: {}", workflow.edges.len());
    println!();

    let config = ServiceConfig::from_env();
    let runtime = WeaveRuntime::new(Arc::new(StandardDispatcher::from_config(&config)));

    // Inline payloads are stripped on save, so run the graph exactly as loaded.
    let stored = runtime
        .store()
        .create_workflow(LOCAL_OWNER, Workflow::new(workflow.name.clone()))
        .await;
    let mut request = ExecuteRequest::new(stored.id);
    request.node_ids = nodes;
    request.nodes = Some(workflow.nodes);
    request.edges = Some(workflow.edges);

    let mut events = runtime.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::RunStarted { scope, .. } => {
                    println!("Run started ({:?})", scope);
                }
                ExecutionEvent::NodeStarted { node_id, node_type, .. } => {
                    println!("  Starting node: {} ({})", node_id, node_type);
                }
                ExecutionEvent::NodeCompleted { node_id, duration_ms, .. } => {
                    println!("  Node {} completed in {}ms", node_id, duration_ms);
                }
                ExecutionEvent::NodeFailed { node_id, error, .. } => {
                    println!("  Node {} failed: {}", node_id, error);
                }
                ExecutionEvent::NodeSkipped { node_id, reason, .. } => {
                    println!("  Node {} skipped: {}", node_id, reason);
                }
                ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
                    NodeEvent::Info { message } => println!("     [{}] {}", node_id, message),
                    NodeEvent::Warning { message } => println!("     [{}] warning: {}", node_id, message),
                },
                ExecutionEvent::RunCompleted { status, duration_ms, .. } => {
                    match status {
                        RunStatus::Success => println!("Run completed successfully in {}ms", duration_ms),
                        _ => println!("Run failed after {}ms", duration_ms),
                    }
                    break;
                }
            }
        }
    });

    let report = runtime.execute_now(LOCAL_OWNER, request).await?;
    let _ = tokio::time::timeout(Duration::from_secs(1), event_task).await;

    let run = runtime.store().get_owned_run(LOCAL_OWNER, report.run_id).await?;

    println!();
    println!("Execution Summary:");
    println!("   Run ID: {}", run.id);
    println!("   Scope: {:?}", run.scope);
    println!("   Status: {:?}", run.status);
    println!("   Completed: {} nodes", report.completed.len());
    if !report.skipped.is_empty() {
        println!("   Skipped: {}", report.skipped.join(", "));
    }

    for node_run in &run.node_runs {
        println!();
        println!(
            "   {} [{}] {:?} {}ms",
            node_run.node_id,
            node_run.node_type,
            node_run.status,
            node_run.duration.unwrap_or_default()
        );
        for (key, value) in &node_run.inputs {
            println!("     in  {}: {}", key, preview(value));
        }
        if let Some(outputs) = &node_run.outputs {
            for (key, value) in outputs {
                println!("     out {}: {}", key, preview(value));
            }
        }
        if let Some(error) = &node_run.error {
            println!("     error: {}", error);
        }
    }

    if let Some(failure) = report.failed {
        bail!("node {} failed: {}", failure.node_id, failure.error);
    }
    Ok(())
}

fn validate_workflow(file: &Path) -> Result<()> {
    println!("Validating workflow: {}", file.display());

    let workflow = load_workflow(file)?;
    let issues = validate_graph(&NodeCatalog::new(), &workflow.nodes, &workflow.edges);

    println!("   Name: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Edges: {}", workflow.edges.len());

    if issues.is_empty() {
        println!("Workflow is valid");
        return Ok(());
    }

    for issue in &issues {
        println!("   - {}", issue);
    }
    bail!("{} problem(s) found", issues.len())
}

fn plan_workflow(file: &Path, nodes: Option<Vec<NodeId>>) -> Result<()> {
    let workflow = load_workflow(file)?;
    if let Some(missing) = nodes
        .iter()
        .flatten()
        .find(|id| workflow.find_node(id).is_none())
    {
        bail!("unknown node: {}", missing);
    }

    let plan = create_execution_plan(&workflow.nodes, &workflow.edges, nodes.as_deref());

    println!("Execution order for {}:", workflow.name);
    for (step, node_id) in plan.execution_order.iter().enumerate() {
        let deps = plan.dependencies.get(node_id).cloned().unwrap_or_default();
        let kind = workflow.find_node(node_id).map(|n| n.type_name()).unwrap_or("?");
        if deps.is_empty() {
            println!("  {}. {} ({})", step + 1, node_id, kind);
        } else {
            println!("  {}. {} ({}) after {}", step + 1, node_id, kind, deps.join(", "));
        }
    }

    let unreachable = plan.unreachable();
    if !unreachable.is_empty() {
        println!();
        println!("Not schedulable (cycle):");
        for node_id in unreachable {
            println!("  - {}", node_id);
        }
    }
    Ok(())
}

fn list_nodes() {
    println!("Available Node Types:");
    println!();

    for descriptor in NodeCatalog::new().descriptors() {
        println!("  - {} ({})", descriptor.node_type, descriptor.label);
        println!("    {}", descriptor.description);
        for port in &descriptor.inputs {
            let required = if port.required { ", required" } else { "" };
            println!("      in  {} <{}{}>", port.id, port.handle_type, required);
        }
        for port in &descriptor.outputs {
            println!("      out {} <{}>", port.id, port.handle_type);
        }
    }
}

fn example_workflow() -> Workflow {
    let mut workflow = Workflow::new("Product Marketing Kit");

    workflow.add_node(
        GraphNode::upload_image("product_photo", "https://example.com/product.jpg")
            .with_label("Product photo")
            .with_position(0.0, 0.0),
    );
    workflow.add_node(
        GraphNode::crop_image(
            "crop_product",
            CropImageConfig {
                x_percent: Some(10.0),
                y_percent: Some(10.0),
                width_percent: Some(80.0),
                height_percent: Some(80.0),
                ..Default::default()
            },
        )
        .with_label("Crop to product")
        .with_position(300.0, 0.0),
    );
    workflow.add_node(
        GraphNode::text("copy_prompt", "You are a marketing copywriter. Write a short product description.")
            .with_label("Copywriter prompt")
            .with_position(0.0, 200.0),
    );
    workflow.add_node(
        GraphNode::text("product_details", "Wireless headphones, 40h battery, noise cancelling.")
            .with_label("Product details")
            .with_position(0.0, 350.0),
    );
    workflow.add_node(
        GraphNode::llm("describe")
            .with_label("Product description")
            .with_position(600.0, 200.0),
    );
    workflow.add_node(
        GraphNode::upload_video("demo_video", "https://example.com/demo.mp4")
            .with_label("Demo video")
            .with_position(0.0, 550.0),
    );
    workflow.add_node(
        GraphNode::extract_frame("hero_frame", "50%")
            .with_label("Hero frame")
            .with_position(300.0, 550.0),
    );
    workflow.add_node(
        GraphNode::text("social_prompt", "Turn the description into a social media post using the images.")
            .with_label("Social prompt")
            .with_position(600.0, 400.0),
    );
    workflow.add_node(
        GraphNode::llm("social_post")
            .with_label("Social post")
            .with_position(900.0, 300.0),
    );

    workflow.connect("product_photo", "output", "crop_product", "image_url");
    workflow.connect("copy_prompt", "output", "describe", "system_prompt");
    workflow.connect("product_details", "output", "describe", "user_message");
    workflow.connect("crop_product", "output", "describe", "images");
    workflow.connect("demo_video", "output", "hero_frame", "video_url");
    workflow.connect("social_prompt", "output", "social_post", "system_prompt");
    workflow.connect("describe", "output", "social_post", "user_message");
    workflow.connect("crop_product", "output", "social_post", "images");
    workflow.connect("hero_frame", "output", "social_post", "images");

    workflow
}

fn create_example_workflow(output: &Path) -> Result<()> {
    let workflow = example_workflow();
    let json = serde_json::to_string_pretty(&workflow)?;
    std::fs::write(output, json).with_context(|| format!("writing {}", output.display()))?;

    println!("Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  GOOGLE_AI_API_KEY=... weave run --file {}", output.display());
    println!("Or just the crop step:");
    println!("  weave run --file {} --nodes product_photo,crop_product", output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_workflow_is_valid() {
        let workflow = example_workflow();
        let issues = validate_graph(&NodeCatalog::new(), &workflow.nodes, &workflow.edges);
        assert!(issues.is_empty(), "{:?}", issues);

        let plan = create_execution_plan(&workflow.nodes, &workflow.edges, None);
        assert_eq!(plan.execution_order.len(), workflow.nodes.len());
        let position = |id: &str| plan.execution_order.iter().position(|n| n == id).unwrap();
        assert!(position("describe") < position("social_post"));
        assert!(position("hero_frame") < position("social_post"));
    }

    #[test]
    fn test_example_workflow_survives_a_file_round_trip() {
        let json = serde_json::to_string(&example_workflow()).unwrap();
        let loaded: Workflow = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.nodes.len(), 9);
        assert_eq!(loaded.edges.len(), 9);
    }

    #[test]
    fn test_preview_truncates() {
        let long = Value::from("x".repeat(200));
        assert_eq!(preview(&long).len(), 83);
        assert_eq!(preview(&Value::from("a\nb")), "a b");
    }
}
