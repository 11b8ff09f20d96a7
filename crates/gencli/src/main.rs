// crates/gencli/src/main.rs

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use gencore::{ExecutionEvent, NodeEvent, Value};
use genjobs::{
    InMemoryJobStore, InMemoryTemplateStore, JobQueue, JobService, JobStatus, NewJob,
    ProgressPublisher, Template, TemplateRequest, WorkerConfig,
};
use gennodes::{standard_registry, NodeServices};
use genruntime::{FlowRuntime, RuntimeConfig, StageConfig, WorkflowConfig, WorkflowScheduler};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Owner recorded on jobs submitted from the command line
const CLI_USER: &str = "cli";

#[derive(Parser)]
#[command(name = "genflow")]
#[command(about = "Image generation workflow CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow config or a stored template as a job and stream its status
    Run {
        /// Path to workflow config JSON file
        #[arg(short, long, required_unless_present = "template", conflicts_with = "template")]
        config: Option<PathBuf>,

        /// Template name or id from the built-in catalog
        #[arg(short, long)]
        template: Option<String>,

        /// Prompt for the job
        #[arg(short, long)]
        prompt: String,

        /// Request parameter as key=value (value parsed as JSON when possible)
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Input image payload for img2img pipelines
        #[arg(long)]
        input_image: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Build a workflow config and print its execution order
    Validate {
        /// Path to workflow config JSON file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// List available node types
    Nodes,

    /// List the built-in workflow templates
    Templates {
        /// Only show this category
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Create an example workflow config
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn runtime() -> FlowRuntime {
    let registry = standard_registry(&NodeServices::default());
    FlowRuntime::with_registry(Arc::new(registry), RuntimeConfig::default())
}

fn load_config(path: &PathBuf) -> Result<WorkflowConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(WorkflowConfig::from_json(&raw)?)
}

/// `key=value`, with the value parsed as JSON and falling back to a string
fn parse_param(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("parameter must be KEY=VALUE, got '{}'", raw))?;
    let value = serde_json::from_str::<serde_json::Value>(value)
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(value));
    Ok((key.trim().to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            template,
            prompt,
            params,
            input_image,
            verbose,
        } => {
            init_tracing(verbose);
            let source = match (config, template) {
                (Some(path), _) => JobSource::Config(path),
                (None, Some(name)) => JobSource::Template(name),
                (None, None) => return Err(anyhow!("either --config or --template is required")),
            };
            run_job(source, prompt, params, input_image).await?;
        }

        Commands::Validate { config } => {
            init_tracing(false);
            validate_config(config)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Templates { category } => {
            list_templates(category).await?;
        }

        Commands::Init { output } => {
            create_example_config(output)?;
        }
    }

    Ok(())
}

enum JobSource {
    Config(PathBuf),
    Template(String),
}

fn job_service(runtime: Arc<FlowRuntime>) -> JobService {
    JobService::new(Arc::new(InMemoryJobStore::new()), runtime)
        .with_templates(Arc::new(InMemoryTemplateStore::with_defaults()))
}

/// Active template matching `name_or_id`, by id or case-insensitive name
async fn find_template(service: &JobService, name_or_id: &str) -> Result<Template> {
    service
        .active_templates(None)
        .await?
        .into_iter()
        .find(|t| t.id.to_string() == name_or_id || t.name.eq_ignore_ascii_case(name_or_id))
        .ok_or_else(|| anyhow!("no active template named '{}' (see `genflow templates`)", name_or_id))
}

async fn run_job(
    source: JobSource,
    prompt: String,
    params: Vec<String>,
    input_image: Option<String>,
) -> Result<()> {
    let mut parameters = Vec::with_capacity(params.len());
    for raw in &params {
        parameters.push(parse_param(raw)?);
    }

    let worker_config = WorkerConfig::from_env();
    let runtime = Arc::new(runtime());
    let mut events = runtime.subscribe_events();
    let service = Arc::new(job_service(runtime));
    let publisher = ProgressPublisher::new(service.clone(), worker_config.poll_interval);
    let queue = JobQueue::start(service.clone(), worker_config);

    // Spawn event listener
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::WorkflowStarted { node_count, .. } => {
                    println!("▶️  Workflow started ({} nodes)", node_count);
                }
                ExecutionEvent::NodeStarted { node_id, node_type, .. } => {
                    println!("  ⚡ Starting node: {} ({})", node_id, node_type);
                }
                ExecutionEvent::NodeCompleted { node_id, duration_ms, .. } => {
                    println!("  ✅ Node {} completed in {}ms", node_id, duration_ms);
                }
                ExecutionEvent::NodeFailed { node_id, error, .. } => {
                    println!("  ❌ Node {} failed: {}", node_id, error);
                }
                ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
                    NodeEvent::Info { message } => println!("     ℹ️  [{}] {}", node_id, message),
                    NodeEvent::Warning { message } => println!("     ⚠️  [{}] {}", node_id, message),
                },
                ExecutionEvent::Progress { percent, message, .. } => {
                    println!("     📊 {}% - {}", percent, message);
                }
                ExecutionEvent::WorkflowCompleted { success, duration_ms, .. } => {
                    if success {
                        println!("✨ Workflow completed in {}ms", duration_ms);
                    } else {
                        println!("💥 Workflow failed after {}ms", duration_ms);
                    }
                }
            }
        }
    });

    let job = match source {
        JobSource::Config(path) => {
            println!("🚀 Loading workflow config from: {}", path.display());
            let mut request = NewJob::new(CLI_USER, prompt, load_config(&path)?);
            for (key, value) in parameters {
                request = request.with_parameter(key, value);
            }
            if let Some(image) = input_image {
                request = request.with_input_image(image);
            }
            queue.submit(request).await?
        }
        JobSource::Template(name) => {
            let template = find_template(&service, &name).await?;
            println!("🚀 Using template: {} ({})", template.name, template.category);
            let mut request = TemplateRequest::new(template.id, CLI_USER, prompt);
            for (key, value) in parameters {
                request = request.with_parameter(key, value);
            }
            if let Some(image) = input_image {
                request = request.with_input_image(image);
            }
            queue.submit_template(request).await?
        }
    };
    println!("📋 Job {} queued at position {:?}", job.id, job.queue_position);
    println!();

    let mut final_status = job.status;
    let mut stream = Box::pin(publisher.subscribe(job.id, CLI_USER));
    while let Some(message) = stream.next().await {
        let message = message?;
        final_status = message.status;
        println!("{}", serde_json::to_string(&message)?);
    }

    queue.shutdown().await;
    event_task.abort();

    println!();
    match final_status {
        JobStatus::Completed => println!("✨ Job {} completed", job.id),
        other => return Err(anyhow!("job {} ended as {}", job.id, other)),
    }

    Ok(())
}

fn validate_config(path: PathBuf) -> Result<()> {
    println!("🔍 Validating workflow config: {}", path.display());

    let config = load_config(&path)?;
    let workflow = runtime().build_workflow(&config)?;
    let order = WorkflowScheduler::execution_order(&workflow)?;

    println!("✅ Workflow is valid:");
    println!("   Stages: {}", config.pipeline.len());
    println!("   Nodes: {}", workflow.len());
    println!("   Connections: {}", workflow.connections().count());
    println!("   Execution order: {}", order.join(" → "));

    Ok(())
}

fn list_nodes() {
    println!("📦 Available Node Types:");
    println!();

    let registry = standard_registry(&NodeServices::default());

    for node_type in registry.list_node_types() {
        if let Some(metadata) = registry.get_metadata(&node_type) {
            println!("  • {} ({})", node_type, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  • {}", node_type);
        }
    }
}

async fn list_templates(category: Option<String>) -> Result<()> {
    let service = job_service(Arc::new(runtime()));

    println!("🎨 Available Templates:");
    println!();

    for template in service.active_templates(category.as_deref()).await? {
        println!("  • {} ({})", template.name, template.category);
        if let Some(description) = &template.description {
            println!("    {}", description);
        }
        let stages: Vec<&str> = template
            .workflow
            .pipeline
            .iter()
            .map(|stage| stage.node_type.as_str())
            .collect();
        println!("    Pipeline: {}", stages.join(" → "));
    }

    println!();
    println!(
        "Categories: {}",
        service.template_categories().await?.join(", ")
    );

    Ok(())
}

fn create_example_config(output: PathBuf) -> Result<()> {
    let config = WorkflowConfig::default()
        .with_stage(
            StageConfig::new("prompt_enhancement")
                .with_parameter("style_prompts", json!(["highly detailed", "cinematic lighting"]))
                .with_parameter("negative_prompt", json!("blurry, low quality")),
        )
        .with_stage(StageConfig::new("generation"))
        .with_stage(
            StageConfig::new("upscaling")
                .with_parameter("scale_factor", json!(2))
                .with_parameter("upscaler_model", json!("RealESRGAN_x4plus")),
        );

    let json = serde_json::to_string_pretty(&config)?;
    std::fs::write(&output, json)?;

    println!("✨ Created example workflow config: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  genflow run --config {} --prompt 'a lighthouse at dawn' --param num_images=2",
        output.display()
    );

    Ok(())
}
