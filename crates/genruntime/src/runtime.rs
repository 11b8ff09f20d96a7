use crate::builder::WorkflowBuilder;
use crate::config::{RuntimeConfig, WorkflowConfig};
use crate::progress::ProgressSink;
use crate::registry::NodeRegistry;
use crate::scheduler::{ExecutionResult, WorkflowScheduler};
use gencore::{EventBus, ExecutionContext, ExecutionEvent, FlowError, Workflow, WorkflowError};
use std::sync::Arc;

/// Main runtime for building and executing workflows.
///
/// Constructed once at process start and shared by every worker; it holds
/// no per-job state.
pub struct FlowRuntime {
    registry: Arc<NodeRegistry>,
    scheduler: WorkflowScheduler,
    event_bus: Arc<EventBus>,
}

impl FlowRuntime {
    /// Create a new runtime with a pre-configured registry
    pub fn with_registry(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let scheduler = WorkflowScheduler::new(event_bus.clone());

        Self {
            registry,
            scheduler,
            event_bus,
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Build a workflow from a pipeline config
    pub fn build_workflow(&self, config: &WorkflowConfig) -> Result<Workflow, WorkflowError> {
        WorkflowBuilder::new(&self.registry).build(config)
    }

    /// Build a fresh workflow and run it for the job described by `ctx`.
    ///
    /// Restartable: every call rebuilds the graph and re-executes every
    /// node, nothing is carried over from a previous attempt.
    pub async fn run(
        &self,
        config: &WorkflowConfig,
        ctx: &mut ExecutionContext,
        progress: &dyn ProgressSink,
    ) -> Result<ExecutionResult, FlowError> {
        let mut workflow = self.build_workflow(config)?;
        self.execute(&mut workflow, ctx, progress).await
    }

    /// Execute an already built workflow
    pub async fn execute(
        &self,
        workflow: &mut Workflow,
        ctx: &mut ExecutionContext,
        progress: &dyn ProgressSink,
    ) -> Result<ExecutionResult, FlowError> {
        self.scheduler.execute(workflow, ctx, progress).await
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}
