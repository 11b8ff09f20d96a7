//! Workflow execution runtime
//!
//! This crate provides the node registry, the pipeline-config builder that
//! auto-wires consecutive stages, and the topological scheduler that runs
//! a workflow for one job.

mod builder;
mod config;
mod progress;
mod registry;
mod runtime;
mod scheduler;

pub use builder::{wiring_for, WorkflowBuilder, SAVE_NODE_ID, SAVE_NODE_TYPE};
pub use config::{
    RuntimeConfig, StageConfig, WorkflowConfig, DEFAULT_CFG_SCALE, DEFAULT_DIMENSION,
    DEFAULT_MODEL, DEFAULT_SCHEDULER, DEFAULT_STEPS,
};
pub use progress::{progress_percent, NoProgress, ProgressError, ProgressSink};
pub use registry::{NodeFactory, NodeMetadata, NodeRegistry, PortDefinition};
pub use runtime::FlowRuntime;
pub use scheduler::{ExecutionResult, WorkflowScheduler};
