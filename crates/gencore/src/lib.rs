//! Core abstractions for the generation workflow engine
//!
//! This crate provides the fundamental types and traits that all other
//! components depend on: the node contract, the workflow graph, the
//! job-scoped execution context and the error taxonomy.

mod artifact;
mod context;
mod error;
pub mod events;
mod node;
mod value;
mod workflow;

pub use artifact::{ImageArtifact, ImageResult, UpscaleInfo};
pub use context::{ExecutionContext, JobId, INPUT_IMAGE_KEY, PARAMETERS_KEY, PROMPT_KEY};
pub use error::{FlowError, NodeError, WorkflowError};
pub use events::*;
pub use node::{Node, NodeContext, NodeOutput, NodeStatus};
pub use value::Value;
pub use workflow::{Connection, NodeId, Workflow, WorkflowNode};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
