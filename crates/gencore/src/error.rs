use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// A node's own failure; remaining nodes are not executed.
    #[error("Node {node_id} ({node_type}) failed: {source}")]
    NodeExecution {
        node_id: String,
        node_type: String,
        #[source]
        source: NodeError,
    },

    /// Inputs were requested from a node that has not completed. The
    /// topological order makes this unreachable, so hitting it is an
    /// engine defect rather than a user error.
    #[error("Source node {source_id} not completed before {node_id}")]
    SourceNotCompleted { node_id: String, source_id: String },
}

impl FlowError {
    /// Text suitable for a job's `error_details`: the failing node's own
    /// message when a node failed, the full error otherwise.
    pub fn user_message(&self) -> String {
        match self {
            FlowError::NodeExecution { source, .. } => source.to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Failed(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Input '{input_key}' of node {node_id} is already wired")]
    InputAlreadyWired { node_id: String, input_key: String },

    #[error("Circular dependency detected in workflow")]
    CircularDependency,

    #[error("Invalid workflow config: {0}")]
    InvalidConfig(String),
}
