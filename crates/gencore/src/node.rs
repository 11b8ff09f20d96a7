use crate::{events::EventEmitter, ExecutionContext, NodeError, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Core trait that all executable nodes implement
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique type identifier (e.g., "generation", "save_image")
    fn node_type(&self) -> &str;

    /// Execute the node with given context
    async fn execute(&self, ctx: NodeContext<'_>) -> Result<NodeOutput, NodeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Everything a node sees while it executes
pub struct NodeContext<'a> {
    pub node_id: &'a str,

    /// Input values copied from connected upstream outputs
    pub inputs: &'a HashMap<String, Value>,

    /// Static parameters for this node
    pub config: &'a HashMap<String, Value>,

    /// Job-scoped state shared by every node of the execution
    pub execution: &'a mut ExecutionContext,

    /// Event emitter for real-time updates
    pub events: EventEmitter,
}

impl<'a> NodeContext<'a> {
    pub fn input(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name).filter(|v| !v.is_null())
    }

    /// First present input among `names`, in order
    pub fn first_input(&self, names: &[&str]) -> Option<&Value> {
        names.iter().find_map(|name| self.input(name))
    }

    pub fn config_str_or(&self, name: &str, default: &str) -> String {
        self.config
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    /// Integer config value that must fit in a `u32`; absent or null
    /// values fall back to `default`.
    pub fn config_u32_or(&self, name: &str, default: u32) -> Result<u32, NodeError> {
        let value = match self.config.get(name).filter(|v| !v.is_null()) {
            Some(value) => value,
            None => return Ok(default),
        };
        let number = value.as_u64().ok_or_else(|| {
            NodeError::Configuration(format!(
                "{} must be a non-negative integer, got {}",
                name,
                value.type_name()
            ))
        })?;
        u32::try_from(number).map_err(|_| {
            NodeError::Configuration(format!("{} is out of range: {}", name, number))
        })
    }

    pub fn config_f64_or(&self, name: &str, default: f64) -> f64 {
        self.config.get(name).and_then(Value::as_f64).unwrap_or(default)
    }
}

/// Output from node execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeOutput {
    /// Output port values
    pub outputs: HashMap<String, Value>,
}

impl NodeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, port: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(port.into(), value.into());
        self
    }
}
