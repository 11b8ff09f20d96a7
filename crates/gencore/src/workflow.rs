use crate::{
    events::EventEmitter, ExecutionContext, Node, NodeContext, NodeError, NodeStatus, Value,
    WorkflowError,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Node id, unique within one workflow (e.g. "generation_1")
pub type NodeId = String;

/// Directed edge from one node's output port to another node's input port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub from_node: NodeId,
    pub from_port: String,
    pub to_node: NodeId,
    pub to_port: String,
}

/// A node instance inside a workflow, with its execution state.
///
/// Each input port accepts at most one source; each output port may fan
/// out to any number of targets.
pub struct WorkflowNode {
    pub id: NodeId,
    pub node_type: String,
    pub parameters: HashMap<String, Value>,
    pub status: NodeStatus,
    pub inputs: HashMap<String, Value>,
    pub outputs: HashMap<String, Value>,
    pub error: Option<String>,
    input_connections: BTreeMap<String, Connection>,
    output_connections: Vec<Connection>,
    behavior: Box<dyn Node>,
}

impl WorkflowNode {
    pub fn new(
        id: impl Into<NodeId>,
        node_type: impl Into<String>,
        parameters: HashMap<String, Value>,
        behavior: Box<dyn Node>,
    ) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            parameters,
            status: NodeStatus::Pending,
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            error: None,
            input_connections: BTreeMap::new(),
            output_connections: Vec::new(),
            behavior,
        }
    }

    /// Wired inputs, keyed by input port
    pub fn input_connections(&self) -> impl Iterator<Item = &Connection> {
        self.input_connections.values()
    }

    /// Fan-out edges in the order they were connected
    pub fn output_connections(&self) -> &[Connection] {
        &self.output_connections
    }

    /// Run the node: pending → running → completed | failed.
    ///
    /// A failure is recorded on the node and returned, never swallowed.
    pub async fn run(
        &mut self,
        execution: &mut ExecutionContext,
        events: EventEmitter,
    ) -> Result<(), NodeError> {
        self.status = NodeStatus::Running;
        self.error = None;
        tracing::info!(node_id = %self.id, node_type = %self.node_type, "Executing node");

        let ctx = NodeContext {
            node_id: &self.id,
            inputs: &self.inputs,
            config: &self.parameters,
            execution,
            events,
        };

        let result = self.behavior.execute(ctx).await;
        match result {
            Ok(output) => {
                self.outputs = output.outputs;
                self.status = NodeStatus::Completed;
                tracing::info!(node_id = %self.id, "Node completed successfully");
                Ok(())
            }
            Err(e) => {
                self.status = NodeStatus::Failed;
                self.error = Some(e.to_string());
                tracing::error!(node_id = %self.id, error = %e, "Node failed");
                Err(e)
            }
        }
    }

    /// Back to pending with no inputs, outputs or error
    pub fn reset(&mut self) {
        self.status = NodeStatus::Pending;
        self.inputs.clear();
        self.outputs.clear();
        self.error = None;
    }
}

impl fmt::Debug for WorkflowNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowNode")
            .field("id", &self.id)
            .field("node_type", &self.node_type)
            .field("status", &self.status)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// A graph of nodes; owns every node it contains
#[derive(Debug, Default)]
pub struct Workflow {
    nodes: Vec<WorkflowNode>,
    index: HashMap<NodeId, usize>,
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; ids must be unique within the workflow
    pub fn add_node(&mut self, node: WorkflowNode) -> Result<(), WorkflowError> {
        if self.index.contains_key(&node.id) {
            return Err(WorkflowError::DuplicateNodeId(node.id));
        }
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Wire `source.output_key` into `target.input_key`
    pub fn connect(
        &mut self,
        source_id: &str,
        output_key: &str,
        target_id: &str,
        input_key: &str,
    ) -> Result<(), WorkflowError> {
        let source_idx = self.position(source_id)?;
        let target_idx = self.position(target_id)?;

        if self.nodes[target_idx].input_connections.contains_key(input_key) {
            return Err(WorkflowError::InputAlreadyWired {
                node_id: target_id.to_string(),
                input_key: input_key.to_string(),
            });
        }

        let connection = Connection {
            from_node: source_id.to_string(),
            from_port: output_key.to_string(),
            to_node: target_id.to_string(),
            to_port: input_key.to_string(),
        };

        self.nodes[source_idx]
            .output_connections
            .push(connection.clone());
        self.nodes[target_idx]
            .input_connections
            .insert(input_key.to_string(), connection);
        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.index.get(id).map(|&idx| &self.nodes[idx])
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut WorkflowNode> {
        match self.index.get(id) {
            Some(&idx) => Some(&mut self.nodes[idx]),
            None => None,
        }
    }

    /// Index of a node in insertion order
    pub fn position(&self, id: &str) -> Result<usize, WorkflowError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| WorkflowError::NodeNotFound(id.to_string()))
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &WorkflowNode> {
        self.nodes.iter()
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.nodes.iter().flat_map(|n| n.input_connections())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Return every node to pending so the graph can run again from scratch
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.reset();
        }
    }
}
