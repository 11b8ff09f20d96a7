use crate::progress::{progress_percent, ProgressSink};
use chrono::Utc;
use gencore::{
    Connection, EventBus, ExecutionContext, ExecutionEvent, FlowError, JobId, NodeId, NodeStatus,
    Value, Workflow, WorkflowError,
};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, EdgeReference, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

/// Runs workflows one node at a time in topological order.
///
/// Independent branches are not run in parallel: every node gets exclusive
/// access to the job's `ExecutionContext` while it executes.
pub struct WorkflowScheduler {
    event_bus: Arc<EventBus>,
}

impl WorkflowScheduler {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self { event_bus }
    }

    /// Deterministic topological order.
    ///
    /// Zero in-degree nodes seed the ready queue in insertion order; a node
    /// becomes ready when its last input connection is satisfied and is
    /// queued behind everything discovered before it. Fan-out edges are
    /// released grouped by output port, ports in the order they were first
    /// connected.
    pub fn execution_order(workflow: &Workflow) -> Result<Vec<NodeId>, WorkflowError> {
        let graph = build_graph(workflow)?;

        let mut in_degree: Vec<usize> = graph
            .node_indices()
            .map(|idx| graph.edges_directed(idx, Direction::Incoming).count())
            .collect();

        let mut ready: VecDeque<NodeIndex> = graph
            .node_indices()
            .filter(|idx| in_degree[idx.index()] == 0)
            .collect();

        let mut order = Vec::with_capacity(graph.node_count());
        while let Some(idx) = ready.pop_front() {
            order.push(graph[idx].clone());

            for edge in fan_out(&graph, idx) {
                let target = edge.target();
                in_degree[target.index()] -= 1;
                if in_degree[target.index()] == 0 {
                    ready.push_back(target);
                }
            }
        }

        if order.len() < graph.node_count() {
            let cycle: Vec<&str> = tarjan_scc(&graph)
                .into_iter()
                .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
                .flatten()
                .map(|idx| graph[idx].as_str())
                .collect();
            tracing::error!(nodes = ?cycle, "Circular dependency detected in workflow");
            return Err(WorkflowError::CircularDependency);
        }

        Ok(order)
    }

    /// Execute every node from scratch and return the outputs of the last
    /// node in execution order.
    ///
    /// The order is computed before anything runs, so a cyclic graph fails
    /// without executing a single node.
    pub async fn execute(
        &self,
        workflow: &mut Workflow,
        ctx: &mut ExecutionContext,
        progress: &dyn ProgressSink,
    ) -> Result<ExecutionResult, FlowError> {
        let job_id = ctx.job_id;
        let start_time = Instant::now();

        let order = Self::execution_order(workflow)?;
        workflow.reset();

        tracing::info!(job_id = %job_id, nodes = order.len(), "Starting workflow execution");
        self.event_bus.emit(ExecutionEvent::WorkflowStarted {
            job_id,
            node_count: order.len(),
            timestamp: Utc::now(),
        });

        let result = self.run_in_order(workflow, order, ctx, progress).await;

        let duration_ms = start_time.elapsed().as_millis() as u64;
        self.event_bus.emit(ExecutionEvent::WorkflowCompleted {
            job_id,
            success: result.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });

        match &result {
            Ok(_) => tracing::info!(job_id = %job_id, duration_ms, "Workflow execution completed"),
            Err(e) => tracing::error!(job_id = %job_id, error = %e, "Workflow execution failed"),
        }

        result
    }

    async fn run_in_order(
        &self,
        workflow: &mut Workflow,
        order: Vec<NodeId>,
        ctx: &mut ExecutionContext,
        progress: &dyn ProgressSink,
    ) -> Result<ExecutionResult, FlowError> {
        let job_id = ctx.job_id;
        let total = order.len();

        for (i, node_id) in order.iter().enumerate() {
            let inputs = collect_inputs(workflow, node_id)?;
            let node = workflow
                .node_mut(node_id)
                .ok_or_else(|| WorkflowError::NodeNotFound(node_id.clone()))?;
            node.inputs = inputs;

            self.event_bus.emit(ExecutionEvent::NodeStarted {
                job_id,
                node_id: node_id.clone(),
                node_type: node.node_type.clone(),
                timestamp: Utc::now(),
            });

            let started = Instant::now();
            let emitter = self.event_bus.create_emitter(job_id, node_id.clone());
            let outcome = node.run(ctx, emitter).await;
            let duration_ms = started.elapsed().as_millis() as u64;
            let node_type = node.node_type.clone();

            match outcome {
                Ok(()) => {
                    self.event_bus.emit(ExecutionEvent::NodeCompleted {
                        job_id,
                        node_id: node_id.clone(),
                        outputs: node.outputs.clone(),
                        duration_ms,
                        timestamp: Utc::now(),
                    });

                    let percent = progress_percent(i + 1, total);
                    self.report(progress, job_id, percent, format!("Completed {}", node_type))
                        .await;
                }
                Err(e) => {
                    self.event_bus.emit(ExecutionEvent::NodeFailed {
                        job_id,
                        node_id: node_id.clone(),
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });

                    skip_remaining(workflow, &order[i + 1..]);

                    let percent = progress_percent(i, total);
                    let message = format!("Failed at {}: {}", node_type, e);
                    self.report(progress, job_id, percent, message).await;

                    return Err(FlowError::NodeExecution {
                        node_id: node_id.clone(),
                        node_type,
                        source: e,
                    });
                }
            }
        }

        let outputs = order
            .last()
            .and_then(|id| workflow.node(id))
            .map(|node| node.outputs.clone())
            .unwrap_or_default();

        Ok(ExecutionResult {
            job_id,
            completed_nodes: total,
            total_nodes: total,
            execution_order: order,
            outputs,
        })
    }

    async fn report(&self, progress: &dyn ProgressSink, job_id: JobId, percent: u8, message: String) {
        self.event_bus.emit(ExecutionEvent::Progress {
            job_id,
            percent,
            message: message.clone(),
            timestamp: Utc::now(),
        });

        if let Err(e) = progress.report(percent, &message).await {
            tracing::warn!(job_id = %job_id, percent, error = %e, "Failed to report progress");
        }
    }
}

/// Dependency graph with one edge per input connection; edge indices
/// follow each source's connection order.
/// Outgoing edges of `idx`, grouped by output port in first-connected
/// order and by connection order within a port
fn fan_out(
    graph: &DiGraph<NodeId, Connection>,
    idx: NodeIndex,
) -> Vec<EdgeReference<'_, Connection>> {
    let mut edges: Vec<_> = graph.edges_directed(idx, Direction::Outgoing).collect();
    edges.sort_by_key(|edge| edge.id());

    let mut ports: Vec<&str> = Vec::new();
    for edge in &edges {
        let port = edge.weight().from_port.as_str();
        if !ports.contains(&port) {
            ports.push(port);
        }
    }
    edges.sort_by_key(|edge| {
        ports
            .iter()
            .position(|port| *port == edge.weight().from_port)
    });
    edges
}

fn build_graph(workflow: &Workflow) -> Result<DiGraph<NodeId, Connection>, WorkflowError> {
    let mut graph = DiGraph::with_capacity(workflow.len(), 0);
    let mut node_to_index = HashMap::new();

    for node in workflow.nodes() {
        let idx = graph.add_node(node.id.clone());
        node_to_index.insert(node.id.as_str(), idx);
    }

    for node in workflow.nodes() {
        for conn in node.output_connections() {
            let from_idx = node_to_index
                .get(conn.from_node.as_str())
                .ok_or_else(|| WorkflowError::NodeNotFound(conn.from_node.clone()))?;
            let to_idx = node_to_index
                .get(conn.to_node.as_str())
                .ok_or_else(|| WorkflowError::NodeNotFound(conn.to_node.clone()))?;
            graph.add_edge(*from_idx, *to_idx, conn.clone());
        }
    }

    Ok(graph)
}

/// Copy upstream outputs into the node's input slots
fn collect_inputs(workflow: &Workflow, node_id: &str) -> Result<HashMap<String, Value>, FlowError> {
    let node = workflow
        .node(node_id)
        .ok_or_else(|| WorkflowError::NodeNotFound(node_id.to_string()))?;

    let mut inputs = HashMap::new();
    for conn in node.input_connections() {
        let source = workflow
            .node(&conn.from_node)
            .ok_or_else(|| WorkflowError::NodeNotFound(conn.from_node.clone()))?;

        if source.status != NodeStatus::Completed {
            return Err(FlowError::SourceNotCompleted {
                node_id: node_id.to_string(),
                source_id: conn.from_node.clone(),
            });
        }

        match source.outputs.get(&conn.from_port) {
            Some(value) => {
                inputs.insert(conn.to_port.clone(), value.clone());
            }
            None => tracing::debug!(
                node_id,
                source = %conn.from_node,
                port = %conn.from_port,
                "Source produced no value for wired output"
            ),
        }
    }

    Ok(inputs)
}

fn skip_remaining(workflow: &mut Workflow, remaining: &[NodeId]) {
    for id in remaining {
        if let Some(node) = workflow.node_mut(id) {
            if node.status == NodeStatus::Pending {
                node.status = NodeStatus::Skipped;
            }
        }
    }
}

/// Result of workflow execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub job_id: JobId,
    pub execution_order: Vec<NodeId>,
    /// Outputs of the last node in execution order
    pub outputs: HashMap<String, Value>,
    pub completed_nodes: usize,
    pub total_nodes: usize,
}
