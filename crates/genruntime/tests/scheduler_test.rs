// crates/genruntime/tests/scheduler_test.rs

use async_trait::async_trait;
use gencore::{
    EventBus, ExecutionContext, ExecutionEvent, FlowError, Node, NodeContext, NodeError,
    NodeOutput, NodeStatus, Value, Workflow, WorkflowError, WorkflowNode,
};
use genruntime::{ProgressError, ProgressSink, WorkflowScheduler};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Forwards its "in" input to "out", or emits its own id when unwired
struct PassThrough {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Node for PassThrough {
    fn node_type(&self) -> &str {
        "pass"
    }

    async fn execute(&self, ctx: NodeContext<'_>) -> Result<NodeOutput, NodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let value = match ctx.input("in") {
            Some(Value::String(s)) => Value::String(format!("{}>{}", s, ctx.node_id)),
            Some(other) => other.clone(),
            None => Value::from(ctx.node_id),
        };
        Ok(NodeOutput::new().with_output("out", value))
    }
}

struct Failing {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Node for Failing {
    fn node_type(&self) -> &str {
        "failing"
    }

    async fn execute(&self, _ctx: NodeContext<'_>) -> Result<NodeOutput, NodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(NodeError::Failed("model exploded".to_string()))
    }
}

#[derive(Default)]
struct RecordingSink {
    reports: Mutex<Vec<(u8, String)>>,
}

impl RecordingSink {
    fn percents(&self) -> Vec<u8> {
        self.reports.lock().unwrap().iter().map(|(p, _)| *p).collect()
    }

    fn messages(&self) -> Vec<String> {
        self.reports.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn report(&self, percent: u8, message: &str) -> Result<(), ProgressError> {
        self.reports.lock().unwrap().push((percent, message.to_string()));
        Ok(())
    }
}

struct BrokenSink;

#[async_trait]
impl ProgressSink for BrokenSink {
    async fn report(&self, _percent: u8, _message: &str) -> Result<(), ProgressError> {
        Err(ProgressError("store unavailable".to_string()))
    }
}

struct Harness {
    workflow: Workflow,
    calls: HashMap<String, Arc<AtomicUsize>>,
}

impl Harness {
    fn new() -> Self {
        Self {
            workflow: Workflow::new(),
            calls: HashMap::new(),
        }
    }

    fn pass(mut self, id: &str) -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        self.calls.insert(id.to_string(), calls.clone());
        self.workflow
            .add_node(WorkflowNode::new(id, "pass", HashMap::new(), Box::new(PassThrough { calls })))
            .unwrap();
        self
    }

    fn failing(mut self, id: &str) -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        self.calls.insert(id.to_string(), calls.clone());
        self.workflow
            .add_node(WorkflowNode::new(id, "failing", HashMap::new(), Box::new(Failing { calls })))
            .unwrap();
        self
    }

    fn edge(mut self, from: &str, to: &str) -> Self {
        self.workflow.connect(from, "out", to, "in").unwrap();
        self
    }

    fn edge_to(mut self, from: &str, to: &str, input: &str) -> Self {
        self.workflow.connect(from, "out", to, input).unwrap();
        self
    }

    fn calls(&self, id: &str) -> usize {
        self.calls[id].load(Ordering::SeqCst)
    }
}

fn scheduler() -> WorkflowScheduler {
    WorkflowScheduler::new(Arc::new(EventBus::new(64)))
}

fn context() -> ExecutionContext {
    ExecutionContext::new(Uuid::new_v4(), "tester")
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_linear_workflow_reports_progress_and_returns_last_output() {
    init_tracing();
    let mut h = Harness::new().pass("a").pass("b").pass("c").edge("a", "b").edge("b", "c");
    let sink = RecordingSink::default();

    let result = scheduler()
        .execute(&mut h.workflow, &mut context(), &sink)
        .await
        .unwrap();

    assert_eq!(sink.percents(), vec![33, 67, 100]);
    assert_eq!(result.execution_order, vec!["a", "b", "c"]);
    assert_eq!(result.outputs.get("out"), Some(&Value::from("a>b>c")));
    assert_eq!(
        &result.outputs,
        &h.workflow.node("c").unwrap().outputs,
        "result equals the last node's outputs"
    );
    assert_eq!(sink.messages()[0], "Completed pass");
}

#[test]
fn test_order_places_dependencies_first() {
    // Diamond plus an independent chain, inserted out of dependency order
    let h = Harness::new()
        .pass("sink")
        .pass("left")
        .pass("root")
        .pass("right")
        .pass("solo")
        .pass("solo_child")
        .edge_to("left", "sink", "l")
        .edge_to("right", "sink", "r")
        .edge("root", "left")
        .edge("root", "right")
        .edge("solo", "solo_child");

    let order = WorkflowScheduler::execution_order(&h.workflow).unwrap();
    let pos = |id: &str| order.iter().position(|n| n == id).unwrap();

    assert_eq!(order.len(), 6);
    for conn in h.workflow.connections() {
        assert!(
            pos(&conn.from_node) < pos(&conn.to_node),
            "{} must run before {}",
            conn.from_node,
            conn.to_node
        );
    }
}

#[test]
fn test_ready_nodes_run_in_discovery_order() {
    let h = Harness::new()
        .pass("x")
        .pass("a")
        .pass("c")
        .pass("b")
        .edge("a", "b")
        .edge("a", "c");

    let order = WorkflowScheduler::execution_order(&h.workflow).unwrap();

    // Seeds in insertion order (x, a); a's fan-out in connection order (b, c)
    assert_eq!(order, vec!["x", "a", "b", "c"]);
}

#[test]
fn test_fan_out_is_released_per_output_port() {
    let mut h = Harness::new().pass("src").pass("x").pass("y").pass("z");
    h.workflow.connect("src", "out1", "x", "in").unwrap();
    h.workflow.connect("src", "out2", "y", "in").unwrap();
    h.workflow.connect("src", "out1", "z", "in").unwrap();

    let order = WorkflowScheduler::execution_order(&h.workflow).unwrap();

    // Every out1 target before the first out2 target
    assert_eq!(order, vec!["src", "x", "z", "y"]);
}

#[tokio::test]
async fn test_cycle_fails_before_any_node_runs() {
    let mut h = Harness::new()
        .pass("start")
        .pass("a")
        .pass("b")
        .edge_to("start", "a", "seed")
        .edge("a", "b")
        .edge("b", "a");
    let sink = RecordingSink::default();

    assert_eq!(
        WorkflowScheduler::execution_order(&h.workflow).unwrap_err(),
        WorkflowError::CircularDependency
    );

    let err = scheduler()
        .execute(&mut h.workflow, &mut context(), &sink)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FlowError::Workflow(WorkflowError::CircularDependency)
    ));
    for id in ["start", "a", "b"] {
        assert_eq!(h.calls(id), 0, "{} must not execute", id);
    }
    assert!(sink.percents().is_empty());
}

#[test]
fn test_self_loop_is_a_cycle() {
    let h = Harness::new().pass("a").edge("a", "a");

    assert_eq!(
        WorkflowScheduler::execution_order(&h.workflow).unwrap_err(),
        WorkflowError::CircularDependency
    );
}

#[tokio::test]
async fn test_failure_in_middle_aborts_remaining_nodes() {
    let mut h = Harness::new()
        .pass("a")
        .failing("b")
        .pass("c")
        .edge("a", "b")
        .edge("b", "c");
    let sink = RecordingSink::default();

    let err = scheduler()
        .execute(&mut h.workflow, &mut context(), &sink)
        .await
        .unwrap_err();

    match &err {
        FlowError::NodeExecution { node_id, node_type, source } => {
            assert_eq!(node_id, "b");
            assert_eq!(node_type, "failing");
            assert_eq!(source, &NodeError::Failed("model exploded".to_string()));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.user_message(), "model exploded");

    let b = h.workflow.node("b").unwrap();
    assert_eq!(b.status, NodeStatus::Failed);
    assert!(!b.error.as_deref().unwrap_or_default().is_empty());

    let c = h.workflow.node("c").unwrap();
    assert_eq!(c.status, NodeStatus::Skipped);
    assert_eq!(h.calls("c"), 0);

    // One report for a, then the failure report naming the node type
    assert_eq!(sink.percents(), vec![33, 33]);
    assert_eq!(sink.messages()[1], "Failed at failing: model exploded");
}

#[tokio::test]
async fn test_progress_sink_failures_are_not_fatal() {
    let mut h = Harness::new().pass("a").pass("b").edge("a", "b");

    let result = scheduler()
        .execute(&mut h.workflow, &mut context(), &BrokenSink)
        .await
        .unwrap();

    assert_eq!(result.completed_nodes, 2);
    assert_eq!(h.calls("b"), 1);
}

#[tokio::test]
async fn test_re_execution_starts_from_scratch() {
    let mut h = Harness::new().pass("a").pass("b").pass("c").edge("a", "b").edge("b", "c");
    let sched = scheduler();

    let first = RecordingSink::default();
    sched.execute(&mut h.workflow, &mut context(), &first).await.unwrap();

    let second = RecordingSink::default();
    sched.execute(&mut h.workflow, &mut context(), &second).await.unwrap();

    assert_eq!(second.percents(), vec![33, 67, 100]);
    for id in ["a", "b", "c"] {
        assert_eq!(h.calls(id), 2, "{} must run on every attempt", id);
    }
}

#[tokio::test]
async fn test_fan_out_delivers_to_every_target() {
    let mut h = Harness::new()
        .pass("src")
        .pass("left")
        .pass("right")
        .edge("src", "left")
        .edge("src", "right");

    scheduler()
        .execute(&mut h.workflow, &mut context(), &RecordingSink::default())
        .await
        .unwrap();

    assert_eq!(
        h.workflow.node("left").unwrap().inputs.get("in"),
        Some(&Value::from("src"))
    );
    assert_eq!(
        h.workflow.node("right").unwrap().inputs.get("in"),
        Some(&Value::from("src"))
    );
}

#[tokio::test]
async fn test_empty_workflow_completes_without_reports() {
    let mut workflow = Workflow::new();
    let sink = RecordingSink::default();

    let result = scheduler()
        .execute(&mut workflow, &mut context(), &sink)
        .await
        .unwrap();

    assert!(result.outputs.is_empty());
    assert_eq!(result.total_nodes, 0);
    assert!(sink.percents().is_empty());
}

#[tokio::test]
async fn test_events_follow_node_completion_order() {
    let bus = Arc::new(EventBus::new(64));
    let mut events = bus.subscribe();
    let mut h = Harness::new().pass("a").pass("b").edge("a", "b");

    WorkflowScheduler::new(bus)
        .execute(&mut h.workflow, &mut context(), &RecordingSink::default())
        .await
        .unwrap();

    let mut completed = Vec::new();
    let mut progress = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            ExecutionEvent::NodeCompleted { node_id, .. } => completed.push(node_id),
            ExecutionEvent::Progress { percent, .. } => progress.push(percent),
            _ => {}
        }
    }

    assert_eq!(completed, vec!["a", "b"]);
    assert_eq!(progress, vec![50, 100]);
}
