use crate::collector::{collect_node_inputs, NodeOutputs};
use crate::planner::create_execution_plan;
use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use weavecore::{
    Edge, EventBus, ExecutionEvent, GraphNode, NodeContext, NodeDispatcher, NodeError, NodeId,
    NodeRunUpdate, RunId, RunRecorder, RunStatus, RunUpdate, WorkflowRun,
};

/// Runs a planned workflow one node at a time.
///
/// Every node is awaited to completion, including its recorder writes, before
/// the next one starts. The first failure ends the run.
#[derive(Clone)]
pub struct WorkflowExecutor {
    dispatcher: Arc<dyn NodeDispatcher>,
    recorder: Arc<dyn RunRecorder>,
    event_bus: Arc<EventBus>,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: RunId,
    pub status: RunStatus,
    pub duration_ms: u64,
    pub completed: Vec<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<NodeFailure>,
    pub skipped: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFailure {
    pub node_id: NodeId,
    pub error: String,
}

impl WorkflowExecutor {
    pub fn new(
        dispatcher: Arc<dyn NodeDispatcher>,
        recorder: Arc<dyn RunRecorder>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            dispatcher,
            recorder,
            event_bus,
        }
    }

    /// Executes `run`, which must already exist in the recorder with status RUNNING.
    pub async fn execute(
        &self,
        run: &WorkflowRun,
        nodes: &[GraphNode],
        edges: &[Edge],
    ) -> RunReport {
        let run_id = run.id;
        let start = Instant::now();

        self.event_bus.emit(ExecutionEvent::RunStarted {
            run_id,
            workflow_id: run.workflow_id,
            scope: run.scope,
            timestamp: Utc::now(),
        });
        tracing::info!(%run_id, workflow_id = %run.workflow_id, scope = ?run.scope, "run started");

        let plan = create_execution_plan(nodes, edges, run.selected_nodes.as_deref());

        let skipped: Vec<NodeId> = plan.unreachable().into_iter().cloned().collect();
        for node_id in &skipped {
            tracing::warn!(%run_id, %node_id, "node is on a cycle, skipping");
            self.event_bus.emit(ExecutionEvent::NodeSkipped {
                run_id,
                node_id: node_id.clone(),
                reason: "not reachable in execution order".to_string(),
                timestamp: Utc::now(),
            });
        }

        let mut completed = Vec::with_capacity(plan.execution_order.len());
        let mut failed = None;
        let mut outputs = NodeOutputs::new();

        for node_id in &plan.execution_order {
            let Some(node) = nodes.iter().find(|n| &n.id == node_id) else {
                continue;
            };
            match self.step(run_id, node, nodes, edges, outputs).await {
                Ok(next) => {
                    outputs = next;
                    completed.push(node_id.clone());
                }
                Err(failure) => {
                    failed = Some(failure);
                    break;
                }
            }
        }

        let status = if failed.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Success
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        if let Err(e) = self
            .recorder
            .update_run(run_id, RunUpdate { status, duration_ms })
            .await
        {
            tracing::error!(%run_id, "failed to record run completion: {}", e);
        }

        self.event_bus.emit(ExecutionEvent::RunCompleted {
            run_id,
            status,
            duration_ms,
            timestamp: Utc::now(),
        });
        tracing::info!(%run_id, ?status, duration_ms, "run finished");

        RunReport {
            run_id,
            status,
            duration_ms,
            completed,
            failed,
            skipped,
        }
    }

    /// Runs one node and hands the output map on to the next step.
    async fn step(
        &self,
        run_id: RunId,
        node: &GraphNode,
        nodes: &[GraphNode],
        edges: &[Edge],
        mut outputs: NodeOutputs,
    ) -> Result<NodeOutputs, NodeFailure> {
        let fail = |error: String| NodeFailure {
            node_id: node.id.clone(),
            error,
        };

        let inputs = collect_node_inputs(&node.id, nodes, edges, Some(&outputs));
        let node_run_id = self
            .recorder
            .create_node_run(run_id, &node.id, node.type_name(), &inputs)
            .await
            .map_err(|e| fail(e.to_string()))?;

        self.event_bus.emit(ExecutionEvent::NodeStarted {
            run_id,
            node_id: node.id.clone(),
            node_type: node.type_name().to_string(),
            timestamp: Utc::now(),
        });

        let ctx = NodeContext::new(
            run_id,
            node.id.clone(),
            inputs,
            self.event_bus.create_emitter(run_id, node.id.clone()),
        );
        let start = Instant::now();
        // A panicking handler fails its node like any other error.
        let result = AssertUnwindSafe(self.dispatcher.run(node, ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(NodeError::ExecutionFailed(format!(
                    "handler panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                tracing::info!(%run_id, node_id = %node.id, "node completed in {}ms", duration_ms);
                self.recorder
                    .update_node_run(
                        node_run_id,
                        NodeRunUpdate::Success {
                            outputs: output.outputs.clone(),
                            duration_ms,
                        },
                    )
                    .await
                    .map_err(|e| fail(e.to_string()))?;

                self.event_bus.emit(ExecutionEvent::NodeCompleted {
                    run_id,
                    node_id: node.id.clone(),
                    outputs: output.outputs.clone(),
                    duration_ms,
                    timestamp: Utc::now(),
                });
                outputs.insert(node.id.clone(), output.outputs);
                Ok(outputs)
            }
            Err(e) => {
                let error = e.to_string();
                tracing::error!(%run_id, node_id = %node.id, "node failed: {}", error);
                if let Err(record_err) = self
                    .recorder
                    .update_node_run(
                        node_run_id,
                        NodeRunUpdate::Failed {
                            error: error.clone(),
                            duration_ms,
                        },
                    )
                    .await
                {
                    tracing::error!(%run_id, node_id = %node.id, "failed to record node failure: {}", record_err);
                }

                self.event_bus.emit(ExecutionEvent::NodeFailed {
                    run_id,
                    node_id: node.id.clone(),
                    error: error.clone(),
                    duration_ms,
                    timestamp: Utc::now(),
                });
                Err(fail(error))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use weavecore::{record, NodeError, NodeOutput, RunScope, Value};

    /// Echoes each node's inputs and fails on request.
    struct Scripted {
        fail_on: Option<&'static str>,
        seen: Mutex<Vec<NodeId>>,
    }

    #[async_trait]
    impl NodeDispatcher for Scripted {
        async fn run(&self, node: &GraphNode, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
            self.seen.lock().unwrap().push(node.id.clone());
            if self.fail_on == Some(node.id.as_str()) {
                return Err(NodeError::ExecutionFailed(format!("{} exploded", node.id)));
            }
            let joined = ctx
                .inputs
                .values()
                .filter_map(|v| v.to_text())
                .collect::<Vec<_>>()
                .join("+");
            Ok(NodeOutput::new().with_output("output", format!("{}[{}]", node.id, joined)))
        }
    }

    fn chain() -> (Vec<GraphNode>, Vec<Edge>) {
        let nodes = vec![GraphNode::text("a", "x"), GraphNode::llm("b"), GraphNode::llm("c")];
        let edges = vec![
            Edge::new("a", "b").with_handles("output", "user_message"),
            Edge::new("b", "c").with_handles("output", "user_message"),
        ];
        (nodes, edges)
    }

    async fn run_chain(fail_on: Option<&'static str>) -> (RunReport, WorkflowRun, Vec<NodeId>) {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(Scripted {
            fail_on,
            seen: Mutex::new(Vec::new()),
        });
        let executor = WorkflowExecutor::new(dispatcher.clone(), store.clone(), Arc::new(EventBus::default()));
        let (nodes, edges) = chain();
        let run = store.create_run(uuid::Uuid::new_v4(), RunScope::Full, None).await.unwrap();
        let report = executor.execute(&run, &nodes, &edges).await;
        let recorded = store.get_run(run.id).await.unwrap();
        let seen = dispatcher.seen.lock().unwrap().clone();
        (report, recorded, seen)
    }

    #[tokio::test]
    async fn outputs_flow_downstream() {
        let (report, run, _) = run_chain(None).await;
        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(run.status, RunStatus::Success);
        let c = run.node_run("c").unwrap();
        assert_eq!(c.inputs, record([("user_message", "b[a[]]")]));
        assert_eq!(c.outputs.as_ref().unwrap()["output"], Value::from("c[b[a[]]]"));
    }

    #[tokio::test]
    async fn failure_stops_the_run() {
        let (report, run, seen) = run_chain(Some("b")).await;
        assert_eq!(seen, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.completed, vec!["a".to_string()]);
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.node_run("a").unwrap().status, RunStatus::Success);
        let b = run.node_run("b").unwrap();
        assert_eq!(b.status, RunStatus::Failed);
        assert_eq!(b.error.as_deref(), Some("Execution failed: b exploded"));
        assert!(run.node_run("c").is_none());
        assert!(run.duration.is_some());
    }

    #[tokio::test]
    async fn events_bracket_the_run() {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let executor = WorkflowExecutor::new(
            Arc::new(Scripted {
                fail_on: None,
                seen: Mutex::new(Vec::new()),
            }),
            store.clone(),
            bus,
        );
        let nodes = vec![GraphNode::text("only", "hi")];
        let run = store.create_run(uuid::Uuid::new_v4(), RunScope::Single, Some(vec!["only".into()])).await.unwrap();
        executor.execute(&run, &nodes, &[]).await;

        assert!(matches!(rx.recv().await.unwrap(), ExecutionEvent::RunStarted { .. }));
        assert!(matches!(rx.recv().await.unwrap(), ExecutionEvent::NodeStarted { .. }));
        assert!(matches!(rx.recv().await.unwrap(), ExecutionEvent::NodeCompleted { .. }));
        assert!(matches!(
            rx.recv().await.unwrap(),
            ExecutionEvent::RunCompleted { status: RunStatus::Success, .. }
        ));
    }

    struct Explodes;

    #[async_trait]
    impl NodeDispatcher for Explodes {
        async fn run(&self, node: &GraphNode, _ctx: NodeContext) -> Result<NodeOutput, NodeError> {
            if node.id == "b" {
                panic!("decoder blew up");
            }
            Ok(NodeOutput::new().with_output("output", node.id.clone()))
        }
    }

    #[tokio::test]
    async fn panicking_handler_fails_node_and_run() {
        let store = Arc::new(MemoryStore::new());
        let executor = WorkflowExecutor::new(Arc::new(Explodes), store.clone(), Arc::new(EventBus::default()));
        let (nodes, edges) = chain();
        let run = store.create_run(uuid::Uuid::new_v4(), RunScope::Full, None).await.unwrap();

        let report = executor.execute(&run, &nodes, &edges).await;
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.failed.as_ref().unwrap().node_id, "b");

        let recorded = store.get_run(run.id).await.unwrap();
        assert_eq!(recorded.status, RunStatus::Failed);
        let b = recorded.node_run("b").unwrap();
        assert_eq!(b.status, RunStatus::Failed);
        assert_eq!(
            b.error.as_deref(),
            Some("Execution failed: handler panicked: decoder blew up")
        );
        assert!(recorded.node_run("c").is_none());
    }
}
