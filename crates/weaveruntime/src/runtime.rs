use crate::catalog::NodeCatalog;
use crate::executor::{RunReport, WorkflowExecutor};
use crate::store::MemoryStore;
use serde::Deserialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use weavecore::{
    Edge, EngineError, EventBus, ExecutionEvent, GraphNode, NodeDispatcher, NodeId, RunId,
    RunRecorder, RunScope, WorkflowId, WorkflowRun,
};

/// Request to execute a stored workflow, or a subset of it.
///
/// `nodes`/`edges` replace the stored graph for this run only.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub workflow_id: WorkflowId,
    #[serde(default)]
    pub node_ids: Option<Vec<NodeId>>,
    #[serde(default)]
    pub nodes: Option<Vec<GraphNode>>,
    #[serde(default)]
    pub edges: Option<Vec<Edge>>,
}

impl ExecuteRequest {
    pub fn new(workflow_id: WorkflowId) -> Self {
        Self {
            workflow_id,
            node_ids: None,
            nodes: None,
            edges: None,
        }
    }

    pub fn with_nodes(mut self, node_ids: Vec<NodeId>) -> Self {
        self.node_ids = Some(node_ids);
        self
    }
}

/// A run that has been recorded and is executing in the background.
pub struct RunHandle {
    pub run_id: RunId,
    /// Run record as created, status RUNNING.
    pub run: WorkflowRun,
    pub task: JoinHandle<RunReport>,
}

impl RunHandle {
    pub async fn wait(self) -> Result<RunReport, EngineError> {
        self.task
            .await
            .map_err(|e| EngineError::Internal(format!("Run task join error: {}", e)))
    }
}

/// Main runtime for executing workflows
pub struct WeaveRuntime {
    catalog: Arc<NodeCatalog>,
    executor: WorkflowExecutor,
    event_bus: Arc<EventBus>,
    store: MemoryStore,
}

impl WeaveRuntime {
    /// Create a new runtime with default settings
    pub fn new(dispatcher: Arc<dyn NodeDispatcher>) -> Self {
        Self::with_config(dispatcher, RuntimeConfig::default())
    }

    pub fn with_config(dispatcher: Arc<dyn NodeDispatcher>, config: RuntimeConfig) -> Self {
        Self::with_store(dispatcher, MemoryStore::new(), config)
    }

    /// Create a runtime over an existing store
    pub fn with_store(dispatcher: Arc<dyn NodeDispatcher>, store: MemoryStore, config: RuntimeConfig) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let recorder: Arc<dyn RunRecorder> = Arc::new(store.clone());
        let executor = WorkflowExecutor::new(dispatcher, recorder, event_bus.clone());

        Self {
            catalog: Arc::new(NodeCatalog::new()),
            executor,
            event_bus,
            store,
        }
    }

    pub fn catalog(&self) -> &Arc<NodeCatalog> {
        &self.catalog
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Records a new run and launches it detached.
    ///
    /// The run record exists before this returns; every node update happens
    /// afterwards on the spawned task.
    pub async fn submit(&self, owner: &str, request: ExecuteRequest) -> Result<RunHandle, EngineError> {
        if matches!(&request.node_ids, Some(ids) if ids.is_empty()) {
            return Err(EngineError::Validation(
                "nodeIds must contain at least one node".to_string(),
            ));
        }

        let workflow = self.store.get_workflow(owner, request.workflow_id).await?;
        let nodes = request.nodes.unwrap_or(workflow.nodes);
        let edges = request.edges.unwrap_or(workflow.edges);

        if let Some(ids) = &request.node_ids {
            if let Some(missing) = ids.iter().find(|id| !nodes.iter().any(|n| &n.id == *id)) {
                return Err(EngineError::NotFound(format!("Node {missing}")));
            }
        }

        let scope = RunScope::from_selection(request.node_ids.as_deref());
        let run = self
            .store
            .create_run(workflow.id, scope, request.node_ids)
            .await?;
        let run_id = run.id;

        let executor = self.executor.clone();
        let planned = run.clone();
        let task = tokio::spawn(async move { executor.execute(&planned, &nodes, &edges).await });

        tracing::info!(%run_id, workflow_id = %workflow.id, ?scope, "run submitted");
        Ok(RunHandle { run_id, run, task })
    }

    /// Submits a run and waits for it to finish.
    pub async fn execute_now(&self, owner: &str, request: ExecuteRequest) -> Result<RunReport, EngineError> {
        self.submit(owner, request).await?.wait().await
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn execute_request_from_editor_payload() {
        let id = uuid::Uuid::new_v4();
        let request: ExecuteRequest = serde_json::from_value(json!({
            "workflowId": id,
            "nodeIds": ["llm-1"],
            "edges": [{"source": "a", "target": "llm-1"}]
        }))
        .unwrap();

        assert_eq!(request.workflow_id, id);
        assert_eq!(request.node_ids, Some(vec!["llm-1".to_string()]));
        assert!(request.nodes.is_none());
        let edges = request.edges.unwrap();
        assert_eq!(edges[0].source_handle, "output");
        assert_eq!(edges[0].target_handle, "input");
    }

    #[test]
    fn execute_request_requires_workflow() {
        let parsed: Result<ExecuteRequest, _> = serde_json::from_value(json!({ "nodeIds": [] }));
        assert!(parsed.is_err());
    }
}
