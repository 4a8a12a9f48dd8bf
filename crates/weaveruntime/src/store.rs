use crate::catalog::NodeCatalog;
use crate::validation::connect_checked;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use weavecore::{
    Edge, EngineError, GraphNode, NodeId, NodeRun, NodeRunId, NodeRunUpdate, Record,
    RecorderError, RunId, RunRecorder, RunScope, RunUpdate, Viewport, Workflow, WorkflowId,
    WorkflowRun,
};

/// Runs returned alongside a single workflow.
pub const RECENT_RUNS: usize = 10;

/// Partial update of a stored workflow; absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowPatch {
    pub name: Option<String>,
    pub nodes: Option<Vec<GraphNode>>,
    pub edges: Option<Vec<Edge>>,
    pub viewport: Option<Viewport>,
}

#[derive(Default)]
struct StoreState {
    workflows: HashMap<WorkflowId, Workflow>,
    runs: HashMap<RunId, WorkflowRun>,
    node_runs: HashMap<NodeRunId, RunId>,
}

impl StoreState {
    fn node_run_mut(&mut self, id: NodeRunId) -> Result<&mut NodeRun, RecorderError> {
        let run_id = self
            .node_runs
            .get(&id)
            .copied()
            .ok_or_else(|| RecorderError::NodeRunNotFound(id.to_string()))?;
        self.runs
            .get_mut(&run_id)
            .and_then(|run| run.node_runs.iter_mut().find(|n| n.id == id))
            .ok_or_else(|| RecorderError::NodeRunNotFound(id.to_string()))
    }

    /// Copies a node's successful outputs back into the stored graph.
    fn write_back(&mut self, run_id: RunId, node_id: &str, outputs: &Record) {
        let Some(workflow_id) = self.runs.get(&run_id).map(|r| r.workflow_id) else {
            return;
        };
        if let Some(node) = self
            .workflows
            .get_mut(&workflow_id)
            .and_then(|wf| wf.find_node_mut(node_id))
        {
            node.kind.apply_outputs(outputs);
        }
    }

    fn owned(&self, owner: &str, id: WorkflowId) -> Result<&Workflow, EngineError> {
        self.workflows
            .get(&id)
            .filter(|wf| wf.owner.as_deref() == Some(owner))
            .ok_or_else(|| EngineError::NotFound(format!("Workflow {id}")))
    }
}

/// Key-value record store for workflows and run history, kept in memory.
///
/// Cloning shares the same underlying state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Workflows of `owner`, most recently updated first.
    pub async fn list_workflows(&self, owner: &str) -> Vec<Workflow> {
        let state = self.state.read().await;
        let mut workflows: Vec<Workflow> = state
            .workflows
            .values()
            .filter(|wf| wf.owner.as_deref() == Some(owner))
            .cloned()
            .collect();
        workflows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        workflows
    }

    /// A workflow visible to `owner`. Someone else's workflow reads as not found.
    pub async fn get_workflow(&self, owner: &str, id: WorkflowId) -> Result<Workflow, EngineError> {
        let state = self.state.read().await;
        state.owned(owner, id).cloned()
    }

    pub async fn get_workflow_with_runs(
        &self,
        owner: &str,
        id: WorkflowId,
    ) -> Result<(Workflow, Vec<WorkflowRun>), EngineError> {
        let workflow = self.get_workflow(owner, id).await?;
        let mut runs = self.list_runs(id).await?;
        runs.truncate(RECENT_RUNS);
        Ok((workflow, runs))
    }

    pub async fn create_workflow(&self, owner: &str, mut workflow: Workflow) -> Workflow {
        let now = Utc::now();
        workflow.owner = Some(owner.to_string());
        workflow.created_at = now;
        workflow.updated_at = now;
        workflow.sanitize();

        let mut state = self.state.write().await;
        state.workflows.insert(workflow.id, workflow.clone());
        tracing::info!(workflow_id = %workflow.id, owner, "workflow created");
        workflow
    }

    pub async fn update_workflow(
        &self,
        owner: &str,
        id: WorkflowId,
        patch: WorkflowPatch,
    ) -> Result<Workflow, EngineError> {
        let mut state = self.state.write().await;
        state.owned(owner, id)?;
        let workflow = state
            .workflows
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(format!("Workflow {id}")))?;

        if let Some(name) = patch.name {
            workflow.name = name;
        }
        if let Some(nodes) = patch.nodes {
            workflow.nodes = nodes;
        }
        if let Some(edges) = patch.edges {
            workflow.edges = edges;
        }
        if patch.viewport.is_some() {
            workflow.viewport = patch.viewport;
        }
        workflow.sanitize();
        workflow.updated_at = Utc::now();
        Ok(workflow.clone())
    }

    /// Adds `edge` to a stored workflow if the type and cycle checks pass.
    ///
    /// Check and write happen under one write lock so concurrent adds never drop an edge.
    pub async fn connect_edge(
        &self,
        owner: &str,
        id: WorkflowId,
        catalog: &NodeCatalog,
        edge: Edge,
    ) -> Result<Workflow, EngineError> {
        let mut state = self.state.write().await;
        state.owned(owner, id)?;
        let workflow = state
            .workflows
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(format!("Workflow {id}")))?;

        connect_checked(catalog, workflow, edge)?;
        workflow.updated_at = Utc::now();
        Ok(workflow.clone())
    }

    /// Removes a workflow together with its run history.
    pub async fn delete_workflow(&self, owner: &str, id: WorkflowId) -> Result<(), EngineError> {
        let mut state = self.state.write().await;
        state.owned(owner, id)?;
        state.workflows.remove(&id);

        let doomed: Vec<RunId> = state
            .runs
            .values()
            .filter(|r| r.workflow_id == id)
            .map(|r| r.id)
            .collect();
        for run_id in doomed {
            if let Some(run) = state.runs.remove(&run_id) {
                for node_run in run.node_runs {
                    state.node_runs.remove(&node_run.id);
                }
            }
        }
        tracing::info!(workflow_id = %id, "workflow deleted");
        Ok(())
    }

    /// Run of a workflow owned by `owner`.
    pub async fn get_owned_run(&self, owner: &str, run_id: RunId) -> Result<WorkflowRun, EngineError> {
        let run = self.get_run(run_id).await?;
        self.get_workflow(owner, run.workflow_id).await?;
        Ok(run)
    }
}

#[async_trait]
impl RunRecorder for MemoryStore {
    async fn create_run(
        &self,
        workflow_id: WorkflowId,
        scope: RunScope,
        selected_nodes: Option<Vec<NodeId>>,
    ) -> Result<WorkflowRun, RecorderError> {
        let run = WorkflowRun::start(workflow_id, scope, selected_nodes);
        let mut state = self.state.write().await;
        state.runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn create_node_run(
        &self,
        run_id: RunId,
        node_id: &str,
        node_type: &str,
        inputs: &Record,
    ) -> Result<NodeRunId, RecorderError> {
        let node_run = NodeRun::start(run_id, node_id.to_string(), node_type.to_string(), inputs.clone());
        let id = node_run.id;

        let mut state = self.state.write().await;
        let run = state
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| RecorderError::RunNotFound(run_id.to_string()))?;
        run.node_runs.push(node_run);
        state.node_runs.insert(id, run_id);
        Ok(id)
    }

    async fn update_node_run(
        &self,
        node_run_id: NodeRunId,
        update: NodeRunUpdate,
    ) -> Result<(), RecorderError> {
        let mut state = self.state.write().await;
        let written_back = match &update {
            NodeRunUpdate::Success { outputs, .. } => Some(outputs.clone()),
            NodeRunUpdate::Failed { .. } => None,
        };

        let node_run = state.node_run_mut(node_run_id)?;
        update.apply(node_run, Utc::now())?;
        let run_id = node_run.run_id;
        let node_id = node_run.node_id.clone();

        if let Some(outputs) = written_back {
            state.write_back(run_id, &node_id, &outputs);
        }
        Ok(())
    }

    async fn update_run(&self, run_id: RunId, update: RunUpdate) -> Result<(), RecorderError> {
        let mut state = self.state.write().await;
        let run = state
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| RecorderError::RunNotFound(run_id.to_string()))?;
        update.apply(run, Utc::now())?;
        Ok(())
    }

    async fn get_run(&self, run_id: RunId) -> Result<WorkflowRun, RecorderError> {
        let state = self.state.read().await;
        let mut run = state
            .runs
            .get(&run_id)
            .cloned()
            .ok_or_else(|| RecorderError::RunNotFound(run_id.to_string()))?;
        run.node_runs.sort_by_key(|n| n.started_at);
        Ok(run)
    }

    async fn list_runs(&self, workflow_id: WorkflowId) -> Result<Vec<WorkflowRun>, RecorderError> {
        let state = self.state.read().await;
        let mut runs: Vec<WorkflowRun> = state
            .runs
            .values()
            .filter(|r| r.workflow_id == workflow_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        for run in &mut runs {
            run.node_runs.sort_by_key(|n| n.started_at);
        }
        Ok(runs)
    }
}
