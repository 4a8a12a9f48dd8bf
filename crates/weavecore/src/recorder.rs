use crate::run::{NodeRunId, NodeRunUpdate, RunId, RunScope, RunUpdate, WorkflowRun};
use crate::{NodeId, Record, RecorderError, WorkflowId};
use async_trait::async_trait;

/// Persistence collaborator the engine writes run state transitions to.
///
/// Calls are awaited in order; the engine does not move on to the next node
/// until the current node's terminal update has returned.
#[async_trait]
pub trait RunRecorder: Send + Sync {
    async fn create_run(
        &self,
        workflow_id: WorkflowId,
        scope: RunScope,
        selected_nodes: Option<Vec<NodeId>>,
    ) -> Result<WorkflowRun, RecorderError>;

    async fn create_node_run(
        &self,
        run_id: RunId,
        node_id: &str,
        node_type: &str,
        inputs: &Record,
    ) -> Result<NodeRunId, RecorderError>;

    async fn update_node_run(
        &self,
        node_run_id: NodeRunId,
        update: NodeRunUpdate,
    ) -> Result<(), RecorderError>;

    async fn update_run(&self, run_id: RunId, update: RunUpdate) -> Result<(), RecorderError>;

    /// Read side: one run with its node runs ordered by start time.
    async fn get_run(&self, run_id: RunId) -> Result<WorkflowRun, RecorderError>;

    /// Read side: runs of a workflow, newest first, node runs ordered by start time.
    async fn list_runs(&self, workflow_id: WorkflowId) -> Result<Vec<WorkflowRun>, RecorderError>;
}
