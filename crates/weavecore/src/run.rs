use crate::error::RecorderError;
use crate::{NodeId, Record, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type RunId = Uuid;
pub type NodeRunId = Uuid;

/// Lifecycle of a run or node run. `Running` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunScope {
    Full,
    Partial,
    Single,
}

impl RunScope {
    /// Scope implied by an execute request's optional node selection.
    pub fn from_selection(node_ids: Option<&[NodeId]>) -> Self {
        match node_ids {
            None => RunScope::Full,
            Some([_]) => RunScope::Single,
            Some(_) => RunScope::Partial,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub id: RunId,
    pub workflow_id: WorkflowId,
    pub status: RunStatus,
    pub scope: RunScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_nodes: Option<Vec<NodeId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub node_runs: Vec<NodeRun>,
}

impl WorkflowRun {
    pub fn start(workflow_id: WorkflowId, scope: RunScope, selected_nodes: Option<Vec<NodeId>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            status: RunStatus::Running,
            scope,
            selected_nodes,
            duration: None,
            started_at: Utc::now(),
            completed_at: None,
            node_runs: Vec::new(),
        }
    }

    pub fn node_run(&self, node_id: &str) -> Option<&NodeRun> {
        self.node_runs.iter().find(|r| r.node_id == node_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRun {
    pub id: NodeRunId,
    pub run_id: RunId,
    pub node_id: NodeId,
    pub node_type: String,
    pub status: RunStatus,
    pub inputs: Record,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl NodeRun {
    pub fn start(run_id: RunId, node_id: NodeId, node_type: String, inputs: Record) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            node_id,
            node_type,
            status: RunStatus::Running,
            inputs,
            outputs: None,
            error: None,
            duration: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Terminal update for a node run.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeRunUpdate {
    Success { outputs: Record, duration_ms: u64 },
    Failed { error: String, duration_ms: u64 },
}

impl NodeRunUpdate {
    pub fn status(&self) -> RunStatus {
        match self {
            NodeRunUpdate::Success { .. } => RunStatus::Success,
            NodeRunUpdate::Failed { .. } => RunStatus::Failed,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        match self {
            NodeRunUpdate::Success { duration_ms, .. } | NodeRunUpdate::Failed { duration_ms, .. } => {
                *duration_ms
            }
        }
    }

    /// Finishes `node_run`. A node run is finished once; later updates are refused.
    pub fn apply(self, node_run: &mut NodeRun, completed_at: DateTime<Utc>) -> Result<(), RecorderError> {
        if node_run.status.is_terminal() {
            return Err(RecorderError::AlreadyFinished(format!("node run {}", node_run.id)));
        }
        node_run.status = self.status();
        node_run.duration = Some(self.duration_ms());
        node_run.completed_at = Some(completed_at);
        match self {
            NodeRunUpdate::Success { outputs, .. } => node_run.outputs = Some(outputs),
            NodeRunUpdate::Failed { error, .. } => node_run.error = Some(error),
        }
        Ok(())
    }
}

/// Terminal update for a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunUpdate {
    pub status: RunStatus,
    pub duration_ms: u64,
}

impl RunUpdate {
    /// Finishes `run`. A finished run keeps its status for good.
    pub fn apply(self, run: &mut WorkflowRun, completed_at: DateTime<Utc>) -> Result<(), RecorderError> {
        if run.status.is_terminal() {
            return Err(RecorderError::AlreadyFinished(format!("run {}", run.id)));
        }
        run.status = self.status;
        run.duration = Some(self.duration_ms);
        run.completed_at = Some(completed_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_follows_selection() {
        assert_eq!(RunScope::from_selection(None), RunScope::Full);
        assert_eq!(RunScope::from_selection(Some(&["a".to_string()])), RunScope::Single);
        assert_eq!(
            RunScope::from_selection(Some(&["a".to_string(), "b".to_string()])),
            RunScope::Partial
        );
    }

    #[test]
    fn statuses_serialize_upper_case() {
        assert_eq!(serde_json::to_string(&RunStatus::Success).unwrap(), "\"SUCCESS\"");
        assert_eq!(serde_json::to_string(&RunScope::Partial).unwrap(), "\"PARTIAL\"");
    }

    #[test]
    fn finished_records_refuse_second_update() {
        let mut run = WorkflowRun::start(Uuid::new_v4(), RunScope::Full, None);
        let failed = RunUpdate {
            status: RunStatus::Failed,
            duration_ms: 4,
        };
        failed.apply(&mut run, Utc::now()).unwrap();
        let retry = RunUpdate {
            status: RunStatus::Success,
            duration_ms: 9,
        };
        assert!(matches!(retry.apply(&mut run, Utc::now()), Err(RecorderError::AlreadyFinished(_))));
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.duration, Some(4));

        let mut node_run = NodeRun::start(run.id, "a".into(), "text".into(), Record::new());
        NodeRunUpdate::Success {
            outputs: Record::new(),
            duration_ms: 1,
        }
        .apply(&mut node_run, Utc::now())
        .unwrap();
        let late = NodeRunUpdate::Failed {
            error: "late".into(),
            duration_ms: 2,
        };
        assert!(late.apply(&mut node_run, Utc::now()).is_err());
        assert_eq!(node_run.status, RunStatus::Success);
        assert!(node_run.error.is_none());
    }
}
