//! Run records and the results handed back to callers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::WorkflowError;
use crate::workflow::schema::Schema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Suspended,
    Success,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Suspended => "suspended",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to re-enter a suspended stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspendState {
    /// Pipeline stage that suspended.
    pub stage_id: String,
    /// Step that asked for input; differs from `stage_id` inside a branch.
    pub step_id: String,
    pub payload: Value,
    pub resume_schema: Schema,
    /// Value the stage received; handed to it again on resume.
    pub input: Value,
    /// Branch arms that finished before the suspension.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub completed_arms: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFailure {
    pub stage_id: Option<String>,
    #[serde(serialize_with = "display")]
    pub error: WorkflowError,
}

/// One execution of a workflow.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub run_id: String,
    pub workflow_id: String,
    pub status: RunStatus,
    pub current_stage_index: usize,
    /// Output of every completed stage, by stage id.
    pub context: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspend: Option<SuspendState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    pub(crate) fn new(workflow_id: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            status: RunStatus::Running,
            current_stage_index: 0,
            context: HashMap::new(),
            suspend: None,
            failure: None,
            output: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// What `start` and `resume` report back.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RunResult {
    Success {
        run_id: String,
        output: Value,
    },
    Suspended {
        run_id: String,
        resume_token: String,
        stage_id: String,
        payload: Value,
    },
    Failed {
        run_id: String,
        stage_id: Option<String>,
        #[serde(serialize_with = "display")]
        error: WorkflowError,
    },
}

impl RunResult {
    pub fn run_id(&self) -> &str {
        match self {
            RunResult::Success { run_id, .. }
            | RunResult::Suspended { run_id, .. }
            | RunResult::Failed { run_id, .. } => run_id,
        }
    }

    pub fn status(&self) -> RunStatus {
        match self {
            RunResult::Success { .. } => RunStatus::Success,
            RunResult::Suspended { .. } => RunStatus::Suspended,
            RunResult::Failed { .. } => RunStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunResult::Success { .. })
    }

    pub fn output(&self) -> Option<&Value> {
        match self {
            RunResult::Success { output, .. } => Some(output),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&WorkflowError> {
        match self {
            RunResult::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

fn display<T: std::fmt::Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_result_wire_shape() {
        let suspended = RunResult::Suspended {
            run_id: "r1".to_string(),
            resume_token: "r1".to_string(),
            stage_id: "confirm-dosage".to_string(),
            payload: json!({ "question": "Confirm dosage?" }),
        };
        assert_eq!(
            serde_json::to_value(&suspended).unwrap(),
            json!({
                "status": "suspended",
                "runId": "r1",
                "resumeToken": "r1",
                "stageId": "confirm-dosage",
                "payload": { "question": "Confirm dosage?" }
            })
        );

        let failed = RunResult::Failed {
            run_id: "r2".to_string(),
            stage_id: Some("classify-step".to_string()),
            error: WorkflowError::step("classify-step", "boom"),
        };
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"], "Step 'classify-step' failed: boom");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(RunStatus::Success.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Suspended.is_terminal());
        assert_eq!(RunStatus::Running.to_string(), "running");
    }
}
