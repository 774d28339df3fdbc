//! Error types for the MedFlow core.
//!
//! `WorkflowError` is the engine's taxonomy: every way a workflow can be
//! rejected, fail, or refuse an operation on a run. `ServerError` is the
//! transport-facing error; when the `axum` feature is enabled it implements
//! `IntoResponse` so it can be used directly as an axum handler error type.

use crate::workflow::run::RunStatus;
use crate::workflow::schema::ValidationError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkflowError {
    /// A value failed its schema. `stage_id` is `None` for workflow input.
    #[error("Validation failed{}: {source}", at_stage(.stage_id))]
    Validation {
        stage_id: Option<String>,
        #[source]
        source: ValidationError,
    },

    #[error("Step '{stage_id}' failed: {message}")]
    StepExecution { stage_id: String, message: String },

    #[error("No branch matched in stage '{stage_id}'")]
    NoRouteMatched { stage_id: String },

    #[error("Run {run_id} has already terminated ({status})")]
    RunAlreadyTerminated { run_id: String, status: RunStatus },

    #[error("Run {run_id} is still running")]
    RunInProgress { run_id: String },

    #[error("Unknown run: {run_id}")]
    UnknownRun { run_id: String },

    #[error("Run {run_id} was cancelled")]
    Cancelled { run_id: String },

    /// The pipeline could not be sealed (empty, duplicate ids, schema mismatch).
    #[error("Invalid workflow: {0}")]
    Commit(String),
}

fn at_stage(stage_id: &Option<String>) -> String {
    match stage_id {
        Some(id) => format!(" at '{}'", id),
        None => " for workflow input".to_string(),
    }
}

impl WorkflowError {
    pub fn validation(stage_id: impl Into<String>, source: ValidationError) -> Self {
        WorkflowError::Validation {
            stage_id: Some(stage_id.into()),
            source,
        }
    }

    pub fn step(stage_id: impl Into<String>, message: impl Into<String>) -> Self {
        WorkflowError::StepExecution {
            stage_id: stage_id.into(),
            message: message.into(),
        }
    }

    /// The stage the error is attributed to, if any.
    pub fn stage_id(&self) -> Option<&str> {
        match self {
            WorkflowError::Validation { stage_id, .. } => stage_id.as_deref(),
            WorkflowError::StepExecution { stage_id, .. }
            | WorkflowError::NoRouteMatched { stage_id } => Some(stage_id),
            _ => None,
        }
    }

    /// Stable, machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::Validation { .. } => "validation_error",
            WorkflowError::StepExecution { .. } => "step_execution_error",
            WorkflowError::NoRouteMatched { .. } => "no_route_matched",
            WorkflowError::RunAlreadyTerminated { .. } => "run_already_terminated",
            WorkflowError::RunInProgress { .. } => "run_in_progress",
            WorkflowError::UnknownRun { .. } => "unknown_run",
            WorkflowError::Cancelled { .. } => "cancelled",
            WorkflowError::Commit(_) => "invalid_workflow",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<WorkflowError> for ServerError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::UnknownRun { .. } => ServerError::NotFound(err.to_string()),
            WorkflowError::RunAlreadyTerminated { .. } | WorkflowError::RunInProgress { .. } => {
                ServerError::Conflict(err.to_string())
            }
            // Input and run failures surface as 500 with the message, matching
            // the workflow routes' contract.
            other => ServerError::Internal(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// axum integration (opt-in via feature flag)
// ---------------------------------------------------------------------------

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let (status, message) = match &self {
            ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ServerError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ServerError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_stage() {
        let err = WorkflowError::validation(
            "classify-step",
            ValidationError::MissingField {
                path: "$.intent".to_string(),
            },
        );
        assert_eq!(
            err.to_string(),
            "Validation failed at 'classify-step': $.intent: missing required field"
        );

        let input = WorkflowError::Validation {
            stage_id: None,
            source: ValidationError::MissingField {
                path: "$.input".to_string(),
            },
        };
        assert!(input.to_string().contains("for workflow input"));
    }

    #[test]
    fn test_server_error_mapping() {
        let not_found: ServerError = WorkflowError::UnknownRun {
            run_id: "r1".to_string(),
        }
        .into();
        assert!(matches!(not_found, ServerError::NotFound(_)));

        let conflict: ServerError = WorkflowError::RunAlreadyTerminated {
            run_id: "r1".to_string(),
            status: RunStatus::Success,
        }
        .into();
        assert!(matches!(conflict, ServerError::Conflict(_)));

        let internal: ServerError = WorkflowError::step("s", "boom").into();
        assert!(matches!(internal, ServerError::Internal(msg) if msg.contains("boom")));
    }
}
