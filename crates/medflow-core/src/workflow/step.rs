//! Steps — the atomic, schema-typed unit of a workflow.
//!
//! A step pairs an input and output schema with a `StepHandler`. Handlers
//! return either a completed value or a `SuspendSignal`; anything that goes
//! wrong inside them is reported as a `StepFailure`, which the step turns
//! into `WorkflowError::StepExecution` carrying its own id.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agents::AgentError;
use crate::error::WorkflowError;
use crate::workflow::schema::{validate, Schema, ValidationError};
use crate::workflow::stream::SinkHandle;

/// Returned by a step instead of a value when it needs external input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspendSignal {
    /// Describes what the caller has to provide.
    pub payload: Value,
    /// Shape the resume input must have.
    pub resume_schema: Schema,
}

impl SuspendSignal {
    pub fn new(payload: Value, resume_schema: Schema) -> Self {
        Self {
            payload,
            resume_schema,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Completed(Value),
    Suspended(SuspendSignal),
}

/// Error raised inside a step handler or map transform.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct StepFailure(String);

impl StepFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<AgentError> for StepFailure {
    fn from(err: AgentError) -> Self {
        StepFailure(format!("agent error: {}", err))
    }
}

impl From<ValidationError> for StepFailure {
    fn from(err: ValidationError) -> Self {
        StepFailure(format!("invalid data: {}", err))
    }
}

impl From<serde_json::Error> for StepFailure {
    fn from(err: serde_json::Error) -> Self {
        StepFailure(format!("serialization error: {}", err))
    }
}

/// What a running step can see of its run.
#[derive(Clone)]
pub struct StepContext {
    run_id: String,
    workflow_id: String,
    stage_id: String,
    resume_data: Option<Value>,
    sink: SinkHandle,
}

impl StepContext {
    pub(crate) fn new(
        run_id: &str,
        workflow_id: &str,
        stage_id: &str,
        resume_data: Option<Value>,
        sink: SinkHandle,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            workflow_id: workflow_id.to_string(),
            stage_id: stage_id.to_string(),
            resume_data,
            sink,
        }
    }

    /// A context outside any run, for driving a step directly.
    pub fn detached(stage_id: &str) -> Self {
        Self::new("detached", "detached", stage_id, None, SinkHandle::none())
    }

    /// Same run, different stage (used for branch arms).
    pub(crate) fn for_stage(&self, stage_id: &str, resume_data: Option<Value>) -> Self {
        Self {
            stage_id: stage_id.to_string(),
            resume_data,
            ..self.clone()
        }
    }

    pub fn with_resume_data(mut self, data: Value) -> Self {
        self.resume_data = Some(data);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn stage_id(&self) -> &str {
        &self.stage_id
    }

    /// The resume input, present only when re-entered after a suspension.
    pub fn resume_data(&self) -> Option<&Value> {
        self.resume_data.as_ref()
    }

    pub fn is_streaming(&self) -> bool {
        self.sink.is_streaming()
    }

    /// Push incremental text to the run's stream, if one is attached.
    pub fn emit(&self, text: impl Into<String>) {
        self.sink.emit(&self.stage_id, text.into());
    }
}

#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn execute(&self, input: Value, ctx: &StepContext) -> Result<StepOutcome, StepFailure>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> StepHandler for FnHandler<F>
where
    F: Fn(Value, StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutcome, StepFailure>> + Send,
{
    async fn execute(&self, input: Value, ctx: &StepContext) -> Result<StepOutcome, StepFailure> {
        (self.0)(input, ctx.clone()).await
    }
}

/// A named, schema-typed unit of work. Cheap to share via `Arc`.
#[derive(Clone)]
pub struct Step {
    id: String,
    description: Option<String>,
    input_schema: Schema,
    output_schema: Schema,
    handler: Arc<dyn StepHandler>,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("input_schema", &self.input_schema)
            .field("output_schema", &self.output_schema)
            .finish_non_exhaustive()
    }
}

impl Step {
    pub fn new(
        id: impl Into<String>,
        input_schema: Schema,
        output_schema: Schema,
        handler: impl StepHandler + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            description: None,
            input_schema,
            output_schema,
            handler: Arc::new(handler),
        }
    }

    /// Build a step from an async closure.
    pub fn from_fn<F, Fut>(
        id: impl Into<String>,
        input_schema: Schema,
        output_schema: Schema,
        f: F,
    ) -> Self
    where
        F: Fn(Value, StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StepOutcome, StepFailure>> + Send + 'static,
    {
        Self::new(id, input_schema, output_schema, FnHandler(f))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn input_schema(&self) -> &Schema {
        &self.input_schema
    }

    pub fn output_schema(&self) -> &Schema {
        &self.output_schema
    }

    /// Validate the input, execute, and validate a completed output.
    pub async fn run(&self, input: Value, ctx: &StepContext) -> Result<StepOutcome, WorkflowError> {
        let input = validate(&self.input_schema, input)
            .map_err(|e| WorkflowError::validation(&self.id, e))?;

        let outcome = self
            .handler
            .execute(input, ctx)
            .await
            .map_err(|e| WorkflowError::step(&self.id, e.message()))?;

        match outcome {
            StepOutcome::Completed(output) => validate(&self.output_schema, output)
                .map(StepOutcome::Completed)
                .map_err(|e| WorkflowError::validation(&self.id, e)),
            suspended @ StepOutcome::Suspended(_) => Ok(suspended),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_schema(field: &str) -> Schema {
        Schema::object().field(field, Schema::String).build()
    }

    #[tokio::test]
    async fn test_step_runs_closure() {
        let step = Step::from_fn("upper", text_schema("input"), text_schema("output"), |input, _ctx| async move {
            let text = input["input"].as_str().unwrap_or_default().to_uppercase();
            Ok(StepOutcome::Completed(json!({ "output": text })))
        });

        let outcome = step
            .run(json!({ "input": "aspirin" }), &StepContext::detached("upper"))
            .await
            .unwrap();
        assert_eq!(outcome, StepOutcome::Completed(json!({ "output": "ASPIRIN" })));
    }

    #[tokio::test]
    async fn test_invalid_output_is_a_validation_error() {
        let step = Step::from_fn("bad", text_schema("input"), text_schema("output"), |_input, _ctx| async move {
            Ok(StepOutcome::Completed(json!({ "output": 7 })))
        });

        let err = step
            .run(json!({ "input": "x" }), &StepContext::detached("bad"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation { stage_id: Some(ref id), .. } if id == "bad"));
    }

    #[tokio::test]
    async fn test_handler_failure_carries_stage_id() {
        let step = Step::from_fn("lookup", text_schema("input"), text_schema("output"), |_input, _ctx| async move {
            Err(StepFailure::new("upstream timed out"))
        });

        let err = step
            .run(json!({ "input": "x" }), &StepContext::detached("lookup"))
            .await
            .unwrap_err();
        match err {
            WorkflowError::StepExecution { stage_id, message } => {
                assert_eq!(stage_id, "lookup");
                assert_eq!(message, "upstream timed out");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_suspension_skips_output_validation() {
        let step = Step::from_fn("confirm", text_schema("input"), text_schema("output"), |_input, ctx| async move {
            match ctx.resume_data() {
                Some(data) => Ok(StepOutcome::Completed(json!({ "output": data["answer"] }))),
                None => Ok(StepOutcome::Suspended(SuspendSignal::new(
                    json!({ "question": "Confirm?" }),
                    text_schema("answer"),
                ))),
            }
        });

        let first = step
            .run(json!({ "input": "x" }), &StepContext::detached("confirm"))
            .await
            .unwrap();
        assert!(matches!(first, StepOutcome::Suspended(_)));

        let ctx = StepContext::detached("confirm").with_resume_data(json!({ "answer": "yes" }));
        let second = step.run(json!({ "input": "x" }), &ctx).await.unwrap();
        assert_eq!(second, StepOutcome::Completed(json!({ "output": "yes" })));
    }
}
