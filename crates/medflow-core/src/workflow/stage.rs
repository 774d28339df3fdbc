//! The three kinds of stage a workflow pipeline is made of.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::WorkflowError;
use crate::workflow::schema::{validate, Schema};
use crate::workflow::step::{Step, StepFailure};

pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

pub type MapFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, StepFailure>> + Send + Sync>;

// ─── Map ───────────────────────────────────────────────────────────────────

/// Reshapes the previous stage's output into the next stage's input.
///
/// A map has no schema of its own. `expects` is filled in at commit time with
/// the input contract of whatever follows it, so a bad transform is caught
/// here and reported under the map's id rather than the next step's.
#[derive(Clone)]
pub struct MapStage {
    pub(crate) id: String,
    pub(crate) transform: MapFn,
    pub(crate) expects: Option<Schema>,
}

impl MapStage {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn expects(&self) -> Option<&Schema> {
        self.expects.as_ref()
    }

    pub(crate) async fn apply(&self, input: Value) -> Result<Value, WorkflowError> {
        let output = (self.transform)(input)
            .await
            .map_err(|e| WorkflowError::step(&self.id, e.message()))?;
        match &self.expects {
            Some(schema) => validate(schema, output).map_err(|e| WorkflowError::validation(&self.id, e)),
            None => Ok(output),
        }
    }
}

// ─── Branch ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct BranchArm {
    predicate: Predicate,
    step: Arc<Step>,
}

impl BranchArm {
    pub fn new(predicate: impl Fn(&Value) -> bool + Send + Sync + 'static, step: impl Into<Arc<Step>>) -> Self {
        Self {
            predicate: Arc::new(predicate),
            step: step.into(),
        }
    }

    pub fn step(&self) -> &Arc<Step> {
        &self.step
    }

    pub fn matches(&self, input: &Value) -> bool {
        (self.predicate)(input)
    }
}

/// Builder for a fan-out stage. Every arm whose predicate holds runs.
#[derive(Clone, Default)]
pub struct Branch {
    id: Option<String>,
    arms: Vec<BranchArm>,
    input_schema: Option<Schema>,
    allow_empty: bool,
    deadline: Option<Duration>,
}

impl Branch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(
        mut self,
        predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
        step: impl Into<Arc<Step>>,
    ) -> Self {
        self.arms.push(BranchArm::new(predicate, step));
        self
    }

    pub fn named(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Validate the incoming value before any predicate sees it.
    pub fn input_schema(mut self, schema: Schema) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Let zero matches produce `{}` instead of failing the run.
    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }

    /// Upper bound on how long each matched arm may run. An arm that overruns
    /// fails the run with a step error naming that arm.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub(crate) fn explicit_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub(crate) fn declared_input(&self) -> Option<&Schema> {
        self.input_schema.as_ref()
    }

    pub(crate) fn compile(self, id: String) -> BranchStage {
        BranchStage {
            id,
            arms: self.arms,
            input_schema: self.input_schema,
            allow_empty: self.allow_empty,
            deadline: self.deadline,
        }
    }
}

#[derive(Clone)]
pub struct BranchStage {
    id: String,
    arms: Vec<BranchArm>,
    input_schema: Option<Schema>,
    allow_empty: bool,
    deadline: Option<Duration>,
}

impl BranchStage {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn arms(&self) -> &[BranchArm] {
        &self.arms
    }

    pub fn input_schema(&self) -> Option<&Schema> {
        self.input_schema.as_ref()
    }

    pub fn allows_empty(&self) -> bool {
        self.allow_empty
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Arms whose predicate holds for `input`, in declaration order.
    pub fn evaluate(&self, input: &Value) -> Vec<&BranchArm> {
        self.arms.iter().filter(|arm| arm.matches(input)).collect()
    }

    /// Output shape: one optional field per arm, keyed by step id.
    pub fn output_schema(&self) -> Schema {
        self.arms
            .iter()
            .fold(Schema::object(), |obj, arm| {
                obj.optional(arm.step.id(), arm.step.output_schema().clone())
            })
            .build()
    }
}

// ─── Stage ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum Stage {
    Step(Arc<Step>),
    Map(MapStage),
    Branch(BranchStage),
}

impl Stage {
    pub fn id(&self) -> &str {
        match self {
            Stage::Step(step) => step.id(),
            Stage::Map(map) => map.id(),
            Stage::Branch(branch) => branch.id(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Stage::Step(_) => "step",
            Stage::Map(_) => "map",
            Stage::Branch(_) => "branch",
        }
    }

    /// Contract the incoming value must satisfy, when one is known.
    pub fn input_contract(&self) -> Option<&Schema> {
        match self {
            Stage::Step(step) => Some(step.input_schema()),
            Stage::Map(_) => None,
            Stage::Branch(branch) => branch.input_schema(),
        }
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.kind(), self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::step::StepOutcome;
    use serde_json::json;

    fn echo(id: &str) -> Step {
        Step::from_fn(id, Schema::Any, Schema::Any, |input, _ctx| async move {
            Ok(StepOutcome::Completed(input))
        })
    }

    #[test]
    fn test_evaluate_keeps_declaration_order() {
        let branch = Branch::new()
            .arm(|v| v["n"].as_i64() == Some(1), echo("one"))
            .arm(|_| false, echo("never"))
            .arm(|v| v["n"].as_i64().unwrap_or(0) > 0, echo("positive"))
            .compile("branch-0".to_string());

        let matched: Vec<&str> = branch
            .evaluate(&json!({ "n": 1 }))
            .iter()
            .map(|arm| arm.step().id())
            .collect();
        assert_eq!(matched, vec!["one", "positive"]);
        assert!(branch.evaluate(&json!({ "n": -1 })).is_empty());
    }

    #[tokio::test]
    async fn test_map_violation_is_attributed_to_map() {
        let map = MapStage {
            id: "shape".to_string(),
            transform: Arc::new(|_v| Box::pin(async { Ok(json!({ "wrong": true })) })),
            expects: Some(Schema::object().field("prompt", Schema::String).build()),
        };

        let err = map.apply(json!({})).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Validation { stage_id: Some(ref id), .. } if id == "shape"));
    }
}
