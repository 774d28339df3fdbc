//! Workflow builder and the compiled, immutable workflow it produces.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::error::WorkflowError;
use crate::workflow::schema::Schema;
use crate::workflow::stage::{Branch, MapFn, MapStage, Stage};
use crate::workflow::step::{Step, StepFailure};

enum PendingStage {
    Step(Arc<Step>),
    Map { id: Option<String>, transform: MapFn },
    Branch(Branch),
}

/// Chains stages together; `commit` seals the pipeline.
pub struct WorkflowBuilder {
    id: String,
    description: Option<String>,
    input_schema: Schema,
    output_schema: Schema,
    stages: Vec<PendingStage>,
}

impl WorkflowBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            input_schema: Schema::Any,
            output_schema: Schema::Any,
            stages: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn input_schema(mut self, schema: Schema) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn output_schema(mut self, schema: Schema) -> Self {
        self.output_schema = schema;
        self
    }

    /// Append a step.
    pub fn then(mut self, step: impl Into<Arc<Step>>) -> Self {
        self.stages.push(PendingStage::Step(step.into()));
        self
    }

    /// Append a synchronous transform.
    pub fn map<F>(self, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.push_map(None, sync_transform(f))
    }

    pub fn map_named<F>(self, id: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.push_map(Some(id.into()), sync_transform(f))
    }

    /// Append an asynchronous, fallible transform.
    pub fn map_async<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, StepFailure>> + Send + 'static,
    {
        let transform: MapFn = Arc::new(move |v| Box::pin(f(v)));
        self.push_map(None, transform)
    }

    pub fn branch(mut self, branch: Branch) -> Self {
        self.stages.push(PendingStage::Branch(branch));
        self
    }

    fn push_map(mut self, id: Option<String>, transform: MapFn) -> Self {
        self.stages.push(PendingStage::Map { id, transform });
        self
    }

    /// Seal the pipeline.
    ///
    /// Rejects an empty pipeline, duplicate stage ids (branch arm step ids
    /// included) and adjacent schemas that cannot feed each other.
    pub fn commit(self) -> Result<Workflow, WorkflowError> {
        let workflow_id = self.id;
        if self.stages.is_empty() {
            return Err(WorkflowError::Commit(format!(
                "workflow '{}' has no stages",
                workflow_id
            )));
        }

        // Input contract of each position, used to fill in map expectations.
        let contracts: Vec<Option<Schema>> = self
            .stages
            .iter()
            .map(|stage| match stage {
                PendingStage::Step(step) => Some(step.input_schema().clone()),
                PendingStage::Map { .. } => None,
                PendingStage::Branch(branch) => branch.declared_input().cloned(),
            })
            .collect();

        let count = self.stages.len();
        let mut stages = Vec::with_capacity(count);
        for (index, pending) in self.stages.into_iter().enumerate() {
            let stage = match pending {
                PendingStage::Step(step) => Stage::Step(step),
                PendingStage::Map { id, transform } => {
                    let expects = if index + 1 == count {
                        Some(self.output_schema.clone())
                    } else {
                        contracts[index + 1].clone()
                    };
                    Stage::Map(MapStage {
                        id: id.unwrap_or_else(|| format!("map-{}", index)),
                        transform,
                        expects,
                    })
                }
                PendingStage::Branch(branch) => {
                    let id = branch
                        .explicit_id()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("branch-{}", index));
                    Stage::Branch(branch.compile(id))
                }
            };
            stages.push(stage);
        }

        check_unique_ids(&workflow_id, &stages)?;
        check_schema_edges(&workflow_id, &self.input_schema, &self.output_schema, &stages)?;

        tracing::debug!(
            "[Workflow] Committed '{}' with {} stages",
            workflow_id,
            stages.len()
        );

        Ok(Workflow {
            inner: Arc::new(WorkflowInner {
                id: workflow_id,
                description: self.description,
                input_schema: self.input_schema,
                output_schema: self.output_schema,
                stages,
            }),
        })
    }
}

fn sync_transform<F>(f: F) -> MapFn
where
    F: Fn(Value) -> Value + Send + Sync + 'static,
{
    Arc::new(move |v| {
        let out = f(v);
        Box::pin(async move { Ok(out) })
    })
}

fn check_unique_ids(workflow_id: &str, stages: &[Stage]) -> Result<(), WorkflowError> {
    let mut seen = HashSet::new();
    let mut claim = |id: &str| {
        if seen.insert(id.to_string()) {
            Ok(())
        } else {
            Err(WorkflowError::Commit(format!(
                "duplicate stage id '{}' in workflow '{}'",
                id, workflow_id
            )))
        }
    };

    for stage in stages {
        claim(stage.id())?;
        if let Stage::Branch(branch) = stage {
            for arm in branch.arms() {
                claim(arm.step().id())?;
            }
        }
    }
    Ok(())
}

fn check_schema_edges(
    workflow_id: &str,
    input: &Schema,
    output: &Schema,
    stages: &[Stage],
) -> Result<(), WorkflowError> {
    let mismatch = |from: &str, to: &str| {
        WorkflowError::Commit(format!(
            "in workflow '{}': output of '{}' does not satisfy the input of '{}'",
            workflow_id, from, to
        ))
    };

    // Schema known to flow out of the previous position, if any.
    let mut produced: Option<(&str, &Schema)> = Some(("<input>", input));

    for stage in stages {
        match stage {
            Stage::Step(step) => {
                if let Some((from, schema)) = produced {
                    if !step.input_schema().accepts(schema) {
                        return Err(mismatch(from, step.id()));
                    }
                }
                produced = Some((step.id(), step.output_schema()));
            }
            Stage::Map(_) => produced = None,
            Stage::Branch(branch) => {
                let incoming = branch
                    .input_schema()
                    .map(|schema| (branch.id(), schema))
                    .or(produced);
                if let Some((from, schema)) = incoming {
                    for arm in branch.arms() {
                        if !arm.step().input_schema().accepts(schema) {
                            return Err(mismatch(from, arm.step().id()));
                        }
                    }
                }
                produced = None;
            }
        }
    }

    if let (Some((from, schema)), Some(Stage::Step(_))) = (produced, stages.last()) {
        if !output.accepts(schema) {
            return Err(mismatch(from, "<output>"));
        }
    }
    Ok(())
}

struct WorkflowInner {
    id: String,
    description: Option<String>,
    input_schema: Schema,
    output_schema: Schema,
    stages: Vec<Stage>,
}

/// A committed workflow. Cloning shares the stages; there is no per-run state.
#[derive(Clone)]
pub struct Workflow {
    inner: Arc<WorkflowInner>,
}

impl Workflow {
    pub fn builder(id: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder::new(id)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn description(&self) -> Option<&str> {
        self.inner.description.as_deref()
    }

    pub fn input_schema(&self) -> &Schema {
        &self.inner.input_schema
    }

    pub fn output_schema(&self) -> &Schema {
        &self.inner.output_schema
    }

    pub fn stages(&self) -> &[Stage] {
        &self.inner.stages
    }

    pub fn stage_ids(&self) -> Vec<&str> {
        self.inner.stages.iter().map(Stage::id).collect()
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.inner.id)
            .field("stages", &self.inner.stages)
            .finish()
    }
}

/// Shorthand for `Workflow::builder`.
pub fn create_workflow(id: impl Into<String>) -> WorkflowBuilder {
    WorkflowBuilder::new(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::step::StepOutcome;
    use serde_json::json;

    fn text(field: &str) -> Schema {
        Schema::object().field(field, Schema::String).build()
    }

    fn step(id: &str, input: Schema, output: Schema) -> Step {
        Step::from_fn(id, input, output, |_input, _ctx| async move {
            Ok(StepOutcome::Completed(json!({})))
        })
    }

    #[test]
    fn test_commit_rejects_empty_pipeline() {
        let err = create_workflow("empty").commit().unwrap_err();
        assert!(matches!(err, WorkflowError::Commit(msg) if msg.contains("no stages")));
    }

    #[test]
    fn test_commit_rejects_duplicate_ids() {
        let err = create_workflow("dup")
            .then(step("a", Schema::Any, Schema::Any))
            .branch(Branch::new().arm(|_| true, step("a", Schema::Any, Schema::Any)))
            .commit()
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Commit(msg) if msg.contains("duplicate stage id 'a'")));
    }

    #[test]
    fn test_commit_rejects_incompatible_steps() {
        let err = create_workflow("mismatch")
            .input_schema(text("input"))
            .then(step("first", text("input"), text("intent")))
            .then(step("second", text("prompt"), Schema::Any))
            .commit()
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Commit(msg) if msg.contains("'first'")));

        let err = create_workflow("bad-input")
            .input_schema(text("query"))
            .then(step("only", text("input"), Schema::Any))
            .commit()
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Commit(msg) if msg.contains("<input>")));
    }

    #[test]
    fn test_default_ids_and_map_expectations() {
        let workflow = create_workflow("ids")
            .input_schema(text("input"))
            .then(step("classify", text("input"), text("intent")))
            .map(|v| v)
            .then(step("answer", text("prompt"), text("output")))
            .map(|v| v)
            .output_schema(text("output"))
            .commit()
            .unwrap();

        assert_eq!(workflow.stage_ids(), vec!["classify", "map-1", "answer", "map-3"]);
        match &workflow.stages()[1] {
            Stage::Map(map) => assert_eq!(map.expects(), Some(&text("prompt"))),
            other => panic!("expected map, got {other:?}"),
        }
        match &workflow.stages()[3] {
            Stage::Map(map) => assert_eq!(map.expects(), Some(&text("output"))),
            other => panic!("expected map, got {other:?}"),
        }
    }
}
