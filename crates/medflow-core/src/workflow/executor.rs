//! Run engine — executes compiled workflows and keeps track of their runs.
//!
//! The engine walks a workflow's stages strictly in order. Every edge is
//! validated: a step checks its own input and output, a map checks its result
//! against whatever comes next, a branch checks its declared input. A step may
//! return a suspension instead of a value; the run is then parked in the
//! in-memory arena until `resume` supplies the requested input.
//!
//! Finished runs are compacted to their outcome and only the most recent
//! `retained_runs` of them are kept. Nothing survives a restart.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{watch, RwLock};

use crate::error::WorkflowError;
use crate::workflow::definition::Workflow;
use crate::workflow::run::{Run, RunFailure, RunResult, RunStatus, SuspendState};
use crate::workflow::schema::validate;
use crate::workflow::stage::{BranchStage, Stage};
use crate::workflow::step::{StepContext, StepOutcome, SuspendSignal};
use crate::workflow::stream::{SinkHandle, StreamSink};

/// Finished runs kept for `run`, `resume` and `cancel` lookups.
pub const DEFAULT_RETAINED_RUNS: usize = 256;

struct RunEntry {
    run: Run,
    /// Dropped once the run can no longer resume.
    workflow: Option<Workflow>,
    cancel: watch::Sender<bool>,
}

#[derive(Default)]
struct Arena {
    runs: HashMap<String, RunEntry>,
    /// Terminal run ids, oldest first.
    finished: VecDeque<String>,
}

impl Arena {
    /// Compact a run that just reached a terminal state and evict the oldest
    /// finished runs beyond `limit`.
    fn retire(&mut self, run_id: &str, limit: usize) {
        let Some(entry) = self.runs.get_mut(run_id) else {
            return;
        };
        entry.workflow = None;
        entry.run.context.clear();
        entry.run.suspend = None;
        self.finished.push_back(run_id.to_string());

        while self.finished.len() > limit {
            if let Some(evicted) = self.finished.pop_front() {
                self.runs.remove(&evicted);
                tracing::debug!("[RunEngine] Evicted finished run {}", evicted);
            }
        }
    }
}

/// Where a resumed run re-enters its suspended stage.
struct ResumePoint {
    step_id: String,
    data: Value,
    completed_arms: Map<String, Value>,
}

enum StageOutcome {
    Completed(Value),
    Suspended {
        step_id: String,
        signal: SuspendSignal,
        completed_arms: Map<String, Value>,
    },
}

#[derive(Clone)]
pub struct RunEngine {
    arena: Arc<RwLock<Arena>>,
    branch_deadline: Option<Duration>,
    retained_runs: usize,
}

impl Default for RunEngine {
    fn default() -> Self {
        Self {
            arena: Arc::default(),
            branch_deadline: None,
            retained_runs: DEFAULT_RETAINED_RUNS,
        }
    }
}

impl RunEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every branch arm that doesn't have its own deadline.
    pub fn with_branch_deadline(mut self, deadline: Duration) -> Self {
        self.branch_deadline = Some(deadline);
        self
    }

    /// How many finished runs stay queryable before the oldest are forgotten.
    pub fn with_retained_runs(mut self, retained: usize) -> Self {
        self.retained_runs = retained;
        self
    }

    // ─── Public operations ─────────────────────────────────────────────────

    /// Start a fresh run. Input that fails the workflow's input schema is
    /// rejected before any run is created.
    pub async fn start(&self, workflow: &Workflow, input: Value) -> Result<RunResult, WorkflowError> {
        self.start_with(workflow, input, SinkHandle::none()).await
    }

    /// Like `start`, pushing incremental output to `sink`. The sink is closed
    /// exactly once before this returns, whatever the outcome.
    pub async fn start_streaming(
        &self,
        workflow: &Workflow,
        input: Value,
        sink: Arc<dyn StreamSink>,
    ) -> Result<RunResult, WorkflowError> {
        let handle = SinkHandle::new(sink);
        let result = self.start_with(workflow, input, handle.clone()).await;
        handle.close();
        result
    }

    /// Continue a suspended run with the input it asked for.
    pub async fn resume(&self, run_id: &str, resume_input: Value) -> Result<RunResult, WorkflowError> {
        self.resume_with(run_id, resume_input, SinkHandle::none()).await
    }

    pub async fn resume_streaming(
        &self,
        run_id: &str,
        resume_input: Value,
        sink: Arc<dyn StreamSink>,
    ) -> Result<RunResult, WorkflowError> {
        let handle = SinkHandle::new(sink);
        let result = self.resume_with(run_id, resume_input, handle.clone()).await;
        handle.close();
        result
    }

    /// Snapshot of a run.
    pub async fn run(&self, run_id: &str) -> Result<Run, WorkflowError> {
        let arena = self.arena.read().await;
        arena
            .runs
            .get(run_id)
            .map(|entry| entry.run.clone())
            .ok_or_else(|| WorkflowError::UnknownRun {
                run_id: run_id.to_string(),
            })
    }

    /// Cancel a run. A suspended run fails immediately. A running one is
    /// interrupted in its current stage and fails as soon as its driver
    /// observes the signal; the returned snapshot may still say `running`.
    pub async fn cancel(&self, run_id: &str) -> Result<Run, WorkflowError> {
        let mut arena = self.arena.write().await;
        let entry = arena.runs.get_mut(run_id).ok_or_else(|| WorkflowError::UnknownRun {
            run_id: run_id.to_string(),
        })?;

        match entry.run.status {
            status if status.is_terminal() => Err(WorkflowError::RunAlreadyTerminated {
                run_id: run_id.to_string(),
                status,
            }),
            RunStatus::Suspended => {
                let stage_id = entry.run.suspend.take().map(|s| s.stage_id);
                entry.run.status = RunStatus::Failed;
                entry.run.failure = Some(RunFailure {
                    stage_id,
                    error: WorkflowError::Cancelled {
                        run_id: run_id.to_string(),
                    },
                });
                entry.run.touch();
                let snapshot = entry.run.clone();
                arena.retire(run_id, self.retained_runs);
                tracing::info!("[RunEngine] Run {} cancelled while suspended", run_id);
                Ok(snapshot)
            }
            _ => {
                entry.cancel.send_replace(true);
                tracing::info!("[RunEngine] Cancellation requested for run {}", run_id);
                Ok(entry.run.clone())
            }
        }
    }

    // ─── Internals ─────────────────────────────────────────────────────────

    async fn start_with(
        &self,
        workflow: &Workflow,
        input: Value,
        sink: SinkHandle,
    ) -> Result<RunResult, WorkflowError> {
        let input = validate(workflow.input_schema(), input).map_err(|source| WorkflowError::Validation {
            stage_id: None,
            source,
        })?;

        let run = Run::new(workflow.id());
        let run_id = run.run_id.clone();
        let (cancel, cancelled) = watch::channel(false);
        {
            let mut arena = self.arena.write().await;
            arena.runs.insert(
                run_id.clone(),
                RunEntry {
                    run,
                    workflow: Some(workflow.clone()),
                    cancel,
                },
            );
        }

        tracing::info!("[RunEngine] Run {} started for workflow '{}'", run_id, workflow.id());
        Ok(self.drive(&run_id, workflow, 0, input, None, cancelled, &sink).await)
    }

    async fn resume_with(
        &self,
        run_id: &str,
        resume_input: Value,
        sink: SinkHandle,
    ) -> Result<RunResult, WorkflowError> {
        // Checked and flipped to `Running` under one write lock, so two
        // concurrent resumes cannot both get through.
        let (workflow, index, suspend, resume_data, cancelled) = {
            let mut arena = self.arena.write().await;
            let entry = arena.runs.get_mut(run_id).ok_or_else(|| WorkflowError::UnknownRun {
                run_id: run_id.to_string(),
            })?;

            match entry.run.status {
                RunStatus::Suspended => {}
                RunStatus::Running => {
                    return Err(WorkflowError::RunInProgress {
                        run_id: run_id.to_string(),
                    })
                }
                status => {
                    return Err(WorkflowError::RunAlreadyTerminated {
                        run_id: run_id.to_string(),
                        status,
                    })
                }
            }

            let (Some(workflow), Some(suspend)) = (entry.workflow.clone(), entry.run.suspend.take()) else {
                return Err(WorkflowError::step(run_id, "suspended run has no resume point"));
            };
            let resume_data = match validate(&suspend.resume_schema, resume_input) {
                Ok(data) => data,
                Err(e) => {
                    // Stays suspended; the caller may try again.
                    let error = WorkflowError::validation(&suspend.stage_id, e);
                    entry.run.suspend = Some(suspend);
                    return Err(error);
                }
            };

            entry.run.status = RunStatus::Running;
            entry.run.touch();
            (
                workflow,
                entry.run.current_stage_index,
                suspend,
                resume_data,
                entry.cancel.subscribe(),
            )
        };

        tracing::info!(
            "[RunEngine] Resuming run {} at stage '{}'",
            run_id,
            suspend.stage_id
        );

        let point = ResumePoint {
            step_id: suspend.step_id,
            data: resume_data,
            completed_arms: suspend.completed_arms,
        };
        Ok(self
            .drive(run_id, &workflow, index, suspend.input, Some(point), cancelled, &sink)
            .await)
    }

    /// Walk stages from `index` until the pipeline ends, a stage suspends, or
    /// something fails. Never leaves the run in `Running`.
    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        run_id: &str,
        workflow: &Workflow,
        mut index: usize,
        mut value: Value,
        mut resume: Option<ResumePoint>,
        cancelled: watch::Receiver<bool>,
        sink: &SinkHandle,
    ) -> RunResult {
        let stages = workflow.stages();

        while let Some(stage) = stages.get(index) {
            if *cancelled.borrow() {
                return self.fail_cancelled(run_id, stage.id()).await;
            }

            tracing::debug!(
                "[RunEngine] Run {} entering {} '{}' ({}/{})",
                run_id,
                stage.kind(),
                stage.id(),
                index + 1,
                stages.len()
            );

            let ctx = StepContext::new(run_id, workflow.id(), stage.id(), None, sink.clone());
            let work = async {
                match stage {
                    Stage::Step(step) => {
                        let ctx = match resume.take() {
                            Some(point) => ctx.with_resume_data(point.data),
                            None => ctx,
                        };
                        step.run(value.clone(), &ctx).await.map(|outcome| match outcome {
                            StepOutcome::Completed(output) => StageOutcome::Completed(output),
                            StepOutcome::Suspended(signal) => StageOutcome::Suspended {
                                step_id: step.id().to_string(),
                                signal,
                                completed_arms: Map::new(),
                            },
                        })
                    }
                    Stage::Map(map) => map.apply(value.clone()).await.map(StageOutcome::Completed),
                    Stage::Branch(branch) => self.run_branch(branch, value.clone(), &ctx, resume.take()).await,
                }
            };

            let outcome = tokio::select! {
                outcome = work => outcome,
                _ = cancellation(cancelled.clone()) => {
                    return self.fail_cancelled(run_id, stage.id()).await;
                }
            };

            match outcome {
                Ok(StageOutcome::Completed(output)) => {
                    self.record(run_id, stage.id(), index + 1, &output).await;
                    value = output;
                    index += 1;
                }
                Ok(StageOutcome::Suspended {
                    step_id,
                    signal,
                    completed_arms,
                }) => {
                    if *cancelled.borrow() {
                        return self.fail_cancelled(run_id, stage.id()).await;
                    }
                    let state = SuspendState {
                        stage_id: stage.id().to_string(),
                        step_id,
                        payload: signal.payload,
                        resume_schema: signal.resume_schema,
                        input: value,
                        completed_arms,
                    };
                    return self.suspend(run_id, state).await;
                }
                Err(error) => {
                    let stage_id = error.stage_id().unwrap_or(stage.id()).to_string();
                    return self.fail(run_id, Some(stage_id), error).await;
                }
            }
        }

        let last = stages.last().map(|s| s.id().to_string());
        if *cancelled.borrow() {
            let error = WorkflowError::Cancelled {
                run_id: run_id.to_string(),
            };
            return self.fail(run_id, last, error).await;
        }

        match validate(workflow.output_schema(), value) {
            Ok(output) => self.succeed(run_id, output).await,
            Err(source) => {
                let error = WorkflowError::Validation {
                    stage_id: last.clone(),
                    source,
                };
                self.fail(run_id, last, error).await
            }
        }
    }

    /// Run every matched arm concurrently with the same input.
    async fn run_branch(
        &self,
        branch: &BranchStage,
        input: Value,
        ctx: &StepContext,
        resume: Option<ResumePoint>,
    ) -> Result<StageOutcome, WorkflowError> {
        let input = match branch.input_schema() {
            Some(schema) => validate(schema, input).map_err(|e| WorkflowError::validation(branch.id(), e))?,
            None => input,
        };

        let matched = branch.evaluate(&input);
        if matched.is_empty() {
            if branch.allows_empty() {
                return Ok(StageOutcome::Completed(Value::Object(Map::new())));
            }
            return Err(WorkflowError::NoRouteMatched {
                stage_id: branch.id().to_string(),
            });
        }

        let (mut outputs, resume_for) = match resume {
            Some(point) => (point.completed_arms, Some((point.step_id, point.data))),
            None => (Map::new(), None),
        };

        let deadline = branch.deadline().or(self.branch_deadline);
        let pending: Vec<_> = matched
            .into_iter()
            .filter(|arm| !outputs.contains_key(arm.step().id()))
            .map(|arm| {
                let step = arm.step().clone();
                let data = match &resume_for {
                    Some((step_id, data)) if step_id == step.id() => Some(data.clone()),
                    _ => None,
                };
                let arm_ctx = ctx.for_stage(step.id(), data);
                let input = input.clone();
                async move {
                    let run = step.run(input, &arm_ctx);
                    let result = match deadline {
                        Some(limit) => match tokio::time::timeout(limit, run).await {
                            Ok(result) => result,
                            Err(_) => Err(WorkflowError::step(
                                step.id(),
                                format!("timed out after {:?}", limit),
                            )),
                        },
                        None => run.await,
                    };
                    (step.id().to_string(), result)
                }
            })
            .collect();

        tracing::debug!(
            "[RunEngine] Branch '{}' running {} arm(s), {} already complete",
            branch.id(),
            pending.len(),
            outputs.len()
        );

        let mut suspended = None;
        for (step_id, result) in futures::future::join_all(pending).await {
            match result? {
                StepOutcome::Completed(output) => {
                    outputs.insert(step_id, output);
                }
                StepOutcome::Suspended(signal) => {
                    if suspended.is_none() {
                        suspended = Some((step_id, signal));
                    }
                }
            }
        }

        Ok(match suspended {
            Some((step_id, signal)) => StageOutcome::Suspended {
                step_id,
                signal,
                completed_arms: outputs,
            },
            None => StageOutcome::Completed(Value::Object(outputs)),
        })
    }

    async fn fail_cancelled(&self, run_id: &str, stage_id: &str) -> RunResult {
        let error = WorkflowError::Cancelled {
            run_id: run_id.to_string(),
        };
        self.fail(run_id, Some(stage_id.to_string()), error).await
    }

    async fn record(&self, run_id: &str, stage_id: &str, next_index: usize, output: &Value) {
        let mut arena = self.arena.write().await;
        if let Some(entry) = arena.runs.get_mut(run_id) {
            entry.run.context.insert(stage_id.to_string(), output.clone());
            entry.run.current_stage_index = next_index;
            entry.run.touch();
        }
    }

    async fn suspend(&self, run_id: &str, state: SuspendState) -> RunResult {
        let result = RunResult::Suspended {
            run_id: run_id.to_string(),
            resume_token: run_id.to_string(),
            stage_id: state.stage_id.clone(),
            payload: state.payload.clone(),
        };

        let mut arena = self.arena.write().await;
        if let Some(entry) = arena.runs.get_mut(run_id) {
            entry.run.status = RunStatus::Suspended;
            entry.run.suspend = Some(state);
            entry.run.touch();
        }
        tracing::info!("[RunEngine] Run {} suspended", run_id);
        result
    }

    async fn succeed(&self, run_id: &str, output: Value) -> RunResult {
        let mut arena = self.arena.write().await;
        if let Some(entry) = arena.runs.get_mut(run_id) {
            entry.run.status = RunStatus::Success;
            entry.run.output = Some(output.clone());
            entry.run.touch();
            arena.retire(run_id, self.retained_runs);
        }
        tracing::info!("[RunEngine] Run {} completed", run_id);
        RunResult::Success {
            run_id: run_id.to_string(),
            output,
        }
    }

    async fn fail(&self, run_id: &str, stage_id: Option<String>, error: WorkflowError) -> RunResult {
        let mut arena = self.arena.write().await;
        if let Some(entry) = arena.runs.get_mut(run_id) {
            entry.run.status = RunStatus::Failed;
            entry.run.failure = Some(RunFailure {
                stage_id: stage_id.clone(),
                error: error.clone(),
            });
            entry.run.touch();
            arena.retire(run_id, self.retained_runs);
        }
        tracing::error!(
            "[RunEngine] Run {} failed at {}: {}",
            run_id,
            stage_id.as_deref().unwrap_or("<output>"),
            error
        );
        RunResult::Failed {
            run_id: run_id.to_string(),
            stage_id,
            error,
        }
    }
}

/// Resolves once `cancel` has been requested for the run. Never resolves if
/// the run's entry is gone.
async fn cancellation(mut cancelled: watch::Receiver<bool>) {
    if cancelled.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}
