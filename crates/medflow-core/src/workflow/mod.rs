//! Workflow engine — typed, step-based orchestration.
//!
//! Workflows are built in code from schema-typed steps, sealed once with
//! `commit`, and then executed any number of times by a `RunEngine`.
//!
//! # Architecture
//!
//! ```text
//! Step ─┐
//! map ──┼─► WorkflowBuilder ──commit──► Workflow ──► RunEngine ──► RunResult
//! Branch┘                                              │
//!                                                      ├─ runs: run_id → Run
//!                                                      └─ StreamSink (optional)
//! ```
//!
//! A step may suspend instead of completing. The run is parked and its id
//! doubles as the resume token.

pub mod definition;
pub mod executor;
pub mod run;
pub mod schema;
pub mod stage;
pub mod step;
pub mod stream;

pub use definition::{create_workflow, Workflow, WorkflowBuilder};
pub use executor::RunEngine;
pub use run::{Run, RunFailure, RunResult, RunStatus, SuspendState};
pub use schema::{validate, Field, ObjectSchema, Schema, ValidationError};
pub use stage::{Branch, BranchArm, BranchStage, MapStage, Stage};
pub use step::{Step, StepContext, StepFailure, StepHandler, StepOutcome, SuspendSignal};
pub use stream::{ChannelSink, StreamChunk, StreamSink};
