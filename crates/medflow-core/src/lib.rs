//! MedFlow Core — transport-agnostic logic for the medicine assistant backend.
//!
//! This crate contains the workflow engine, the agent and tool capabilities,
//! and the concrete medicine workflows. It has **no HTTP framework
//! dependency** by default, making it suitable for use in:
//!
//! - HTTP servers (via `medflow-server`)
//! - CLI tools (via `medflow-cli`)
//!
//! # Feature Flags
//!
//! - `axum` — Enables `IntoResponse` impl on `ServerError` for use in axum handlers.

pub mod agents;
pub mod catalog;
pub mod config;
pub mod error;
pub mod state;
pub mod tools;
pub mod workflow;

// Convenience re-exports
pub use config::MedflowConfig;
pub use error::{ServerError, WorkflowError};
pub use state::{AppState, AppStateInner};
