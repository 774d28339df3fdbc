//! Shared application state for the axum server and the CLI.

use std::sync::Arc;

use crate::agents::{AgentInvoker, HttpAgentInvoker, ProfileLoader};
use crate::catalog::{Toolbox, WorkflowCatalog};
use crate::config::MedflowConfig;
use crate::error::WorkflowError;
use crate::workflow::RunEngine;

/// Shared state accessible by all API handlers.
pub struct AppStateInner {
    pub engine: RunEngine,
    pub catalog: WorkflowCatalog,
    pub toolbox: Toolbox,
    pub config: MedflowConfig,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    /// Production wiring: HTTP agents, profiles from disk, openFDA.
    pub fn new(config: MedflowConfig) -> Result<Self, WorkflowError> {
        let invoker: Arc<dyn AgentInvoker> = Arc::new(HttpAgentInvoker::new(config.agent.clone()));
        let profiles = ProfileLoader::resolve(config.agents_dir.as_deref());
        let toolbox = Toolbox::new(invoker, profiles, config.openfda_api_key.clone());
        Self::with_toolbox(config, toolbox)
    }

    /// Wire the built-in catalog to an existing toolbox.
    pub fn with_toolbox(config: MedflowConfig, toolbox: Toolbox) -> Result<Self, WorkflowError> {
        let catalog = WorkflowCatalog::builtin(&toolbox)?;
        let mut engine = RunEngine::new();
        if let Some(deadline) = config.branch_timeout {
            engine = engine.with_branch_deadline(deadline);
        }
        if let Some(retained) = config.retained_runs {
            engine = engine.with_retained_runs(retained);
        }

        tracing::info!(
            "[AppState] {} workflows, {} agent profiles, adapter {}",
            catalog.iter().count(),
            toolbox.profiles().all().len(),
            config.agent.adapter.as_str()
        );

        Ok(Self {
            engine,
            catalog,
            toolbox,
            config,
        })
    }
}
