//! Runtime configuration, read from the environment.
//!
//! | Variable                      | Meaning                                   |
//! |-------------------------------|-------------------------------------------|
//! | `MEDFLOW_AGENT_ADAPTER`       | `openai` (default) or `anthropic`         |
//! | `MEDFLOW_AGENT_BASE_URL`      | provider base URL                         |
//! | `MEDFLOW_MODEL`               | default model                             |
//! | `OPENAI_API_KEY` / `ANTHROPIC_API_KEY` | key for the chosen adapter       |
//! | `OPENFDA_API_KEY`             | openFDA key; lookups degrade without it   |
//! | `MEDFLOW_AGENTS_DIR`          | extra agent profile directory             |
//! | `MEDFLOW_BRANCH_TIMEOUT_SECS` | default deadline for branch arms          |
//! | `MEDFLOW_RETAINED_RUNS`       | finished runs kept in memory (default 256) |
//!
//! Values may reference other variables with `${VAR}` or `${VAR:-default}`.

use std::time::Duration;

use regex::Regex;

use crate::agents::{AgentAdapter, AgentCallConfig};

lazy_static::lazy_static! {
    static ref ENV_REF: Regex = Regex::new(r"\$\{([^}]+)\}").unwrap();
}

#[derive(Debug, Clone, Default)]
pub struct MedflowConfig {
    pub agent: AgentCallConfig,
    pub openfda_api_key: Option<String>,
    pub agents_dir: Option<String>,
    pub branch_timeout: Option<Duration>,
    pub retained_runs: Option<usize>,
}

impl MedflowConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| resolve_env_vars(&v))
                .filter(|v| !v.trim().is_empty())
        };

        let adapter = match get("MEDFLOW_AGENT_ADAPTER") {
            Some(value) => value.parse::<AgentAdapter>()?,
            None => AgentAdapter::OpenAi,
        };

        let defaults = AgentCallConfig::default();
        let agent = AgentCallConfig {
            adapter,
            base_url: get("MEDFLOW_AGENT_BASE_URL").unwrap_or_else(|| adapter.default_base_url().to_string()),
            api_key: get(adapter.api_key_var()).unwrap_or_default(),
            model: get("MEDFLOW_MODEL").unwrap_or(defaults.model.clone()),
            ..defaults
        };

        let branch_timeout = match get("MEDFLOW_BRANCH_TIMEOUT_SECS") {
            Some(secs) => Some(Duration::from_secs(secs.trim().parse::<u64>().map_err(|e| {
                format!("MEDFLOW_BRANCH_TIMEOUT_SECS must be a whole number of seconds: {}", e)
            })?)),
            None => None,
        };

        let retained_runs = match get("MEDFLOW_RETAINED_RUNS") {
            Some(count) => Some(
                count
                    .trim()
                    .parse::<usize>()
                    .map_err(|e| format!("MEDFLOW_RETAINED_RUNS must be a whole number: {}", e))?,
            ),
            None => None,
        };

        Ok(Self {
            agent,
            openfda_api_key: get("OPENFDA_API_KEY"),
            agents_dir: get("MEDFLOW_AGENTS_DIR"),
            branch_timeout,
            retained_runs,
        })
    }
}

/// Resolve environment variable references in a string.
/// Supports `${ENV_VAR}` and `${ENV_VAR:-default}` syntax.
pub fn resolve_env_vars(input: &str) -> String {
    ENV_REF.replace_all(input, |caps: &regex::Captures| {
        let var_expr = &caps[1];
        if let Some(idx) = var_expr.find(":-") {
            let var_name = &var_expr[..idx];
            let default_val = &var_expr[idx + 2..];
            std::env::var(var_name).unwrap_or_else(|_| default_val.to_string())
        } else {
            std::env::var(var_expr).unwrap_or_else(|_| format!("${{{}}}", var_expr))
        }
    })
    .to_string()
}
