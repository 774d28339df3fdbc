//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and reuses
//! the medflow-core workflows through `AppState`.

pub mod agent;
pub mod server;
pub mod workflow;

use std::sync::Arc;

use medflow_core::state::{AppState, AppStateInner};
use medflow_core::MedflowConfig;

/// Build a shared `AppState` from `.env` files and the process environment.
///
/// This mirrors `medflow_server::create_app_state` but runs the workflows
/// in-process instead of behind HTTP.
pub fn init_state() -> Result<AppState, String> {
    load_dotenv();
    let config = MedflowConfig::from_env()?;
    let inner = AppStateInner::new(config).map_err(|e| format!("Failed to build workflows: {}", e))?;
    Ok(Arc::new(inner))
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

/// Load .env and .env.local files for environment variables.
pub fn load_dotenv() {
    // Try .env.local first (higher priority), then .env
    for filename in &[".env.local", ".env"] {
        let path = std::path::Path::new(filename);
        if !path.exists() {
            continue;
        }
        if let Ok(content) = std::fs::read_to_string(path) {
            for (key, value) in parse_dotenv(&content) {
                // Only set if not already present (existing env vars take priority)
                if std::env::var(&key).is_err() {
                    std::env::set_var(&key, &value);
                }
            }
            tracing::info!("[CLI] Loaded environment from '{}'", filename);
        }
    }
}

/// Parse `KEY=VALUE` lines, skipping comments and blanks and stripping
/// surrounding quotes from values.
pub fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let mut value = value.trim();
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotenv() {
        let vars = parse_dotenv("# comment\n\nOPENFDA_API_KEY=\"abc\"\nMEDFLOW_MODEL = gpt-4o-mini\nBROKEN\nEMPTY=''\n");
        assert_eq!(
            vars,
            vec![
                ("OPENFDA_API_KEY".to_string(), "abc".to_string()),
                ("MEDFLOW_MODEL".to_string(), "gpt-4o-mini".to_string()),
                ("EMPTY".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("medicine", 16), "medicine");
        assert_eq!(truncate("test-medical-tool", 10), "test-medi…");
    }
}
