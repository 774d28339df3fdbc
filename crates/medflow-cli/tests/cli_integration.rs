//! Integration tests for the medflow-cli commands.
//!
//! These tests verify that the CLI commands work correctly by exercising
//! the same code paths as the binary, with canned agents in place of a
//! model provider.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use medflow_cli::commands;
use medflow_core::agents::{AgentError, AgentInvoker, AgentRequest, AgentResponse, ProfileLoader};
use medflow_core::catalog::Toolbox;
use medflow_core::state::{AppState, AppStateInner};
use medflow_core::workflow::RunResult;
use medflow_core::MedflowConfig;

struct EchoAgents;

#[async_trait]
impl AgentInvoker for EchoAgents {
    async fn generate(&self, request: AgentRequest) -> Result<AgentResponse, AgentError> {
        let text = if request.instructions.starts_with("You are a classifier.") {
            "compare".to_string()
        } else {
            format!("advice for: {}", request.prompt().unwrap_or_default())
        };
        Ok(AgentResponse {
            text: Some(text),
            model: "echo".to_string(),
            ..Default::default()
        })
    }
}

/// Create an AppState with profiles loaded from `agents_dir`.
fn test_state(agents_dir: Option<&str>) -> AppState {
    let config = MedflowConfig {
        agents_dir: agents_dir.map(str::to_string),
        ..Default::default()
    };
    let toolbox = Toolbox::new(
        Arc::new(EchoAgents),
        ProfileLoader::resolve(config.agents_dir.as_deref()),
        None,
    );
    Arc::new(AppStateInner::with_toolbox(config, toolbox).expect("Failed to build catalog"))
}

#[tokio::test]
async fn test_workflow_list_and_describe() {
    let state = test_state(None);
    commands::workflow::list(&state).await.unwrap();
    commands::workflow::describe(&state, "medicine").await.unwrap();

    let err = commands::workflow::describe(&state, "missing").await.unwrap_err();
    assert!(err.contains("Workflow not found"));
}

#[tokio::test]
async fn test_workflow_run_compare() {
    let state = test_state(None);
    let result = commands::workflow::execute(
        &state,
        "medicine",
        json!({ "input": "aspirin vs naproxen" }),
        false,
        |_| panic!("medicine never suspends"),
    )
    .await
    .unwrap();

    assert_eq!(
        result.output(),
        Some(&json!({ "output": "Comparison of aspirin vs naproxen (mock data)." }))
    );
}

#[tokio::test]
async fn test_workflow_run_answers_suspension() {
    let state = test_state(None);
    let mut asked = Vec::new();

    let result = commands::workflow::execute(
        &state,
        "dosage-check",
        json!({ "drug": "ibuprofen", "dosage": "400mg" }),
        false,
        |suspend| {
            asked.push(suspend.payload["question"].as_str().unwrap_or_default().to_string());
            commands::workflow::resume_input(&suspend.resume_schema, "yes")
        },
    )
    .await
    .unwrap();

    assert_eq!(asked, vec!["Confirm dosage?"]);
    match result {
        RunResult::Success { output, .. } => {
            assert!(output["output"].as_str().unwrap().starts_with("advice for: "));
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_workflow_run_reports_failure() {
    let state = test_state(None);
    let err = commands::workflow::run(&state, "dosage-check", "{\"drug\": 1}", false, vec![])
        .await
        .unwrap_err();
    assert!(err.contains("Validation failed"));

    let err = commands::workflow::run(&state, "medicine", "not json", false, vec![])
        .await
        .unwrap_err();
    assert!(err.contains("not valid JSON"));
}

#[tokio::test]
async fn test_agent_profiles_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("triage.yaml"),
        "id: triage\nname: Triage Agent\ninstructions: Sort the query.\n",
    )
    .unwrap();

    let state = test_state(dir.path().to_str());
    assert!(state.toolbox.profiles().get("triage").is_some());
    assert!(state.toolbox.profiles().get("classifier").is_some());

    commands::agent::list(&state).await.unwrap();
    commands::agent::list_tools(&state).await.unwrap();
}
