//! Integration test: the built-in catalog driven end to end with canned agents.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use medflow_core::agents::{AgentError, AgentInvoker, AgentRequest, AgentResponse, ProfileLoader};
use medflow_core::catalog::{Toolbox, WorkflowCatalog};
use medflow_core::workflow::{ChannelSink, RunEngine, RunResult, RunStatus};
use medflow_core::WorkflowError;

/// Answers by agent instructions prefix; anything unscripted is a failure.
#[derive(Default)]
struct CannedAgents {
    replies: Vec<(&'static str, AgentResponse)>,
    prompts: Mutex<Vec<String>>,
}

impl CannedAgents {
    fn text(mut self, prefix: &'static str, text: &str) -> Self {
        self.replies.push((
            prefix,
            AgentResponse {
                text: Some(text.to_string()),
                model: "canned".to_string(),
                ..Default::default()
            },
        ));
        self
    }
}

#[async_trait]
impl AgentInvoker for CannedAgents {
    async fn generate(&self, request: AgentRequest) -> Result<AgentResponse, AgentError> {
        if let Some(prompt) = request.prompt() {
            self.prompts.lock().unwrap().push(prompt.to_string());
        }
        self.replies
            .iter()
            .find(|(prefix, _)| request.instructions.starts_with(*prefix))
            .map(|(_, reply)| reply.clone())
            .ok_or_else(|| AgentError::Configuration("no canned reply".to_string()))
    }
}

fn catalog(agents: CannedAgents) -> WorkflowCatalog {
    let toolbox = Toolbox::new(Arc::new(agents), ProfileLoader::resolve(None), None);
    WorkflowCatalog::builtin(&toolbox).unwrap()
}

#[tokio::test]
async fn test_compare_query_uses_comparison_tool() {
    let catalog = catalog(CannedAgents::default().text("You are a classifier.", "compare"));
    let workflow = catalog.get("medicine").unwrap();

    let result = RunEngine::new()
        .start(workflow, json!({ "input": "ibuprofen vs acetaminophen" }))
        .await
        .unwrap();

    assert_eq!(result.status(), RunStatus::Success);
    assert_eq!(
        result.output(),
        Some(&json!({ "output": "Comparison of ibuprofen vs acetaminophen (mock data)." }))
    );
}

#[tokio::test]
async fn test_general_need_without_openfda_key_degrades() {
    let catalog = catalog(
        CannedAgents::default()
            .text("You are a classifier.", "\"General-Need\"")
            .text("Provide precise", "Ibuprofen is commonly used for headaches."),
    );
    let workflow = catalog.get("medicine").unwrap();

    let result = RunEngine::new()
        .start(workflow, json!({ "input": "What helps with a headache?" }))
        .await
        .unwrap();

    let output = result.output().unwrap()["output"].as_str().unwrap().to_string();
    assert!(output.starts_with("Ibuprofen is commonly used for headaches."));
    assert!(output.contains("API Error: OPENFDA_API_KEY is not set"));
}

#[tokio::test]
async fn test_unknown_intent_fails_at_route() {
    let catalog = catalog(CannedAgents::default().text("You are a classifier.", "dosage"));
    let workflow = catalog.get("medicine").unwrap();

    let result = RunEngine::new()
        .start(workflow, json!({ "input": "How much aspirin?" }))
        .await
        .unwrap();

    match result {
        RunResult::Failed { stage_id, error, .. } => {
            assert_eq!(stage_id.as_deref(), Some("route"));
            assert!(matches!(error, WorkflowError::NoRouteMatched { .. }));
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_input_is_rejected_before_run() {
    let catalog = catalog(CannedAgents::default());
    let workflow = catalog.get("medicine").unwrap();

    let err = RunEngine::new()
        .start(workflow, json!({ "query": "aspirin" }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation_error");
}

#[tokio::test]
async fn test_dosage_check_suspends_then_resumes() {
    let catalog = catalog(
        CannedAgents::default().text("Provide precise", "Do not exceed 3200mg per day."),
    );
    let workflow = catalog.get("dosage-check").unwrap();
    let engine = RunEngine::new();

    let started = engine
        .start(workflow, json!({ "drug": "ibuprofen", "dosage": "400mg" }))
        .await
        .unwrap();
    let (run_id, token) = match &started {
        RunResult::Suspended {
            run_id,
            resume_token,
            payload,
            ..
        } => {
            assert_eq!(payload["question"], "Confirm dosage?");
            (run_id.clone(), resume_token.clone())
        }
        other => panic!("expected suspension, got {:?}", other),
    };
    assert_eq!(engine.run(&run_id).await.unwrap().status, RunStatus::Suspended);

    let resumed = engine.resume(&token, json!({ "answer": "yes" })).await.unwrap();
    assert_eq!(
        resumed.output(),
        Some(&json!({ "output": "Do not exceed 3200mg per day." }))
    );

    let again = engine.resume(&token, json!({ "answer": "yes" })).await.unwrap_err();
    assert!(matches!(again, WorkflowError::RunAlreadyTerminated { .. }));
}

#[tokio::test]
async fn test_streaming_emits_in_order_and_closes() {
    let catalog = catalog(CannedAgents::default().text("You are a classifier.", "compare"));
    let workflow = catalog.get("medicine").unwrap();
    let (sink, mut rx) = ChannelSink::new();

    let result = RunEngine::new()
        .start_streaming(workflow, json!({ "input": "Advil versus Tylenol" }), Arc::new(sink))
        .await
        .unwrap();
    assert!(result.is_success());

    let mut chunks = Vec::new();
    while let Some(chunk) = rx.recv().await {
        chunks.push((chunk.stage_id, chunk.text));
    }
    assert_eq!(
        chunks,
        vec![
            ("classify-step".to_string(), "intent: compare\n".to_string()),
            (
                "comparison-step".to_string(),
                "Comparison of Advil vs Tylenol (mock data).".to_string()
            ),
        ]
    );
}

#[tokio::test]
async fn test_catalog_listing_describes_stages() {
    let catalog = catalog(CannedAgents::default());
    let info = catalog.list();
    let medicine = info.iter().find(|w| w.path == "medicine").unwrap();
    assert_eq!(
        medicine.stages,
        vec!["classify-step", "prepare-route", "route", "collect-output"]
    );
    assert_eq!(medicine.output_schema["required"], json!(["output"]));
}
