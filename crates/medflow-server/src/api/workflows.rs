use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use medflow_core::catalog::WorkflowInfo;
use medflow_core::workflow::{ChannelSink, Run, RunResult, Workflow};
use medflow_core::ServerError;

use crate::AppState;

type SseStream = Pin<Box<dyn tokio_stream::Stream<Item = Result<Event, Infallible>> + Send>>;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_workflows))
        .route("/runs/{id}", get(get_run))
        .route("/runs/{id}/resume", post(resume_run))
        .route("/runs/{id}/cancel", post(cancel_run))
        .route("/{name}", post(run_workflow))
        .route("/{name}/stream", post(stream_workflow))
}

fn find_workflow(state: &AppState, name: &str) -> Result<Workflow, ServerError> {
    state
        .catalog
        .get(name)
        .cloned()
        .ok_or_else(|| ServerError::NotFound(format!("Workflow not found: {}", name)))
}

/// Unreadable bodies fail like any other bad input: `500 {error}`.
fn request_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ServerError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ServerError::Internal(format!("Invalid request body: {}", rejection.body_text())))
}

/// Map a run result onto the HTTP shape: the bare output on success, the
/// suspension descriptor when parked, `500 {error}` on failure.
fn run_response(result: RunResult) -> Response {
    match result {
        RunResult::Success { output, .. } => (StatusCode::OK, Json(output)).into_response(),
        suspended @ RunResult::Suspended { .. } => {
            let body = serde_json::to_value(&suspended).unwrap_or(Value::Null);
            (StatusCode::OK, Json(body)).into_response()
        }
        RunResult::Failed {
            run_id,
            stage_id,
            error,
        } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": error.to_string(),
                "runId": run_id,
                "stageId": stage_id,
            })),
        )
            .into_response(),
    }
}

async fn list_workflows(State(state): State<AppState>) -> Json<Vec<WorkflowInfo>> {
    Json(state.catalog.list())
}

async fn run_workflow(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ServerError> {
    let workflow = find_workflow(&state, &name)?;
    let input = request_body(body)?;
    tracing::info!("[API] POST /workflows/{}", name);
    let result = state.engine.start(&workflow, input).await?;
    Ok(run_response(result))
}

/// POST /workflows/{name}/stream — SSE `chunk` events while the run is in
/// flight, then one `result` event with the `RunResult`.
async fn stream_workflow(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Sse<SseStream>, ServerError> {
    let workflow = find_workflow(&state, &name)?;
    let input = request_body(body)?;
    tracing::info!("[API] POST /workflows/{}/stream", name);

    let (sink, mut rx) = ChannelSink::new();
    let engine = state.engine.clone();
    let run = tokio::spawn(async move { engine.start_streaming(&workflow, input, Arc::new(sink)).await });

    let stream = async_stream::stream! {
        while let Some(chunk) = rx.recv().await {
            let data = serde_json::to_string(&chunk).unwrap_or_default();
            yield Ok::<_, Infallible>(Event::default().event("chunk").data(data));
        }

        let result = match run.await {
            Ok(Ok(result)) => serde_json::to_value(&result).unwrap_or(Value::Null),
            Ok(Err(e)) => json!({ "status": "failed", "error": e.to_string(), "stageId": e.stage_id() }),
            Err(e) => json!({ "status": "failed", "error": format!("run task aborted: {}", e) }),
        };
        yield Ok(Event::default().event("result").data(result.to_string()));
    };

    Ok(Sse::new(Box::pin(stream)))
}

async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Run>, ServerError> {
    Ok(Json(state.engine.run(&id).await?))
}

async fn resume_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ServerError> {
    tracing::info!("[API] POST /workflows/runs/{}/resume", id);
    let resume_input = request_body(body)?;
    let result = state.engine.resume(&id, resume_input).await?;
    Ok(run_response(result))
}

async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Run>, ServerError> {
    tracing::info!("[API] POST /workflows/runs/{}/cancel", id);
    Ok(Json(state.engine.cancel(&id).await?))
}
