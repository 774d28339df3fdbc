//! `medflow workflow` — List, describe and run the built-in workflows.

use std::io::Write;
use std::sync::Arc;

use serde_json::Value;

use medflow_core::state::AppState;
use medflow_core::workflow::{RunEngine, RunResult, Schema, StreamChunk, StreamSink, SuspendState, Workflow};

use super::{print_json, truncate};

/// Prints chunks to stdout as they arrive.
struct StdoutSink;

impl StreamSink for StdoutSink {
    fn emit(&self, chunk: StreamChunk) {
        print!("{}", chunk.text);
        let _ = std::io::stdout().flush();
    }

    fn close(&self) {
        println!();
    }
}

/// List the workflows in the catalog.
pub async fn list(state: &AppState) -> Result<(), String> {
    let workflows = state.catalog.list();

    println!("┌───────────────────┬────────────────────────────┬────────┐");
    println!("│ Path              │ Id                         │ Stages │");
    println!("├───────────────────┼────────────────────────────┼────────┤");
    for info in &workflows {
        println!(
            "│ {:<17} │ {:<26} │ {:<6} │",
            truncate(&info.path, 17),
            truncate(&info.id, 26),
            info.stages.len()
        );
    }
    println!("└───────────────────┴────────────────────────────┴────────┘");
    Ok(())
}

/// Print a workflow's stages and JSON schemas.
pub async fn describe(state: &AppState, name: &str) -> Result<(), String> {
    let info = state
        .catalog
        .list()
        .into_iter()
        .find(|w| w.path == name)
        .ok_or_else(|| format!("Workflow not found: {}", name))?;
    let value = serde_json::to_value(&info).map_err(|e| e.to_string())?;
    print_json(&value);
    Ok(())
}

/// Run a workflow to completion, asking for resume input whenever it
/// suspends. `answers` are used first, then the terminal is prompted.
pub async fn run(
    state: &AppState,
    name: &str,
    input: &str,
    stream: bool,
    answers: Vec<String>,
) -> Result<(), String> {
    let input: Value =
        serde_json::from_str(input).map_err(|e| format!("Input is not valid JSON: {}", e))?;

    let mut answers = answers.into_iter();
    let result = execute(state, name, input, stream, |suspend| match answers.next() {
        Some(raw) => resume_input(&suspend.resume_schema, &raw),
        None => prompt_resume(suspend),
    })
    .await?;

    match result {
        RunResult::Success { output, .. } => {
            if !stream {
                print_json(&output);
            }
            Ok(())
        }
        RunResult::Failed {
            run_id,
            stage_id,
            error,
        } => Err(format!(
            "Run {} failed at '{}': {}",
            run_id,
            stage_id.as_deref().unwrap_or("<input>"),
            error
        )),
        RunResult::Suspended { run_id, .. } => Err(format!("Run {} is still suspended", run_id)),
    }
}

/// Start `name` and keep resuming it with `answer` until it stops suspending.
pub async fn execute<F>(
    state: &AppState,
    name: &str,
    input: Value,
    stream: bool,
    mut answer: F,
) -> Result<RunResult, String>
where
    F: FnMut(&SuspendState) -> Result<Value, String>,
{
    let workflow = state
        .catalog
        .get(name)
        .cloned()
        .ok_or_else(|| format!("Workflow not found: {}", name))?;

    let mut result = start(&state.engine, &workflow, input, stream).await?;

    loop {
        let run_id = match &result {
            RunResult::Suspended { run_id, .. } => run_id.clone(),
            _ => break,
        };

        let run = state.engine.run(&run_id).await.map_err(|e| e.to_string())?;
        let suspend = run
            .suspend
            .ok_or_else(|| format!("Run {} has no suspend state", run_id))?;
        println!("⏸  Suspended at '{}': {}", suspend.stage_id, suspend.payload);

        let resume = answer(&suspend)?;
        result = if stream {
            state.engine.resume_streaming(&run_id, resume, Arc::new(StdoutSink)).await
        } else {
            state.engine.resume(&run_id, resume).await
        }
        .map_err(|e| e.to_string())?;
    }

    Ok(result)
}

async fn start(engine: &RunEngine, workflow: &Workflow, input: Value, stream: bool) -> Result<RunResult, String> {
    let result = if stream {
        engine.start_streaming(workflow, input, Arc::new(StdoutSink)).await
    } else {
        engine.start(workflow, input).await
    };
    result.map_err(|e| e.to_string())
}

fn prompt_resume(suspend: &SuspendState) -> Result<Value, String> {
    let question = suspend
        .payload
        .get("question")
        .and_then(Value::as_str)
        .unwrap_or("Resume input");
    let raw: String = dialoguer::Input::new()
        .with_prompt(question)
        .interact_text()
        .map_err(|e| format!("Failed to read resume input: {}", e))?;
    resume_input(&suspend.resume_schema, &raw)
}

/// Turn a line of user input into resume data. A JSON object is taken as is;
/// plain text fills the single field of a one-field object schema.
pub fn resume_input(schema: &Schema, raw: &str) -> Result<Value, String> {
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(raw) {
        return Ok(value);
    }
    match schema {
        Schema::Object(object) if object.fields.len() == 1 => {
            let mut map = serde_json::Map::new();
            map.insert(object.fields[0].name.clone(), Value::String(raw.trim().to_string()));
            Ok(Value::Object(map))
        }
        _ => Err(format!("Resume input must be a JSON object, got: {}", raw)),
    }
}
