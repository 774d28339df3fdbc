//! `dosage-check` — asks a human to confirm a dosage before giving advice.
//!
//! `confirm-dosage` suspends with `{question, drug, dosage}` and waits for
//! `{answer}`; `dosage-advice` only consults the agent once confirmed.

use serde_json::{json, Value};

use super::{str_field, text_field, Toolbox};
use crate::error::WorkflowError;
use crate::workflow::schema::Schema;
use crate::workflow::step::{Step, StepOutcome, SuspendSignal};
use crate::workflow::{create_workflow, Workflow};

fn request_schema() -> Schema {
    Schema::object()
        .field("drug", Schema::String)
        .field("dosage", Schema::String)
        .build()
}

fn confirmed_schema() -> Schema {
    Schema::object()
        .field("confirmed", Schema::Boolean)
        .field("drug", Schema::String)
        .field("dosage", Schema::String)
        .build()
}

fn is_affirmative(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "yes" | "y" | "confirm" | "confirmed" | "true" | "ok"
    )
}

fn confirm_step() -> Step {
    Step::from_fn("confirm-dosage", request_schema(), confirmed_schema(), |input, ctx| async move {
        let drug = str_field(&input, "drug")?;
        let dosage = str_field(&input, "dosage")?;

        match ctx.resume_data() {
            Some(data) => {
                let confirmed = is_affirmative(str_field(data, "answer")?);
                Ok(StepOutcome::Completed(json!({
                    "confirmed": confirmed,
                    "drug": drug,
                    "dosage": dosage,
                })))
            }
            None => Ok(StepOutcome::Suspended(SuspendSignal::new(
                json!({ "question": "Confirm dosage?", "drug": drug, "dosage": dosage }),
                text_field("answer"),
            ))),
        }
    })
    .with_description("Wait for the user to confirm the dosage")
}

pub fn dosage_workflow(toolbox: &Toolbox) -> Result<Workflow, WorkflowError> {
    let agent = toolbox.agent("medicine-info");

    let advice = Step::from_fn("dosage-advice", confirmed_schema(), text_field("output"), move |input, ctx| {
        let agent = agent.clone();
        async move {
            let drug = str_field(&input, "drug")?;
            let dosage = str_field(&input, "dosage")?;

            let output = if input["confirmed"] == Value::Bool(true) {
                agent
                    .generate_text(&format!(
                        "Give brief safety guidance for taking {} of {}.",
                        dosage, drug
                    ))
                    .await?
            } else {
                format!("Dosage of {} for {} was not confirmed; no advice given.", dosage, drug)
            };
            ctx.emit(output.clone());
            Ok(StepOutcome::Completed(json!({ "output": output })))
        }
    })
    .with_description("Safety guidance for a confirmed dosage");

    create_workflow("dosage-check-workflow")
        .description("Confirms a dosage with the user before giving guidance")
        .input_schema(request_schema())
        .output_schema(text_field("output"))
        .then(confirm_step())
        .then(advice)
        .commit()
}
