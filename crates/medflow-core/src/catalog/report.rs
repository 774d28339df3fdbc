//! `generate-report` — research a topic, then have the report agent write it up.

use serde_json::json;

use super::research::gather_findings;
use super::{str_field, text_field, Toolbox};
use crate::error::WorkflowError;
use crate::workflow::schema::Schema;
use crate::workflow::step::{Step, StepOutcome};
use crate::workflow::{create_workflow, Workflow};

pub fn report_workflow(toolbox: &Toolbox) -> Result<Workflow, WorkflowError> {
    let researcher = toolbox.agent("research");
    let writer = toolbox.agent("report");
    let output = Schema::object()
        .optional("report", Schema::String)
        .field("completed", Schema::Boolean)
        .build();

    let step = Step::from_fn(
        "research-and-report",
        text_field("input"),
        output.clone(),
        move |input, ctx| {
            let researcher = researcher.clone();
            let writer = writer.clone();
            async move {
                let topic = str_field(&input, "input")?;

                let report = match gather_findings(&researcher, topic).await {
                    Ok((_, object)) => writer
                        .generate_text(&format!("Generate a report based on this research: {}", object))
                        .await
                        .map_err(|e| e.to_string()),
                    Err(message) => Err(message),
                };

                let out = match report {
                    Ok(report) => {
                        ctx.emit(report.clone());
                        json!({ "report": report, "completed": true })
                    }
                    Err(message) => {
                        tracing::error!("[Report] Error generating report on '{}': {}", topic, message);
                        json!({ "completed": false })
                    }
                };
                Ok(StepOutcome::Completed(out))
            }
        },
    );

    create_workflow("generate-report-workflow")
        .description("Researches a topic and writes a report from the findings")
        .input_schema(text_field("input"))
        .output_schema(output)
        .then(step)
        .commit()
}
