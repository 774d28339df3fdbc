//! `test-medical-tool` — the medical-tool agent picks the lookup, the
//! medical-retrieval tool answers it.

use serde_json::json;

use super::{str_field, text_field, Toolbox};
use crate::error::WorkflowError;
use crate::tools::invoke_tool;
use crate::workflow::schema::Schema;
use crate::workflow::step::{Step, StepOutcome};
use crate::workflow::{create_workflow, Workflow};

pub fn medical_tool_workflow(toolbox: &Toolbox) -> Result<Workflow, WorkflowError> {
    let agent = toolbox.agent("medical-tool");
    let tool = toolbox.medical_retrieval.clone();
    let input = Schema::object()
        .field("drug_name", Schema::String)
        .describe("The name of the drug to look up.")
        .build();

    let step = Step::from_fn(
        "run-medical-agent",
        input.clone(),
        text_field("info"),
        move |input, ctx| {
            let agent = agent.clone();
            let tool = tool.clone();
            async move {
                let drug_name = str_field(&input, "drug_name")?;
                // The agent only decides what to look up; its call is the tool input.
                let call = agent.generate_object(drug_name, &tool.input_schema()).await?;
                let result = invoke_tool(tool.as_ref(), call).await?;
                let info = str_field(&result, "info")?.to_string();
                ctx.emit(info.clone());
                Ok(StepOutcome::Completed(json!({ "info": info })))
            }
        },
    );

    create_workflow("test-medical-tool-workflow")
        .description("Calls the medical tool agent to test the medical retrieval tool.")
        .input_schema(input)
        .output_schema(text_field("info"))
        .then(step)
        .commit()
}
