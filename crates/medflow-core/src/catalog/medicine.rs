//! `medicine` — classify the query, then route it to exactly one handler.
//!
//! ```text
//! classify-step ─► map {prompt, intent} ─► route ─┬─ general_need   ─► medicine-info-step
//!                                                 ├─ product_lookup ─► product-lookup-step
//!                                                 ├─ compare        ─► comparison-step
//!                                                 └─ research       ─► research-step
//!                                         ─► map {output}
//! ```

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{str_field, text_field, ToolAgentStep, Toolbox};
use crate::error::WorkflowError;
use crate::tools::invoke_tool;
use crate::workflow::schema::Schema;
use crate::workflow::stage::Branch;
use crate::workflow::step::{Step, StepOutcome};
use crate::workflow::{create_workflow, Workflow};

lazy_static::lazy_static! {
    static ref PRODUCT_SEPARATOR: Regex =
        Regex::new(r"(?i)\s+vs\.?\s+|\s+versus\s+|\s*,\s*|\s+and\s+").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    GeneralNeed,
    ProductLookup,
    Compare,
    Research,
}

impl Intent {
    pub const ALL: [Intent; 4] = [
        Intent::GeneralNeed,
        Intent::ProductLookup,
        Intent::Compare,
        Intent::Research,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::GeneralNeed => "general_need",
            Intent::ProductLookup => "product_lookup",
            Intent::Compare => "compare",
            Intent::Research => "research",
        }
    }

    /// Id of the step that handles this intent.
    pub fn step_id(&self) -> &'static str {
        match self {
            Intent::GeneralNeed => "medicine-info-step",
            Intent::ProductLookup => "product-lookup-step",
            Intent::Compare => "comparison-step",
            Intent::Research => "research-step",
        }
    }

    /// Parse classifier text such as `"General-Need"` or `compare\n`.
    pub fn parse(raw: &str) -> Option<Intent> {
        let normalised = normalise(raw);
        Intent::ALL.into_iter().find(|i| i.as_str() == normalised)
    }
}

/// Trim, drop surrounding quotes, lowercase, and fold `-`/space into `_`.
pub fn normalise(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_lowercase()
        .replace(['-', ' '], "_")
}

/// Split "a vs b", "a versus b", "a, b and c" into product names.
pub fn split_products(prompt: &str) -> Vec<String> {
    PRODUCT_SEPARATOR
        .split(prompt)
        .map(|p| p.trim().trim_end_matches(['?', '.', '!']).trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn routed_schema() -> Schema {
    Schema::object()
        .field("prompt", Schema::String)
        .field("intent", Schema::String)
        .build()
}

fn classify_step(toolbox: &Toolbox) -> Step {
    let classifier = toolbox.agent("classifier");
    let output = Schema::object()
        .field("intent", Schema::String)
        .field("input", Schema::String)
        .build();

    Step::from_fn("classify-step", text_field("input"), output, move |input, ctx| {
        let classifier = classifier.clone();
        async move {
            let query = str_field(&input, "input")?;
            let text = classifier.generate_text(query).await?;
            let intent = normalise(&text);
            tracing::info!("[Medicine] Classified query as '{}'", intent);
            ctx.emit(format!("intent: {}\n", intent));
            Ok(StepOutcome::Completed(json!({ "intent": intent, "input": query })))
        }
    })
    .with_description("Classify user intent")
}

fn comparison_step(toolbox: &Toolbox) -> Step {
    let tool = toolbox.comparison.clone();
    Step::from_fn(
        Intent::Compare.step_id(),
        routed_schema(),
        text_field("output"),
        move |input, ctx| {
            let tool = tool.clone();
            async move {
                let products = split_products(str_field(&input, "prompt")?);
                let result = invoke_tool(tool.as_ref(), json!({ "products": products })).await?;
                let comparison = str_field(&result, "comparison")?.to_string();
                ctx.emit(comparison.clone());
                Ok(StepOutcome::Completed(json!({ "output": comparison })))
            }
        },
    )
    .with_description("Compares multiple drugs side by side")
}

fn route_step(intent: Intent, toolbox: &Toolbox) -> Step {
    let handler = match intent {
        Intent::GeneralNeed => ToolAgentStep {
            agent: toolbox.agent("medicine-info"),
            tool: toolbox.medical_retrieval.clone(),
            tool_input: |prompt| json!({ "query": prompt }),
            render: render_info,
        },
        Intent::ProductLookup => ToolAgentStep {
            agent: toolbox.agent("product-lookup"),
            tool: toolbox.pricing_lookup.clone(),
            tool_input: |prompt| json!({ "drug": prompt }),
            render: render_pricing,
        },
        Intent::Compare => return comparison_step(toolbox),
        Intent::Research => ToolAgentStep {
            agent: toolbox.agent("research"),
            tool: toolbox.medical_retrieval.clone(),
            tool_input: |prompt| json!({ "query": prompt }),
            render: render_info,
        },
    };

    let description = handler.agent.profile().description.clone().unwrap_or_default();
    Step::new(intent.step_id(), routed_schema(), text_field("output"), handler).with_description(description)
}

fn render_info(output: &Value) -> String {
    output["info"].as_str().unwrap_or_default().to_string()
}

fn render_pricing(output: &Value) -> String {
    format!(
        "{}: estimated cost {}, availability {}",
        output["name"].as_str().unwrap_or_default(),
        output["cost"].as_str().unwrap_or("N/A"),
        output["availability"].as_str().unwrap_or("Unknown"),
    )
}

/// Take the one routed answer out of the branch output.
fn collect_output(routes: Value) -> Value {
    let output = routes
        .as_object()
        .and_then(|m| m.values().next())
        .map(|route| route["output"].clone())
        .unwrap_or(Value::Null);
    json!({ "output": output })
}

pub fn medicine_workflow(toolbox: &Toolbox) -> Result<Workflow, WorkflowError> {
    let route = Intent::ALL.into_iter().fold(
        Branch::new().named("route").input_schema(routed_schema()),
        |branch, intent| {
            let step = Arc::new(route_step(intent, toolbox));
            branch.arm(
                move |v: &Value| v["intent"].as_str().and_then(Intent::parse) == Some(intent),
                step,
            )
        },
    );

    create_workflow("medicine-workflow")
        .description("Routes user queries to the correct medicine-related agent")
        .input_schema(text_field("input"))
        .output_schema(text_field("output"))
        .then(classify_step(toolbox))
        .map_named("prepare-route", |v| {
            json!({ "prompt": v["input"], "intent": v["intent"] })
        })
        .branch(route)
        .map_named("collect-output", collect_output)
        .commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_parse_normalises() {
        assert_eq!(Intent::parse("\"general_need\""), Some(Intent::GeneralNeed));
        assert_eq!(Intent::parse("  Product-Lookup \n"), Some(Intent::ProductLookup));
        assert_eq!(Intent::parse("compare"), Some(Intent::Compare));
        assert_eq!(Intent::parse("'research'"), Some(Intent::Research));
        assert_eq!(Intent::parse("general need"), Some(Intent::GeneralNeed));
        assert_eq!(Intent::parse("dosage"), None);
    }

    #[test]
    fn test_split_products() {
        assert_eq!(split_products("ibuprofen vs acetaminophen"), vec!["ibuprofen", "acetaminophen"]);
        assert_eq!(split_products("Advil versus Tylenol?"), vec!["Advil", "Tylenol"]);
        assert_eq!(
            split_products("aspirin, naproxen and ibuprofen"),
            vec!["aspirin", "naproxen", "ibuprofen"]
        );
        assert_eq!(split_products("aspirin VS. naproxen"), vec!["aspirin", "naproxen"]);
    }

    #[test]
    fn test_collect_output() {
        let routes = json!({ "comparison-step": { "output": "text" } });
        assert_eq!(collect_output(routes), json!({ "output": "text" }));
    }
}
