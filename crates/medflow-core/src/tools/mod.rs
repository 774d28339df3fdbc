//! Tools — typed, side-effecting helpers the medicine steps call.
//!
//! Provided tools:
//!   1. medical-retrieval - drug label lookup against openFDA
//!   2. pricing-lookup    - cost and availability via the pricing-expert agent
//!   3. comparison-tool   - side-by-side product comparison
//!
//! A tool never fails outright: collaborator errors come back as degraded
//! output of the declared shape. `invoke_tool` still validates both sides so
//! a buggy tool is caught at the calling step.

pub mod comparison;
pub mod medical_retrieval;
pub mod pricing_lookup;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::workflow::schema::{validate, Schema};
use crate::workflow::step::StepFailure;

pub use comparison::ComparisonTool;
pub use medical_retrieval::MedicalRetrievalTool;
pub use pricing_lookup::PricingLookupTool;

#[async_trait]
pub trait Tool: Send + Sync {
    fn id(&self) -> &str;

    fn description(&self) -> &str;

    fn input_schema(&self) -> Schema;

    fn output_schema(&self) -> Schema;

    async fn execute(&self, input: Value) -> Value;
}

/// Run a tool with its input and output checked against its schemas.
pub async fn invoke_tool(tool: &dyn Tool, input: Value) -> Result<Value, StepFailure> {
    let input = validate(&tool.input_schema(), input)
        .map_err(|e| StepFailure::new(format!("tool '{}' rejected its input: {}", tool.id(), e)))?;

    tracing::debug!("[Tool] Invoking {}", tool.id());
    let output = tool.execute(input).await;

    validate(&tool.output_schema(), output)
        .map_err(|e| StepFailure::new(format!("tool '{}' produced invalid output: {}", tool.id(), e)))
}

/// Summary of a tool for listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub id: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Value,
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.id().to_string(), tool);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(id).cloned()
    }

    pub fn list(&self) -> Vec<ToolInfo> {
        self.tools
            .values()
            .map(|tool| ToolInfo {
                id: tool.id().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema().to_json_schema(),
                output_schema: tool.output_schema().to_json_schema(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        fn id(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "returns the wrong shape"
        }

        fn input_schema(&self) -> Schema {
            Schema::object().field("query", Schema::String).build()
        }

        fn output_schema(&self) -> Schema {
            Schema::object().field("info", Schema::String).build()
        }

        async fn execute(&self, _input: Value) -> Value {
            json!({ "info": 42 })
        }
    }

    #[tokio::test]
    async fn test_invoke_tool_validates_both_sides() {
        let err = invoke_tool(&Broken, json!({ "q": "x" })).await.unwrap_err();
        assert!(err.message().contains("rejected its input"));

        let err = invoke_tool(&Broken, json!({ "query": "x" })).await.unwrap_err();
        assert!(err.message().contains("invalid output"));
    }

    #[test]
    fn test_registry_lists_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ComparisonTool));
        registry.register(Arc::new(Broken));
        let ids: Vec<String> = registry.list().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["broken", "comparison-tool"]);
        assert!(registry.get("comparison-tool").is_some());
    }
}
