//! The medicine assistant's workflows, keyed by the URL path they are
//! served under.

pub mod dosage;
pub mod medical_tool;
pub mod medicine;
pub mod report;
pub mod research;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::agents::{Agent, AgentInvoker, AgentProfile, ProfileLoader};
use crate::error::WorkflowError;
use crate::tools::{
    invoke_tool, ComparisonTool, MedicalRetrievalTool, PricingLookupTool, Tool, ToolRegistry,
};
use crate::workflow::schema::Schema;
use crate::workflow::step::{StepContext, StepFailure, StepHandler, StepOutcome};
use crate::workflow::Workflow;

/// Agents and tools the catalog's steps are built from.
#[derive(Clone)]
pub struct Toolbox {
    invoker: Arc<dyn AgentInvoker>,
    profiles: ProfileLoader,
    registry: ToolRegistry,
    pub medical_retrieval: Arc<dyn Tool>,
    pub pricing_lookup: Arc<dyn Tool>,
    pub comparison: Arc<dyn Tool>,
}

impl Toolbox {
    pub fn new(invoker: Arc<dyn AgentInvoker>, profiles: ProfileLoader, openfda_api_key: Option<String>) -> Self {
        Self::with_medical_retrieval(
            invoker,
            profiles,
            Arc::new(MedicalRetrievalTool::new(openfda_api_key)),
        )
    }

    /// Same as `new`, with the drug-label source supplied by the caller.
    pub fn with_medical_retrieval(
        invoker: Arc<dyn AgentInvoker>,
        profiles: ProfileLoader,
        medical_retrieval: Arc<dyn Tool>,
    ) -> Self {
        let pricing_expert = Agent::new(profile_or_default(&profiles, "pricing-expert"), invoker.clone());
        let pricing_lookup: Arc<dyn Tool> = Arc::new(PricingLookupTool::new(pricing_expert));
        let comparison: Arc<dyn Tool> = Arc::new(ComparisonTool);

        let mut registry = ToolRegistry::new();
        registry.register(medical_retrieval.clone());
        registry.register(pricing_lookup.clone());
        registry.register(comparison.clone());

        Self {
            invoker,
            profiles,
            registry,
            medical_retrieval,
            pricing_lookup,
            comparison,
        }
    }

    pub fn agent(&self, id: &str) -> Agent {
        Agent::new(profile_or_default(&self.profiles, id), self.invoker.clone())
    }

    pub fn profiles(&self) -> &ProfileLoader {
        &self.profiles
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.registry
    }
}

fn profile_or_default(profiles: &ProfileLoader, id: &str) -> AgentProfile {
    match profiles.get(id) {
        Some(profile) => profile.clone(),
        None => {
            tracing::warn!("[Catalog] No profile named '{}', using an empty one", id);
            AgentProfile {
                id: id.to_string(),
                name: id.to_string(),
                description: None,
                instructions: String::new(),
                model: None,
                tools: Vec::new(),
            }
        }
    }
}

// ─── Catalog ───────────────────────────────────────────────────────────────

/// Listing entry for `GET /workflows`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInfo {
    pub id: String,
    pub path: String,
    pub description: Option<String>,
    pub stages: Vec<String>,
    pub input_schema: Value,
    pub output_schema: Value,
}

#[derive(Clone, Default)]
pub struct WorkflowCatalog {
    workflows: BTreeMap<String, Workflow>,
}

impl WorkflowCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in workflow, wired to `toolbox`.
    pub fn builtin(toolbox: &Toolbox) -> Result<Self, WorkflowError> {
        let mut catalog = Self::new();
        catalog.register("medicine", medicine::medicine_workflow(toolbox)?);
        catalog.register("research", research::research_workflow(toolbox)?);
        catalog.register("generate-report", report::report_workflow(toolbox)?);
        catalog.register("test-medical-tool", medical_tool::medical_tool_workflow(toolbox)?);
        catalog.register("dosage-check", dosage::dosage_workflow(toolbox)?);
        Ok(catalog)
    }

    pub fn register(&mut self, path: impl Into<String>, workflow: Workflow) {
        self.workflows.insert(path.into(), workflow);
    }

    pub fn get(&self, path: &str) -> Option<&Workflow> {
        self.workflows.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Workflow)> {
        self.workflows.iter().map(|(path, wf)| (path.as_str(), wf))
    }

    pub fn list(&self) -> Vec<WorkflowInfo> {
        self.iter()
            .map(|(path, wf)| WorkflowInfo {
                id: wf.id().to_string(),
                path: path.to_string(),
                description: wf.description().map(str::to_string),
                stages: wf.stage_ids().into_iter().map(str::to_string).collect(),
                input_schema: wf.input_schema().to_json_schema(),
                output_schema: wf.output_schema().to_json_schema(),
            })
            .collect()
    }
}

// ─── Shared step handlers ──────────────────────────────────────────────────

pub(crate) fn text_field(name: &str) -> Schema {
    Schema::object().field(name, Schema::String).build()
}

/// Pull a string field out of a validated value.
pub(crate) fn str_field<'a>(value: &'a Value, name: &str) -> Result<&'a str, StepFailure> {
    value[name]
        .as_str()
        .ok_or_else(|| StepFailure::new(format!("missing string field '{}'", name)))
}

/// Calls a tool with the prompt, then lets an agent answer with the tool's
/// result as grounding. Output is the answer followed by the tool text.
pub(crate) struct ToolAgentStep {
    pub agent: Agent,
    pub tool: Arc<dyn Tool>,
    pub tool_input: fn(&str) -> Value,
    pub render: fn(&Value) -> String,
}

#[async_trait]
impl StepHandler for ToolAgentStep {
    async fn execute(&self, input: Value, ctx: &StepContext) -> Result<StepOutcome, StepFailure> {
        let prompt = str_field(&input, "prompt")?;

        let tool_output = invoke_tool(self.tool.as_ref(), (self.tool_input)(prompt)).await?;
        let grounding = (self.render)(&tool_output);
        ctx.emit(format!("{}\n", grounding));

        let question = format!(
            "{}\n\nResult of the {} tool:\n{}",
            prompt,
            self.tool.id(),
            grounding
        );
        let answer = self.agent.generate_text(&question).await?;
        ctx.emit(answer.clone());

        Ok(StepOutcome::Completed(json!({
            "output": format!("{}\n\n{}", answer.trim(), grounding),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ScriptedInvoker;

    #[test]
    fn test_builtin_catalog_paths() {
        let toolbox = Toolbox::new(
            Arc::new(ScriptedInvoker::default()),
            ProfileLoader::resolve(None),
            None,
        );
        let catalog = WorkflowCatalog::builtin(&toolbox).unwrap();
        let paths: Vec<&str> = catalog.iter().map(|(path, _)| path).collect();
        assert_eq!(
            paths,
            vec!["dosage-check", "generate-report", "medicine", "research", "test-medical-tool"]
        );

        let medicine = catalog.list().into_iter().find(|w| w.path == "medicine").unwrap();
        assert_eq!(medicine.id, "medicine-workflow");
        assert_eq!(medicine.input_schema["required"], json!(["input"]));
        assert_eq!(toolbox.tools().list().len(), 3);
    }

    #[test]
    fn test_unknown_profile_falls_back() {
        let toolbox = Toolbox::new(Arc::new(ScriptedInvoker::default()), ProfileLoader::new(), None);
        let agent = toolbox.agent("nobody");
        assert_eq!(agent.id(), "nobody");
        assert!(agent.profile().instructions.is_empty());
    }
}
