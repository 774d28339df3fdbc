//! `research` — two-phase research through the research agent, rendered as a
//! Markdown summary.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{str_field, text_field, Toolbox};
use crate::agents::Agent;
use crate::error::WorkflowError;
use crate::workflow::schema::Schema;
use crate::workflow::step::{Step, StepOutcome};
use crate::workflow::{create_workflow, Workflow};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchFindings {
    pub queries: Vec<String>,
    pub search_results: Vec<SearchResult>,
    pub learnings: Vec<Learning>,
    pub completed_queries: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub relevance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Learning {
    pub learning: String,
    pub follow_up_questions: Vec<String>,
    pub source: String,
}

/// Shape the research agent must answer with.
pub fn findings_schema() -> Schema {
    Schema::object()
        .field("queries", Schema::array(Schema::String))
        .field(
            "searchResults",
            Schema::array(
                Schema::object()
                    .field("title", Schema::String)
                    .field("url", Schema::String)
                    .field("relevance", Schema::String)
                    .build(),
            ),
        )
        .field(
            "learnings",
            Schema::array(
                Schema::object()
                    .field("learning", Schema::String)
                    .field("followUpQuestions", Schema::array(Schema::String))
                    .field("source", Schema::String)
                    .build(),
            ),
        )
        .field("completedQueries", Schema::array(Schema::String))
        .optional("phase", Schema::String)
        .build()
}

pub fn research_prompt(topic: &str) -> String {
    format!(
        "Research the following topic thoroughly using the two-phase process: \"{}\".\n\n\
         Phase 1: Search for 2-3 initial queries about this topic\n\
         Phase 2: Search for follow-up questions from the learnings (then STOP)\n\n\
         Return findings in JSON format with queries, searchResults, learnings, completedQueries, and phase.",
        topic
    )
}

/// Render findings as Markdown. Empty sections are left out.
pub fn render_summary(topic: &str, findings: &ResearchFindings) -> String {
    let mut summary = format!("Research completed on \"{}\":\n\n", topic);

    if !findings.queries.is_empty() {
        summary.push_str("## Queries\n");
        for (i, q) in findings.queries.iter().enumerate() {
            let _ = writeln!(summary, "{}. {}", i + 1, q);
        }
        summary.push('\n');
    }

    if !findings.search_results.is_empty() {
        summary.push_str("## Search Results\n");
        for (i, r) in findings.search_results.iter().enumerate() {
            let _ = writeln!(summary, "{}. [{}]({}) ({})", i + 1, r.title, r.url, r.relevance);
        }
        summary.push('\n');
    }

    if !findings.learnings.is_empty() {
        summary.push_str("## Key Learnings\n");
        for (i, l) in findings.learnings.iter().enumerate() {
            let _ = writeln!(summary, "{}. {}\n   - Source: {}", i + 1, l.learning, l.source);
            if !l.follow_up_questions.is_empty() {
                let _ = writeln!(summary, "   - Follow-up: {}", l.follow_up_questions.join("; "));
            }
        }
        summary.push('\n');
    }

    if !findings.completed_queries.is_empty() {
        summary.push_str("## Completed Queries\n");
        for (i, q) in findings.completed_queries.iter().enumerate() {
            let _ = writeln!(summary, "{}. {}", i + 1, q);
        }
        summary.push('\n');
    }

    if let Some(phase) = &findings.phase {
        let _ = writeln!(summary, "## Phase\n{}", phase);
    }

    summary
}

/// Ask the research agent for findings on `topic`; returns them typed and raw.
pub(crate) async fn gather_findings(agent: &Agent, topic: &str) -> Result<(ResearchFindings, Value), String> {
    let object = agent
        .generate_object(&research_prompt(topic), &findings_schema())
        .await
        .map_err(|e| e.to_string())?;
    let findings = serde_json::from_value::<ResearchFindings>(object.clone()).map_err(|e| e.to_string())?;
    Ok((findings, object))
}

pub fn research_workflow(toolbox: &Toolbox) -> Result<Workflow, WorkflowError> {
    let agent = toolbox.agent("research");
    let output = Schema::object()
        .field("summary", Schema::String)
        .field("researchData", Schema::Any)
        .build();

    let step = Step::from_fn("research", text_field("input"), output.clone(), move |input, ctx| {
        let agent = agent.clone();
        async move {
            let topic = str_field(&input, "input")?;
            let out = match gather_findings(&agent, topic).await {
                Ok((findings, object)) => {
                    let summary = render_summary(topic, &findings);
                    ctx.emit(summary.clone());
                    json!({ "summary": summary, "researchData": object })
                }
                Err(message) => {
                    tracing::warn!("[Research] Research on '{}' failed: {}", topic, message);
                    json!({
                        "summary": format!("Error: {}", message),
                        "researchData": { "error": message },
                    })
                }
            };
            Ok(StepOutcome::Completed(out))
        }
    });

    create_workflow("research-workflow")
        .description("Researches a medical topic and summarises the findings")
        .input_schema(text_field("input"))
        .output_schema(output)
        .then(step)
        .commit()
}

#[cfg(test)]
pub(crate) fn sample_findings() -> Value {
    json!({
        "queries": ["ibuprofen efficacy"],
        "searchResults": [
            { "title": "Trial A", "url": "https://example.org/a", "relevance": "high" }
        ],
        "learnings": [
            { "learning": "Works for pain", "followUpQuestions": ["Dose?", "Duration?"], "source": "Trial A" }
        ],
        "completedQueries": ["ibuprofen efficacy"],
        "phase": "done"
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::schema::validate;

    #[test]
    fn test_sample_matches_schema() {
        assert!(validate(&findings_schema(), sample_findings()).is_ok());
    }

    #[test]
    fn test_render_summary_sections() {
        let findings: ResearchFindings = serde_json::from_value(sample_findings()).unwrap();
        let summary = render_summary("ibuprofen", &findings);
        assert!(summary.starts_with("Research completed on \"ibuprofen\":\n\n## Queries\n1. ibuprofen efficacy\n"));
        assert!(summary.contains("1. [Trial A](https://example.org/a) (high)"));
        assert!(summary.contains("   - Source: Trial A\n   - Follow-up: Dose?; Duration?\n"));
        assert!(summary.contains("## Completed Queries\n1. ibuprofen efficacy\n"));
        assert!(summary.ends_with("## Phase\ndone\n"));
    }

    #[test]
    fn test_render_summary_skips_empty_sections() {
        let findings = ResearchFindings {
            queries: vec![],
            search_results: vec![],
            learnings: vec![],
            completed_queries: vec![],
            phase: None,
        };
        assert_eq!(render_summary("x", &findings), "Research completed on \"x\":\n\n");
    }
}
