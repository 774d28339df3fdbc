//! Drug label lookup against the openFDA API.
//!
//! GET {base_url}/drug/label.json?search=...&api_key=...&limit=1
//!
//! Every failure is folded into the `info` text so the calling workflow can
//! still complete with a degraded answer.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::Tool;
use crate::workflow::schema::Schema;

pub const OPENFDA_BASE_URL: &str = "https://api.fda.gov";

const MISSING_KEY: &str = "API Error: OPENFDA_API_KEY is not set in environment variables.";

pub struct MedicalRetrievalTool {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl MedicalRetrievalTool {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: OPENFDA_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn lookup(&self, query: &str) -> String {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!("[MedicalRetrieval] OPENFDA_API_KEY missing, returning degraded info");
            return MISSING_KEY.to_string();
        };

        match self.fetch(query, api_key).await {
            Ok(body) => format_label(query, &body),
            Err(message) => {
                tracing::warn!("[MedicalRetrieval] openFDA lookup for '{}' failed: {}", query, message);
                format!("API Error: {}", message)
            }
        }
    }

    async fn fetch(&self, query: &str, api_key: &str) -> Result<Value, String> {
        let url = format!("{}/drug/label.json", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[
                ("search", search_expression(query).as_str()),
                ("api_key", api_key),
                ("limit", "1"),
            ])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        let body: Value = response.json().await.map_err(|e| e.to_string())?;
        if !status.is_success() {
            return Err(body["error"]["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("API request failed with status {}", status.as_u16())));
        }
        Ok(body)
    }
}

fn search_expression(query: &str) -> String {
    format!(
        "(openfda.generic_name:\"{q}\" OR openfda.brand_name:\"{q}\") OR (description:\"{q}\" OR indications_and_usage:\"{q}\")",
        q = query
    )
}

/// Render the first label hit, or the not-found text.
fn format_label(query: &str, body: &Value) -> String {
    let Some(label) = body["results"].as_array().and_then(|r| r.first()) else {
        return format!("No drug label information found for: {}", query);
    };

    let first = |v: &Value| v.as_array().and_then(|a| a.first()).and_then(Value::as_str).map(str::to_string);
    let generic = first(&label["openfda"]["generic_name"]).unwrap_or_else(|| "N/A".to_string());
    let brand = first(&label["openfda"]["brand_name"]).unwrap_or_else(|| "N/A".to_string());
    let indications =
        first(&label["indications_and_usage"]).unwrap_or_else(|| "No indications listed.".to_string());
    let excerpt: String = indications.chars().take(300).collect();

    format!(
        "Found info for: {}. Generic Name: {}. Brand Name: {}. Indications: {}...",
        query, generic, brand, excerpt
    )
}

#[async_trait]
impl Tool for MedicalRetrievalTool {
    fn id(&self) -> &str {
        "medical-retrieval"
    }

    fn description(&self) -> &str {
        "Fetches drug label information from the openFDA API."
    }

    fn input_schema(&self) -> Schema {
        Schema::object()
            .field("query", Schema::String)
            .describe("The generic or brand name of the drug to look up.")
            .build()
    }

    fn output_schema(&self) -> Schema {
        Schema::object()
            .field("info", Schema::String)
            .describe("A summary of the drug information found or an error message.")
            .build()
    }

    async fn execute(&self, input: Value) -> Value {
        let query = input["query"].as_str().unwrap_or_default();
        json!({ "info": self.lookup(query).await })
    }
}
