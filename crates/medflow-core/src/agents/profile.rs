//! Agent profiles — who an agent is and how it should answer.
//!
//! Profiles can be defined in YAML and dropped into `./agents/` or
//! `~/.medflow/agents/`:
//!
//! ```yaml
//! id: "classifier"
//! name: "Classifier Agent"
//! description: "Classifies queries into general_need, product_lookup, compare, or research"
//! model: "gpt-4o"
//! instructions: |
//!   You are a classifier. Categorize the query into one of:
//!   - "general_need"
//!   - "product_lookup"
//! ```
//!
//! Anything not found on disk falls back to the built-in set.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Profile ID (e.g., "classifier", "pricing-expert")
    pub id: String,

    /// Display name
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// System instructions sent with every call
    pub instructions: String,

    /// Model override; the invoker's default is used when absent
    #[serde(default)]
    pub model: Option<String>,

    /// Tool ids this agent works with
    #[serde(default)]
    pub tools: Vec<String>,
}

impl AgentProfile {
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        serde_yaml::from_str(yaml).map_err(|e| format!("Failed to parse agent profile YAML: {}", e))
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read agent profile '{}': {}", path.display(), e))?;
        Self::from_yaml(&content)
    }
}

/// Loads agent profiles from directories, with built-ins as fallback.
#[derive(Debug, Clone, Default)]
pub struct ProfileLoader {
    profiles: HashMap<String, AgentProfile>,
}

impl ProfileLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-ins plus whatever the default directories (and `extra_dir`)
    /// override.
    pub fn resolve(extra_dir: Option<&str>) -> Self {
        let mut loader = Self::new();
        for builtin in Self::builtin_profiles() {
            loader.insert(builtin);
        }
        loader.load_default_dirs();
        if let Some(dir) = extra_dir {
            if let Err(e) = loader.load_dir(dir) {
                tracing::warn!("[ProfileLoader] {}", e);
            }
        }
        loader
    }

    pub fn insert(&mut self, profile: AgentProfile) {
        self.profiles.insert(profile.id.clone(), profile);
    }

    /// Load all `*.yaml` / `*.yml` profiles from a directory.
    pub fn load_dir(&mut self, dir: &str) -> Result<usize, String> {
        let dir_path = Path::new(dir);
        if !dir_path.is_dir() {
            return Err(format!("Agent profile directory '{}' does not exist", dir));
        }

        let mut count = 0;
        for entry in std::fs::read_dir(dir_path)
            .map_err(|e| format!("Failed to read directory '{}': {}", dir, e))?
        {
            let entry = entry.map_err(|e| format!("Directory entry error: {}", e))?;
            let path = entry.path();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if !matches!(ext, "yaml" | "yml") {
                continue;
            }

            let profile = AgentProfile::from_file(&path)?;
            tracing::info!("[ProfileLoader] Loaded agent profile: {} ({})", profile.id, profile.name);
            self.insert(profile);
            count += 1;
        }

        Ok(count)
    }

    /// Checks `./agents/` and `~/.medflow/agents/`.
    pub fn load_default_dirs(&mut self) -> usize {
        let mut search_paths = vec![PathBuf::from("agents")];
        if let Some(home) = dirs::home_dir() {
            search_paths.push(home.join(".medflow").join("agents"));
        }

        let mut total = 0;
        for dir in &search_paths {
            if !dir.is_dir() {
                continue;
            }
            let dir = dir.to_string_lossy();
            match self.load_dir(&dir) {
                Ok(n) => {
                    tracing::info!("[ProfileLoader] Loaded {} profiles from '{}'", n, dir);
                    total += n;
                }
                Err(e) => {
                    tracing::warn!("[ProfileLoader] Failed to load from '{}': {}", dir, e);
                }
            }
        }
        total
    }

    pub fn get(&self, id: &str) -> Option<&AgentProfile> {
        self.profiles.get(id)
    }

    /// All profiles, sorted by id.
    pub fn all(&self) -> Vec<&AgentProfile> {
        let mut all: Vec<&AgentProfile> = self.profiles.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Profiles that need no files on disk.
    pub fn builtin_profiles() -> Vec<AgentProfile> {
        fn profile(id: &str, name: &str, description: &str, model: &str, tools: &[&str], instructions: &str) -> AgentProfile {
            AgentProfile {
                id: id.to_string(),
                name: name.to_string(),
                description: Some(description.to_string()),
                instructions: instructions.to_string(),
                model: Some(model.to_string()),
                tools: tools.iter().map(|t| t.to_string()).collect(),
            }
        }

        vec![
            profile(
                "classifier",
                "Classifier Agent",
                "Classifies queries into general_need, product_lookup, compare, or research",
                "gpt-4o",
                &[],
                "You are a classifier. Categorize the query into one of:\n\
                 - \"general_need\"\n\
                 - \"product_lookup\"\n\
                 - \"compare\"\n\
                 - \"research\"\n\
                 Answer with the category only.",
            ),
            profile(
                "medicine-info",
                "Medicine Info Agent",
                "Provides info based on general health needs (pain relief, cold, etc.)",
                "gpt-4o",
                &["medical-retrieval"],
                "Provide precise medical information for general needs. \
                 Ground your answer in the drug label information you are given.",
            ),
            profile(
                "product-lookup",
                "Product Lookup Agent",
                "Fetches detailed info about a specific drug/product",
                "gpt-4o",
                &["pricing-lookup"],
                "Look up drug information including cost, availability, and alternatives.",
            ),
            profile(
                "comparison",
                "Comparison Agent",
                "Compares multiple drugs side by side",
                "gpt-4o",
                &["comparison-tool"],
                "Return a comparison of the given products.",
            ),
            profile(
                "research",
                "Research Agent",
                "Fetches research articles and clinical trials related to a medicine",
                "gpt-4o",
                &["medical-retrieval"],
                "Summarize clinical trial and research information with citations.",
            ),
            profile(
                "pricing-expert",
                "Pricing Expert Agent",
                "Estimates drug prices and availability",
                "gpt-4o-mini",
                &[],
                "You are a pharmaceutical pricing expert. Given a drug name, provide a realistic, \
                 estimated cash price range for it in the United States. Also, state whether it is \
                 typically available \"OTC\" (over-the-counter) or \"Prescription\". \
                 Respond only with the JSON object.",
            ),
            profile(
                "medical-tool",
                "Medical Tool Agent",
                "Answers drug questions using the medical-retrieval tool only",
                "gpt-4o-mini",
                &["medical-retrieval"],
                "You are a specialized assistant. Your only job is to use the medical-retrieval tool \
                 to answer the user's query about a drug.",
            ),
            profile(
                "report",
                "Report Agent",
                "Writes a report from structured research findings",
                "gpt-4o",
                &[],
                "You write clear, well-structured reports in Markdown from research findings. \
                 Cite the sources you are given.",
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profile_yaml() {
        let yaml = r#"
id: "classifier"
name: "Strict Classifier"
model: "gpt-4o-mini"
instructions: |
  Reply with one word.
tools: ["medical-retrieval"]
"#;
        let profile = AgentProfile::from_yaml(yaml).unwrap();
        assert_eq!(profile.id, "classifier");
        assert_eq!(profile.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(profile.tools, vec!["medical-retrieval"]);
        assert!(profile.description.is_none());
    }

    #[test]
    fn test_builtin_profiles() {
        let builtins = ProfileLoader::builtin_profiles();
        for id in [
            "classifier",
            "medicine-info",
            "product-lookup",
            "comparison",
            "research",
            "pricing-expert",
            "medical-tool",
            "report",
        ] {
            assert!(builtins.iter().any(|p| p.id == id), "missing builtin {id}");
        }
    }

    #[test]
    fn test_load_dir_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("classifier.yaml"),
            "id: classifier\nname: Custom\ninstructions: custom\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loader = ProfileLoader::resolve(dir.path().to_str());
        assert_eq!(loader.get("classifier").unwrap().name, "Custom");
        assert!(loader.get("pricing-expert").is_some());
    }

    #[test]
    fn test_load_dir_rejects_missing_directory() {
        let mut loader = ProfileLoader::new();
        assert!(loader.load_dir("/nonexistent/medflow/agents").is_err());
    }
}
