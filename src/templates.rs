//! Document template catalog.
//!
//! A [`TemplateCatalog`] maps a document type (`proposal`, `technical_doc`,
//! `jira_ticket`) to named templates, each listing the sections (or, for
//! tickets, the fields) a finished document must carry. The catalog is
//! immutable: it is built once at startup, from the built-in defaults or a
//! TOML file at `templates.path`, and passed explicitly to whoever needs it.
//!
//! # Override File
//!
//! ```toml
//! [proposal.standard]
//! name = "Standard Presale Proposal"
//! description = "Standard business proposal template"
//! sections = ["executive_summary", "project_overview", "timeline"]
//!
//! [jira_ticket.bug]
//! name = "Bug Report"
//! description = "Defect report"
//! fields = ["summary", "reproduction_steps", "expected_behavior"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// One template: a display name plus its required parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

impl Template {
    fn new(name: &str, description: &str, sections: &[&str], fields: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            sections: sections.iter().map(|s| s.to_string()).collect(),
            fields: fields.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Sections if the template has any, otherwise fields.
    pub fn parts(&self) -> &[String] {
        if self.sections.is_empty() {
            &self.fields
        } else {
            &self.sections
        }
    }
}

pub type TemplateSet = BTreeMap<String, Template>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateCatalog {
    types: BTreeMap<String, TemplateSet>,
}

impl TemplateCatalog {
    pub fn builtin() -> Self {
        let mut types = BTreeMap::new();

        let mut proposal = TemplateSet::new();
        proposal.insert(
            "standard".to_string(),
            Template::new(
                "Standard Presale Proposal",
                "Standard business proposal template",
                &[
                    "executive_summary",
                    "project_overview",
                    "scope_of_work",
                    "timeline",
                    "budget",
                    "team",
                    "deliverables",
                    "terms",
                ],
                &[],
            ),
        );
        proposal.insert(
            "technical".to_string(),
            Template::new(
                "Technical Proposal",
                "Technical-focused proposal template",
                &[
                    "technical_overview",
                    "architecture",
                    "implementation",
                    "testing",
                    "deployment",
                    "maintenance",
                ],
                &[],
            ),
        );
        types.insert("proposal".to_string(), proposal);

        let mut technical_doc = TemplateSet::new();
        technical_doc.insert(
            "api".to_string(),
            Template::new(
                "API Documentation",
                "REST API documentation template",
                &[
                    "introduction",
                    "authentication",
                    "endpoints",
                    "examples",
                    "error_handling",
                ],
                &[],
            ),
        );
        technical_doc.insert(
            "architecture".to_string(),
            Template::new(
                "System Architecture",
                "System architecture documentation template",
                &["overview", "components", "data_flow", "deployment", "security"],
                &[],
            ),
        );
        types.insert("technical_doc".to_string(), technical_doc);

        let mut jira_ticket = TemplateSet::new();
        jira_ticket.insert(
            "story".to_string(),
            Template::new(
                "User Story",
                "User story template for feature requests",
                &[],
                &["summary", "description", "acceptance_criteria", "story_points"],
            ),
        );
        jira_ticket.insert(
            "task".to_string(),
            Template::new(
                "Technical Task",
                "Technical task template",
                &[],
                &[
                    "summary",
                    "description",
                    "implementation_notes",
                    "definition_of_done",
                ],
            ),
        );
        types.insert("jira_ticket".to_string(), jira_ticket);

        Self { types }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let catalog: TemplateCatalog =
            toml::from_str(content).context("Failed to parse template catalog")?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// The built-in catalog, or the one in `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(Self::builtin()),
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read template file: {}", path.display()))?;
                Self::from_toml_str(&content)
                    .with_context(|| format!("Invalid template file: {}", path.display()))
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.types.is_empty() {
            bail!("template catalog defines no document types");
        }
        for (doc_type, set) in &self.types {
            if set.is_empty() {
                bail!("document type '{}' has no templates", doc_type);
            }
            for (key, template) in set {
                if template.parts().is_empty() {
                    bail!(
                        "template '{}.{}' must list sections or fields",
                        doc_type,
                        key
                    );
                }
            }
        }
        Ok(())
    }

    pub fn doc_types(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }

    pub fn templates(&self, doc_type: &str) -> Option<&TemplateSet> {
        self.types.get(doc_type)
    }

    pub fn get(&self, doc_type: &str, key: &str) -> Option<&Template> {
        self.types.get(doc_type).and_then(|set| set.get(key))
    }

    pub fn total(&self) -> usize {
        self.types.values().map(BTreeMap::len).sum()
    }

    /// Per-type template counts and keys.
    pub fn summary(&self) -> serde_json::Value {
        let types: serde_json::Map<String, serde_json::Value> = self
            .types
            .iter()
            .map(|(doc_type, set)| {
                (
                    doc_type.clone(),
                    serde_json::json!({
                        "count": set.len(),
                        "available": set.keys().collect::<Vec<_>>(),
                    }),
                )
            })
            .collect();
        serde_json::Value::Object(types)
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_shape() {
        let catalog = TemplateCatalog::builtin();
        assert_eq!(catalog.doc_types(), vec!["jira_ticket", "proposal", "technical_doc"]);
        assert_eq!(catalog.total(), 6);

        let standard = catalog.get("proposal", "standard").unwrap();
        assert_eq!(standard.name, "Standard Presale Proposal");
        assert_eq!(standard.parts().len(), 8);

        let story = catalog.get("jira_ticket", "story").unwrap();
        assert!(story.sections.is_empty());
        assert_eq!(story.parts()[2], "acceptance_criteria");
    }

    #[test]
    fn summary_lists_keys() {
        let summary = TemplateCatalog::builtin().summary();
        assert_eq!(summary["technical_doc"]["count"], 2);
        assert_eq!(
            summary["technical_doc"]["available"],
            serde_json::json!(["api", "architecture"])
        );
    }

    #[test]
    fn override_file_replaces_catalog() {
        let catalog = TemplateCatalog::from_toml_str(
            r#"
            [jira_ticket.bug]
            name = "Bug Report"
            fields = ["summary", "reproduction_steps"]
            "#,
        )
        .unwrap();
        assert_eq!(catalog.doc_types(), vec!["jira_ticket"]);
        assert_eq!(catalog.get("jira_ticket", "bug").unwrap().parts().len(), 2);
        assert!(catalog.get("proposal", "standard").is_none());
    }

    #[test]
    fn template_without_parts_rejected() {
        let err = TemplateCatalog::from_toml_str(
            r#"
            [proposal.empty]
            name = "Nothing"
            "#,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("sections or fields"));
    }

    #[test]
    fn builtin_serializes_like_the_toml_format() {
        let catalog = TemplateCatalog::builtin();
        let json = serde_json::to_value(&catalog).unwrap();
        assert_eq!(json["proposal"]["technical"]["name"], "Technical Proposal");
        assert!(json["jira_ticket"]["task"].get("sections").is_none());
    }
}
