//! Structured document generation.
//!
//! Builds a proposal, technical document or ticket one part at a time: for
//! every section (or field) of the chosen template the query engine is asked
//! a grounded question, and the answers become the document body. The
//! assembled document is then run through [`validate`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PipelineError, Result};
use crate::models::SourceRef;
use crate::query::QueryEngine;
use crate::templates::TemplateCatalog;
use crate::validate::{validate, ValidationReport};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateRequest {
    /// Template key; defaults to the first template of the type.
    #[serde(default)]
    pub template: Option<String>,
    /// Caller-supplied facts (client name, requirements, ...) woven into
    /// every question.
    #[serde(default)]
    pub inputs: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedSection {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedDocument {
    pub document_id: String,
    pub document_type: String,
    pub template: String,
    pub template_name: String,
    pub sections: Vec<GeneratedSection>,
    pub sources: Vec<SourceRef>,
    pub validation: ValidationReport,
    pub generated_at: String,
}

impl GeneratedDocument {
    /// Sections as a `name → text` object, the shape validation consumes.
    pub fn content(&self) -> Map<String, Value> {
        section_map(&self.sections)
    }
}

fn section_map(sections: &[GeneratedSection]) -> Map<String, Value> {
    sections
        .iter()
        .map(|s| (s.name.clone(), Value::String(s.text.clone())))
        .collect()
}

pub async fn generate_document(
    engine: &QueryEngine,
    catalog: &TemplateCatalog,
    doc_type: &str,
    request: &GenerateRequest,
) -> Result<GeneratedDocument> {
    let set = catalog.templates(doc_type).ok_or_else(|| {
        PipelineError::InvalidRequest(format!(
            "Document type '{}' not found. Available types: {}",
            doc_type,
            catalog.doc_types().join(", ")
        ))
    })?;
    let (key, template) = match &request.template {
        Some(key) => set.get_key_value(key.as_str()),
        None => set.iter().next(),
    }
    .ok_or_else(|| {
        PipelineError::InvalidRequest(format!(
            "template '{}' not found for document type '{}'. Available: {}",
            request.template.as_deref().unwrap_or_default(),
            doc_type,
            set.keys().cloned().collect::<Vec<_>>().join(", ")
        ))
    })?;

    let facts = describe_inputs(&request.inputs);
    let mut sections = Vec::with_capacity(template.parts().len());
    let mut sources = Vec::new();
    let mut seen = HashSet::new();

    for part in template.parts() {
        let question = section_question(&template.name, part, &facts);
        tracing::debug!(doc_type, template = %key, part = %part, "generating section");
        let answer = engine.ask(&question).await?;
        for source in answer.sources {
            if seen.insert(source.chunk_id.clone()) {
                sources.push(source);
            }
        }
        sections.push(GeneratedSection {
            name: part.clone(),
            text: answer.text.trim().to_string(),
        });
    }

    let validation = validate(doc_type, Some(key), Some(template), &section_map(&sections));
    let document = GeneratedDocument {
        document_id: uuid::Uuid::new_v4().to_string(),
        document_type: doc_type.to_string(),
        template: key.clone(),
        template_name: template.name.clone(),
        sections,
        sources,
        validation,
        generated_at: chrono::Utc::now().to_rfc3339(),
    };

    tracing::info!(
        document_id = %document.document_id,
        doc_type,
        template = %key,
        score = document.validation.score,
        "document generated"
    );
    Ok(document)
}

fn section_question(template_name: &str, part: &str, facts: &str) -> String {
    let title = part.replace('_', " ");
    let mut q = format!(
        "Write the \"{}\" part of a {} using only what the documents say.",
        title, template_name
    );
    if !facts.is_empty() {
        q.push_str("\nKnown details:\n");
        q.push_str(facts);
    }
    q
}

fn describe_inputs(inputs: &Map<String, Value>) -> String {
    inputs
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                Value::Array(items) => items
                    .iter()
                    .map(|i| i.as_str().map(str::to_string).unwrap_or_else(|| i.to_string()))
                    .collect::<Vec<_>>()
                    .join("; "),
                other => other.to_string(),
            };
            format!("- {}: {}", k.replace('_', " "), value)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn question_mentions_part_and_facts() {
        let facts = describe_inputs(
            json!({ "client_name": "Acme", "requirements": ["SSO", "audit log"], "budget": null })
                .as_object()
                .unwrap(),
        );
        assert_eq!(facts, "- client name: Acme\n- requirements: SSO; audit log");

        let q = section_question("Standard Presale Proposal", "scope_of_work", &facts);
        assert!(q.starts_with("Write the \"scope of work\" part of a Standard Presale Proposal"));
        assert!(q.ends_with("- requirements: SSO; audit log"));
    }

    #[test]
    fn question_without_facts() {
        let q = section_question("User Story", "summary", "");
        assert!(!q.contains("Known details"));
    }
}
