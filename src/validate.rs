//! Document validation.
//!
//! Scores a structured document (a JSON object of section/field name to
//! content) against the parts its template requires. Scoring depends on the
//! document type:
//!
//! | Type | Missing part | Severity | Suggestions |
//! |------|--------------|----------|-------------|
//! | `proposal` | −20 | high | testimonials, milestones (when complete) |
//! | `technical_doc` | −20 | high | code examples, diagrams |
//! | `jira_ticket` | −15 | medium | acceptance criteria (stories) |
//! | anything else | n/a | n/a | specific-type hint; empty content scores 0 |
//!
//! The score is floored at 0. A document is valid when no issue is high
//! severity.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PipelineError, Result};
use crate::templates::{Template, TemplateCatalog};

const PROPOSAL_DEFAULT_SECTIONS: &[&str] = &[
    "executive_summary",
    "project_overview",
    "scope_of_work",
    "timeline",
    "budget_estimate",
];
const JIRA_DEFAULT_FIELDS: &[&str] = &["summary", "description", "priority"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub score: f64,
    pub issues: Vec<ValidationIssue>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationRequest {
    pub document_type: String,
    /// Template key within the document type; type defaults apply when absent.
    #[serde(default)]
    pub template: Option<String>,
    pub content: Map<String, Value>,
}

/// Validates `request` against the catalog. Fails only when a named
/// template does not exist.
pub fn validate_request(
    catalog: &TemplateCatalog,
    request: &ValidationRequest,
) -> Result<ValidationReport> {
    let template = match &request.template {
        Some(key) => Some(catalog.get(&request.document_type, key).ok_or_else(|| {
            PipelineError::InvalidRequest(format!(
                "template '{}' not found for document type '{}'",
                key, request.document_type
            ))
        })?),
        None => None,
    };
    Ok(validate(
        &request.document_type,
        request.template.as_deref(),
        template,
        &request.content,
    ))
}

pub fn validate(
    doc_type: &str,
    template_key: Option<&str>,
    template: Option<&Template>,
    content: &Map<String, Value>,
) -> ValidationReport {
    let required = |defaults: &[&str]| -> Vec<String> {
        match template {
            Some(t) => t.parts().to_vec(),
            None => defaults.iter().map(|s| s.to_string()).collect(),
        }
    };

    let mut issues = Vec::new();
    let mut suggestions = Vec::new();
    let mut score = 100.0;

    match doc_type {
        "proposal" => {
            for section in required(PROPOSAL_DEFAULT_SECTIONS) {
                if is_missing(content, &section) {
                    issues.push(missing("missing_section", Severity::High, &section));
                    score -= 20.0;
                }
            }
            if issues.is_empty() {
                suggestions.push("Consider adding client testimonials or case studies".to_string());
                suggestions.push("Include detailed project milestones".to_string());
            }
        }
        "technical_doc" => {
            for section in required(&[]) {
                if is_missing(content, &section) {
                    issues.push(missing("missing_section", Severity::High, &section));
                    score -= 20.0;
                }
            }
            suggestions.push("Consider adding code examples".to_string());
            suggestions.push("Include diagrams or flowcharts".to_string());
        }
        "jira_ticket" => {
            for field in required(JIRA_DEFAULT_FIELDS) {
                if is_missing(content, &field) {
                    issues.push(missing("missing_field", Severity::Medium, &field));
                    score -= 15.0;
                }
            }
            let is_story = template_key == Some("story")
                || content.get("ticket_type").and_then(Value::as_str) == Some("story");
            if is_story && is_missing(content, "acceptance_criteria") {
                suggestions.push("User stories should include acceptance criteria".to_string());
            }
        }
        _ => {
            score = 85.0;
            if content.is_empty() {
                issues.push(ValidationIssue {
                    kind: "empty_content".to_string(),
                    severity: Severity::High,
                    message: "Document content is empty".to_string(),
                });
                score = 0.0;
            }
            suggestions.push("Consider using specific document type validation".to_string());
        }
    }

    let is_valid = !issues.iter().any(|i| i.severity == Severity::High);
    ValidationReport {
        is_valid,
        score: f64::max(0.0, score),
        issues,
        suggestions,
    }
}

fn missing(kind: &str, severity: Severity, name: &str) -> ValidationIssue {
    let noun = if kind == "missing_field" { "field" } else { "section" };
    ValidationIssue {
        kind: kind.to_string(),
        severity,
        message: format!("Required {} '{}' is missing or empty", noun, name),
    }
}

fn is_missing(content: &Map<String, Value>, key: &str) -> bool {
    match content.get(key) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn complete_proposal_scores_full_with_suggestions() {
        let content = obj(json!({
            "executive_summary": "x",
            "project_overview": "x",
            "scope_of_work": ["a"],
            "timeline": "Q3",
            "budget_estimate": "40k"
        }));
        let report = validate("proposal", None, None, &content);
        assert!(report.is_valid);
        assert_eq!(report.score, 100.0);
        assert_eq!(report.suggestions.len(), 2);
    }

    #[test]
    fn proposal_missing_sections_is_invalid() {
        let content = obj(json!({ "executive_summary": "x", "timeline": "  " }));
        let report = validate("proposal", None, None, &content);
        assert!(!report.is_valid);
        assert_eq!(report.issues.len(), 4);
        assert_eq!(report.score, 20.0);
        assert_eq!(report.issues[0].kind, "missing_section");
        assert!(report.suggestions.is_empty());
    }

    #[test]
    fn template_parts_replace_defaults() {
        let catalog = TemplateCatalog::builtin();
        let template = catalog.get("proposal", "standard");
        let report = validate("proposal", Some("standard"), template, &Map::new());
        assert_eq!(report.issues.len(), 8);
        assert_eq!(report.score, 0.0);
    }

    #[test]
    fn jira_issues_are_medium_and_do_not_invalidate() {
        let content = obj(json!({ "summary": "Login", "ticket_type": "story" }));
        let report = validate("jira_ticket", None, None, &content);
        assert!(report.is_valid);
        assert_eq!(report.score, 70.0);
        assert!(report.issues.iter().all(|i| i.severity == Severity::Medium));
        assert_eq!(
            report.suggestions,
            vec!["User stories should include acceptance criteria".to_string()]
        );
    }

    #[test]
    fn technical_doc_without_template_is_valid() {
        let report = validate("technical_doc", None, None, &Map::new());
        assert!(report.is_valid);
        assert_eq!(report.score, 100.0);
        assert_eq!(report.suggestions.len(), 2);
    }

    #[test]
    fn generic_documents() {
        let report = validate("memo", None, None, &obj(json!({ "body": "hi" })));
        assert_eq!(report.score, 85.0);
        assert!(report.is_valid);

        let report = validate("memo", None, None, &Map::new());
        assert_eq!(report.score, 0.0);
        assert!(!report.is_valid);
        assert_eq!(report.issues[0].kind, "empty_content");
    }

    #[test]
    fn unknown_template_is_bad_request() {
        let request = ValidationRequest {
            document_type: "proposal".into(),
            template: Some("nope".into()),
            content: Map::new(),
        };
        let err = validate_request(&TemplateCatalog::builtin(), &request).unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }

    #[test]
    fn issue_serializes_with_type_key() {
        let issue = missing("missing_field", Severity::Medium, "priority");
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["type"], "missing_field");
        assert_eq!(json["severity"], "medium");
    }
}
