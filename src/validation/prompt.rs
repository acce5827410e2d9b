//! Judge prompt construction.
//!
//! Pure functions: identical inputs always produce an identical prompt.

use crate::model::{ContextDocument, Criterion, EvaluationRequest};

/// Render context documents as `Source:` / `Content:` blocks separated by blank lines.
pub fn format_context(documents: &[ContextDocument]) -> String {
    if documents.is_empty() {
        return "No context documents were provided.".to_string();
    }

    documents
        .iter()
        .map(|doc| format!("Source: {}\nContent: {}", doc.source_id, doc.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_criteria(criteria: &[Criterion]) -> String {
    criteria
        .iter()
        .map(|c| {
            if c.description.is_empty() {
                format!("- {}", c.name)
            } else {
                format!("- {}: {}", c.name, c.description)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn response_schema(criteria: &[Criterion]) -> String {
    let overall =
        r#"  "overall": {"score": <1-100>, "explanation": "<brief overall assessment>"}"#;

    if criteria.is_empty() {
        return format!("{{\n{}\n}}", overall);
    }

    let entries = criteria
        .iter()
        .map(|c| {
            format!(
                r#"    "{}": {{"score": <1-100>, "explanation": "<brief explanation>"}}"#,
                c.name
            )
        })
        .collect::<Vec<_>>()
        .join(",\n");

    format!("{{\n  \"criteria\": {{\n{}\n  }},\n{}\n}}", entries, overall)
}

/// Build the prompt asking the judge to score `answer` for `request`.
pub fn build_evaluation_prompt(request: &EvaluationRequest, answer: &str) -> String {
    let criteria_section = if request.criteria.is_empty() {
        "Give a single overall assessment of the answer's quality.".to_string()
    } else {
        format!(
            "Evaluate the answer on each of these criteria:\n{}\n\nThen give an overall assessment.",
            format_criteria(&request.criteria)
        )
    };

    format!(
        r#"You are an expert judge evaluating an answer produced by a retrieval-augmented generation system.

Question: {}

Context Documents:
{}

Answer to Evaluate:
{}

{}

Score from 1 (very poor) to 100 (excellent). Base your judgement on the context documents; penalize claims the context does not support.

Respond in JSON format:
{}

Respond with only the JSON, no other text."#,
        request.query.trim(),
        format_context(&request.context_documents),
        answer.trim(),
        criteria_section,
        response_schema(&request.criteria)
    )
}
