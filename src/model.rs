//! Core data model: evaluation requests, candidate answers and token usage.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A context document handed to both the candidate models and the judge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDocument {
    /// Identifier shown to the judge for attribution (usually a file name).
    pub source_id: String,
    /// Extracted plain text.
    pub text: String,
}

impl ContextDocument {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
        }
    }
}

/// A named evaluation criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    /// Normalized criterion name.
    pub name: String,
    /// Optional guidance for the judge.
    pub description: String,
}

impl Criterion {
    /// Create a criterion; the name is normalized.
    pub fn new(name: &str, description: impl Into<String>) -> Self {
        Self {
            name: normalize_criterion_name(name),
            description: description.into(),
        }
    }

    /// Parse a free-form criteria list such as `"Accuracy, Clarity"`.
    ///
    /// Items are separated by commas or newlines. An item of the form
    /// `Name: description` carries a description.
    pub fn parse_list(text: &str) -> Vec<Criterion> {
        text.split([',', '\n'])
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| match item.split_once(':') {
                Some((name, description)) if !name.trim().is_empty() => {
                    Criterion::new(name, description.trim())
                }
                _ => Criterion::new(item, ""),
            })
            .collect()
    }
}

/// Normalize a criterion name so differently-cased judge output lands on one key.
///
/// Trims, collapses inner whitespace, upper-cases the first character and
/// lower-cases the rest. Applying it twice yields the same name.
pub fn normalize_criterion_name(name: &str) -> String {
    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };

    // Multi-char expansions ('ß' -> "SS") would break idempotence.
    let mut upper = first.to_uppercase();
    let head = match (upper.next(), upper.next()) {
        (Some(single), None) => single,
        _ => first,
    };

    std::iter::once(head)
        .chain(chars.flat_map(char::to_lowercase))
        .collect()
}

/// Immutable input shared by every judge call of a validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    /// The user question.
    pub query: String,
    /// Ordered context documents.
    pub context_documents: Vec<ContextDocument>,
    /// Ordered evaluation criteria.
    pub criteria: Vec<Criterion>,
}

impl EvaluationRequest {
    pub fn new(
        query: impl Into<String>,
        context_documents: Vec<ContextDocument>,
        criteria: Vec<Criterion>,
    ) -> Self {
        Self {
            query: query.into(),
            context_documents,
            criteria,
        }
    }

    /// Names of the requested criteria, in order.
    pub fn criterion_names(&self) -> Vec<&str> {
        self.criteria.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Token counts for one model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
    /// True when the counts were estimated from text rather than reported.
    pub estimated: bool,
}

impl TokenUsage {
    pub fn reported(input: u32, output: u32) -> Self {
        Self {
            input,
            output,
            estimated: false,
        }
    }

    /// Estimate usage from the prompt and answer text.
    pub fn estimate(prompt: &str, answer: &str) -> Self {
        Self {
            input: u32::try_from(estimate_tokens(prompt)).unwrap_or(u32::MAX),
            output: u32::try_from(estimate_tokens(answer)).unwrap_or(u32::MAX),
            estimated: true,
        }
    }

    pub fn total(&self) -> u32 {
        self.input.saturating_add(self.output)
    }
}

/// Estimate token count from text (rough approximation: words / 0.75).
pub fn estimate_tokens(text: &str) -> usize {
    let word_count = text.split_whitespace().count();
    (word_count as f64 / 0.75) as usize
}

/// One candidate model's answer. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub model_id: String,
    pub answer_text: String,
    pub token_usage: Option<TokenUsage>,
    pub response_time_ms: u64,
}

impl ModelResponse {
    pub fn new(model_id: impl Into<String>, answer_text: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            answer_text: answer_text.into(),
            token_usage: None,
            response_time_ms: 0,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.token_usage = Some(usage);
        self
    }

    pub fn with_response_time(mut self, millis: u64) -> Self {
        self.response_time_ms = millis;
        self
    }
}

/// Where an ingested answer's text came from.
///
/// Resolved once when answers are read from external JSON so later stages
/// never inspect the raw shape again.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerSource {
    /// A plain string, or a string field directly on the object.
    Direct(String),
    /// A string nested one level down (`answer.text`, `response.content`).
    Nested(String),
    /// An unrecognized shape, kept verbatim.
    Unknown(Value),
}

const DIRECT_FIELDS: [&str; 4] = ["answer", "response", "text", "content"];
const NESTED_PARENTS: [&str; 2] = ["answer", "response"];
const NESTED_FIELDS: [&str; 2] = ["text", "content"];

impl AnswerSource {
    /// Classify a raw JSON answer value.
    pub fn from_value(value: Value) -> Self {
        if let Value::String(text) = value {
            return AnswerSource::Direct(text);
        }

        if let Value::Object(map) = &value {
            for field in DIRECT_FIELDS {
                if let Some(Value::String(text)) = map.get(field) {
                    return AnswerSource::Direct(text.clone());
                }
            }
            for parent in NESTED_PARENTS {
                if let Some(Value::Object(inner)) = map.get(parent) {
                    for field in NESTED_FIELDS {
                        if let Some(Value::String(text)) = inner.get(field) {
                            return AnswerSource::Nested(text.clone());
                        }
                    }
                }
            }
        }

        AnswerSource::Unknown(value)
    }

    /// The answer text to evaluate.
    pub fn into_text(self) -> String {
        match self {
            AnswerSource::Direct(text) | AnswerSource::Nested(text) => text,
            AnswerSource::Unknown(raw) => raw.to_string(),
        }
    }
}
