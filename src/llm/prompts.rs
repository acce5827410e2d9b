//! Prompt templates for answer generation.
//!
//! Templates use `{name}` placeholders filled by [`Prompts::render`]. The
//! judge prompt is assembled separately in `validation::prompt`.

/// Collection of prompts used when querying candidate models.
pub struct Prompts;

impl Prompts {
    /// System prompt for candidate models answering from context.
    pub fn system_rag_assistant() -> &'static str {
        "You are a helpful assistant that answers questions using only the provided context documents. If the context does not contain the answer, say so plainly. Cite the source of each fact you use."
    }

    /// System prompt for the judge model.
    pub fn system_judge() -> &'static str {
        "You are an impartial evaluator of question-answering systems. Always respond with valid JSON when requested."
    }

    /// User prompt for answering a query from context documents.
    pub fn answer_with_context() -> &'static str {
        r#"Answer the question using the context documents below.

Context Documents:
{context}

Question: {query}

Answer:"#
    }

    /// Connectivity check prompt.
    pub fn connection_check() -> &'static str {
        "Say 'hello' and nothing else."
    }

    /// Substitute `{name}` placeholders in a single pass.
    ///
    /// Substituted values are never rescanned, so a value containing
    /// `{query}` stays literal. Unknown placeholders are left as-is.
    pub fn render(template: &str, values: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let replaced = after.find('}').and_then(|close| {
                let name = &after[..close];
                values
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| (*value, close))
            });
            match replaced {
                Some((value, close)) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }

        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_are_not_empty() {
        assert!(!Prompts::system_rag_assistant().is_empty());
        assert!(!Prompts::system_judge().is_empty());
        assert!(!Prompts::answer_with_context().is_empty());
        assert!(!Prompts::connection_check().is_empty());
    }

    #[test]
    fn test_render_fills_placeholders() {
        let rendered = Prompts::render(
            Prompts::answer_with_context(),
            &[("context", "Source: a\nContent: b"), ("query", "why?")],
        );
        assert!(rendered.contains("Source: a\nContent: b"));
        assert!(rendered.contains("Question: why?"));
        assert!(!rendered.contains("{query}"));
    }

    #[test]
    fn test_render_does_not_rescan_values() {
        let rendered = Prompts::render("{a} and {b}", &[("a", "{b}"), ("b", "x")]);
        assert_eq!(rendered, "{b} and x");
    }

    #[test]
    fn test_render_keeps_unknown_and_unbalanced_braces() {
        assert_eq!(Prompts::render("{json} {", &[("x", "y")]), "{json} {");
        assert_eq!(Prompts::render("{\"k\": {x}}", &[("x", "1")]), "{\"k\": 1}");
    }
}
