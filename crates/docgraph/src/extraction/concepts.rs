//! Concept extraction with a JSON-mode LLM call

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::ExtractionConfig;
use crate::error::{Error, Result};
use crate::providers::LlmProvider;

/// Extracts salient concepts and named entities from text.
///
/// Extraction is best effort: [`ConceptExtractor::extract`] never fails and
/// returns an empty list whenever the model call or its output is unusable.
pub struct ConceptExtractor {
    llm: Arc<dyn LlmProvider>,
    config: ExtractionConfig,
}

impl ConceptExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>, config: ExtractionConfig) -> Self {
        Self { llm, config }
    }

    /// Concepts mentioned in `text`, or an empty list on any failure
    pub async fn extract(&self, text: &str) -> Vec<String> {
        match self.try_extract(text).await {
            Ok(concepts) => concepts,
            Err(e) => {
                tracing::warn!("Concept extraction failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Same as [`extract`](Self::extract) but surfaces the failure reason
    pub async fn try_extract(&self, text: &str) -> Result<Vec<String>> {
        if text.trim().chars().count() < self.config.min_input_chars {
            return Ok(Vec::new());
        }

        let prompt = build_prompt(truncate_chars(text, self.config.max_input_chars));
        let output = self.llm.generate_json(&prompt).await?;

        parse_concepts(&output, self.config.max_concepts).map_err(|e| {
            tracing::debug!("Unparseable model output: {}", output);
            e
        })
    }
}

/// First `max_chars` characters of `text`
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

fn build_prompt(text: &str) -> String {
    format!(
        r#"You are an expert data analyst. Extract the key business concepts and named entities (companies, people, locations, products, figures) from the text below.
Return ONLY a JSON object with a single key "concepts" whose value is a list of strings. Do not add any explanation.

Example:
{{"concepts": ["Samsung Electronics", "Revenue", "2024", "Growth"]}}

Text:
{}"#,
        text
    )
}

/// Parse `{"concepts": [...]}` output.
///
/// A missing or non-list `concepts` key yields an empty list. Elements are
/// coerced to strings, trimmed, de-duplicated and capped at `max_concepts`.
pub fn parse_concepts(output: &str, max_concepts: usize) -> Result<Vec<String>> {
    let value: Value = serde_json::from_str(output.trim())
        .map_err(|e| Error::model(format!("Model output is not JSON: {}", e)))?;

    let Some(items) = value.get("concepts").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    let mut seen = HashSet::new();
    let concepts = items
        .iter()
        .map(|item| match item {
            Value::String(s) => s.trim().to_string(),
            Value::Null => String::new(),
            other => other.to_string(),
        })
        .filter(|c| !c.is_empty())
        .filter(|c| seen.insert(c.clone()))
        .take(max_concepts)
        .collect();

    Ok(concepts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockLlmProvider;

    fn extractor(mock: MockLlmProvider) -> ConceptExtractor {
        ConceptExtractor::new(Arc::new(mock), ExtractionConfig::default())
    }

    #[tokio::test]
    async fn test_short_input_skips_model() {
        let mut mock = MockLlmProvider::new();
        mock.expect_generate_json().times(0);

        let extractor = extractor(mock);
        assert!(extractor.extract("   tiny    ").await.is_empty());
        assert!(extractor.extract("").await.is_empty());
    }

    #[tokio::test]
    async fn test_extracts_concepts() {
        let mut mock = MockLlmProvider::new();
        mock.expect_generate_json()
            .times(1)
            .withf(|prompt| prompt.contains("Samsung Electronics announced"))
            .returning(|_| Ok(r#"{"concepts": ["Samsung Electronics", "Revenue", 2024]}"#.to_string()));

        let concepts = extractor(mock)
            .extract("Samsung Electronics announced a 15% increase in annual revenue for 2024.")
            .await;
        assert_eq!(concepts, vec!["Samsung Electronics", "Revenue", "2024"]);
    }

    #[tokio::test]
    async fn test_malformed_output_degrades_to_empty() {
        let mut mock = MockLlmProvider::new();
        mock.expect_generate_json()
            .returning(|_| Ok("Sure! Here are the concepts: Revenue, Growth".to_string()));

        let extractor = extractor(mock);
        let text = "Quarterly revenue grew strongly in every region.";
        assert!(extractor.extract(text).await.is_empty());
        assert!(matches!(extractor.try_extract(text).await, Err(Error::Model(_))));
    }

    #[tokio::test]
    async fn test_transport_failure_degrades_to_empty() {
        let mut mock = MockLlmProvider::new();
        mock.expect_generate_json()
            .returning(|_| Err(Error::model("connection refused")));

        assert!(extractor(mock)
            .extract("Quarterly revenue grew strongly in every region.")
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_long_input_is_truncated() {
        let mut mock = MockLlmProvider::new();
        mock.expect_generate_json()
            .withf(|prompt| prompt.contains(&"가".repeat(4000)) && !prompt.contains(&"가".repeat(4001)))
            .returning(|_| Ok(r#"{"concepts": []}"#.to_string()));

        let text = "가".repeat(5000);
        assert!(extractor(mock).extract(&text).await.is_empty());
    }

    #[test]
    fn test_parse_concepts_shapes() {
        assert!(parse_concepts(r#"{"entities": ["a"]}"#, 10).unwrap().is_empty());
        assert!(parse_concepts(r#"{"concepts": "Revenue"}"#, 10).unwrap().is_empty());
        assert!(parse_concepts("[]", 10).unwrap().is_empty());
        assert!(parse_concepts("not json", 10).is_err());

        let concepts =
            parse_concepts(r#"{"concepts": [" Revenue ", "Revenue", "", null, true, 1.5]}"#, 10).unwrap();
        assert_eq!(concepts, vec!["Revenue", "true", "1.5"]);

        let capped = parse_concepts(r#"{"concepts": ["a", "b", "c"]}"#, 2).unwrap();
        assert_eq!(capped, vec!["a", "b"]);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hi", 10), "hi");
        assert_eq!(truncate_chars("한국어", 2), "한국");
    }
}
