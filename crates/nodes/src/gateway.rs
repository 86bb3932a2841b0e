//! LLM gateway: the single path every LLM-backed collaborator uses to turn a
//! prompt into a typed value.
//!
//! The gateway sends one completion request through the configured
//! [`LlmProvider`], pulls the first JSON object out of the reply (models like
//! to wrap JSON in Markdown fences or prose) and deserialises it. Anything
//! that cannot be parsed becomes [`CollaboratorError::Malformed`].

use std::sync::Arc;

use pipeline::{CollaboratorError, CompletionRequest, LlmProvider};
use serde::de::DeserializeOwned;

/// Default output budget per completion.
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Typed completions over an [`LlmProvider`].
#[derive(Clone)]
pub struct LlmGateway {
    provider: Arc<dyn LlmProvider>,
    max_tokens: u32,
    temperature: f32,
}

impl LlmGateway {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.2,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sends `prompt` and parses the reply as `T`.
    ///
    /// `collaborator` names the caller in errors.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        collaborator: &str,
        system: &str,
        prompt: String,
    ) -> Result<T, CollaboratorError> {
        let request = CompletionRequest {
            system: system.to_string(),
            prompt,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let completion = self.provider.complete(&request).await?;
        tracing::debug!(
            collaborator,
            model = %completion.model,
            chars = completion.text.len(),
            "completion received"
        );

        let json = extract_json(&completion.text).ok_or_else(|| {
            CollaboratorError::malformed(collaborator, "response contains no JSON object")
        })?;
        serde_json::from_str(json)
            .map_err(|e| CollaboratorError::malformed(collaborator, format!("invalid JSON: {e}")))
    }
}

/// Returns the first balanced JSON object in `text`.
///
/// Braces inside JSON strings are ignored, so a fenced block or a reply with
/// trailing commentary both yield just the object.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use pipeline::Completion;
    use serde::Deserialize;

    use super::*;

    struct Canned(&'static str);

    #[async_trait]
    impl LlmProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, CollaboratorError> {
            Ok(Completion {
                text: self.0.to_string(),
                model: "test-model".into(),
            })
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Answer {
        value: u32,
    }

    #[test]
    fn test_extract_from_fenced_block() {
        let text = "Here you go:\n```json\n{\"a\": {\"b\": 1}}\n```\nThanks";
        assert_eq!(extract_json(text), Some("{\"a\": {\"b\": 1}}"));
    }

    #[test]
    fn test_extract_ignores_braces_in_strings() {
        let text = r#"{"msg": "use } and { freely", "n": 2} trailing {"#;
        assert_eq!(extract_json(text), Some(r#"{"msg": "use } and { freely", "n": 2}"#));
    }

    #[test]
    fn test_extract_handles_escaped_quotes() {
        let text = r#"{"msg": "say \"}\" please"}"#;
        assert_eq!(extract_json(text), Some(text));
    }

    #[test]
    fn test_extract_unbalanced_returns_none() {
        assert_eq!(extract_json("{\"a\": 1"), None);
        assert_eq!(extract_json("no json here"), None);
    }

    #[tokio::test]
    async fn test_complete_json_parses_reply() {
        let gateway = LlmGateway::new(Arc::new(Canned("Sure! {\"value\": 7}")));
        let answer: Answer = gateway
            .complete_json("tester", "system", "prompt".into())
            .await
            .unwrap();
        assert_eq!(answer, Answer { value: 7 });
    }

    #[tokio::test]
    async fn test_complete_json_reports_malformed() {
        let gateway = LlmGateway::new(Arc::new(Canned("I cannot help with that.")));
        let err = gateway
            .complete_json::<Answer>("tester", "system", "prompt".into())
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Malformed { ref collaborator, .. } if collaborator == "tester"));
    }
}
