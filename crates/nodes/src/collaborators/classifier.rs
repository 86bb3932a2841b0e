use async_trait::async_trait;
use pipeline::{Classification, Classifier, CollaboratorError, LogEntry};

use super::{describe_log, prompts};
use crate::LlmGateway;

/// [`Classifier`] backed by an LLM.
pub struct LlmClassifier {
    gateway: LlmGateway,
}

impl LlmClassifier {
    pub const NAME: &'static str = "llm-classifier";

    pub fn new(gateway: LlmGateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn classify(&self, log: &LogEntry) -> Result<Classification, CollaboratorError> {
        let prompt = format!(
            "Analyse this log and decide whether it is a bug that needs an issue.\n\n{}\n{}",
            describe_log(log),
            prompts::CLASSIFIER_FORMAT
        );
        let classification: Classification = self
            .gateway
            .complete_json(Self::NAME, prompts::CLASSIFIER_SYSTEM, prompt)
            .await?;
        classification
            .validate()
            .map_err(|detail| CollaboratorError::malformed(Self::NAME, detail))?;
        Ok(classification)
    }
}
