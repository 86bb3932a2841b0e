//! TOML configuration file and environment credentials.
//!
//! ```toml
//! [pipeline.review]
//! max_iterations = 3
//!
//! [github]
//! repository = "acme/shop"
//!
//! [llm]
//! model = "claude-3-5-sonnet-latest"
//! ```
//!
//! Every section is optional. Secrets are never read from the file.

use std::path::Path;

use anyhow::{bail, Context};
use pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "bugfinder.toml";

pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const DISCORD_WEBHOOK_URL: &str = "DISCORD_WEBHOOK_URL";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub pipeline: PipelineConfig,
    pub github: GithubSection,
    pub discord: DiscordSection,
    pub llm: LlmSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GithubSection {
    /// `owner/name`; may also be given with `--repository`.
    pub repository: Option<String>,
    pub api_url: String,
}

impl Default for GithubSection {
    fn default() -> Self {
        Self {
            repository: None,
            api_url: github::issues::DEFAULT_API_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscordSection {
    /// When false, notifications are logged instead of sent.
    pub enabled: bool,
}

impl Default for DiscordSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmSection {
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: f64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: llm::anthropic::DEFAULT_MODEL.to_string(),
            base_url: llm::anthropic::DEFAULT_BASE_URL.to_string(),
            max_tokens: nodes::DEFAULT_MAX_TOKENS,
            temperature: 0.2,
            timeout_seconds: 60.0,
        }
    }
}

impl FileConfig {
    /// Loads `path`. A missing file yields the defaults unless `required`.
    pub fn load(path: &Path, required: bool) -> anyhow::Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        let config: Self =
            toml::from_str(&text).with_context(|| format!("invalid config in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.pipeline.validate()?;
        let timeout = self.llm.timeout_seconds;
        if !(timeout > 0.0 && timeout <= pipeline::MAX_DURATION_SECONDS) {
            bail!("invalid configuration: llm.timeout_seconds: must be positive and at most 86400");
        }
        if self.llm.max_tokens == 0 {
            bail!("invalid configuration: llm.max_tokens: must be at least 1");
        }
        Ok(())
    }
}

/// Reads a required secret from the environment.
pub fn secret(name: &str) -> anyhow::Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => bail!("environment variable {name} is not set"),
    }
}
