//! Bug Finder LLM provider infrastructure adapter.
//!
//! Implements the [`pipeline::LlmProvider`] trait for Anthropic's Messages
//! API. Additional providers are added as new modules in this crate without
//! any changes to the `pipeline` crate.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting, response parsing
//! and status classification live here. The [`pipeline`] crate sees only
//! [`pipeline::LlmProvider`].

pub mod anthropic;
pub mod error;

pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use error::LlmError;
