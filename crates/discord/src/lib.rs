//! Bug Finder Discord infrastructure adapter.
//!
//! Implements [`pipeline::NotificationGateway`] by posting an embed to a
//! Discord webhook. Embed styling lives in [`embed`]; transport and status
//! classification in [`webhook`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** One request per call; the orchestrator owns retries.

pub mod embed;
pub mod webhook;

pub use embed::{WebhookEmbed, WebhookPayload};
pub use webhook::{DiscordWebhook, WebhookConfigError, WebhookInfo};
