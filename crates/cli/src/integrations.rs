//! `check-integrations`: read-only reachability checks for GitHub and Discord.
//!
//! Nothing is created or posted. GitHub is asked for the repository, Discord
//! for the webhook description.

use discord::WebhookInfo;
use github::RepositoryAccess;
use pipeline::GatewayError;
use serde::Serialize;

/// Outcome of checking one integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrationCheck {
    pub integration: &'static str,
    pub ok: bool,
    pub detail: String,
}

impl IntegrationCheck {
    pub fn failed(integration: &'static str, detail: impl Into<String>) -> Self {
        Self {
            integration,
            ok: false,
            detail: detail.into(),
        }
    }

    pub fn skipped(integration: &'static str, detail: impl Into<String>) -> Self {
        Self {
            integration,
            ok: true,
            detail: detail.into(),
        }
    }
}

pub fn github(result: Result<RepositoryAccess, GatewayError>) -> IntegrationCheck {
    match result {
        Ok(access) if access.can_create_issues() => IntegrationCheck {
            integration: "github",
            ok: true,
            detail: format!("{}: issues can be created", access.full_name),
        },
        Ok(access) if !access.has_issues => IntegrationCheck::failed(
            "github",
            format!("{}: issues are disabled", access.full_name),
        ),
        Ok(access) => IntegrationCheck::failed(
            "github",
            format!("{}: token has no write access", access.full_name),
        ),
        Err(error) => IntegrationCheck::failed("github", error.to_string()),
    }
}

pub fn discord(result: Result<WebhookInfo, GatewayError>) -> IntegrationCheck {
    match result {
        Ok(info) => IntegrationCheck {
            integration: "discord",
            ok: true,
            detail: match (info.name, info.channel_id) {
                (Some(name), Some(channel)) => format!("webhook `{name}` posts to channel {channel}"),
                (Some(name), None) => format!("webhook `{name}` is reachable"),
                _ => format!("webhook {} is reachable", info.id),
            },
        },
        Err(error) => IntegrationCheck::failed("discord", error.to_string()),
    }
}
