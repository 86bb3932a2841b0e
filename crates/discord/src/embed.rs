//! Webhook payload built from a [`NotificationMessage`].

use pipeline::{NotificationKind, NotificationMessage, Severity};
use serde::Serialize;

const USERNAME: &str = "Bug Finder";

/// Discord caps embed descriptions at 4096 characters.
const MAX_DESCRIPTION: usize = 4096;

const RED: u32 = 0xFF0000;
const ORANGE: u32 = 0xFF8C00;
const YELLOW: u32 = 0xFFD700;
const BLUE: u32 = 0x3498DB;
const GREY: u32 = 0x808080;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookPayload {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub embeds: Vec<WebhookEmbed>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookEmbed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub description: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub footer: EmbedFooter,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

fn colour(severity: Option<Severity>) -> u32 {
    match severity {
        Some(Severity::Critical) | Some(Severity::High) => RED,
        Some(Severity::Medium) => ORANGE,
        Some(Severity::Low) => YELLOW,
        None => BLUE,
    }
}

fn field(name: &str, value: impl Into<String>) -> EmbedField {
    EmbedField {
        name: name.to_string(),
        value: value.into(),
        inline: true,
    }
}

impl WebhookPayload {
    pub fn from_message(message: &NotificationMessage) -> Self {
        let severity = message
            .severity
            .map_or_else(|| "unknown".to_string(), |s| s.to_string().to_uppercase());
        let mut fields = vec![field("Severity", severity)];

        let (title, url, color, content) = match &message.kind {
            NotificationKind::IssueCreated { issue } => {
                fields.push(field("Issue", format!("[{}]({})", issue.number, issue.url)));
                if let Some(repository) = &issue.repository {
                    fields.push(field("Repository", repository.to_string()));
                }
                let mention = matches!(message.severity, Some(Severity::Critical))
                    .then(|| "@here".to_string());
                (
                    format!("New bug reported: {}", message.title),
                    Some(issue.url.clone()),
                    colour(message.severity),
                    mention,
                )
            }
            NotificationKind::PublicationFailed { error } => {
                fields.push(EmbedField {
                    name: "Error".to_string(),
                    value: error.chars().take(1024).collect(),
                    inline: false,
                });
                (
                    format!("Issue creation failed: {}", message.title),
                    None,
                    GREY,
                    None,
                )
            }
        };

        Self {
            username: USERNAME.to_string(),
            content,
            embeds: vec![WebhookEmbed {
                title: title.chars().take(256).collect(),
                url,
                description: message.summary.chars().take(MAX_DESCRIPTION).collect(),
                color,
                fields,
                footer: EmbedFooter {
                    text: format!("Bug Finder • process {}", message.process_id),
                },
                timestamp: chrono::Utc::now().to_rfc3339(),
            }],
        }
    }
}
