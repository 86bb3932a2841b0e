//! Webhook transport.

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    FailureCause, GatewayError, MessageId, NotificationGateway, NotificationMessage,
    NotificationReceipt,
};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;

use crate::WebhookPayload;

#[derive(Debug, Error)]
pub enum WebhookConfigError {
    #[error("missing webhook URL")]
    MissingUrl,

    #[error("invalid webhook URL: {0}")]
    InvalidUrl(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// [`NotificationGateway`] posting to a Discord webhook.
#[derive(Debug, Clone)]
pub struct DiscordWebhook {
    url: Url,
    client: Client,
}

impl DiscordWebhook {
    /// `url` is the full webhook URL including its token.
    pub fn new(url: &str) -> Result<Self, WebhookConfigError> {
        if url.trim().is_empty() {
            return Err(WebhookConfigError::MissingUrl);
        }
        let mut url =
            Url::parse(url.trim()).map_err(|e| WebhookConfigError::InvalidUrl(e.to_string()))?;
        // `wait=true` makes Discord return the created message.
        url.query_pairs_mut().append_pair("wait", "true");
        Ok(Self {
            url,
            client: Client::builder().build()?,
        })
    }

    /// Fetches the webhook's own description without posting a message.
    ///
    /// Fails the same way [`NotificationGateway::send`] would for a revoked or
    /// mistyped webhook.
    pub async fn check(&self) -> Result<WebhookInfo, GatewayError> {
        let mut url = self.url.clone();
        url.set_query(None);
        let response = self.client.get(url).send().await.map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }
        parse_info(&body)
    }
}

/// What Discord reports about a webhook.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
}

fn parse_info(body: &str) -> Result<WebhookInfo, GatewayError> {
    serde_json::from_str(body).map_err(|e| {
        GatewayError::new(FailureCause::Rejected, format!("unreadable webhook description: {e}"))
    })
}

fn transport_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::timeout(error.to_string())
    } else {
        GatewayError::new(FailureCause::Transport, error.to_string())
    }
}

#[async_trait]
impl NotificationGateway for DiscordWebhook {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send(&self, message: &NotificationMessage) -> Result<NotificationReceipt, GatewayError> {
        let payload = WebhookPayload::from_message(message);
        let response = self
            .client
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let error = classify_failure(status, &body);
            tracing::warn!(status = status.as_u16(), cause = %error.cause, "webhook rejected message");
            return Err(error);
        }

        let message_id = serde_json::from_str::<SentMessage>(&body)
            .ok()
            .and_then(|m| MessageId::new(m.id));
        tracing::debug!(message_id = ?message_id, "webhook message delivered");
        Ok(NotificationReceipt { message_id })
    }
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    #[serde(default)]
    message: String,
    /// Seconds, possibly fractional.
    retry_after: f64,
}

/// Maps a non-success response to a [`GatewayError`]; Discord reports the
/// back-off for a `429` in the JSON body.
fn classify_failure(status: StatusCode, body: &str) -> GatewayError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        if let Ok(limit) = serde_json::from_str::<RateLimitBody>(body) {
            let wait = Duration::try_from_secs_f64(limit.retry_after).ok();
            return GatewayError::from_status(429, limit.message).with_retry_after(wait);
        }
    }
    GatewayError::from_status(status.as_u16(), body.chars().take(200).collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_validation() {
        assert!(matches!(DiscordWebhook::new(" "), Err(WebhookConfigError::MissingUrl)));
        assert!(matches!(
            DiscordWebhook::new("not a url"),
            Err(WebhookConfigError::InvalidUrl(_))
        ));
        let webhook = DiscordWebhook::new("https://discord.com/api/webhooks/1/abc").unwrap();
        assert_eq!(webhook.url.query(), Some("wait=true"));
    }

    #[test]
    fn test_rate_limit_reads_body_hint() {
        let error = classify_failure(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"message": "You are being rate limited.", "retry_after": 1.5, "global": false}"#,
        );
        assert_eq!(error.cause, FailureCause::RateLimited);
        assert_eq!(error.retry_after, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_rate_limit_ignores_unrepresentable_hint() {
        for body in [
            r#"{"message": "slow down", "retry_after": 1e30}"#,
            r#"{"message": "slow down", "retry_after": -2.0}"#,
        ] {
            let error = classify_failure(StatusCode::TOO_MANY_REQUESTS, body);
            assert_eq!(error.cause, FailureCause::RateLimited);
            assert_eq!(error.retry_after, None);
        }
    }

    #[test]
    fn test_parse_webhook_description() {
        let info = parse_info(
            r#"{"type": 1, "id": "223704706495545344", "name": "bugfinder",
                "channel_id": "199737254929760256", "token": "secret"}"#,
        )
        .unwrap();
        assert_eq!(info.id, "223704706495545344");
        assert_eq!(info.name.as_deref(), Some("bugfinder"));
        assert!(parse_info("<html>").is_err());
    }

    #[tokio::test]
    async fn test_check_unreachable_host_is_transport_error() {
        let webhook = DiscordWebhook::new("http://127.0.0.1:9/api/webhooks/1/abc").unwrap();
        let error = webhook.check().await.unwrap_err();
        assert!(matches!(error.cause, FailureCause::Transport | FailureCause::Timeout));
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(
            classify_failure(StatusCode::SERVICE_UNAVAILABLE, "").cause,
            FailureCause::ServerError
        );
        assert_eq!(
            classify_failure(StatusCode::NOT_FOUND, r#"{"message": "Unknown Webhook"}"#).cause,
            FailureCause::Rejected
        );
        // A 429 without a readable body is still rate limited.
        let error = classify_failure(StatusCode::TOO_MANY_REQUESTS, "");
        assert_eq!(error.cause, FailureCause::RateLimited);
        assert_eq!(error.retry_after, None);
    }
}
