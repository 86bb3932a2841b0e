//! Gateways that log instead of calling GitHub or Discord.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use pipeline::{
    GatewayError, IssueNumber, IssuePayload, NotificationGateway, NotificationMessage,
    NotificationReceipt, PublicationGateway, PublishedIssue,
};

/// Returns synthetic issue references numbered from 1.
#[derive(Debug, Default)]
pub struct LoggingPublisher {
    next: AtomicU64,
}

#[async_trait]
impl PublicationGateway for LoggingPublisher {
    fn name(&self) -> &str {
        "dry-run-publisher"
    }

    async fn create_issue(&self, payload: &IssuePayload) -> Result<PublishedIssue, GatewayError> {
        let number = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(
            number,
            title = %payload.title,
            labels = ?payload.labels,
            body_chars = payload.body.len(),
            "dry run: issue not created"
        );
        Ok(PublishedIssue {
            number: IssueNumber::new(number),
            url: format!("dry-run://issues/{number}"),
            repository: None,
        })
    }
}

#[derive(Debug, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl NotificationGateway for LoggingNotifier {
    fn name(&self) -> &str {
        "dry-run-notifier"
    }

    async fn send(&self, message: &NotificationMessage) -> Result<NotificationReceipt, GatewayError> {
        tracing::info!(
            kind = ?message.kind,
            title = %message.title,
            severity = ?message.severity,
            "dry run: notification not sent"
        );
        Ok(NotificationReceipt::default())
    }
}
