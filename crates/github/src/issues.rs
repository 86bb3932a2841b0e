//! Issue creation via `POST /repos/{owner}/{repo}/issues`, plus a read-only
//! access check against `GET /repos/{owner}/{repo}`.

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    FailureCause, GatewayError, IssueNumber, IssuePayload, PublicationGateway, PublishedIssue,
    RepositoryId,
};
use reqwest::header::{HeaderMap, ACCEPT, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";

/// Errors raised while building a [`GithubIssueTracker`].
#[derive(Debug, Error)]
pub enum GithubConfigError {
    #[error("missing GitHub token")]
    MissingToken,

    #[error("repository `{0}` is not in owner/name form")]
    InvalidRepository(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Connection settings for [`GithubIssueTracker`].
#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub token: String,
    pub repository: RepositoryId,
    pub api_url: String,
    pub user_agent: String,
}

impl GithubConfig {
    pub fn new(token: impl Into<String>, repository: RepositoryId) -> Self {
        Self {
            token: token.into(),
            repository,
            api_url: DEFAULT_API_URL.to_string(),
            user_agent: format!("bugfinder/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

/// [`PublicationGateway`] that creates GitHub issues.
#[derive(Debug, Clone)]
pub struct GithubIssueTracker {
    config: GithubConfig,
    repository_url: String,
    issues_url: String,
    client: Client,
}

impl GithubIssueTracker {
    pub fn new(config: GithubConfig) -> Result<Self, GithubConfigError> {
        if config.token.trim().is_empty() {
            return Err(GithubConfigError::MissingToken);
        }
        let Some((owner, name)) = config.repository.split() else {
            return Err(GithubConfigError::InvalidRepository(
                config.repository.to_string(),
            ));
        };
        let repository_url = format!(
            "{}/repos/{owner}/{name}",
            config.api_url.trim_end_matches('/')
        );
        let issues_url = format!("{repository_url}/issues");
        let client = Client::builder().build()?;
        Ok(Self {
            config,
            repository_url,
            issues_url,
            client,
        })
    }

    /// Reads the repository with the configured token and reports whether
    /// issues can be created in it. Creates nothing.
    pub async fn check_access(&self) -> Result<RepositoryAccess, GatewayError> {
        let response = self
            .client
            .get(&self.repository_url)
            .bearer_auth(&self.config.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header(USER_AGENT, &self.config.user_agent)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &headers, &body));
        }
        let body = response.text().await.map_err(transport_error)?;
        let access = parse_repository(&body)?;
        tracing::debug!(
            repository = %self.config.repository,
            can_create_issues = access.can_create_issues(),
            "repository access checked"
        );
        Ok(access)
    }
}

/// What the token can do in the configured repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryAccess {
    pub full_name: String,
    pub has_issues: bool,
    /// `None` when GitHub omits the permissions block (anonymous or
    /// fine-grained tokens without metadata access).
    pub can_push: Option<bool>,
}

impl RepositoryAccess {
    /// Issues are enabled and the token may write to the repository.
    pub fn can_create_issues(&self) -> bool {
        self.has_issues && self.can_push.unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct RepositoryBody {
    full_name: String,
    #[serde(default)]
    has_issues: bool,
    #[serde(default)]
    permissions: Option<Permissions>,
}

#[derive(Debug, Deserialize)]
struct Permissions {
    #[serde(default)]
    push: bool,
}

fn parse_repository(body: &str) -> Result<RepositoryAccess, GatewayError> {
    let repo: RepositoryBody = serde_json::from_str(body).map_err(|e| {
        GatewayError::new(FailureCause::Rejected, format!("unreadable repository: {e}"))
    })?;
    Ok(RepositoryAccess {
        full_name: repo.full_name,
        has_issues: repo.has_issues,
        can_push: repo.permissions.map(|p| p.push),
    })
}

#[async_trait]
impl PublicationGateway for GithubIssueTracker {
    fn name(&self) -> &str {
        "github"
    }

    async fn create_issue(&self, payload: &IssuePayload) -> Result<PublishedIssue, GatewayError> {
        let response = self
            .client
            .post(&self.issues_url)
            .bearer_auth(&self.config.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header(USER_AGENT, &self.config.user_agent)
            .json(payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            let error = classify_failure(status, &headers, &body);
            tracing::warn!(
                repository = %self.config.repository,
                status = status.as_u16(),
                cause = %error.cause,
                "issue creation failed"
            );
            return Err(error);
        }

        let created: CreatedIssue = response.json().await.map_err(|e| {
            // The issue may exist even though the reply was unreadable.
            GatewayError::new(FailureCause::Rejected, format!("unreadable response: {e}"))
        })?;
        tracing::info!(
            repository = %self.config.repository,
            issue = created.number,
            "issue created"
        );
        Ok(PublishedIssue {
            number: IssueNumber::new(created.number),
            url: created.html_url,
            repository: Some(self.config.repository.clone()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    number: u64,
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn transport_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::timeout(error.to_string())
    } else {
        GatewayError::new(FailureCause::Transport, error.to_string())
    }
}

/// Maps a non-success response to a [`GatewayError`].
///
/// GitHub reports primary rate-limit exhaustion as `403` with
/// `x-ratelimit-remaining: 0`, secondary limits as `403`/`429` with
/// `Retry-After`.
fn classify_failure(status: StatusCode, headers: &HeaderMap, body: &str) -> GatewayError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());
    let retry_after = retry_after(headers);
    let exhausted = header_str(headers, "x-ratelimit-remaining") == Some("0");

    if status == StatusCode::FORBIDDEN && (exhausted || retry_after.is_some()) {
        let wait = retry_after.or_else(|| until_reset(headers));
        return GatewayError {
            status: Some(status.as_u16()),
            ..GatewayError::rate_limited(message, wait)
        };
    }
    GatewayError::from_status(status.as_u16(), message).with_retry_after(retry_after)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok().map(str::trim)
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_str(headers, RETRY_AFTER.as_str())?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Time until `x-ratelimit-reset` (epoch seconds), if it lies in the future.
fn until_reset(headers: &HeaderMap) -> Option<Duration> {
    let reset: i64 = header_str(headers, "x-ratelimit-reset")?.parse().ok()?;
    let seconds = reset - chrono::Utc::now().timestamp();
    (seconds > 0).then(|| Duration::from_secs(seconds as u64))
}
