//! Bug Finder GitHub infrastructure adapter.
//!
//! Implements [`pipeline::PublicationGateway`] by creating issues through the
//! GitHub REST API. All HTTP concerns (authentication headers, rate-limit
//! header interpretation, status classification) live here; the orchestrator
//! only sees [`pipeline::GatewayError`] and its [`pipeline::RetryPolicy`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** No domain rules. Retrying is the orchestrator's job;
//! this crate makes exactly one request per call.

pub mod issues;

pub use issues::{GithubConfig, GithubConfigError, GithubIssueTracker, RepositoryAccess};
