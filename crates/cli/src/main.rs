//! Bug Finder CLI entry point.
//!
//! This binary is the composition root for the entire system:
//!
//! 1. **Parse configuration**: load `bugfinder.toml` (optional) and read
//!    credentials from the environment.
//! 2. **Wire observability**: `tracing-subscriber` with a text or JSON layer
//!    on stderr, plus an OpenTelemetry OTLP exporter when configured.
//! 3. **Construct infrastructure**: `AnthropicProvider`, `GithubIssueTracker`
//!    and `DiscordWebhook` (or logging stand-ins with `--dry-run`), injected
//!    into the `ProcessOrchestrator`.
//! 4. **Run**: each input log becomes one concurrent process; each finished
//!    record is printed to stdout as JSON together with its derived metrics.

mod config;
mod dry_run;
mod integrations;
mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use discord::DiscordWebhook;
use github::{GithubConfig, GithubIssueTracker};
use llm::{AnthropicConfig, AnthropicProvider};
use nodes::{
    Collaborators, LlmClassifier, LlmContentReviewer, LlmDrafter, LlmGateway, LlmRefiner,
    ProcessOrchestrator,
};
use pipeline::{
    MetricsAggregator, NotificationGateway, ProcessMetrics, ProcessRecord, PublicationGateway,
    RepositoryId, StandardReviewEngine, TerminalResult,
};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::config::FileConfig;
use crate::integrations::IntegrationCheck;
use crate::telemetry::LogFormat;

#[derive(Parser)]
#[command(name = "bugfinder")]
#[command(about = "Turn application logs into reviewed GitHub issues", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file [default: bugfinder.toml, ignored when absent]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (logs go to stderr)
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run each log through the pipeline and print its process record
    Process {
        /// Log files, one log per file; `-` reads stdin
        #[arg(required = true)]
        files: Vec<String>,

        /// Log issues and notifications instead of calling GitHub and Discord
        #[arg(long)]
        dry_run: bool,

        /// Target repository (`owner/name`), overriding the config file
        #[arg(long, env = "BUGFINDER_REPOSITORY")]
        repository: Option<String>,

        /// LLM model, overriding the config file
        #[arg(long)]
        model: Option<String>,

        /// Pretty-print records
        #[arg(long)]
        pretty: bool,
    },

    /// Validate the configuration file and print the effective settings
    CheckConfig,

    /// Check that the GitHub repository and Discord webhook are reachable
    CheckIntegrations {
        /// Target repository (`owner/name`), overriding the config file
        #[arg(long, env = "BUGFINDER_REPOSITORY")]
        repository: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let telemetry = match telemetry::init(cli.log_format) {
        Ok(telemetry) => telemetry,
        Err(error) => {
            eprintln!("error: failed to initialise logging: {error:#}");
            return ExitCode::FAILURE;
        }
    };

    let code = match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            tracing::error!("bugfinder failed: {error:#}");
            ExitCode::FAILURE
        }
    };
    telemetry.shutdown();
    code
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let (path, required) = match cli.config {
        Some(path) => (path, true),
        None => (PathBuf::from(config::DEFAULT_CONFIG_PATH), false),
    };
    let mut file_config = FileConfig::load(&path, required)?;

    match cli.command {
        Commands::CheckConfig => {
            print!("{}", toml::to_string_pretty(&file_config)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Process {
            files,
            dry_run,
            repository,
            model,
            pretty,
        } => {
            if repository.is_some() {
                file_config.github.repository = repository;
            }
            if let Some(model) = model {
                file_config.llm.model = model;
            }
            process(files, &file_config, dry_run, pretty).await
        }
        Commands::CheckIntegrations { repository } => {
            if repository.is_some() {
                file_config.github.repository = repository;
            }
            check_integrations(&file_config).await
        }
    }
}

/// One line of `process` output. A task that panicked has an `error` and no
/// record.
#[derive(Serialize)]
struct Output<'a> {
    source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<&'a ProcessRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<ProcessMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> Output<'a> {
    fn new(source: &'a str, result: &'a Result<ProcessRecord, String>) -> Self {
        match result {
            Ok(record) => Self {
                source,
                record: Some(record),
                metrics: Some(ProcessMetrics::from_record(record)),
                error: None,
            },
            Err(error) => Self {
                source,
                record: None,
                metrics: None,
                error: Some(error.clone()),
            },
        }
    }

    fn failed(&self) -> bool {
        self.record
            .map_or(true, |r| r.terminal_result() == Some(TerminalResult::Failed))
    }
}

async fn process(
    files: Vec<String>,
    config: &FileConfig,
    dry_run: bool,
    pretty: bool,
) -> anyhow::Result<ExitCode> {
    let mut inputs = Vec::with_capacity(files.len());
    for source in files {
        let raw = read_input(&source).await?;
        inputs.push((source, raw));
    }

    let metrics = Arc::new(MetricsAggregator::new());
    let orchestrator =
        Arc::new(build_orchestrator(config, dry_run)?.with_metrics(Arc::clone(&metrics)));

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("received Ctrl+C, cancelling in-flight processes");
            shutdown.cancel();
        }
    });

    // Spawned up front so the logs run concurrently; awaited in input order.
    let tasks: Vec<_> = inputs
        .into_iter()
        .map(|(source, raw)| {
            let orchestrator = Arc::clone(&orchestrator);
            let cancel = cancel.clone();
            let handle = tokio::spawn(async move { orchestrator.process(&raw, &cancel).await });
            (source, handle)
        })
        .collect();

    let mut results = Vec::with_capacity(tasks.len());
    for (source, handle) in tasks {
        let result = handle.await.map_err(|error| {
            tracing::error!(%source, "process task did not complete: {error}");
            format!("process task did not complete: {error}")
        });
        results.push((source, result));
    }

    let mut any_failed = false;
    for (source, result) in &results {
        let output = Output::new(source, result);
        any_failed |= output.failed();
        let line = if pretty {
            serde_json::to_string_pretty(&output)?
        } else {
            serde_json::to_string(&output)?
        };
        println!("{line}");
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        processed = snapshot.total_processed,
        issues_created = snapshot.issues_created,
        skipped = snapshot.skipped,
        failed = snapshot.failed,
        notification_failures = snapshot.notification_failures,
        "run complete"
    );

    Ok(if any_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn check_integrations(config: &FileConfig) -> anyhow::Result<ExitCode> {
    let github = match tracker(config) {
        Ok(tracker) => integrations::github(tracker.check_access().await),
        Err(error) => IntegrationCheck::failed("github", format!("{error:#}")),
    };
    let discord = if !config.discord.enabled {
        IntegrationCheck::skipped("discord", "disabled in configuration")
    } else {
        match webhook() {
            Ok(webhook) => integrations::discord(webhook.check().await),
            Err(error) => IntegrationCheck::failed("discord", format!("{error:#}")),
        }
    };

    let checks = [github, discord];
    for check in &checks {
        if check.ok {
            tracing::info!(integration = check.integration, detail = %check.detail, "integration ok");
        } else {
            tracing::warn!(integration = check.integration, detail = %check.detail, "integration failed");
        }
    }
    println!("{}", serde_json::to_string_pretty(&checks)?);

    Ok(if checks.iter().all(|c| c.ok) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn read_input(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        let mut raw = String::new();
        tokio::io::stdin()
            .read_to_string(&mut raw)
            .await
            .context("failed to read stdin")?;
        return Ok(raw);
    }
    tokio::fs::read_to_string(source)
        .await
        .with_context(|| format!("failed to read {source}"))
}

fn build_orchestrator(config: &FileConfig, dry_run: bool) -> anyhow::Result<ProcessOrchestrator> {
    let provider = AnthropicProvider::new(
        AnthropicConfig::new(config::secret(config::ANTHROPIC_API_KEY)?, &config.llm.model)
            .with_base_url(&config.llm.base_url)
            .with_timeout(std::time::Duration::from_secs_f64(config.llm.timeout_seconds)),
    )?;
    let gateway = LlmGateway::new(Arc::new(provider))
        .with_max_tokens(config.llm.max_tokens)
        .with_temperature(config.llm.temperature);

    let (publisher, notifier): (Arc<dyn PublicationGateway>, Arc<dyn NotificationGateway>) =
        if dry_run {
            tracing::info!("dry run: GitHub and Discord will not be called");
            (
                Arc::new(dry_run::LoggingPublisher::default()),
                Arc::new(dry_run::LoggingNotifier),
            )
        } else {
            (publisher(config)?, notifier(config)?)
        };

    let collaborators = Collaborators {
        classifier: Arc::new(LlmClassifier::new(gateway.clone())),
        drafter: Arc::new(LlmDrafter::new(gateway.clone())),
        review_engine: Arc::new(StandardReviewEngine::new(
            Arc::new(LlmContentReviewer::new(gateway.clone())),
            config.pipeline.review.clone(),
        )),
        refiner: Arc::new(LlmRefiner::new(gateway)),
        publisher,
        notifier,
    };
    Ok(ProcessOrchestrator::new(collaborators, config.pipeline.clone())?)
}

fn tracker(config: &FileConfig) -> anyhow::Result<GithubIssueTracker> {
    let repository = config
        .github
        .repository
        .as_deref()
        .and_then(RepositoryId::new)
        .context("no target repository: set github.repository or pass --repository")?;
    Ok(GithubIssueTracker::new(
        GithubConfig::new(config::secret(config::GITHUB_TOKEN)?, repository)
            .with_api_url(&config.github.api_url),
    )?)
}

fn webhook() -> anyhow::Result<DiscordWebhook> {
    Ok(DiscordWebhook::new(&config::secret(config::DISCORD_WEBHOOK_URL)?)?)
}

fn publisher(config: &FileConfig) -> anyhow::Result<Arc<dyn PublicationGateway>> {
    Ok(Arc::new(tracker(config)?))
}

fn notifier(config: &FileConfig) -> anyhow::Result<Arc<dyn NotificationGateway>> {
    if !config.discord.enabled {
        tracing::info!("discord disabled, notifications are logged only");
        return Ok(Arc::new(dry_run::LoggingNotifier));
    }
    Ok(Arc::new(webhook()?))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_process_flags() {
        let cli = Cli::try_parse_from([
            "bugfinder",
            "--log-format",
            "json",
            "process",
            "--dry-run",
            "--pretty",
            "a.log",
            "-",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Process {
                files,
                dry_run,
                pretty,
                ..
            } => {
                assert_eq!(files, vec!["a.log", "-"]);
                assert!(dry_run && pretty);
            }
            _ => panic!("expected process"),
        }
    }

    #[test]
    fn test_parses_check_integrations() {
        let cli = Cli::try_parse_from([
            "bugfinder",
            "check-integrations",
            "--repository",
            "acme/shop",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::CheckIntegrations { repository: Some(ref r) } if r == "acme/shop"
        ));
    }

    #[test]
    fn test_output_carries_metrics() {
        use pipeline::{ProcessId, ValidationError};

        let mut record = ProcessRecord::new(ProcessId::new_random());
        record.fail(pipeline::PipelineError::Validation(ValidationError::EmptyInput));
        let result = Ok(record);
        let output = Output::new("a.log", &result);
        assert!(output.failed());

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["source"], "a.log");
        assert!(json["record"].is_object());
        assert!(json["metrics"]["step_count"].is_number());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_output_for_task_that_did_not_complete() {
        let result = Err("process task did not complete: task 7 panicked".to_string());
        let output = Output::new("b.log", &result);
        assert!(output.failed());

        let json = serde_json::to_value(&output).unwrap();
        assert!(json.get("record").is_none());
        assert!(json["error"].as_str().unwrap().contains("panicked"));
    }

    #[test]
    fn test_process_requires_files() {
        assert!(Cli::try_parse_from(["bugfinder", "process"]).is_err());
    }
}
