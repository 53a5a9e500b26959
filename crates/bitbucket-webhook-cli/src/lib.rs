//! # Bitbucket Webhook CLI
//!
//! Command-line interface for normalizing stored Bitbucket Cloud webhook
//! deliveries.
//!
//! This module provides CLI commands for:
//! - Authenticating and normalizing a delivery read from a file or stdin
//! - Generating shell completions
//!
//! Results are written to stdout. Logs always go to stderr.

use bitbucket_webhook_core::{
    webhook::EVENT_HEADER_KEY, BitbucketCloudWebhook, CanonicalEvent, WebhookError,
    WebhookParser, WebhookRequest, WebhookSecret,
};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::{
    collections::HashMap,
    fs::File,
    io::{self, Read, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

/// Prefix for configuration environment variables
pub const ENV_PREFIX: &str = "BITBUCKET_WEBHOOK";

// ============================================================================
// CLI Structure
// ============================================================================

/// Bitbucket webhook CLI - normalize Bitbucket Cloud deliveries
#[derive(Parser)]
#[command(name = "bitbucket-webhook")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Authenticate and normalize Bitbucket Cloud webhook deliveries")]
#[command(
    long_about = "Validates the shared token of a Bitbucket Cloud webhook delivery and converts push and pull request payloads into a provider-agnostic event record"
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BITBUCKET_WEBHOOK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level or filter directive (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Normalize a stored webhook delivery
    Parse(ParseArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Arguments of the `parse` command
#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Value of the X-Event-Key header
    #[arg(short, long)]
    pub event_key: String,

    /// Payload file; stdin when omitted or "-"
    #[arg(short, long)]
    pub payload: Option<PathBuf>,

    /// Full delivery URL; its query string supplies the presented token
    #[arg(short, long)]
    pub url: Option<String>,

    /// Expected shared token (overrides the configuration)
    #[arg(short, long, env = "BITBUCKET_WEBHOOK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(short, long)]
    pub format: Option<OutputFormat>,
}

/// Output format options
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output
    #[default]
    Json,
    /// Human-readable text
    Text,
}

/// Log format options
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

// ============================================================================
// Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Webhook rejected: {0}")]
    Webhook(#[from] WebhookError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("{0}")]
    Usage(#[from] clap::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Webhook(WebhookError::AuthenticationFailed) => 2,
            Self::Webhook(WebhookError::MalformedPayload { .. }) => 3,
            Self::Webhook(WebhookError::Io(_)) => 5,
            Self::InvalidArgument { .. } => 4,
            Self::Usage(_) => 4,
            Self::Io(_) => 5,
            Self::Output(_) => 6,
        }
    }
}

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] config::ConfigError),

    #[error("Logging setup failed: {message}")]
    Logging { message: String },
}

// ============================================================================
// Configuration Types
// ============================================================================

/// CLI configuration structure
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Webhook authentication settings
    pub webhook: WebhookConfig,

    /// Default logging configuration
    pub logging: LoggingConfig,

    /// Output formatting preferences
    pub output: OutputConfig,
}

/// Webhook authentication settings
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Expected shared token; absent disables authentication
    pub token: Option<WebhookSecret>,
}

/// Logging configuration
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Output formatting preferences
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

/// Load configuration from defaults, an optional file and the process
/// environment.
///
/// Sources (applied in order, later sources override earlier ones):
///  1. Built-in defaults
///  2. The file at `config_path`, format chosen by its extension
///  3. Environment variables prefixed `BITBUCKET_WEBHOOK__` with `__` as the
///     nesting separator, e.g. `BITBUCKET_WEBHOOK__WEBHOOK__TOKEN`
pub fn load_configuration(config_path: Option<&Path>) -> Result<CliConfig, ConfigError> {
    load_configuration_with_env(config_path, None)
}

/// Same as [`load_configuration`] with an explicit environment map in place of
/// the process environment.
pub fn load_configuration_with_env(
    config_path: Option<&Path>,
    environment: Option<config::Map<String, String>>,
) -> Result<CliConfig, ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = config_path {
        if !path.is_file() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let config = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .source(environment),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub fn run_cli() -> Result<(), CliError> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => {
            // --help and --version
            e.print()?;
            return Ok(());
        }
        Err(e) => return Err(CliError::Usage(e)),
    };

    let config = load_configuration(cli.config.as_deref())?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let log_format = if cli.json_logs {
        LogFormat::Json
    } else {
        config.logging.format
    };
    initialize_logging(&level, log_format)?;

    debug!(
        config_file = ?cli.config,
        token_configured = config.webhook.token.is_some(),
        output_format = ?config.output.format,
        "Configuration loaded"
    );

    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute_command(cli.command, &config, &mut out)
}

/// Initialize logging to stderr.
///
/// `RUST_LOG` overrides `level` when set.
pub fn initialize_logging(level: &str, format: LogFormat) -> Result<(), CliError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|e| CliError::InvalidArgument {
            arg: "--log-level".to_string(),
            message: e.to_string(),
        })?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .try_init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .try_init(),
    };

    result.map_err(|e| {
        CliError::Configuration(ConfigError::Logging {
            message: e.to_string(),
        })
    })
}

/// Dispatch a parsed command
pub fn execute_command(
    command: Commands,
    config: &CliConfig,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    match command {
        Commands::Parse(args) => execute_parse_command(args, config, out),
        Commands::Completions { shell } => execute_completions_command(shell, out),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Execute parse command
pub fn execute_parse_command(
    args: ParseArgs,
    config: &CliConfig,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let delivery_url = args
        .url
        .as_deref()
        .map(|raw| {
            Url::parse(raw).map_err(|e| CliError::InvalidArgument {
                arg: "--url".to_string(),
                message: e.to_string(),
            })
        })
        .transpose()?;

    let expected = match args.token {
        Some(token) => WebhookSecret::from(token),
        None => config.webhook.token.clone().unwrap_or_default(),
    };
    let format = args.format.unwrap_or(config.output.format);

    let body = open_payload(args.payload.as_deref())?;
    let headers = HashMap::from([(EVENT_HEADER_KEY.to_string(), args.event_key.clone())]);
    let request = match &delivery_url {
        Some(url) => WebhookRequest::from_url(url, headers, body),
        None => WebhookRequest::new(headers, Vec::new(), body),
    };

    info!(
        event_key = %args.event_key,
        payload = %args.payload.as_deref().map_or("<stdin>".into(), Path::to_string_lossy),
        "Parsing webhook delivery"
    );

    let event = BitbucketCloudWebhook::new().parse(request, &expected)?;

    write_event(event.as_ref(), &args.event_key, format, out)
}

/// Execute completions command
pub fn execute_completions_command(
    shell: clap_complete::Shell,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    debug!(shell = ?shell, "Generating shell completions");

    let mut command = Cli::command();
    clap_complete::generate(shell, &mut command, "bitbucket-webhook", out);
    Ok(())
}

fn open_payload(path: Option<&Path>) -> Result<Box<dyn Read>, CliError> {
    match path {
        None => Ok(Box::new(io::stdin())),
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdin())),
        Some(path) => {
            let file = File::open(path).map_err(|e| {
                io::Error::new(e.kind(), format!("cannot open {}: {}", path.display(), e))
            })?;
            Ok(Box::new(file))
        }
    }
}

// ============================================================================
// Output
// ============================================================================

fn write_event(
    event: Option<&CanonicalEvent>,
    event_key: &str,
    format: OutputFormat,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            // `null` marks an unsupported event kind
            serde_json::to_writer_pretty(&mut *out, &event)?;
            writeln!(out)?;
        }
        OutputFormat::Text => match event {
            Some(event) => write!(out, "{}", render_text(event))?,
            None => writeln!(out, "No event produced for event key '{}'", event_key)?,
        },
    }

    Ok(())
}

/// Render an event as aligned `label: value` lines, skipping empty fields
pub fn render_text(event: &CanonicalEvent) -> String {
    let timestamp = if event.timestamp == 0 {
        String::new()
    } else {
        chrono::DateTime::from_timestamp(event.timestamp, 0)
            .map(|date| date.to_rfc3339())
            .unwrap_or_else(|| event.timestamp.to_string())
    };
    let pull_request = if event.pull_request_id == 0 {
        String::new()
    } else {
        event.pull_request_id.to_string()
    };
    let author = match (event.author.login.as_str(), event.author.email.as_str()) {
        (login, "") => login.to_string(),
        ("", email) => format!("<{}>", email),
        (login, email) => format!("{} <{}>", login, email),
    };

    let fields = [
        ("event", event.event.to_string()),
        ("repository", event.target_repository.full_name()),
        ("branch", event.target_branch.clone()),
        ("pull request", pull_request),
        ("source repository", event.source_repository.full_name()),
        ("source branch", event.source_branch.clone()),
        ("timestamp", timestamp),
        ("branch status", event.branch_status.map(|s| s.to_string()).unwrap_or_default()),
        ("commit", event.commit.hash.clone()),
        (
            "message",
            event.commit.message.lines().next().unwrap_or_default().to_string(),
        ),
        ("commit url", event.commit.url.clone()),
        ("before commit", event.before_commit.hash.clone()),
        ("compare url", event.compare_url.clone()),
        ("triggered by", event.triggered_by.login.clone()),
        ("author", author),
        ("committer", event.committer.login.clone()),
    ];

    fields
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(label, value)| format!("{:<19}{}\n", format!("{}:", label), value))
        .collect()
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
