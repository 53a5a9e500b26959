//! Tests for the bitbucket-webhook-cli library module.

use super::*;
use bitbucket_webhook_core::EventKind;
use std::io::Write as _;

// ============================================================================
// Test helpers
// ============================================================================

const PULL_REQUEST_PAYLOAD: &str = r#"{
    "pullrequest": {
        "id": 42,
        "source": { "repository": { "full_name": "org/repo-fork" }, "branch": { "name": "feature" } },
        "destination": { "repository": { "full_name": "org/repo" }, "branch": { "name": "main" } },
        "updated_on": "2024-03-01T10:00:00+00:00"
    },
    "repository": { "full_name": "org/repo" },
    "actor": { "nickname": "reviewer" }
}"#;

fn payload_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn config_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn no_env() -> Option<config::Map<String, String>> {
    Some(config::Map::new())
}

fn parse_args(event_key: &str, payload: &Path) -> ParseArgs {
    ParseArgs {
        event_key: event_key.to_string(),
        payload: Some(payload.to_path_buf()),
        url: None,
        token: None,
        format: None,
    }
}

fn run_parse(args: ParseArgs, config: &CliConfig) -> (Result<(), CliError>, String) {
    let mut out = Vec::new();
    let result = execute_parse_command(args, config, &mut out);
    (result, String::from_utf8(out).unwrap())
}

// ============================================================================
// Argument parsing
// ============================================================================

#[test]
fn test_cli_parsing() {
    let cli = Cli::try_parse_from([
        "bitbucket-webhook",
        "--log-level",
        "debug",
        "parse",
        "--event-key",
        "repo:push",
        "--payload",
        "delivery.json",
        "--format",
        "text",
    ])
    .unwrap();

    assert_eq!(cli.log_level.as_deref(), Some("debug"));
    match cli.command {
        Commands::Parse(args) => {
            assert_eq!(args.event_key, "repo:push");
            assert_eq!(args.payload, Some(PathBuf::from("delivery.json")));
            assert_eq!(args.format, Some(OutputFormat::Text));
        }
        _ => panic!("Expected Parse command"),
    }
}

#[test]
fn test_event_key_is_required() {
    let result = Cli::try_parse_from(["bitbucket-webhook", "parse"]);
    assert!(result.is_err());
}

#[test]
fn test_completions_parsing() {
    let cli = Cli::try_parse_from(["bitbucket-webhook", "completions", "bash"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Completions {
            shell: clap_complete::Shell::Bash
        }
    ));
}

#[test]
fn test_cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_config_defaults() {
    let config = CliConfig::default();
    assert!(config.webhook.token.is_none());
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, LogFormat::Text);
    assert_eq!(config.output.format, OutputFormat::Json);
}

#[test]
fn test_load_without_sources_uses_defaults() {
    let config = load_configuration_with_env(None, no_env()).unwrap();
    assert!(config.webhook.token.is_none());
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_load_from_toml_file() {
    let file = config_file(
        ".toml",
        r#"
[webhook]
token = "from-file"

[logging]
level = "debug"
format = "json"

[output]
format = "text"
"#,
    );

    let config = load_configuration_with_env(Some(file.path()), no_env()).unwrap();

    assert_eq!(
        config.webhook.token.as_ref().map(WebhookSecret::expose_bytes),
        Some(&b"from-file"[..])
    );
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.output.format, OutputFormat::Text);
}

#[test]
fn test_load_from_yaml_file() {
    let file = config_file(".yaml", "logging:\n  level: warn\n");

    let config = load_configuration_with_env(Some(file.path()), no_env()).unwrap();

    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.output.format, OutputFormat::Json);
}

#[test]
fn test_environment_overrides_file() {
    let file = config_file(".toml", "[webhook]\ntoken = \"from-file\"\n");
    let env = config::Map::from([(
        "BITBUCKET_WEBHOOK__WEBHOOK__TOKEN".to_string(),
        "from-env".to_string(),
    )]);

    let config = load_configuration_with_env(Some(file.path()), Some(env)).unwrap();

    assert_eq!(
        config.webhook.token.as_ref().map(WebhookSecret::expose_bytes),
        Some(&b"from-env"[..])
    );
}

#[test]
fn test_unprefixed_environment_is_ignored() {
    let env = config::Map::from([
        ("BITBUCKET_WEBHOOK_TOKEN".to_string(), "flag-env".to_string()),
        ("LOGGING__LEVEL".to_string(), "trace".to_string()),
    ]);

    let config = load_configuration_with_env(None, Some(env)).unwrap();

    assert!(config.webhook.token.is_none());
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let err = load_configuration_with_env(Some(&path), no_env()).unwrap_err();

    assert!(matches!(err, ConfigError::FileNotFound { .. }), "got: {err:?}");
    assert_eq!(CliError::from(err).exit_code(), 1);
}

#[test]
fn test_invalid_config_value_is_an_error() {
    let file = config_file(".toml", "[output]\nformat = \"xml\"\n");

    let err = load_configuration_with_env(Some(file.path()), no_env()).unwrap_err();

    assert!(matches!(err, ConfigError::Invalid(_)), "got: {err:?}");
}

#[test]
fn test_config_debug_redacts_token() {
    let config = CliConfig {
        webhook: WebhookConfig {
            token: Some(WebhookSecret::from("super-secret")),
        },
        ..CliConfig::default()
    };

    let debug_output = format!("{:?}", config);

    assert!(!debug_output.contains("super-secret"));
}

// ============================================================================
// Exit codes
// ============================================================================

#[test]
fn test_exit_codes() {
    assert_eq!(
        CliError::Webhook(WebhookError::AuthenticationFailed).exit_code(),
        2
    );
    assert_eq!(
        CliError::Webhook(WebhookError::malformed("bad")).exit_code(),
        3
    );
    assert_eq!(
        CliError::InvalidArgument {
            arg: "--url".to_string(),
            message: "bad".to_string()
        }
        .exit_code(),
        4
    );
    assert_eq!(
        CliError::Io(io::Error::new(io::ErrorKind::NotFound, "missing")).exit_code(),
        5
    );
    assert_eq!(
        CliError::Webhook(WebhookError::Io(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "closed"
        )))
        .exit_code(),
        5
    );
}

// ============================================================================
// parse command
// ============================================================================

mod parse_command {
    use super::*;

    #[test]
    fn test_writes_json_event() {
        let payload = payload_file(PULL_REQUEST_PAYLOAD);

        let (result, output) = run_parse(
            parse_args("pullrequest:created", payload.path()),
            &CliConfig::default(),
        );

        result.unwrap();
        let event: CanonicalEvent = serde_json::from_str(&output).unwrap();
        assert_eq!(event.event, EventKind::PrOpened);
        assert_eq!(event.pull_request_id, 42);
        assert_eq!(event.target_branch, "main");
        assert_eq!(event.source_branch, "feature");
    }

    #[test]
    fn test_unsupported_event_writes_null() {
        let payload = payload_file("{}");

        let (result, output) = run_parse(
            parse_args("issue:created", payload.path()),
            &CliConfig::default(),
        );

        result.unwrap();
        assert_eq!(output.trim(), "null");
    }

    #[test]
    fn test_text_output() {
        let payload = payload_file(PULL_REQUEST_PAYLOAD);
        let mut args = parse_args("pullrequest:fulfilled", payload.path());
        args.format = Some(OutputFormat::Text);

        let (result, output) = run_parse(args, &CliConfig::default());

        result.unwrap();
        assert!(output.contains("PrMerged"), "{output}");
        assert!(output.contains("org/repo-fork"), "{output}");
        assert!(output.contains("2024-03-01T10:00:00+00:00"), "{output}");
    }

    #[test]
    fn test_configured_output_format_is_used() {
        let payload = payload_file("{}");
        let config = CliConfig {
            output: OutputConfig {
                format: OutputFormat::Text,
            },
            ..CliConfig::default()
        };

        let (result, output) = run_parse(parse_args("issue:created", payload.path()), &config);

        result.unwrap();
        assert!(output.contains("No event produced"), "{output}");
        assert!(output.contains("issue:created"), "{output}");
    }

    #[test]
    fn test_token_from_url_is_checked_against_flag() {
        let payload = payload_file(PULL_REQUEST_PAYLOAD);
        let mut args = parse_args("pullrequest:created", payload.path());
        args.url = Some("https://hooks.example.com/bitbucket?token=xyz".to_string());
        args.token = Some("abc".to_string());

        let (result, output) = run_parse(args, &CliConfig::default());

        let err = result.unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(output.is_empty());
    }

    #[test]
    fn test_token_from_config_is_used_without_flag() {
        let payload = payload_file(PULL_REQUEST_PAYLOAD);
        let mut args = parse_args("pullrequest:created", payload.path());
        args.url = Some("https://hooks.example.com/bitbucket?token=abc".to_string());
        let config = CliConfig {
            webhook: WebhookConfig {
                token: Some(WebhookSecret::from("abc")),
            },
            ..CliConfig::default()
        };

        let (result, _) = run_parse(args, &config);

        result.unwrap();
    }

    #[test]
    fn test_flag_token_overrides_config() {
        let payload = payload_file(PULL_REQUEST_PAYLOAD);
        let mut args = parse_args("pullrequest:created", payload.path());
        args.url = Some("https://hooks.example.com/bitbucket?token=abc".to_string());
        args.token = Some("other".to_string());
        let config = CliConfig {
            webhook: WebhookConfig {
                token: Some(WebhookSecret::from("abc")),
            },
            ..CliConfig::default()
        };

        let (result, _) = run_parse(args, &config);

        assert!(matches!(
            result,
            Err(CliError::Webhook(WebhookError::AuthenticationFailed))
        ));
    }

    #[test]
    fn test_malformed_payload() {
        let payload = payload_file("[1, 2, 3]");

        let (result, _) = run_parse(
            parse_args("repo:push", payload.path()),
            &CliConfig::default(),
        );

        assert_eq!(result.unwrap_err().exit_code(), 3);
    }

    #[test]
    fn test_invalid_url() {
        let payload = payload_file(PULL_REQUEST_PAYLOAD);
        let mut args = parse_args("pullrequest:created", payload.path());
        args.url = Some("not a url".to_string());

        let (result, _) = run_parse(args, &CliConfig::default());

        let err = result.unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument { .. }), "got: {err:?}");
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_missing_payload_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");

        let (result, _) = run_parse(
            parse_args("repo:push", &path),
            &CliConfig::default(),
        );

        let err = result.unwrap_err();
        assert_eq!(err.exit_code(), 5);
        assert!(err.to_string().contains("missing.json"), "{err}");
    }
}

// ============================================================================
// completions command
// ============================================================================

#[test]
fn test_completions_mention_binary_name() {
    let mut out = Vec::new();

    execute_completions_command(clap_complete::Shell::Bash, &mut out).unwrap();

    let script = String::from_utf8(out).unwrap();
    assert!(script.contains("bitbucket-webhook"));
}

// ============================================================================
// Text rendering
// ============================================================================

#[test]
fn test_render_text_skips_empty_fields() {
    let mut event = CanonicalEvent::new(EventKind::Push);
    event.target_branch = "main".to_string();
    event.author.login = "jdoe".to_string();
    event.author.email = "jane@example.com".to_string();

    let text = render_text(&event);

    assert!(text.contains("event:"));
    assert!(text.contains("Push"));
    assert!(text.contains("branch:"));
    assert!(text.contains("jdoe <jane@example.com>"));
    assert!(!text.contains("pull request:"));
    assert!(!text.contains("timestamp:"));
    assert!(!text.contains("compare url:"));
}

#[test]
fn test_render_text_uses_first_message_line() {
    let mut event = CanonicalEvent::new(EventKind::Push);
    event.commit.hash = "abc123".to_string();
    event.commit.message = "Fix build\n\nLonger description".to_string();

    let text = render_text(&event);

    assert!(text.contains("Fix build"));
    assert!(!text.contains("Longer description"));
}
