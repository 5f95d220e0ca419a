use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use architect_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let api_key = config
        .invocation
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    let entries: Vec<(&str, String, &[&str])> = vec![
        entry(
            "agents.onboarding_target",
            config.agents.onboarding_target.clone(),
            &["ARCHITECT_AGENTS_ONBOARDING_TARGET", "ONBOARDING_AGENT_ARN"],
        ),
        entry(
            "agents.provisioning_target",
            config.agents.provisioning_target.clone(),
            &["ARCHITECT_AGENTS_PROVISIONING_TARGET", "PROVISIONING_AGENT_ARN"],
        ),
        entry("agents.alias_id", config.agents.alias_id.clone(), &["ARCHITECT_AGENTS_ALIAS_ID"]),
        entry(
            "agents.unknown_agent",
            format!("{:?}", config.agents.unknown_agent),
            &["ARCHITECT_AGENTS_UNKNOWN_AGENT"],
        ),
        entry(
            "invocation.endpoint_url",
            config.invocation.resolved_endpoint(),
            &["ARCHITECT_INVOCATION_ENDPOINT_URL"],
        ),
        entry("invocation.api_key", api_key, &["ARCHITECT_INVOCATION_API_KEY"]),
        entry(
            "invocation.region",
            config.invocation.region.clone(),
            &["ARCHITECT_INVOCATION_REGION", "REGION"],
        ),
        entry(
            "invocation.timeout_secs",
            config.invocation.timeout_secs.to_string(),
            &["ARCHITECT_INVOCATION_TIMEOUT_SECS"],
        ),
        entry(
            "relay.connection_backend",
            format!("{:?}", config.relay.connection_backend),
            &["ARCHITECT_RELAY_CONNECTION_BACKEND"],
        ),
        entry(
            "relay.management_endpoint",
            config
                .relay
                .management_endpoint
                .clone()
                .unwrap_or_else(|| "<derived per event>".to_string()),
            &["ARCHITECT_RELAY_MANAGEMENT_ENDPOINT"],
        ),
        entry("relay.stage", config.relay.stage.clone(), &["ARCHITECT_RELAY_STAGE"]),
        entry(
            "relay.executor",
            format!("{:?}", config.relay.executor),
            &["ARCHITECT_RELAY_EXECUTOR"],
        ),
        entry(
            "relay.worker_count",
            config.relay.worker_count.to_string(),
            &["ARCHITECT_RELAY_WORKER_COUNT"],
        ),
        entry(
            "relay.queue_capacity",
            config.relay.queue_capacity.to_string(),
            &["ARCHITECT_RELAY_QUEUE_CAPACITY"],
        ),
        entry(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["ARCHITECT_SERVER_BIND_ADDRESS"],
        ),
        entry("server.port", config.server.port.to_string(), &["ARCHITECT_SERVER_PORT"]),
        entry(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["ARCHITECT_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        entry(
            "logging.level",
            config.logging.level.clone(),
            &["ARCHITECT_LOGGING_LEVEL", "ARCHITECT_LOG_LEVEL"],
        ),
        entry(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["ARCHITECT_LOGGING_FORMAT", "ARCHITECT_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, value, env_keys) in entries {
        lines.push(render_line(key_path, &value, source(key_path, env_keys)));
    }

    lines.join("\n")
}

fn entry<'a>(
    key_path: &'a str,
    value: String,
    env_keys: &'a [&'a str],
) -> (&'a str, String, &'a [&'a str]) {
    (key_path, value, env_keys)
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("architect.toml"), PathBuf::from("config/architect.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
