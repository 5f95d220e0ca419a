use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub agents: AgentsConfig,
    pub invocation: InvocationConfig,
    pub relay: RelayConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct AgentsConfig {
    /// Agent id or full ARN of the onboarding agent.
    pub onboarding_target: String,
    /// Agent id or full ARN of the provisioning agent.
    pub provisioning_target: String,
    pub alias_id: String,
    pub unknown_agent: UnknownAgentPolicy,
}

#[derive(Clone, Debug)]
pub struct InvocationConfig {
    pub endpoint_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub region: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub connection_backend: ConnectionBackend,
    pub management_endpoint: Option<String>,
    pub stage: String,
    pub executor: TaskExecutor,
    pub worker_count: usize,
    pub queue_capacity: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// What to do with an `agentType` that is neither onboarding nor provisioning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownAgentPolicy {
    Reject,
    Onboarding,
    Provisioning,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionBackend {
    /// Connections held by this process' own WebSocket endpoint.
    Local,
    /// Connections held by a managed gateway, reached over its management API.
    Http,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskExecutor {
    Spawn,
    WorkerPool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub onboarding_target: Option<String>,
    pub provisioning_target: Option<String>,
    pub unknown_agent: Option<UnknownAgentPolicy>,
    pub invocation_endpoint_url: Option<String>,
    pub invocation_api_key: Option<String>,
    pub connection_backend: Option<ConnectionBackend>,
    pub executor: Option<TaskExecutor>,
    pub server_port: Option<u16>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            agents: AgentsConfig {
                onboarding_target: String::new(),
                provisioning_target: String::new(),
                alias_id: "DEFAULT".to_string(),
                unknown_agent: UnknownAgentPolicy::Onboarding,
            },
            invocation: InvocationConfig {
                endpoint_url: None,
                api_key: None,
                region: "us-east-1".to_string(),
                timeout_secs: 600,
            },
            relay: RelayConfig {
                connection_backend: ConnectionBackend::Local,
                management_endpoint: None,
                stage: "prod".to_string(),
                executor: TaskExecutor::Spawn,
                worker_count: 8,
                queue_capacity: 256,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 9000,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl InvocationConfig {
    /// Explicit endpoint, or the regional agent runtime endpoint.
    pub fn resolved_endpoint(&self) -> String {
        match &self.endpoint_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://bedrock-agent-runtime.{}.amazonaws.com", self.region),
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for UnknownAgentPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "onboarding" => Ok(Self::Onboarding),
            "provisioning" => Ok(Self::Provisioning),
            other => Err(ConfigError::Validation(format!(
                "unsupported unknown agent policy `{other}` (expected reject|onboarding|provisioning)"
            ))),
        }
    }
}

impl std::str::FromStr for ConnectionBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "http" => Ok(Self::Http),
            other => Err(ConfigError::Validation(format!(
                "unsupported connection backend `{other}` (expected local|http)"
            ))),
        }
    }
}

impl std::str::FromStr for TaskExecutor {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "spawn" => Ok(Self::Spawn),
            "worker_pool" => Ok(Self::WorkerPool),
            other => Err(ConfigError::Validation(format!(
                "unsupported task executor `{other}` (expected spawn|worker_pool)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("architect.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(agents) = patch.agents {
            if let Some(onboarding_target) = agents.onboarding_target {
                self.agents.onboarding_target = onboarding_target;
            }
            if let Some(provisioning_target) = agents.provisioning_target {
                self.agents.provisioning_target = provisioning_target;
            }
            if let Some(alias_id) = agents.alias_id {
                self.agents.alias_id = alias_id;
            }
            if let Some(unknown_agent) = agents.unknown_agent {
                self.agents.unknown_agent = unknown_agent;
            }
        }

        if let Some(invocation) = patch.invocation {
            if let Some(endpoint_url) = invocation.endpoint_url {
                self.invocation.endpoint_url = Some(endpoint_url);
            }
            if let Some(api_key_value) = invocation.api_key {
                self.invocation.api_key = Some(secret_value(api_key_value));
            }
            if let Some(region) = invocation.region {
                self.invocation.region = region;
            }
            if let Some(timeout_secs) = invocation.timeout_secs {
                self.invocation.timeout_secs = timeout_secs;
            }
        }

        if let Some(relay) = patch.relay {
            if let Some(connection_backend) = relay.connection_backend {
                self.relay.connection_backend = connection_backend;
            }
            if let Some(management_endpoint) = relay.management_endpoint {
                self.relay.management_endpoint = Some(management_endpoint);
            }
            if let Some(stage) = relay.stage {
                self.relay.stage = stage;
            }
            if let Some(executor) = relay.executor {
                self.relay.executor = executor;
            }
            if let Some(worker_count) = relay.worker_count {
                self.relay.worker_count = worker_count;
            }
            if let Some(queue_capacity) = relay.queue_capacity {
                self.relay.queue_capacity = queue_capacity;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let onboarding = read_env("ARCHITECT_AGENTS_ONBOARDING_TARGET")
            .or_else(|| read_env("ONBOARDING_AGENT_ARN"));
        if let Some(value) = onboarding {
            self.agents.onboarding_target = value;
        }
        let provisioning = read_env("ARCHITECT_AGENTS_PROVISIONING_TARGET")
            .or_else(|| read_env("PROVISIONING_AGENT_ARN"));
        if let Some(value) = provisioning {
            self.agents.provisioning_target = value;
        }
        if let Some(value) = read_env("ARCHITECT_AGENTS_ALIAS_ID") {
            self.agents.alias_id = value;
        }
        if let Some(value) = read_env("ARCHITECT_AGENTS_UNKNOWN_AGENT") {
            self.agents.unknown_agent = value.parse()?;
        }

        if let Some(value) = read_env("ARCHITECT_INVOCATION_ENDPOINT_URL") {
            self.invocation.endpoint_url = Some(value);
        }
        if let Some(value) = read_env("ARCHITECT_INVOCATION_API_KEY") {
            self.invocation.api_key = Some(secret_value(value));
        }
        let region = read_env("ARCHITECT_INVOCATION_REGION").or_else(|| read_env("REGION"));
        if let Some(value) = region {
            self.invocation.region = value;
        }
        if let Some(value) = read_env("ARCHITECT_INVOCATION_TIMEOUT_SECS") {
            self.invocation.timeout_secs = parse_u64("ARCHITECT_INVOCATION_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ARCHITECT_RELAY_CONNECTION_BACKEND") {
            self.relay.connection_backend = value.parse()?;
        }
        if let Some(value) = read_env("ARCHITECT_RELAY_MANAGEMENT_ENDPOINT") {
            self.relay.management_endpoint = Some(value);
        }
        if let Some(value) = read_env("ARCHITECT_RELAY_STAGE") {
            self.relay.stage = value;
        }
        if let Some(value) = read_env("ARCHITECT_RELAY_EXECUTOR") {
            self.relay.executor = value.parse()?;
        }
        if let Some(value) = read_env("ARCHITECT_RELAY_WORKER_COUNT") {
            self.relay.worker_count = parse_usize("ARCHITECT_RELAY_WORKER_COUNT", &value)?;
        }
        if let Some(value) = read_env("ARCHITECT_RELAY_QUEUE_CAPACITY") {
            self.relay.queue_capacity = parse_usize("ARCHITECT_RELAY_QUEUE_CAPACITY", &value)?;
        }

        if let Some(value) = read_env("ARCHITECT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ARCHITECT_SERVER_PORT") {
            self.server.port = parse_u16("ARCHITECT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("ARCHITECT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("ARCHITECT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("ARCHITECT_LOGGING_LEVEL").or_else(|| read_env("ARCHITECT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ARCHITECT_LOGGING_FORMAT").or_else(|| read_env("ARCHITECT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(onboarding_target) = overrides.onboarding_target {
            self.agents.onboarding_target = onboarding_target;
        }
        if let Some(provisioning_target) = overrides.provisioning_target {
            self.agents.provisioning_target = provisioning_target;
        }
        if let Some(unknown_agent) = overrides.unknown_agent {
            self.agents.unknown_agent = unknown_agent;
        }
        if let Some(endpoint_url) = overrides.invocation_endpoint_url {
            self.invocation.endpoint_url = Some(endpoint_url);
        }
        if let Some(api_key) = overrides.invocation_api_key {
            self.invocation.api_key = Some(secret_value(api_key));
        }
        if let Some(connection_backend) = overrides.connection_backend {
            self.relay.connection_backend = connection_backend;
        }
        if let Some(executor) = overrides.executor {
            self.relay.executor = executor;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_agents(&self.agents)?;
        validate_invocation(&self.invocation)?;
        validate_relay(&self.relay)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("architect.toml"), PathBuf::from("config/architect.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_agents(agents: &AgentsConfig) -> Result<(), ConfigError> {
    if agents.onboarding_target.trim().is_empty() {
        return Err(ConfigError::Validation(
            "agents.onboarding_target is required (agent id or ARN, or set ONBOARDING_AGENT_ARN)"
                .to_string(),
        ));
    }
    if agents.provisioning_target.trim().is_empty() {
        return Err(ConfigError::Validation(
            "agents.provisioning_target is required (agent id or ARN, or set PROVISIONING_AGENT_ARN)"
                .to_string(),
        ));
    }
    if agents.onboarding_target.trim().ends_with('/')
        || agents.provisioning_target.trim().ends_with('/')
    {
        return Err(ConfigError::Validation(
            "agent targets must not end with `/` (the agent id is the last path segment)"
                .to_string(),
        ));
    }
    if agents.alias_id.trim().is_empty() {
        return Err(ConfigError::Validation("agents.alias_id must not be empty".to_string()));
    }

    Ok(())
}

fn validate_invocation(invocation: &InvocationConfig) -> Result<(), ConfigError> {
    if invocation.timeout_secs == 0 || invocation.timeout_secs > 900 {
        return Err(ConfigError::Validation(
            "invocation.timeout_secs must be in range 1..=900".to_string(),
        ));
    }

    if let Some(url) = &invocation.endpoint_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "invocation.endpoint_url must start with http:// or https://".to_string(),
            ));
        }
    } else if invocation.region.trim().is_empty() {
        return Err(ConfigError::Validation(
            "invocation.region is required when invocation.endpoint_url is not set".to_string(),
        ));
    }

    if let Some(api_key) = &invocation.api_key {
        if api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "invocation.api_key must not be blank when provided".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_relay(relay: &RelayConfig) -> Result<(), ConfigError> {
    if let Some(endpoint) = &relay.management_endpoint {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ConfigError::Validation(
                "relay.management_endpoint must start with http:// or https://".to_string(),
            ));
        }
    }

    if relay.stage.trim().is_empty() {
        return Err(ConfigError::Validation("relay.stage must not be empty".to_string()));
    }

    if relay.executor == TaskExecutor::WorkerPool {
        if relay.worker_count == 0 {
            return Err(ConfigError::Validation(
                "relay.worker_count must be greater than zero".to_string(),
            ));
        }
        if relay.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "relay.queue_capacity must be greater than zero".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    agents: Option<AgentsPatch>,
    invocation: Option<InvocationPatch>,
    relay: Option<RelayPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentsPatch {
    onboarding_target: Option<String>,
    provisioning_target: Option<String>,
    alias_id: Option<String>,
    unknown_agent: Option<UnknownAgentPolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct InvocationPatch {
    endpoint_url: Option<String>,
    api_key: Option<String>,
    region: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RelayPatch {
    connection_backend: Option<ConnectionBackend>,
    management_endpoint: Option<String>,
    stage: Option<String>,
    executor: Option<TaskExecutor>,
    worker_count: Option<usize>,
    queue_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
