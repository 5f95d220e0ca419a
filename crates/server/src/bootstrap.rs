use std::sync::Arc;
use std::time::Duration;

use architect_agent::{AgentDirectory, AgentRuntime, HttpAgentInvoker, InvocationError};
use architect_core::config::{AppConfig, ConfigError, ConnectionBackend, LoadOptions, TaskExecutor};
use architect_relay::{
    http_manager_factory, LocalConnectionRegistry, Notifier, RelayDispatcher, SpawnSubmitter,
    TaskSubmitter, WorkerPool,
};
use thiserror::Error;
use tracing::info;

const MANAGEMENT_API_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Application {
    pub config: AppConfig,
    pub dispatcher: RelayDispatcher,
    pub connections: Arc<LocalConnectionRegistry>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("agent invoker could not be built: {0}")]
    Invoker(#[source] InvocationError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let invoker =
        HttpAgentInvoker::from_config(&config.invocation).map_err(BootstrapError::Invoker)?;
    let runtime =
        AgentRuntime::new(AgentDirectory::from_config(&config.agents), Arc::new(invoker));
    info!(
        event_name = "system.bootstrap.agents_configured",
        correlation_id = "bootstrap",
        endpoint = %config.invocation.resolved_endpoint(),
        unknown_agent = ?config.agents.unknown_agent,
        "agent runtime configured"
    );

    let connections = Arc::new(LocalConnectionRegistry::new());
    let notifier = match config.relay.connection_backend {
        ConnectionBackend::Local => Notifier::with_manager(connections.clone()),
        ConnectionBackend::Http => Notifier::new(http_manager_factory(
            config.relay.management_endpoint.clone(),
            MANAGEMENT_API_TIMEOUT,
        )),
    };

    let submitter: Arc<dyn TaskSubmitter> = match config.relay.executor {
        TaskExecutor::Spawn => Arc::new(SpawnSubmitter),
        TaskExecutor::WorkerPool => {
            Arc::new(WorkerPool::new(config.relay.worker_count, config.relay.queue_capacity))
        }
    };
    info!(
        event_name = "system.bootstrap.relay_configured",
        correlation_id = "bootstrap",
        connection_backend = ?config.relay.connection_backend,
        executor = ?config.relay.executor,
        "relay dispatcher configured"
    );

    let dispatcher = RelayDispatcher::new(notifier, runtime, submitter);
    Ok(Application { config, dispatcher, connections })
}
