use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use architect_core::{ConnectionId, Notification};
use async_trait::async_trait;
use reqwest::Url;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::events::AddressingContext;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection `{0}` is gone")]
    Gone(ConnectionId),
    #[error("no management endpoint could be derived for the connection")]
    MissingEndpoint,
    #[error("notification could not be serialized: {0}")]
    Serialize(String),
    #[error("delivery transport failed: {0}")]
    Transport(String),
}

/// Pushes a text payload to one open client connection.
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    async fn post_to_connection(
        &self,
        connection_id: &ConnectionId,
        data: &str,
    ) -> Result<(), DeliveryError>;
}

pub type ConnectionManagerFactory = Arc<
    dyn Fn(&AddressingContext) -> Result<Arc<dyn ConnectionManager>, DeliveryError> + Send + Sync,
>;

/// Serializes notifications and hands them to a lazily built connection manager.
///
/// The manager is built from the addressing context of the first event that
/// needs it and reused for the life of the process.
pub struct Notifier {
    factory: ConnectionManagerFactory,
    manager: OnceLock<Arc<dyn ConnectionManager>>,
}

impl Notifier {
    pub fn new(factory: ConnectionManagerFactory) -> Self {
        Self { factory, manager: OnceLock::new() }
    }

    /// A notifier whose manager is fixed up front.
    pub fn with_manager(manager: Arc<dyn ConnectionManager>) -> Self {
        let cached = OnceLock::new();
        let _ = cached.set(manager.clone());
        let factory: ConnectionManagerFactory = Arc::new(move |_: &AddressingContext| {
            Ok::<_, DeliveryError>(manager.clone())
        });
        Self { factory, manager: cached }
    }

    fn manager(
        &self,
        addressing: &AddressingContext,
    ) -> Result<&Arc<dyn ConnectionManager>, DeliveryError> {
        if let Some(manager) = self.manager.get() {
            return Ok(manager);
        }

        // Racing builders are harmless; the first one stored wins.
        let built = (self.factory)(addressing)?;
        info!(
            event_name = "relay.notifier.manager_initialized",
            endpoint = addressing.endpoint().as_deref().unwrap_or("local"),
            "connection manager initialized"
        );
        Ok(self.manager.get_or_init(|| built))
    }

    pub async fn send(
        &self,
        connection_id: &ConnectionId,
        notification: &Notification,
        addressing: &AddressingContext,
    ) -> Result<(), DeliveryError> {
        let result = self.deliver(connection_id, notification, addressing).await;
        match &result {
            Ok(()) => debug!(
                event_name = "relay.notification.sent",
                connection_id = %connection_id,
                notification_type = notification.kind(),
                request_id = notification.request_id().map(|id| id.0.as_str()).unwrap_or("none"),
                terminal = notification.is_terminal(),
                "notification delivered"
            ),
            Err(error) => warn!(
                event_name = "relay.notification.failed",
                connection_id = %connection_id,
                notification_type = notification.kind(),
                request_id = notification.request_id().map(|id| id.0.as_str()).unwrap_or("none"),
                error = %error,
                "notification delivery failed"
            ),
        }
        result
    }

    async fn deliver(
        &self,
        connection_id: &ConnectionId,
        notification: &Notification,
        addressing: &AddressingContext,
    ) -> Result<(), DeliveryError> {
        let payload = serde_json::to_string(notification)
            .map_err(|error| DeliveryError::Serialize(error.to_string()))?;
        let manager = self.manager(addressing)?;
        manager.post_to_connection(connection_id, &payload).await
    }
}

/// Connections terminated by this process' own WebSocket endpoint.
#[derive(Default)]
pub struct LocalConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<String>>>,
}

impl LocalConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection and returns the stream its outbound frames arrive on.
    pub async fn register(&self, connection_id: ConnectionId) -> mpsc::UnboundedReceiver<String> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.connections.write().await.insert(connection_id, sender);
        receiver
    }

    pub async fn unregister(&self, connection_id: &ConnectionId) -> bool {
        self.connections.write().await.remove(connection_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ConnectionManager for LocalConnectionRegistry {
    async fn post_to_connection(
        &self,
        connection_id: &ConnectionId,
        data: &str,
    ) -> Result<(), DeliveryError> {
        let connections = self.connections.read().await;
        let sender =
            connections.get(connection_id).ok_or_else(|| DeliveryError::Gone(connection_id.clone()))?;
        sender.send(data.to_owned()).map_err(|_| DeliveryError::Gone(connection_id.clone()))
    }
}

/// Connections held by a managed gateway, reached through its management API.
pub struct HttpConnectionManager {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpConnectionManager {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| DeliveryError::Transport(error.to_string()))?;

        let endpoint = endpoint.into();
        let endpoint = Url::parse(&endpoint).map_err(|error| {
            DeliveryError::Transport(format!("invalid management endpoint `{endpoint}`: {error}"))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(DeliveryError::Transport(format!(
                "management endpoint `{endpoint}` cannot carry a path"
            )));
        }

        Ok(Self { client, endpoint })
    }

    fn connection_url(&self, connection_id: &ConnectionId) -> Result<Url, DeliveryError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| {
                DeliveryError::Transport("management endpoint cannot carry a path".into())
            })?
            .pop_if_empty()
            .push("@connections")
            .push(&connection_id.0);
        Ok(url)
    }
}

#[async_trait]
impl ConnectionManager for HttpConnectionManager {
    async fn post_to_connection(
        &self,
        connection_id: &ConnectionId,
        data: &str,
    ) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.connection_url(connection_id)?)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(data.to_owned())
            .send()
            .await
            .map_err(|error| DeliveryError::Transport(error.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::GONE {
            return Err(DeliveryError::Gone(connection_id.clone()));
        }
        if !status.is_success() {
            return Err(DeliveryError::Transport(format!(
                "management endpoint returned {}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}

/// Factory for the managed-gateway backend.
///
/// `fixed_endpoint` wins over the endpoint derived from the event.
pub fn http_manager_factory(
    fixed_endpoint: Option<String>,
    timeout: Duration,
) -> ConnectionManagerFactory {
    Arc::new(move |addressing: &AddressingContext| {
        let endpoint = fixed_endpoint
            .clone()
            .or_else(|| addressing.endpoint())
            .ok_or(DeliveryError::MissingEndpoint)?;
        let manager: Arc<dyn ConnectionManager> =
            Arc::new(HttpConnectionManager::new(endpoint, timeout)?);
        Ok::<_, DeliveryError>(manager)
    })
}
