//! Inbound event shapes.
//!
//! A gateway event is what the bidirectional-connection gateway delivers for
//! `$connect`, `$disconnect` and `$default`. A processing job is the relay
//! re-entering itself out-of-band; on the wire it is an object carrying the
//! `async_processing` marker key.

use architect_core::{AgentType, ConnectionId, RequestId, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CONNECT_ROUTE: &str = "$connect";
pub const DISCONNECT_ROUTE: &str = "$disconnect";
pub const DEFAULT_ROUTE: &str = "$default";
pub const ASYNC_PROCESSING_MARKER: &str = "async_processing";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RouteKey {
    Connect,
    Disconnect,
    Default,
    Other(String),
}

impl RouteKey {
    pub fn parse(value: &str) -> Self {
        match value {
            CONNECT_ROUTE => Self::Connect,
            DISCONNECT_ROUTE => Self::Disconnect,
            DEFAULT_ROUTE => Self::Default,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Connect => CONNECT_ROUTE,
            Self::Disconnect => DISCONNECT_ROUTE,
            Self::Default => DEFAULT_ROUTE,
            Self::Other(value) => value,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<ConnectionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayEvent {
    #[serde(default)]
    pub request_context: RequestContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Where a notification for this event should be posted back to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressingContext {
    pub domain_name: Option<String>,
    pub stage: Option<String>,
}

impl AddressingContext {
    /// `https://{domainName}/{stage}`, the management endpoint of a managed gateway.
    pub fn endpoint(&self) -> Option<String> {
        let domain = self.domain_name.as_deref().filter(|domain| !domain.is_empty())?;
        match self.stage.as_deref().filter(|stage| !stage.is_empty()) {
            Some(stage) => Some(format!("https://{domain}/{stage}")),
            None => Some(format!("https://{domain}")),
        }
    }
}

impl GatewayEvent {
    pub fn new(
        route_key: &str,
        connection_id: ConnectionId,
        addressing: &AddressingContext,
        body: Option<String>,
    ) -> Self {
        Self {
            request_context: RequestContext {
                route_key: Some(route_key.to_owned()),
                connection_id: Some(connection_id),
                domain_name: addressing.domain_name.clone(),
                stage: addressing.stage.clone(),
            },
            body,
        }
    }

    pub fn route_key(&self) -> RouteKey {
        RouteKey::parse(self.request_context.route_key.as_deref().unwrap_or_default())
    }

    pub fn connection_id(&self) -> Option<&ConnectionId> {
        self.request_context.connection_id.as_ref()
    }

    pub fn addressing(&self) -> AddressingContext {
        AddressingContext {
            domain_name: self.request_context.domain_name.clone(),
            stage: self.request_context.stage.clone(),
        }
    }
}

/// Everything the out-of-band step needs, captured at acknowledgment time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingJob {
    pub agent_type: AgentType,
    pub message: String,
    pub request_id: RequestId,
    pub session_id: SessionId,
    pub connection_id: ConnectionId,
    /// The originating gateway event; used to address the connection later.
    pub event: GatewayEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayEvent {
    Gateway(GatewayEvent),
    AsyncProcessing(ProcessingJob),
}

#[derive(Serialize, Deserialize)]
struct AsyncProcessingEnvelope {
    async_processing: ProcessingJob,
}

impl RelayEvent {
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        if value.get(ASYNC_PROCESSING_MARKER).is_some() {
            let envelope: AsyncProcessingEnvelope = serde_json::from_value(value)?;
            return Ok(Self::AsyncProcessing(envelope.async_processing));
        }
        serde_json::from_value(value).map(Self::Gateway)
    }

    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Gateway(event) => serde_json::to_value(event),
            Self::AsyncProcessing(job) => {
                serde_json::to_value(AsyncProcessingEnvelope { async_processing: job.clone() })
            }
        }
    }
}
