use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentType;
use crate::domain::request::{RequestId, SessionId};

pub const CONNECTED_MESSAGE: &str = "Connected to Agentic-Architect";
pub const THINKING_MESSAGE: &str = "Agent is thinking...";

/// A message pushed to a client connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Connected {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Acknowledged {
        request_id: RequestId,
        agent_type: AgentType,
    },
    #[serde(rename_all = "camelCase")]
    Progress {
        request_id: RequestId,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Response {
        request_id: RequestId,
        agent_type: AgentType,
        response: String,
        session_id: SessionId,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        request_id: Option<RequestId>,
        error: String,
    },
}

impl Notification {
    pub fn connected() -> Self {
        Self::Connected { message: CONNECTED_MESSAGE.to_owned() }
    }

    pub fn thinking(request_id: RequestId) -> Self {
        Self::Progress { request_id, message: THINKING_MESSAGE.to_owned() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Acknowledged { .. } => "acknowledged",
            Self::Progress { .. } => "progress",
            Self::Response { .. } => "response",
            Self::Error { .. } => "error",
        }
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::Connected { .. } => None,
            Self::Acknowledged { request_id, .. }
            | Self::Progress { request_id, .. }
            | Self::Response { request_id, .. } => Some(request_id),
            Self::Error { request_id, .. } => request_id.as_ref(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Response { .. } | Self::Error { .. })
    }
}
