use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::agent::AgentType;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl SessionId {
    /// Session used when the client does not pin one: stable for a given request id.
    pub fn derived_from(request_id: &RequestId) -> Self {
        Self(format!("session-{}", request_id.0))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("request body is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("request is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("request field `{0}` must be a string")]
    InvalidField(&'static str),
}

/// A client message addressed to one of the agents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayRequest {
    pub id: RequestId,
    pub agent_type: AgentType,
    pub message: String,
    pub session_id: SessionId,
}

impl RelayRequest {
    /// Parses `{id, agentType?, message, sessionId?}`.
    pub fn parse(body: &str) -> Result<Self, RequestError> {
        let value: Value =
            serde_json::from_str(body).map_err(|error| RequestError::InvalidJson(error.to_string()))?;
        let object = value.as_object().ok_or(RequestError::NotAnObject)?;

        let id = match object.get("id") {
            Some(raw) => id_from_value(raw).ok_or(RequestError::InvalidField("id"))?,
            None => return Err(RequestError::MissingField("id")),
        };
        let message = match object.get("message") {
            Some(Value::String(message)) => message.clone(),
            Some(_) => return Err(RequestError::InvalidField("message")),
            None => return Err(RequestError::MissingField("message")),
        };
        let agent_type = match object.get("agentType") {
            Some(Value::String(agent_type)) => AgentType::parse(agent_type),
            Some(Value::Null) | None => AgentType::default(),
            Some(_) => return Err(RequestError::InvalidField("agentType")),
        };
        let session_id = match object.get("sessionId") {
            Some(Value::String(session_id)) if !session_id.is_empty() => {
                SessionId(session_id.clone())
            }
            Some(Value::String(_)) | Some(Value::Null) | None => SessionId::derived_from(&id),
            Some(_) => return Err(RequestError::InvalidField("sessionId")),
        };

        Ok(Self { id, agent_type, message, session_id })
    }
}

impl RequestId {
    /// Best-effort id extraction for reporting failures on bodies that did not parse.
    pub fn recover(body: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(body).ok()?;
        value.get("id").and_then(id_from_value)
    }
}

fn id_from_value(value: &Value) -> Option<RequestId> {
    match value {
        Value::String(id) if !id.is_empty() => Some(RequestId(id.clone())),
        Value::Number(id) => Some(RequestId(id.to_string())),
        _ => None,
    }
}
