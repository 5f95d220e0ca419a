//! Shared configuration, error types and wire-level domain types for the
//! Agentic-Architect relay.

pub mod config;
pub mod domain;
pub mod errors;

pub use domain::agent::AgentType;
pub use domain::notification::Notification;
pub use domain::request::{ConnectionId, RelayRequest, RequestError, RequestId, SessionId};
pub use errors::{ApplicationError, RelayStatus, StatusResponse};
