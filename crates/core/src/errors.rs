use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::request::RequestError;

/// Status reported back to whatever delivered the event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelayStatus {
    Ok,
    BadRequest,
    InternalError,
}

impl RelayStatus {
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::InternalError => 500,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Ok)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status_code: u16,
}

impl From<RelayStatus> for StatusResponse {
    fn from(status: RelayStatus) -> Self {
        Self { status_code: status.code() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("unsupported route key `{0}`")]
    UnsupportedRoute(String),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("event is missing connection id")]
    MissingConnection,
    #[error("task submission failed: {0}")]
    Submission(String),
}

impl ApplicationError {
    /// Only routing mistakes are the caller's fault; everything else surfaced
    /// on the synchronous path is reported as a server failure.
    pub fn status(&self) -> RelayStatus {
        match self {
            Self::UnsupportedRoute(_) => RelayStatus::BadRequest,
            Self::Request(_) | Self::MissingConnection | Self::Submission(_) => {
                RelayStatus::InternalError
            }
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::UnsupportedRoute(_) => "unsupported_route",
            Self::Request(_) => "malformed_request",
            Self::MissingConnection => "missing_connection",
            Self::Submission(_) => "submission",
        }
    }
}
