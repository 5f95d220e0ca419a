pub mod config;
pub mod doctor;
pub mod invoke;

use serde::Serialize;
use serde_json::json;

/// What a command prints and the exit code the process ends with.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

impl CommandResult {
    pub fn text(output: String, exit_code: u8) -> Self {
        Self { exit_code, output }
    }

    /// One JSON line; a payload that will not serialize becomes a `serialization` error.
    pub fn json<T: Serialize>(payload: &T, exit_code: u8) -> Self {
        match serde_json::to_string(payload) {
            Ok(output) => Self { exit_code, output },
            Err(error) => Self {
                exit_code: 1,
                output: json!({
                    "status": "error",
                    "error_class": "serialization",
                    "message": error.to_string(),
                })
                .to_string(),
            },
        }
    }
}
