use std::sync::Arc;

use architect_agent::{AgentDirectory, AgentError, AgentRuntime, HttpAgentInvoker};
use architect_core::config::{AppConfig, LoadOptions};
use architect_core::{AgentType, SessionId};
use serde::Serialize;
use uuid::Uuid;

use super::CommandResult;

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum InvokeStatus {
    Ok,
    Error,
}

/// Printed for every `invoke`, so scripts can pick up the session to continue.
#[derive(Debug, Serialize)]
struct InvokeOutcome<'a> {
    command: &'static str,
    status: InvokeStatus,
    agent_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<&'a str>,
    message: String,
}

impl<'a> InvokeOutcome<'a> {
    fn failed(
        agent_type: &'a str,
        session_id: Option<&'a str>,
        error_class: &'a str,
        message: String,
    ) -> Self {
        Self {
            command: "invoke",
            status: InvokeStatus::Error,
            agent_type,
            session_id,
            error_class: Some(error_class),
            message,
        }
    }
}

pub fn run(agent: &str, session: Option<&str>, message: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            let outcome =
                InvokeOutcome::failed(agent, session, "config_validation", error.to_string());
            return CommandResult::json(&outcome, 2);
        }
    };

    let invoker = match HttpAgentInvoker::from_config(&config.invocation) {
        Ok(invoker) => invoker,
        Err(error) => {
            let outcome = InvokeOutcome::failed(agent, session, error.kind(), error.to_string());
            return CommandResult::json(&outcome, 1);
        }
    };
    let runtime =
        AgentRuntime::new(AgentDirectory::from_config(&config.agents), Arc::new(invoker));

    execute(&runtime, agent, session, message)
}

/// One blocking round-trip through `runtime`; the response text becomes the message.
pub fn execute(
    runtime: &AgentRuntime,
    agent: &str,
    session: Option<&str>,
    message: &str,
) -> CommandResult {
    let agent_type = AgentType::parse(agent);
    let agent_label = agent_type.to_string();
    let session_id = match session.filter(|session| !session.trim().is_empty()) {
        Some(session) => SessionId(session.to_string()),
        None => SessionId(format!("session-{}", Uuid::new_v4())),
    };

    let executor = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(executor) => executor,
        Err(error) => {
            let outcome = InvokeOutcome::failed(
                &agent_label,
                Some(&session_id.0),
                "runtime",
                format!("failed to initialize async runtime: {error}"),
            );
            return CommandResult::json(&outcome, 1);
        }
    };

    match executor.block_on(runtime.ask(&agent_type, message, &session_id)) {
        Ok(result) => {
            let outcome = InvokeOutcome {
                command: "invoke",
                status: InvokeStatus::Ok,
                agent_type: &agent_label,
                session_id: Some(&result.session_id.0),
                error_class: None,
                message: format!(
                    "[{agent_label} | {}] {}",
                    result.session_id, result.response_text
                ),
            };
            CommandResult::json(&outcome, 0)
        }
        Err(error) => {
            let exit_code = if matches!(error, AgentError::Routing(_)) { 2 } else { 1 };
            let outcome = InvokeOutcome::failed(
                &agent_label,
                Some(&session_id.0),
                error.kind(),
                error.describe(),
            );
            CommandResult::json(&outcome, exit_code)
        }
    }
}
