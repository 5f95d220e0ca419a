use std::sync::Arc;

use architect_core::{AgentType, SessionId};
use thiserror::Error;

use crate::directory::{AgentDirectory, RoutingError};
use crate::invoker::{AgentInvocationResult, AgentInvoker, InvocationError};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Invocation(#[from] InvocationError),
}

impl AgentError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Routing(_) => "RoutingError",
            Self::Invocation(error) => error.kind(),
        }
    }

    /// Text shown to the client, e.g. `TimeoutError: agent invocation timed out after 600s`.
    pub fn describe(&self) -> String {
        format!("{}: {self}", self.kind())
    }
}

/// Routes a message to the right agent and waits for its full answer.
#[derive(Clone)]
pub struct AgentRuntime {
    directory: AgentDirectory,
    invoker: Arc<dyn AgentInvoker>,
}

impl AgentRuntime {
    pub fn new(directory: AgentDirectory, invoker: Arc<dyn AgentInvoker>) -> Self {
        Self { directory, invoker }
    }

    pub fn directory(&self) -> &AgentDirectory {
        &self.directory
    }

    pub async fn ask(
        &self,
        agent_type: &AgentType,
        message: &str,
        session_id: &SessionId,
    ) -> Result<AgentInvocationResult, AgentError> {
        let target = self.directory.resolve(agent_type)?;
        let result = self.invoker.invoke(target, message, session_id).await?;
        Ok(result)
    }
}
