use architect_core::config::{AgentsConfig, UnknownAgentPolicy};
use architect_core::AgentType;
use thiserror::Error;

use crate::invoker::AgentTarget;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("unknown agent type `{0}` (expected onboarding|provisioning)")]
    UnknownAgentType(String),
}

/// Maps a client-facing agent type onto the agent that serves it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentDirectory {
    onboarding: AgentTarget,
    provisioning: AgentTarget,
    unknown_agent: UnknownAgentPolicy,
}

impl AgentDirectory {
    pub fn new(
        onboarding: AgentTarget,
        provisioning: AgentTarget,
        unknown_agent: UnknownAgentPolicy,
    ) -> Self {
        Self { onboarding, provisioning, unknown_agent }
    }

    pub fn from_config(config: &AgentsConfig) -> Self {
        Self::new(
            AgentTarget::from_identifier(&config.onboarding_target, &config.alias_id),
            AgentTarget::from_identifier(&config.provisioning_target, &config.alias_id),
            config.unknown_agent,
        )
    }

    pub fn resolve(&self, agent_type: &AgentType) -> Result<&AgentTarget, RoutingError> {
        match agent_type {
            AgentType::Onboarding => Ok(&self.onboarding),
            AgentType::Provisioning => Ok(&self.provisioning),
            AgentType::Other(raw) => match self.unknown_agent {
                UnknownAgentPolicy::Onboarding => Ok(&self.onboarding),
                UnknownAgentPolicy::Provisioning => Ok(&self.provisioning),
                UnknownAgentPolicy::Reject => Err(RoutingError::UnknownAgentType(raw.clone())),
            },
        }
    }

    pub fn unknown_agent_policy(&self) -> UnknownAgentPolicy {
        self.unknown_agent
    }
}
