use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The agent a client asked to talk to.
///
/// Unknown values are preserved verbatim so they can be echoed back in
/// notifications and resolved by the routing policy later on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum AgentType {
    #[default]
    Onboarding,
    Provisioning,
    Other(String),
}

impl AgentType {
    pub fn parse(value: &str) -> Self {
        match value {
            "onboarding" => Self::Onboarding,
            "provisioning" => Self::Provisioning,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Onboarding => "onboarding",
            Self::Provisioning => "provisioning",
            Self::Other(value) => value,
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AgentType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AgentType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::AgentType;

    #[test]
    fn known_agent_types_parse_exactly() {
        assert_eq!(AgentType::parse("onboarding"), AgentType::Onboarding);
        assert_eq!(AgentType::parse("provisioning"), AgentType::Provisioning);
        assert_eq!(AgentType::parse("Onboarding"), AgentType::Other("Onboarding".to_owned()));
    }

    #[test]
    fn unknown_agent_type_round_trips_verbatim() {
        let agent: AgentType = serde_json::from_str("\"billing\"").expect("deserialize");
        assert_eq!(serde_json::to_string(&agent).expect("serialize"), "\"billing\"");
    }
}
