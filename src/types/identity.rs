use super::identifiers::{AgentId, UserId};
use crate::error::{FleetError, Result};
use serde::{Deserialize, Serialize};

/// Who is calling, as resolved from the bearer credential upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Identity {
    User { user_id: UserId },
    Agent { agent_id: AgentId, owner_id: UserId },
}

impl Identity {
    #[must_use]
    pub fn user(user_id: impl Into<String>) -> Self {
        Self::User {
            user_id: UserId::new(user_id),
        }
    }

    #[must_use]
    pub fn agent(agent_id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self::Agent {
            agent_id: AgentId::new(agent_id),
            owner_id: UserId::new(owner_id),
        }
    }

    /// The user whose records this caller may read. Agents see their owner's fleet.
    #[must_use]
    pub const fn scope_user(&self) -> &UserId {
        match self {
            Self::User { user_id } => user_id,
            Self::Agent { owner_id, .. } => owner_id,
        }
    }

    /// # Errors
    /// Returns `Forbidden` with `message` when the caller is an agent.
    pub fn require_user(&self, message: &str) -> Result<&UserId> {
        match self {
            Self::User { user_id } => Ok(user_id),
            Self::Agent { .. } => Err(FleetError::Forbidden(message.to_string())),
        }
    }

    /// # Errors
    /// Returns `Forbidden` with `message` when the caller is a user.
    pub fn require_agent(&self, message: &str) -> Result<&AgentId> {
        match self {
            Self::Agent { agent_id, .. } => Ok(agent_id),
            Self::User { .. } => Err(FleetError::Forbidden(message.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Identity;

    #[test]
    fn agent_scope_is_its_owner() {
        let agent = Identity::agent("a1", "u1");
        assert_eq!(agent.scope_user().value(), "u1");
        assert!(agent.require_user("no").is_err());
        assert!(agent.require_agent("no").is_ok());
        assert!(Identity::user("u1").require_agent("no").is_err());
    }
}
