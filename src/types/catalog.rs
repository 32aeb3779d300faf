use super::identifiers::{AgentId, ContainerId, ExceptionId, ScriptId};
use super::platform::PlatformFamily;
use crate::error::{FleetError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An executable patch script. Operations snapshot its hash at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub id: ScriptId,
    pub name: String,
    pub platform_family: PlatformFamily,
    pub os_version: Option<String>,
    pub file_name: String,
    pub sha256: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// What an agent checks a downloaded script against before running it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptValidation {
    pub id: ScriptId,
    pub name: String,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum ExceptionScope {
    Agent(AgentId),
    Container(ContainerId),
}

impl ExceptionScope {
    /// Exactly one of the two ids must be present.
    ///
    /// # Errors
    /// Returns `Validation` when both or neither are set.
    pub fn from_parts(agent_id: Option<AgentId>, container_id: Option<ContainerId>) -> Result<Self> {
        let agent_id = agent_id.filter(|id| !id.is_empty());
        let container_id = container_id.filter(|id| !id.is_empty());
        match (agent_id, container_id) {
            (Some(agent), None) => Ok(Self::Agent(agent)),
            (None, Some(container)) => Ok(Self::Container(container)),
            (None, None) => Err(FleetError::Validation(
                "either agent_id or container_id must be provided".to_string(),
            )),
            (Some(_), Some(_)) => Err(FleetError::Validation(
                "only one of agent_id or container_id may be provided".to_string(),
            )),
        }
    }

    #[must_use]
    pub const fn agent_id(&self) -> Option<&AgentId> {
        match self {
            Self::Agent(id) => Some(id),
            Self::Container(_) => None,
        }
    }

    #[must_use]
    pub const fn container_id(&self) -> Option<&ContainerId> {
        match self {
            Self::Agent(_) => None,
            Self::Container(id) => Some(id),
        }
    }
}

/// A package withheld from patch runs on one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageException {
    pub id: ExceptionId,
    pub scope: ExceptionScope,
    pub package_name: String,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PackageException {
    /// # Errors
    /// Returns `Validation` for a blank package name.
    pub fn new(scope: ExceptionScope, package_name: impl Into<String>) -> Result<Self> {
        let package_name = package_name.into().trim().to_string();
        if package_name.is_empty() {
            return Err(FleetError::Validation(
                "package_name is required".to_string(),
            ));
        }
        Ok(Self {
            id: ExceptionId::generate(),
            scope,
            package_name,
            active: true,
            expires_at: None,
        })
    }

    #[must_use]
    pub const fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    #[must_use]
    pub const fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.map_or(true, |expires| expires >= now)
    }
}
