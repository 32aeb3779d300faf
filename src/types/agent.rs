use super::identifiers::{AgentId, ContainerId, RebootOperationId, UserId};
use super::platform::PlatformFamily;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fleet member. Enrollment and heartbeats are owned elsewhere; the
/// orchestrator only reads it and moves `pending_reboot_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub owner_id: UserId,
    pub platform_family: PlatformFamily,
    pub os_version: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub pending_reboot_id: Option<RebootOperationId>,
}

impl Agent {
    #[must_use]
    pub fn new(id: AgentId, owner_id: UserId, platform_family: PlatformFamily) -> Self {
        Self {
            id,
            owner_id,
            platform_family,
            os_version: None,
            last_seen: None,
            pending_reboot_id: None,
        }
    }

    #[must_use]
    pub fn with_os_version(mut self, os_version: impl Into<String>) -> Self {
        self.os_version = Some(os_version.into());
        self
    }

    #[must_use]
    pub const fn with_last_seen(mut self, last_seen: DateTime<Utc>) -> Self {
        self.last_seen = Some(last_seen);
        self
    }

    #[must_use]
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.owner_id == user_id
    }

    #[must_use]
    pub fn has_pending_reboot(&self) -> bool {
        self.pending_reboot_id
            .as_ref()
            .is_some_and(|id| !id.is_empty())
    }

    /// Whether a heartbeat arrived strictly after `instant`.
    #[must_use]
    pub fn seen_after(&self, instant: DateTime<Utc>) -> bool {
        self.last_seen.is_some_and(|seen| seen > instant)
    }
}

/// Host-managed VM/LXC. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub agent_id: AgentId,
    pub vmid: u32,
    pub os_type: String,
}

impl Container {
    #[must_use]
    pub fn new(id: ContainerId, agent_id: AgentId, vmid: u32, os_type: impl Into<String>) -> Self {
        Self {
            id,
            agent_id,
            vmid,
            os_type: os_type.into(),
        }
    }
}
