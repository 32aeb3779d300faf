use super::identifiers::{AgentId, RebootOperationId, UserId};
use super::platform::Target;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_REBOOT_TIMEOUT_SECS: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebootStatus {
    Pending,
    Sent,
    Rebooting,
    Completed,
    Timeout,
}

impl RebootStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Rebooting => "rebooting",
            Self::Completed => "completed",
            Self::Timeout => "timeout",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Timeout)
    }

    #[must_use]
    pub const fn is_outstanding(&self) -> bool {
        !self.is_terminal()
    }
}

impl TryFrom<&str> for RebootStatus {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "rebooting" => Ok(Self::Rebooting),
            "completed" => Ok(Self::Completed),
            "timeout" => Ok(Self::Timeout),
            _ => Err(format!("Unknown reboot status: {s}")),
        }
    }
}

impl fmt::Display for RebootStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebootOperation {
    pub id: RebootOperationId,
    pub user_id: UserId,
    pub target: Target,
    pub reason: Option<String>,
    pub status: RebootStatus,
    pub requested_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub timeout_seconds: u32,
    pub error_message: Option<String>,
}

impl RebootOperation {
    /// New reboot, already `sent` so the creation event carries the
    /// state agents act on.
    #[must_use]
    pub fn sent(
        user_id: UserId,
        target: Target,
        reason: Option<String>,
        timeout_seconds: u32,
        requested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RebootOperationId::generate(),
            user_id,
            target,
            reason: reason.filter(|r| !r.trim().is_empty()),
            status: RebootStatus::Sent,
            requested_at,
            acknowledged_at: None,
            completed_at: None,
            timeout_seconds,
            error_message: None,
        }
    }

    #[must_use]
    pub const fn agent_id(&self) -> &AgentId {
        self.target.agent_id()
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::seconds(i64::from(self.timeout_seconds))
    }

    /// True once strictly more than `timeout_seconds` have passed since `since`.
    #[must_use]
    pub fn expired_since(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(since) > self.timeout()
    }
}

/// A conditional status change applied by the store as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebootTransition {
    pub reboot_id: RebootOperationId,
    pub from: RebootStatus,
    pub to: RebootStatus,
    pub at: DateTime<Utc>,
    pub error_message: Option<String>,
    /// Agent whose `pending_reboot_id` is cleared if it still points here.
    pub release_agent: Option<AgentId>,
}

impl RebootTransition {
    #[must_use]
    pub const fn acknowledge(reboot_id: RebootOperationId, at: DateTime<Utc>) -> Self {
        Self {
            reboot_id,
            from: RebootStatus::Sent,
            to: RebootStatus::Rebooting,
            at,
            error_message: None,
            release_agent: None,
        }
    }

    #[must_use]
    pub const fn complete(
        reboot_id: RebootOperationId,
        agent_id: AgentId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            reboot_id,
            from: RebootStatus::Rebooting,
            to: RebootStatus::Completed,
            at,
            error_message: None,
            release_agent: Some(agent_id),
        }
    }

    #[must_use]
    pub fn time_out(
        reboot_id: RebootOperationId,
        agent_id: AgentId,
        from: RebootStatus,
        at: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            reboot_id,
            from,
            to: RebootStatus::Timeout,
            at,
            error_message: Some(message.into()),
            release_agent: Some(agent_id),
        }
    }

    /// Apply the field changes to a loaded record. The caller has already
    /// checked `from`.
    pub fn apply_to(&self, operation: &mut RebootOperation) {
        operation.status = self.to;
        match self.to {
            RebootStatus::Rebooting => operation.acknowledged_at = Some(self.at),
            RebootStatus::Completed => operation.completed_at = Some(self.at),
            _ => {}
        }
        if let Some(message) = &self.error_message {
            operation.error_message = Some(message.clone());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebootFilter {
    pub user_id: Option<UserId>,
    pub agent_id: Option<AgentId>,
    pub status: Option<RebootStatus>,
    pub limit: Option<usize>,
}
