use super::identifiers::{AgentId, ContainerId, ScheduleId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    Patch,
    Reboot,
}

impl ScheduleKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Patch => "patch",
            Self::Reboot => "reboot",
        }
    }
}

impl TryFrom<&str> for ScheduleKind {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "patch" => Ok(Self::Patch),
            "reboot" => Ok(Self::Reboot),
            _ => Err(format!("Unknown schedule kind: {s}")),
        }
    }
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recurring patch or reboot definition for one (agent, container) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub kind: ScheduleKind,
    pub user_id: UserId,
    pub agent_id: AgentId,
    pub container_id: Option<ContainerId>,
    pub cron_expression: String,
    pub active: bool,
    pub reason: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Schedule {
    /// Whether `other` would violate the one-active-schedule-per-target rule
    /// if both were saved.
    #[must_use]
    pub fn collides_with(&self, other: &Self) -> bool {
        self.id != other.id
            && self.active
            && other.active
            && self.kind == other.kind
            && self.agent_id == other.agent_id
            && self.container_id == other.container_id
    }

    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.active && self.next_run_at.is_some_and(|next| next <= now)
    }

    #[must_use]
    pub fn conflict_message(&self) -> String {
        match &self.container_id {
            Some(container) => format!(
                "a {} schedule already exists for this container (agent: {}, container: {})",
                self.kind, self.agent_id, container
            ),
            None => format!(
                "a {} schedule already exists for this agent ({})",
                self.kind, self.agent_id
            ),
        }
    }
}
