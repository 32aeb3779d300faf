use super::catalog::Script;
use super::identifiers::{PatchOperationId, ScriptId, UserId};
use super::platform::Target;
use crate::error::{FleetError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatchMode {
    DryRun,
    Apply,
}

impl PatchMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DryRun => "dry-run",
            Self::Apply => "apply",
        }
    }

    /// # Errors
    /// Returns `Validation` for anything but `dry-run` or `apply`.
    pub fn parse(value: &str) -> Result<Self> {
        Self::try_from(value).map_err(FleetError::Validation)
    }
}

impl TryFrom<&str> for PatchMode {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "dry-run" => Ok(Self::DryRun),
            "apply" => Ok(Self::Apply),
            _ => Err("invalid mode: must be dry-run or apply".to_string()),
        }
    }
}

impl fmt::Display for PatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl PatchStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl TryFrom<&str> for PatchStatus {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown patch status: {s}")),
        }
    }
}

impl fmt::Display for PatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub id: PatchOperationId,
    pub user_id: UserId,
    pub target: Target,
    pub mode: PatchMode,
    pub status: PatchStatus,
    pub script_id: ScriptId,
    pub script_sha256: String,
    pub script_url: String,
    pub exclusions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stdout_ref: Option<String>,
    pub stderr_ref: Option<String>,
    pub exit_code: Option<i32>,
    pub error_message: Option<String>,
}

impl PatchOperation {
    /// A freshly resolved operation awaiting its agent.
    #[must_use]
    pub fn pending(
        user_id: UserId,
        target: Target,
        mode: PatchMode,
        script: &Script,
        exclusions: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PatchOperationId::generate(),
            user_id,
            target,
            mode,
            status: PatchStatus::Pending,
            script_id: script.id.clone(),
            script_sha256: script.sha256.clone(),
            script_url: script.url.clone(),
            exclusions,
            created_at,
            started_at: None,
            completed_at: None,
            stdout_ref: None,
            stderr_ref: None,
            exit_code: None,
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PatchMode, PatchStatus};
    use crate::error::FleetError;

    #[test]
    fn mode_parse_rejects_unknown_values() {
        assert_eq!(PatchMode::parse("apply").ok(), Some(PatchMode::Apply));
        assert_eq!(PatchMode::parse("dry-run").ok(), Some(PatchMode::DryRun));
        assert!(matches!(
            PatchMode::parse("yolo"),
            Err(FleetError::Validation(msg)) if msg.contains("dry-run or apply")
        ));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            PatchStatus::Pending,
            PatchStatus::Running,
            PatchStatus::Completed,
            PatchStatus::Failed,
        ] {
            assert_eq!(PatchStatus::try_from(status.as_str()), Ok(status));
        }
        assert!(PatchStatus::Failed.is_terminal());
        assert!(!PatchStatus::Running.is_terminal());
    }
}
