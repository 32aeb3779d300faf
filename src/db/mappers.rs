use crate::error::{FleetError, Result};
use crate::types::{
    Agent, AgentId, Container, ContainerId, ExceptionId, ExceptionScope, PackageException,
    PatchMode, PatchOperation, PatchOperationId, PatchStatus, PlatformFamily, RebootOperation,
    RebootOperationId, RebootStatus, Schedule, ScheduleId, ScheduleKind, Script, ScriptId, Target,
    UserId,
};
use chrono::{DateTime, Utc};

#[derive(Debug, sqlx::FromRow)]
pub struct AgentRow {
    pub id: String,
    pub owner_id: String,
    pub platform_family: String,
    pub os_version: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub pending_reboot_id: Option<String>,
}

impl From<AgentRow> for Agent {
    fn from(row: AgentRow) -> Self {
        Self {
            id: AgentId::new(row.id),
            owner_id: UserId::new(row.owner_id),
            platform_family: PlatformFamily::new(row.platform_family),
            os_version: row.os_version,
            last_seen: row.last_seen,
            pending_reboot_id: row
                .pending_reboot_id
                .filter(|id| !id.is_empty())
                .map(RebootOperationId::new),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ContainerRow {
    pub id: String,
    pub agent_id: String,
    pub vmid: i32,
    pub os_type: String,
}

impl TryFrom<ContainerRow> for Container {
    type Error = FleetError;

    fn try_from(row: ContainerRow) -> Result<Self> {
        Ok(Self {
            id: ContainerId::new(row.id),
            agent_id: AgentId::new(row.agent_id),
            vmid: to_u32(row.vmid, "containers.vmid")?,
            os_type: row.os_type,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ScriptRow {
    pub id: String,
    pub name: String,
    pub platform_family: String,
    pub os_version: Option<String>,
    pub file_name: String,
    pub sha256: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl From<ScriptRow> for Script {
    fn from(row: ScriptRow) -> Self {
        Self {
            id: ScriptId::new(row.id),
            name: row.name,
            platform_family: PlatformFamily::new(row.platform_family),
            os_version: row.os_version.filter(|v| !v.is_empty()),
            file_name: row.file_name,
            sha256: row.sha256,
            url: row.url,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ExceptionRow {
    pub id: String,
    pub agent_id: Option<String>,
    pub container_id: Option<String>,
    pub package_name: String,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<ExceptionRow> for PackageException {
    type Error = FleetError;

    fn try_from(row: ExceptionRow) -> Result<Self> {
        let scope = ExceptionScope::from_parts(
            row.agent_id.map(AgentId::new),
            row.container_id.map(ContainerId::new),
        )
        .map_err(|e| FleetError::Database(format!("package_exceptions {}: {e}", row.id)))?;
        Ok(Self {
            id: ExceptionId::new(row.id),
            scope,
            package_name: row.package_name,
            active: row.is_active,
            expires_at: row.expires_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct PatchRow {
    pub id: String,
    pub user_id: String,
    pub agent_id: String,
    pub container_id: Option<String>,
    pub vmid: Option<i32>,
    pub mode: String,
    pub status: String,
    pub script_id: String,
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

impl TryFrom<PatchRow> for PatchOperation {
    type Error = FleetError;

    fn try_from(row: PatchRow) -> Result<Self> {
        let target = target_from_columns(row.agent_id, row.container_id, row.vmid)?;
        Ok(Self {
            id: PatchOperationId::new(row.id),
            user_id: UserId::new(row.user_id),
            target,
            mode: PatchMode::try_from(row.mode.as_str()).map_err(FleetError::Database)?,
            status: PatchStatus::try_from(row.status.as_str()).map_err(FleetError::Database)?,
            script_id: ScriptId::new(row.script_id),
            script_sha256: row.script_sha256,
            script_url: row.script_url,
            exclusions: row.exclusions,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            stdout_ref: row.stdout_ref,
            stderr_ref: row.stderr_ref,
            exit_code: row.exit_code,
            error_message: row.error_message,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct RebootRow {
    pub id: String,
    pub user_id: String,
    pub agent_id: String,
    pub container_id: Option<String>,
    pub vmid: Option<i32>,
    pub reason: Option<String>,
    pub status: String,
    pub requested_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub timeout_seconds: i32,
    pub error_message: Option<String>,
}

impl TryFrom<RebootRow> for RebootOperation {
    type Error = FleetError;

    fn try_from(row: RebootRow) -> Result<Self> {
        let target = target_from_columns(row.agent_id, row.container_id, row.vmid)?;
        Ok(Self {
            id: RebootOperationId::new(row.id),
            user_id: UserId::new(row.user_id),
            target,
            reason: row.reason,
            status: RebootStatus::try_from(row.status.as_str()).map_err(FleetError::Database)?,
            requested_at: row.requested_at,
            acknowledged_at: row.acknowledged_at,
            completed_at: row.completed_at,
            timeout_seconds: to_u32(row.timeout_seconds, "reboot_operations.timeout_seconds")?,
            error_message: row.error_message,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ScheduleRow {
    pub id: String,
    pub user_id: String,
    pub agent_id: String,
    pub container_id: String,
    pub cron_expression: String,
    pub is_active: bool,
    pub reason: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ScheduleRow {
    pub fn into_schedule(self, kind: ScheduleKind) -> Schedule {
        Schedule {
            id: ScheduleId::new(self.id),
            kind,
            user_id: UserId::new(self.user_id),
            agent_id: AgentId::new(self.agent_id),
            container_id: Some(self.container_id)
                .filter(|id| !id.is_empty())
                .map(ContainerId::new),
            cron_expression: self.cron_expression,
            active: self.is_active,
            reason: self.reason,
            last_run_at: self.last_run_at,
            next_run_at: self.next_run_at,
            created_at: self.created_at,
        }
    }
}

pub const fn schedule_table(kind: ScheduleKind) -> &'static str {
    match kind {
        ScheduleKind::Patch => "patch_schedules",
        ScheduleKind::Reboot => "reboot_schedules",
    }
}

/// Split a target into its `(container_id, vmid)` columns.
pub fn target_columns(target: &Target) -> (Option<&str>, Option<i32>) {
    match target {
        Target::Host { .. } => (None, None),
        Target::Container {
            container_id, vmid, ..
        } => (
            Some(container_id.value()),
            Some(i32::try_from(*vmid).unwrap_or(i32::MAX)),
        ),
    }
}

fn target_from_columns(
    agent_id: String,
    container_id: Option<String>,
    vmid: Option<i32>,
) -> Result<Target> {
    let agent_id = AgentId::new(agent_id);
    match (container_id.filter(|id| !id.is_empty()), vmid) {
        (None, _) => Ok(Target::Host { agent_id }),
        (Some(container_id), Some(vmid)) => Ok(Target::Container {
            agent_id,
            container_id: ContainerId::new(container_id),
            vmid: to_u32(vmid, "vmid")?,
        }),
        (Some(container_id), None) => Err(FleetError::Database(format!(
            "container target {container_id} stored without vmid"
        ))),
    }
}

fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| FleetError::Database(format!("{column} must be non-negative, got {value}")))
}

#[cfg(test)]
mod tests {
    use super::{target_columns, target_from_columns, to_u32};
    use crate::types::{AgentId, ContainerId, Target};

    #[test]
    fn target_columns_round_trip() {
        let target = Target::Container {
            agent_id: AgentId::new("a"),
            container_id: ContainerId::new("c"),
            vmid: 101,
        };
        let (container, vmid) = target_columns(&target);
        let rebuilt = target_from_columns("a".into(), container.map(str::to_string), vmid);
        assert_eq!(rebuilt.ok(), Some(target));
    }

    #[test]
    fn container_without_vmid_is_rejected() {
        assert!(target_from_columns("a".into(), Some("c".into()), None).is_err());
        assert!(matches!(
            target_from_columns("a".into(), Some(String::new()), None),
            Ok(Target::Host { .. })
        ));
    }

    #[test]
    fn negative_counts_are_rejected() {
        assert_eq!(to_u32(3, "x").ok(), Some(3));
        assert!(to_u32(-2, "x").is_err());
    }
}
