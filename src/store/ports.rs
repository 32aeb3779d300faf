use crate::types::{
    Agent, AgentId, Container, ContainerId, ExceptionId, ExceptionScope, PackageException,
    PatchOperation, PatchOperationId, PatchStatus, PlatformFamily, RebootFilter, RebootOperation,
    RebootOperationId, RebootTransition, Schedule, ScheduleId, Script, ScriptId, UserId,
};
use crate::Result;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

pub type PortFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Agents and containers. Enrollment and topology ingestion write here
/// from outside; the orchestrator only moves `pending_reboot_id`.
pub trait AgentDirectory {
    fn upsert_agent(&self, agent: Agent) -> PortFuture<'_, ()>;

    fn get_agent<'a>(&'a self, agent_id: &'a AgentId) -> PortFuture<'a, Option<Agent>>;

    fn record_heartbeat<'a>(
        &'a self,
        agent_id: &'a AgentId,
        seen_at: DateTime<Utc>,
    ) -> PortFuture<'a, bool>;

    fn agents_with_pending_reboot(&self) -> PortFuture<'_, Vec<Agent>>;

    /// Clears the pointer only while it still names `reboot_id`.
    fn release_pending_reboot<'a>(
        &'a self,
        agent_id: &'a AgentId,
        reboot_id: &'a RebootOperationId,
    ) -> PortFuture<'a, bool>;

    fn upsert_container(&self, container: Container) -> PortFuture<'_, ()>;

    fn get_container<'a>(
        &'a self,
        container_id: &'a ContainerId,
    ) -> PortFuture<'a, Option<Container>>;
}

/// Scripts, the container OS-type map and package exceptions.
pub trait CatalogStore {
    fn insert_script(&self, script: Script) -> PortFuture<'_, ()>;

    fn get_script<'a>(&'a self, script_id: &'a ScriptId) -> PortFuture<'a, Option<Script>>;

    fn scripts_for_family<'a>(
        &'a self,
        family: &'a PlatformFamily,
    ) -> PortFuture<'a, Vec<Script>>;

    fn map_os_type(&self, os_type: String, family: PlatformFamily) -> PortFuture<'_, ()>;

    fn family_for_os_type<'a>(
        &'a self,
        os_type: &'a str,
    ) -> PortFuture<'a, Option<PlatformFamily>>;

    fn insert_exception(&self, exception: PackageException) -> PortFuture<'_, ()>;

    fn delete_exception<'a>(&'a self, exception_id: &'a ExceptionId) -> PortFuture<'a, bool>;

    fn exceptions_for_scope<'a>(
        &'a self,
        scope: &'a ExceptionScope,
    ) -> PortFuture<'a, Vec<PackageException>>;
}

pub trait PatchStore {
    fn insert_patch(&self, operation: PatchOperation) -> PortFuture<'_, ()>;

    fn get_patch<'a>(
        &'a self,
        operation_id: &'a PatchOperationId,
    ) -> PortFuture<'a, Option<PatchOperation>>;

    /// Overwrite the stored operation only while its status is still
    /// `expected`. Returns `false` when another writer got there first or the
    /// operation is gone.
    fn update_patch_if(
        &self,
        operation: PatchOperation,
        expected: PatchStatus,
    ) -> PortFuture<'_, bool>;

    fn patches_for_user<'a>(&'a self, user_id: &'a UserId)
        -> PortFuture<'a, Vec<PatchOperation>>;
}

pub trait RebootStore {
    /// Insert `operation` and point its agent's `pending_reboot_id` at it,
    /// as one unit. Returns `false` without writing anything when the agent
    /// already holds a pending reboot.
    fn insert_reboot_claiming_agent(&self, operation: RebootOperation) -> PortFuture<'_, bool>;

    fn get_reboot<'a>(
        &'a self,
        reboot_id: &'a RebootOperationId,
    ) -> PortFuture<'a, Option<RebootOperation>>;

    /// Applies `transition` only if the stored status still equals
    /// `transition.from`; releases the agent pointer in the same unit.
    fn apply_reboot_transition(&self, transition: RebootTransition) -> PortFuture<'_, bool>;

    fn list_reboots(&self, filter: RebootFilter) -> PortFuture<'_, Vec<RebootOperation>>;
}

pub trait ScheduleStore {
    /// Fails with `Conflict` when another active schedule of the same kind
    /// targets the same (agent, container) pair.
    fn insert_schedule(&self, schedule: Schedule) -> PortFuture<'_, ()>;

    /// Write the cron expression, active flag and reason of an existing
    /// schedule, plus `next_run_at` when `reschedule` is set. `last_run_at`
    /// is left to [`Self::record_schedule_run`]. Returns the stored record,
    /// or `None` when the schedule is gone. Same `Conflict` rule as insert.
    fn update_schedule(
        &self,
        schedule: Schedule,
        reschedule: bool,
    ) -> PortFuture<'_, Option<Schedule>>;

    fn get_schedule<'a>(&'a self, schedule_id: &'a ScheduleId)
        -> PortFuture<'a, Option<Schedule>>;

    fn delete_schedule<'a>(&'a self, schedule_id: &'a ScheduleId) -> PortFuture<'a, bool>;

    /// Stamp run bookkeeping on an existing schedule. Returns `false` when
    /// the schedule is gone; never re-creates it.
    fn record_schedule_run<'a>(
        &'a self,
        schedule_id: &'a ScheduleId,
        last_run_at: Option<DateTime<Utc>>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> PortFuture<'a, bool>;

    fn schedules_for_user<'a>(&'a self, user_id: &'a UserId) -> PortFuture<'a, Vec<Schedule>>;

    fn due_schedules(&self, now: DateTime<Utc>) -> PortFuture<'_, Vec<Schedule>>;
}

pub trait FleetStore:
    AgentDirectory + CatalogStore + PatchStore + RebootStore + ScheduleStore + Send + Sync
{
}

impl<T> FleetStore for T where
    T: AgentDirectory + CatalogStore + PatchStore + RebootStore + ScheduleStore + Send + Sync
{
}
