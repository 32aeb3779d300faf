use super::ports::{
    AgentDirectory, CatalogStore, PatchStore, PortFuture, RebootStore, ScheduleStore,
};
use crate::error::FleetError;
use crate::types::{
    normalize_os_type, Agent, AgentId, Container, ContainerId, ExceptionId, ExceptionScope,
    PackageException, PatchOperation, PatchOperationId, PatchStatus, PlatformFamily, RebootFilter,
    RebootOperation, RebootOperationId, RebootTransition, Schedule, ScheduleId, Script, ScriptId,
    UserId,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
    agents: HashMap<AgentId, Agent>,
    containers: HashMap<ContainerId, Container>,
    scripts: HashMap<ScriptId, Script>,
    os_types: HashMap<String, PlatformFamily>,
    exceptions: HashMap<ExceptionId, PackageException>,
    patches: HashMap<PatchOperationId, PatchOperation>,
    reboots: HashMap<RebootOperationId, RebootOperation>,
    schedules: HashMap<ScheduleId, Schedule>,
}

/// Process-local record store. Every invariant-carrying write runs under
/// one write lock, which gives the same all-or-nothing behaviour the
/// Postgres store gets from a transaction.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AgentDirectory for MemoryStore {
    fn upsert_agent(&self, agent: Agent) -> PortFuture<'_, ()> {
        Box::pin(async move {
            self.state.write().await.agents.insert(agent.id.clone(), agent);
            Ok(())
        })
    }

    fn get_agent<'a>(&'a self, agent_id: &'a AgentId) -> PortFuture<'a, Option<Agent>> {
        Box::pin(async move { Ok(self.state.read().await.agents.get(agent_id).cloned()) })
    }

    fn record_heartbeat<'a>(
        &'a self,
        agent_id: &'a AgentId,
        seen_at: DateTime<Utc>,
    ) -> PortFuture<'a, bool> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            Ok(state.agents.get_mut(agent_id).map_or(false, |agent| {
                agent.last_seen = Some(seen_at);
                true
            }))
        })
    }

    fn agents_with_pending_reboot(&self) -> PortFuture<'_, Vec<Agent>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let mut agents = state
                .agents
                .values()
                .filter(|agent| agent.has_pending_reboot())
                .cloned()
                .collect::<Vec<_>>();
            agents.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(agents)
        })
    }

    fn release_pending_reboot<'a>(
        &'a self,
        agent_id: &'a AgentId,
        reboot_id: &'a RebootOperationId,
    ) -> PortFuture<'a, bool> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            Ok(release_agent(&mut state, agent_id, reboot_id))
        })
    }

    fn upsert_container(&self, container: Container) -> PortFuture<'_, ()> {
        Box::pin(async move {
            self.state
                .write()
                .await
                .containers
                .insert(container.id.clone(), container);
            Ok(())
        })
    }

    fn get_container<'a>(
        &'a self,
        container_id: &'a ContainerId,
    ) -> PortFuture<'a, Option<Container>> {
        Box::pin(async move {
            Ok(self
                .state
                .read()
                .await
                .containers
                .get(container_id)
                .cloned())
        })
    }
}

fn release_agent(
    state: &mut MemoryState,
    agent_id: &AgentId,
    reboot_id: &RebootOperationId,
) -> bool {
    match state.agents.get_mut(agent_id) {
        Some(agent) if agent.pending_reboot_id.as_ref() == Some(reboot_id) => {
            agent.pending_reboot_id = None;
            true
        }
        _ => false,
    }
}

impl CatalogStore for MemoryStore {
    fn insert_script(&self, script: Script) -> PortFuture<'_, ()> {
        Box::pin(async move {
            self.state
                .write()
                .await
                .scripts
                .insert(script.id.clone(), script);
            Ok(())
        })
    }

    fn get_script<'a>(&'a self, script_id: &'a ScriptId) -> PortFuture<'a, Option<Script>> {
        Box::pin(async move { Ok(self.state.read().await.scripts.get(script_id).cloned()) })
    }

    fn scripts_for_family<'a>(
        &'a self,
        family: &'a PlatformFamily,
    ) -> PortFuture<'a, Vec<Script>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let mut scripts = state
                .scripts
                .values()
                .filter(|script| &script.platform_family == family)
                .cloned()
                .collect::<Vec<_>>();
            scripts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
            Ok(scripts)
        })
    }

    fn map_os_type(&self, os_type: String, family: PlatformFamily) -> PortFuture<'_, ()> {
        Box::pin(async move {
            self.state
                .write()
                .await
                .os_types
                .insert(normalize_os_type(&os_type), family);
            Ok(())
        })
    }

    fn family_for_os_type<'a>(
        &'a self,
        os_type: &'a str,
    ) -> PortFuture<'a, Option<PlatformFamily>> {
        Box::pin(async move {
            Ok(self
                .state
                .read()
                .await
                .os_types
                .get(&normalize_os_type(os_type))
                .cloned())
        })
    }

    fn insert_exception(&self, exception: PackageException) -> PortFuture<'_, ()> {
        Box::pin(async move {
            self.state
                .write()
                .await
                .exceptions
                .insert(exception.id.clone(), exception);
            Ok(())
        })
    }

    fn delete_exception<'a>(&'a self, exception_id: &'a ExceptionId) -> PortFuture<'a, bool> {
        Box::pin(async move {
            Ok(self
                .state
                .write()
                .await
                .exceptions
                .remove(exception_id)
                .is_some())
        })
    }

    fn exceptions_for_scope<'a>(
        &'a self,
        scope: &'a ExceptionScope,
    ) -> PortFuture<'a, Vec<PackageException>> {
        Box::pin(async move {
            Ok(self
                .state
                .read()
                .await
                .exceptions
                .values()
                .filter(|exception| &exception.scope == scope)
                .cloned()
                .collect())
        })
    }
}

impl PatchStore for MemoryStore {
    fn insert_patch(&self, operation: PatchOperation) -> PortFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            if state.patches.contains_key(&operation.id) {
                return Err(FleetError::Conflict(format!(
                    "patch operation {} already exists",
                    operation.id
                )));
            }
            state.patches.insert(operation.id.clone(), operation);
            Ok(())
        })
    }

    fn get_patch<'a>(
        &'a self,
        operation_id: &'a PatchOperationId,
    ) -> PortFuture<'a, Option<PatchOperation>> {
        Box::pin(async move { Ok(self.state.read().await.patches.get(operation_id).cloned()) })
    }

    fn update_patch_if(
        &self,
        operation: PatchOperation,
        expected: PatchStatus,
    ) -> PortFuture<'_, bool> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            match state.patches.get_mut(&operation.id) {
                Some(stored) if stored.status == expected => {
                    *stored = operation;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn patches_for_user<'a>(
        &'a self,
        user_id: &'a UserId,
    ) -> PortFuture<'a, Vec<PatchOperation>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let mut patches = state
                .patches
                .values()
                .filter(|op| &op.user_id == user_id)
                .cloned()
                .collect::<Vec<_>>();
            patches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(patches)
        })
    }
}

impl RebootStore for MemoryStore {
    fn insert_reboot_claiming_agent(&self, operation: RebootOperation) -> PortFuture<'_, bool> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let agent = state
                .agents
                .get_mut(operation.agent_id())
                .ok_or_else(|| FleetError::NotFound("agent not found".to_string()))?;
            if agent.has_pending_reboot() {
                return Ok(false);
            }
            agent.pending_reboot_id = Some(operation.id.clone());
            state.reboots.insert(operation.id.clone(), operation);
            Ok(true)
        })
    }

    fn get_reboot<'a>(
        &'a self,
        reboot_id: &'a RebootOperationId,
    ) -> PortFuture<'a, Option<RebootOperation>> {
        Box::pin(async move { Ok(self.state.read().await.reboots.get(reboot_id).cloned()) })
    }

    fn apply_reboot_transition(&self, transition: RebootTransition) -> PortFuture<'_, bool> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let Some(operation) = state.reboots.get_mut(&transition.reboot_id) else {
                return Ok(false);
            };
            if operation.status != transition.from {
                return Ok(false);
            }
            transition.apply_to(operation);
            if let Some(agent_id) = &transition.release_agent {
                release_agent(&mut state, agent_id, &transition.reboot_id);
            }
            Ok(true)
        })
    }

    fn list_reboots(&self, filter: RebootFilter) -> PortFuture<'_, Vec<RebootOperation>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let mut reboots = state
                .reboots
                .values()
                .filter(|op| filter.user_id.as_ref().map_or(true, |u| &op.user_id == u))
                .filter(|op| filter.agent_id.as_ref().map_or(true, |a| op.agent_id() == a))
                .filter(|op| filter.status.map_or(true, |s| op.status == s))
                .cloned()
                .collect::<Vec<_>>();
            reboots.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
            if let Some(limit) = filter.limit {
                reboots.truncate(limit);
            }
            Ok(reboots)
        })
    }
}

impl ScheduleStore for MemoryStore {
    fn insert_schedule(&self, schedule: Schedule) -> PortFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            if state.schedules.contains_key(&schedule.id) {
                return Err(FleetError::Conflict(format!(
                    "schedule {} already exists",
                    schedule.id
                )));
            }
            if state
                .schedules
                .values()
                .any(|existing| schedule.collides_with(existing))
            {
                return Err(FleetError::Conflict(schedule.conflict_message()));
            }
            state.schedules.insert(schedule.id.clone(), schedule);
            Ok(())
        })
    }

    fn update_schedule(
        &self,
        schedule: Schedule,
        reschedule: bool,
    ) -> PortFuture<'_, Option<Schedule>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            if state
                .schedules
                .values()
                .any(|existing| schedule.collides_with(existing))
            {
                return Err(FleetError::Conflict(schedule.conflict_message()));
            }
            let Some(stored) = state.schedules.get_mut(&schedule.id) else {
                return Ok(None);
            };
            stored.cron_expression = schedule.cron_expression;
            stored.active = schedule.active;
            stored.reason = schedule.reason;
            if reschedule {
                stored.next_run_at = schedule.next_run_at;
            }
            Ok(Some(stored.clone()))
        })
    }

    fn get_schedule<'a>(
        &'a self,
        schedule_id: &'a ScheduleId,
    ) -> PortFuture<'a, Option<Schedule>> {
        Box::pin(async move { Ok(self.state.read().await.schedules.get(schedule_id).cloned()) })
    }

    fn delete_schedule<'a>(&'a self, schedule_id: &'a ScheduleId) -> PortFuture<'a, bool> {
        Box::pin(async move {
            Ok(self
                .state
                .write()
                .await
                .schedules
                .remove(schedule_id)
                .is_some())
        })
    }

    fn record_schedule_run<'a>(
        &'a self,
        schedule_id: &'a ScheduleId,
        last_run_at: Option<DateTime<Utc>>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> PortFuture<'a, bool> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            Ok(state.schedules.get_mut(schedule_id).map_or(false, |schedule| {
                schedule.last_run_at = last_run_at;
                schedule.next_run_at = next_run_at;
                true
            }))
        })
    }

    fn schedules_for_user<'a>(&'a self, user_id: &'a UserId) -> PortFuture<'a, Vec<Schedule>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let mut schedules = state
                .schedules
                .values()
                .filter(|s| &s.user_id == user_id)
                .cloned()
                .collect::<Vec<_>>();
            schedules.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(schedules)
        })
    }

    fn due_schedules(&self, now: DateTime<Utc>) -> PortFuture<'_, Vec<Schedule>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let mut due = state
                .schedules
                .values()
                .filter(|s| s.is_due(now))
                .cloned()
                .collect::<Vec<_>>();
            due.sort_by(|a, b| a.next_run_at.cmp(&b.next_run_at));
            Ok(due)
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::MemoryStore;
    use crate::store::{AgentDirectory, RebootStore};
    use crate::types::{
        Agent, AgentId, PlatformFamily, RebootOperation, RebootStatus, RebootTransition, Target,
        UserId,
    };
    use chrono::Utc;

    async fn store_with_agent() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .upsert_agent(Agent::new(
                AgentId::new("a1"),
                UserId::new("u1"),
                PlatformFamily::new("debian"),
            ))
            .await
            .unwrap();
        store
    }

    fn reboot() -> RebootOperation {
        RebootOperation::sent(
            UserId::new("u1"),
            Target::host(AgentId::new("a1")),
            None,
            300,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn second_claim_is_refused_without_writing() {
        let store = store_with_agent().await;
        let first = reboot();
        let second = reboot();

        assert!(store.insert_reboot_claiming_agent(first.clone()).await.unwrap());
        assert!(!store.insert_reboot_claiming_agent(second.clone()).await.unwrap());

        assert!(store.get_reboot(&second.id).await.unwrap().is_none());
        let agent = store.get_agent(&AgentId::new("a1")).await.unwrap().unwrap();
        assert_eq!(agent.pending_reboot_id, Some(first.id));
    }

    #[tokio::test]
    async fn transition_is_conditional_on_from_status() {
        let store = store_with_agent().await;
        let op = reboot();
        store.insert_reboot_claiming_agent(op.clone()).await.unwrap();

        let timeout = RebootTransition::time_out(
            op.id.clone(),
            AgentId::new("a1"),
            RebootStatus::Rebooting,
            Utc::now(),
            "late",
        );
        assert!(!store.apply_reboot_transition(timeout).await.unwrap());

        let ack = RebootTransition::acknowledge(op.id.clone(), Utc::now());
        assert!(store.apply_reboot_transition(ack.clone()).await.unwrap());
        assert!(!store.apply_reboot_transition(ack).await.unwrap());

        let stored = store.get_reboot(&op.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RebootStatus::Rebooting);
    }

    #[tokio::test]
    async fn release_only_clears_matching_pointer() {
        let store = store_with_agent().await;
        let op = reboot();
        store.insert_reboot_claiming_agent(op.clone()).await.unwrap();

        let other = reboot();
        assert!(!store
            .release_pending_reboot(&AgentId::new("a1"), &other.id)
            .await
            .unwrap());
        assert!(store
            .release_pending_reboot(&AgentId::new("a1"), &op.id)
            .await
            .unwrap());
        assert!(store.agents_with_pending_reboot().await.unwrap().is_empty());
    }
}
