use super::cron::CronSchedule;
use super::patch::{PatchManager, PatchRequest};
use super::reboot::{RebootManager, RebootRequest};
use super::target::TargetResolver;
use crate::clock::Clock;
use crate::error::{FleetError, Result};
use crate::store::FleetStore;
use crate::types::{
    AgentId, ContainerId, Identity, PatchMode, Schedule, ScheduleId, ScheduleKind, UserId,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleDraft {
    pub kind: ScheduleKind,
    pub agent_id: AgentId,
    pub container_id: Option<ContainerId>,
    pub cron_expression: String,
    pub active: bool,
    pub reason: Option<String>,
}

/// Fields left `None` keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleUpdate {
    pub cron_expression: Option<String>,
    pub active: Option<bool>,
    pub reason: Option<String>,
}

/// Result of executing one schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleRun {
    Launched {
        kind: ScheduleKind,
        operation_id: String,
    },
    /// The agent already had a reboot outstanding; only `next_run_at` moved.
    Skipped { reason: String },
    Inactive,
}

#[derive(Debug, Default)]
pub struct DueReport {
    pub launched: Vec<ScheduleId>,
    pub skipped: Vec<ScheduleId>,
    pub failed: Vec<(ScheduleId, FleetError)>,
}

#[derive(Clone)]
pub struct ScheduleEngine {
    store: Arc<dyn FleetStore>,
    clock: Arc<dyn Clock>,
    targets: TargetResolver,
    patches: PatchManager,
    reboots: RebootManager,
}

impl ScheduleEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn FleetStore>,
        clock: Arc<dyn Clock>,
        patches: PatchManager,
        reboots: RebootManager,
    ) -> Self {
        Self {
            targets: TargetResolver::new(store.clone()),
            store,
            clock,
            patches,
            reboots,
        }
    }

    /// # Errors
    /// `Forbidden` for agents or foreign agents, `Cron` for a bad
    /// expression, `Conflict` when the target already has an active
    /// schedule of this kind.
    pub async fn create(&self, identity: &Identity, draft: ScheduleDraft) -> Result<Schedule> {
        let user_id = identity.require_user("agents cannot manage schedules")?;
        let agent = self.targets.owned_agent(&draft.agent_id, user_id).await?;
        let target = self
            .targets
            .resolve_target(&agent, draft.container_id.as_ref())
            .await?;
        let cron = CronSchedule::parse(&draft.cron_expression)?;
        let now = self.clock.now();

        let schedule = Schedule {
            id: ScheduleId::generate(),
            kind: draft.kind,
            user_id: user_id.clone(),
            agent_id: agent.id,
            container_id: target.container_id().cloned(),
            cron_expression: cron.expression().to_string(),
            active: draft.active,
            reason: draft.reason.filter(|r| !r.trim().is_empty()),
            last_run_at: None,
            next_run_at: next_run(&cron, draft.active, now)?,
            created_at: now,
        };
        self.store.insert_schedule(schedule.clone()).await?;

        info!(
            schedule_id = %schedule.id,
            kind = %schedule.kind,
            cron = %schedule.cron_expression,
            next_run_at = ?schedule.next_run_at,
            "Created schedule"
        );
        Ok(schedule)
    }

    /// # Errors
    /// As [`Self::create`], plus `NotFound` for an unknown id.
    pub async fn update(
        &self,
        identity: &Identity,
        schedule_id: &ScheduleId,
        update: ScheduleUpdate,
    ) -> Result<Schedule> {
        let user_id = identity.require_user("agents cannot manage schedules")?;
        let mut schedule = self.load_owned(schedule_id, user_id).await?;

        let reschedule = update
            .cron_expression
            .as_ref()
            .is_some_and(|expr| expr.trim() != schedule.cron_expression)
            || update.active.is_some_and(|active| active != schedule.active);

        if let Some(expression) = update.cron_expression {
            schedule.cron_expression = CronSchedule::parse(&expression)?.expression().to_string();
        }
        if let Some(active) = update.active {
            schedule.active = active;
        }
        if let Some(reason) = update.reason {
            schedule.reason = Some(reason).filter(|r| !r.trim().is_empty());
        }
        if reschedule {
            let cron = CronSchedule::parse(&schedule.cron_expression)?;
            schedule.next_run_at = next_run(&cron, schedule.active, self.clock.now())?;
        }

        let schedule = self
            .store
            .update_schedule(schedule, reschedule)
            .await?
            .ok_or_else(|| FleetError::NotFound("schedule not found".to_string()))?;
        info!(schedule_id = %schedule.id, active = schedule.active, "Updated schedule");
        Ok(schedule)
    }

    /// # Errors
    /// `NotFound` or `Forbidden`.
    pub async fn delete(&self, identity: &Identity, schedule_id: &ScheduleId) -> Result<()> {
        let user_id = identity.require_user("agents cannot manage schedules")?;
        self.load_owned(schedule_id, user_id).await?;
        if !self.store.delete_schedule(schedule_id).await? {
            return Err(FleetError::NotFound("schedule not found".to_string()));
        }
        info!(schedule_id = %schedule_id, "Deleted schedule");
        Ok(())
    }

    /// # Errors
    /// `NotFound` or `Forbidden`.
    pub async fn get(&self, identity: &Identity, schedule_id: &ScheduleId) -> Result<Schedule> {
        self.load_owned(schedule_id, identity.scope_user()).await
    }

    /// # Errors
    /// Returns any store failure.
    pub async fn list(&self, identity: &Identity) -> Result<Vec<Schedule>> {
        self.store.schedules_for_user(identity.scope_user()).await
    }

    /// Materialize one run. Target, script and exclusions are resolved now,
    /// not when the schedule was defined. A reboot schedule whose agent
    /// already has a reboot outstanding is skipped rather than failed.
    ///
    /// # Errors
    /// `NotFound` for an unknown id; any other creation failure after
    /// `next_run_at` has been advanced.
    pub async fn execute(&self, schedule_id: &ScheduleId) -> Result<ScheduleRun> {
        let schedule = self
            .store
            .get_schedule(schedule_id)
            .await?
            .ok_or_else(|| FleetError::NotFound("schedule not found".to_string()))?;
        if !schedule.active {
            debug!(schedule_id = %schedule.id, "Skipping inactive schedule");
            return Ok(ScheduleRun::Inactive);
        }

        let cron = CronSchedule::parse(&schedule.cron_expression)?;
        let now = self.clock.now();
        let next_run_at = cron.next_after(now);

        let launched = self.launch(&schedule).await;
        match launched {
            Ok(operation_id) => {
                self.store
                    .record_schedule_run(&schedule.id, Some(now), next_run_at)
                    .await?;
                info!(
                    schedule_id = %schedule.id,
                    kind = %schedule.kind,
                    operation_id = %operation_id,
                    next_run_at = ?next_run_at,
                    "Schedule fired"
                );
                Ok(ScheduleRun::Launched {
                    kind: schedule.kind,
                    operation_id,
                })
            }
            Err(FleetError::Conflict(reason)) if schedule.kind == ScheduleKind::Reboot => {
                self.store
                    .record_schedule_run(&schedule.id, schedule.last_run_at, next_run_at)
                    .await?;
                info!(schedule_id = %schedule.id, reason = %reason, "Reboot schedule skipped");
                Ok(ScheduleRun::Skipped { reason })
            }
            Err(e) => {
                self.store
                    .record_schedule_run(&schedule.id, schedule.last_run_at, next_run_at)
                    .await?;
                warn!(schedule_id = %schedule.id, error = %e, "Schedule execution failed");
                Err(e)
            }
        }
    }

    /// Execute every active schedule due at `now`.
    ///
    /// # Errors
    /// Only when the due list cannot be read; per-schedule failures land in
    /// the report.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<DueReport> {
        let due = self.store.due_schedules(now).await?;
        let mut report = DueReport::default();
        for schedule in due {
            match self.execute(&schedule.id).await {
                Ok(ScheduleRun::Launched { .. }) => report.launched.push(schedule.id),
                Ok(ScheduleRun::Skipped { .. }) => report.skipped.push(schedule.id),
                Ok(ScheduleRun::Inactive) => {}
                Err(e) => report.failed.push((schedule.id, e)),
            }
        }
        Ok(report)
    }

    /// Drive [`Self::run_due`] every `period` until `shutdown` flips.
    pub async fn run(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_secs = period.as_secs(), "Schedule driver started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_due(self.clock.now()).await {
                        Ok(report) if !report.failed.is_empty() => {
                            warn!(
                                launched = report.launched.len(),
                                skipped = report.skipped.len(),
                                failed = report.failed.len(),
                                "Schedule tick finished with failures"
                            );
                        }
                        Ok(report) => {
                            debug!(
                                launched = report.launched.len(),
                                skipped = report.skipped.len(),
                                "Schedule tick"
                            );
                        }
                        Err(e) => warn!(error = %e, "Schedule tick failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Schedule driver shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn launch(&self, schedule: &Schedule) -> Result<String> {
        match schedule.kind {
            ScheduleKind::Patch => self
                .patches
                .create_for_user(
                    &schedule.user_id,
                    PatchRequest {
                        agent_id: schedule.agent_id.clone(),
                        container_id: schedule.container_id.clone(),
                        mode: PatchMode::Apply,
                    },
                )
                .await
                .map(|operation| operation.id.to_string()),
            ScheduleKind::Reboot => self
                .reboots
                .create_for_user(
                    &schedule.user_id,
                    RebootRequest {
                        agent_id: schedule.agent_id.clone(),
                        container_id: schedule.container_id.clone(),
                        reason: schedule.reason.clone(),
                        timeout_seconds: None,
                    },
                )
                .await
                .map(|operation| operation.id.to_string()),
        }
    }

    async fn load_owned(&self, schedule_id: &ScheduleId, user_id: &UserId) -> Result<Schedule> {
        let schedule = self
            .store
            .get_schedule(schedule_id)
            .await?
            .ok_or_else(|| FleetError::NotFound("schedule not found".to_string()))?;
        if &schedule.user_id != user_id {
            return Err(FleetError::Forbidden(
                "unauthorized: schedule does not belong to user".to_string(),
            ));
        }
        Ok(schedule)
    }
}

fn next_run(
    cron: &CronSchedule,
    active: bool,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    if !active {
        return Ok(None);
    }
    cron.next_after(now).map(Some).ok_or_else(|| FleetError::Cron {
        expression: cron.expression().to_string(),
        reason: "never fires".to_string(),
    })
}
