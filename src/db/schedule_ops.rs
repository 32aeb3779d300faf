use super::mappers::{schedule_table, ScheduleRow};
use super::{db_error, is_unique_violation, FleetDb};
use crate::error::{FleetError, Result};
use crate::store::{PortFuture, ScheduleStore};
use crate::types::{ContainerId, Schedule, ScheduleId, ScheduleKind, UserId};
use chrono::{DateTime, Utc};
use sqlx::{Acquire, PgConnection};

const SCHEDULE_COLUMNS: &str = "id, user_id, agent_id, container_id, cron_expression, is_active, \
     reason, last_run_at, next_run_at, created_at";

const KINDS: [ScheduleKind; 2] = [ScheduleKind::Patch, ScheduleKind::Reboot];

impl FleetDb {
    async fn ensure_no_active_twin(
        conn: &mut PgConnection,
        schedule: &Schedule,
        container_id: &str,
    ) -> Result<()> {
        if !schedule.active {
            return Ok(());
        }
        let taken = sqlx::query_scalar::<_, bool>(&format!(
            "SELECT EXISTS(
                 SELECT 1 FROM {}
                 WHERE agent_id = $1 AND container_id = $2 AND is_active AND id <> $3
                 FOR UPDATE
             )",
            schedule_table(schedule.kind)
        ))
        .bind(schedule.agent_id.value())
        .bind(container_id)
        .bind(schedule.id.value())
        .fetch_one(conn)
        .await
        .map_err(db_error("Failed to check schedule uniqueness"))?;

        if taken {
            return Err(FleetError::Conflict(schedule.conflict_message()));
        }
        Ok(())
    }

    async fn insert_schedule_row(&self, schedule: &Schedule) -> Result<()> {
        let table = schedule_table(schedule.kind);
        let container_id = schedule
            .container_id
            .as_ref()
            .map_or("", ContainerId::value);

        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(db_error("Failed to begin tx"))?;

        let conn = tx
            .acquire()
            .await
            .map_err(db_error("Failed to acquire tx conn"))?;

        Self::ensure_no_active_twin(&mut *conn, schedule, container_id).await?;

        let saved = sqlx::query(&format!(
            "INSERT INTO {table} (
                 id, user_id, agent_id, container_id, cron_expression, is_active,
                 reason, last_run_at, next_run_at, created_at
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(schedule.id.value())
        .bind(schedule.user_id.value())
        .bind(schedule.agent_id.value())
        .bind(container_id)
        .bind(&schedule.cron_expression)
        .bind(schedule.active)
        .bind(schedule.reason.as_deref())
        .bind(schedule.last_run_at)
        .bind(schedule.next_run_at)
        .bind(schedule.created_at)
        .execute(&mut *conn)
        .await;

        match saved {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(FleetError::Conflict(schedule.conflict_message()));
            }
            Err(e) => return Err(FleetError::Database(format!("Failed to save schedule: {e}"))),
        }

        tx.commit().await.map_err(db_error("Failed to commit tx"))
    }

    async fn update_schedule_row(
        &self,
        schedule: &Schedule,
        reschedule: bool,
    ) -> Result<Option<Schedule>> {
        let table = schedule_table(schedule.kind);
        let container_id = schedule
            .container_id
            .as_ref()
            .map_or("", ContainerId::value);

        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(db_error("Failed to begin tx"))?;

        let conn = tx
            .acquire()
            .await
            .map_err(db_error("Failed to acquire tx conn"))?;

        Self::ensure_no_active_twin(&mut *conn, schedule, container_id).await?;

        // last_run_at belongs to the run path and is never written here.
        let updated = sqlx::query_as::<_, ScheduleRow>(&format!(
            "UPDATE {table}
             SET cron_expression = $2,
                 is_active = $3,
                 reason = $4,
                 next_run_at = CASE WHEN $5 THEN $6 ELSE next_run_at END
             WHERE id = $1
             RETURNING {SCHEDULE_COLUMNS}"
        ))
        .bind(schedule.id.value())
        .bind(&schedule.cron_expression)
        .bind(schedule.active)
        .bind(schedule.reason.as_deref())
        .bind(reschedule)
        .bind(schedule.next_run_at)
        .fetch_optional(&mut *conn)
        .await;

        let row = match updated {
            Ok(row) => row,
            Err(e) if is_unique_violation(&e) => {
                return Err(FleetError::Conflict(schedule.conflict_message()));
            }
            Err(e) => return Err(FleetError::Database(format!("Failed to update schedule: {e}"))),
        };

        tx.commit().await.map_err(db_error("Failed to commit tx"))?;
        Ok(row.map(|row| row.into_schedule(schedule.kind)))
    }
}

impl ScheduleStore for FleetDb {
    fn insert_schedule(&self, schedule: Schedule) -> PortFuture<'_, ()> {
        Box::pin(async move { self.insert_schedule_row(&schedule).await })
    }

    fn update_schedule(
        &self,
        schedule: Schedule,
        reschedule: bool,
    ) -> PortFuture<'_, Option<Schedule>> {
        Box::pin(async move { self.update_schedule_row(&schedule, reschedule).await })
    }

    fn get_schedule<'a>(
        &'a self,
        schedule_id: &'a ScheduleId,
    ) -> PortFuture<'a, Option<Schedule>> {
        Box::pin(async move {
            for kind in KINDS {
                let row = sqlx::query_as::<_, ScheduleRow>(&format!(
                    "SELECT {SCHEDULE_COLUMNS} FROM {} WHERE id = $1",
                    schedule_table(kind)
                ))
                .bind(schedule_id.value())
                .fetch_optional(self.pool())
                .await
                .map_err(db_error("Failed to load schedule"))?;
                if let Some(row) = row {
                    return Ok(Some(row.into_schedule(kind)));
                }
            }
            Ok(None)
        })
    }

    fn delete_schedule<'a>(&'a self, schedule_id: &'a ScheduleId) -> PortFuture<'a, bool> {
        Box::pin(async move {
            let mut deleted = false;
            for kind in KINDS {
                let result = sqlx::query(&format!(
                    "DELETE FROM {} WHERE id = $1",
                    schedule_table(kind)
                ))
                .bind(schedule_id.value())
                .execute(self.pool())
                .await
                .map_err(db_error("Failed to delete schedule"))?;
                deleted |= result.rows_affected() > 0;
            }
            Ok(deleted)
        })
    }

    fn record_schedule_run<'a>(
        &'a self,
        schedule_id: &'a ScheduleId,
        last_run_at: Option<DateTime<Utc>>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> PortFuture<'a, bool> {
        Box::pin(async move {
            let mut updated = false;
            for kind in KINDS {
                let result = sqlx::query(&format!(
                    "UPDATE {} SET last_run_at = $2, next_run_at = $3 WHERE id = $1",
                    schedule_table(kind)
                ))
                .bind(schedule_id.value())
                .bind(last_run_at)
                .bind(next_run_at)
                .execute(self.pool())
                .await
                .map_err(db_error("Failed to record schedule run"))?;
                updated |= result.rows_affected() > 0;
            }
            Ok(updated)
        })
    }

    fn schedules_for_user<'a>(&'a self, user_id: &'a UserId) -> PortFuture<'a, Vec<Schedule>> {
        Box::pin(async move {
            let mut schedules = Vec::new();
            for kind in KINDS {
                let rows = sqlx::query_as::<_, ScheduleRow>(&format!(
                    "SELECT {SCHEDULE_COLUMNS} FROM {} WHERE user_id = $1",
                    schedule_table(kind)
                ))
                .bind(user_id.value())
                .fetch_all(self.pool())
                .await
                .map_err(db_error("Failed to list schedules"))?;
                schedules.extend(rows.into_iter().map(|row| row.into_schedule(kind)));
            }
            schedules.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(schedules)
        })
    }

    fn due_schedules(&self, now: DateTime<Utc>) -> PortFuture<'_, Vec<Schedule>> {
        Box::pin(async move {
            let mut due = Vec::new();
            for kind in KINDS {
                let rows = sqlx::query_as::<_, ScheduleRow>(&format!(
                    "SELECT {SCHEDULE_COLUMNS} FROM {}
                     WHERE is_active AND next_run_at IS NOT NULL AND next_run_at <= $1",
                    schedule_table(kind)
                ))
                .bind(now)
                .fetch_all(self.pool())
                .await
                .map_err(db_error("Failed to list due schedules"))?;
                due.extend(rows.into_iter().map(|row| row.into_schedule(kind)));
            }
            due.sort_by(|a, b| a.next_run_at.cmp(&b.next_run_at));
            Ok(due)
        })
    }
}
