#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

use super::mappers::{target_columns, RebootRow};
use super::{db_error, is_unique_violation, FleetDb};
use crate::error::{FleetError, Result};
use crate::store::{PortFuture, RebootStore};
use crate::types::{RebootFilter, RebootOperation, RebootOperationId, RebootTransition};
use sqlx::{Acquire, Postgres, QueryBuilder};

const REBOOT_COLUMNS: &str = "id, user_id, agent_id, container_id, vmid, reason, status, \
     requested_at, acknowledged_at, completed_at, timeout_seconds, error_message";

impl FleetDb {
    async fn claim_agent_and_insert(&self, operation: &RebootOperation) -> Result<bool> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(db_error("Failed to begin tx"))?;

        let conn = tx
            .acquire()
            .await
            .map_err(db_error("Failed to acquire tx conn"))?;

        let pending = sqlx::query_scalar::<_, Option<String>>(
            "SELECT pending_reboot_id FROM agents WHERE id = $1 FOR UPDATE",
        )
        .bind(operation.agent_id().value())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("Failed to lock agent"))?;

        let Some(pending) = pending else {
            tx.rollback().await.map_err(db_error("Failed to rollback tx"))?;
            return Err(FleetError::NotFound("agent not found".to_string()));
        };

        if pending.is_some_and(|id| !id.is_empty()) {
            tx.rollback().await.map_err(db_error("Failed to rollback tx"))?;
            return Ok(false);
        }

        let (container_id, vmid) = target_columns(&operation.target);
        let timeout_seconds = i32::try_from(operation.timeout_seconds).unwrap_or(i32::MAX);
        let inserted = sqlx::query(
            "INSERT INTO reboot_operations (
                 id, user_id, agent_id, container_id, vmid, reason, status,
                 requested_at, timeout_seconds
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(operation.id.value())
        .bind(operation.user_id.value())
        .bind(operation.agent_id().value())
        .bind(container_id)
        .bind(vmid)
        .bind(operation.reason.as_deref())
        .bind(operation.status.as_str())
        .bind(operation.requested_at)
        .bind(timeout_seconds)
        .execute(&mut *conn)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await.map_err(db_error("Failed to rollback tx"))?;
                return Ok(false);
            }
            Err(e) => return Err(FleetError::Database(format!("Failed to insert reboot: {e}"))),
        }

        sqlx::query("UPDATE agents SET pending_reboot_id = $2 WHERE id = $1")
            .bind(operation.agent_id().value())
            .bind(operation.id.value())
            .execute(&mut *conn)
            .await
            .map_err(db_error("Failed to set pending reboot"))?;

        tx.commit().await.map_err(db_error("Failed to commit tx"))?;
        Ok(true)
    }

    async fn transition_reboot(&self, transition: &RebootTransition) -> Result<bool> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(db_error("Failed to begin tx"))?;

        let conn = tx
            .acquire()
            .await
            .map_err(db_error("Failed to acquire tx conn"))?;

        let updated = sqlx::query(
            "UPDATE reboot_operations
             SET status = $3,
                 acknowledged_at = CASE WHEN $3 = 'rebooting' THEN $4 ELSE acknowledged_at END,
                 completed_at = CASE WHEN $3 = 'completed' THEN $4 ELSE completed_at END,
                 error_message = COALESCE($5, error_message)
             WHERE id = $1 AND status = $2",
        )
        .bind(transition.reboot_id.value())
        .bind(transition.from.as_str())
        .bind(transition.to.as_str())
        .bind(transition.at)
        .bind(transition.error_message.as_deref())
        .execute(&mut *conn)
        .await
        .map_err(db_error("Failed to transition reboot"))?;

        if updated.rows_affected() == 0 {
            tx.rollback().await.map_err(db_error("Failed to rollback tx"))?;
            return Ok(false);
        }

        if let Some(agent_id) = &transition.release_agent {
            sqlx::query(
                "UPDATE agents SET pending_reboot_id = NULL
                 WHERE id = $1 AND pending_reboot_id = $2",
            )
            .bind(agent_id.value())
            .bind(transition.reboot_id.value())
            .execute(&mut *conn)
            .await
            .map_err(db_error("Failed to release pending reboot"))?;
        }

        tx.commit().await.map_err(db_error("Failed to commit tx"))?;
        Ok(true)
    }
}

impl RebootStore for FleetDb {
    fn insert_reboot_claiming_agent(&self, operation: RebootOperation) -> PortFuture<'_, bool> {
        Box::pin(async move { self.claim_agent_and_insert(&operation).await })
    }

    fn get_reboot<'a>(
        &'a self,
        reboot_id: &'a RebootOperationId,
    ) -> PortFuture<'a, Option<RebootOperation>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, RebootRow>(&format!(
                "SELECT {REBOOT_COLUMNS} FROM reboot_operations WHERE id = $1"
            ))
            .bind(reboot_id.value())
            .fetch_optional(self.pool())
            .await
            .map_err(db_error("Failed to load reboot"))?;
            row.map(RebootOperation::try_from).transpose()
        })
    }

    fn apply_reboot_transition(&self, transition: RebootTransition) -> PortFuture<'_, bool> {
        Box::pin(async move { self.transition_reboot(&transition).await })
    }

    fn list_reboots(&self, filter: RebootFilter) -> PortFuture<'_, Vec<RebootOperation>> {
        Box::pin(async move {
            let mut query = QueryBuilder::<Postgres>::new(format!(
                "SELECT {REBOOT_COLUMNS} FROM reboot_operations WHERE TRUE"
            ));
            if let Some(user_id) = &filter.user_id {
                query.push(" AND user_id = ").push_bind(user_id.value().to_string());
            }
            if let Some(agent_id) = &filter.agent_id {
                query.push(" AND agent_id = ").push_bind(agent_id.value().to_string());
            }
            if let Some(status) = filter.status {
                query.push(" AND status = ").push_bind(status.as_str());
            }
            query.push(" ORDER BY requested_at DESC");
            if let Some(limit) = filter.limit {
                query
                    .push(" LIMIT ")
                    .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
            }

            let rows = query
                .build_query_as::<RebootRow>()
                .fetch_all(self.pool())
                .await
                .map_err(db_error("Failed to list reboots"))?;
            rows.into_iter().map(RebootOperation::try_from).collect()
        })
    }
}
