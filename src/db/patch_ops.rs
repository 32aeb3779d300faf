use super::mappers::{target_columns, PatchRow};
use super::{db_error, is_unique_violation, FleetDb};
use crate::error::FleetError;
use crate::store::{PatchStore, PortFuture};
use crate::types::{PatchOperation, PatchOperationId, PatchStatus, UserId};

const PATCH_COLUMNS: &str = "id, user_id, agent_id, container_id, vmid, mode, status, script_id, \
     script_sha256, script_url, exclusions, created_at, started_at, completed_at, stdout_ref, \
     stderr_ref, exit_code, error_message";

impl PatchStore for FleetDb {
    fn insert_patch(&self, operation: PatchOperation) -> PortFuture<'_, ()> {
        Box::pin(async move {
            let (container_id, vmid) = target_columns(&operation.target);
            sqlx::query(
                "INSERT INTO patch_operations (
                     id, user_id, agent_id, container_id, vmid, mode, status, script_id,
                     script_sha256, script_url, exclusions, created_at
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(operation.id.value())
            .bind(operation.user_id.value())
            .bind(operation.target.agent_id().value())
            .bind(container_id)
            .bind(vmid)
            .bind(operation.mode.as_str())
            .bind(operation.status.as_str())
            .bind(operation.script_id.value())
            .bind(&operation.script_sha256)
            .bind(&operation.script_url)
            .bind(&operation.exclusions)
            .bind(operation.created_at)
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(|e| {
                if is_unique_violation(&e) {
                    FleetError::Conflict(format!("patch operation {} already exists", operation.id))
                } else {
                    FleetError::Database(format!("Failed to insert patch operation: {e}"))
                }
            })
        })
    }

    fn get_patch<'a>(
        &'a self,
        operation_id: &'a PatchOperationId,
    ) -> PortFuture<'a, Option<PatchOperation>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, PatchRow>(&format!(
                "SELECT {PATCH_COLUMNS} FROM patch_operations WHERE id = $1"
            ))
            .bind(operation_id.value())
            .fetch_optional(self.pool())
            .await
            .map_err(db_error("Failed to load patch operation"))?;
            row.map(PatchOperation::try_from).transpose()
        })
    }

    fn update_patch_if(
        &self,
        operation: PatchOperation,
        expected: PatchStatus,
    ) -> PortFuture<'_, bool> {
        Box::pin(async move {
            let updated = sqlx::query(
                "UPDATE patch_operations
                 SET status = $3,
                     started_at = $4,
                     completed_at = $5,
                     stdout_ref = $6,
                     stderr_ref = $7,
                     exit_code = $8,
                     error_message = $9
                 WHERE id = $1 AND status = $2",
            )
            .bind(operation.id.value())
            .bind(expected.as_str())
            .bind(operation.status.as_str())
            .bind(operation.started_at)
            .bind(operation.completed_at)
            .bind(operation.stdout_ref.as_deref())
            .bind(operation.stderr_ref.as_deref())
            .bind(operation.exit_code)
            .bind(operation.error_message.as_deref())
            .execute(self.pool())
            .await
            .map_err(db_error("Failed to update patch operation"))?;

            Ok(updated.rows_affected() == 1)
        })
    }

    fn patches_for_user<'a>(
        &'a self,
        user_id: &'a UserId,
    ) -> PortFuture<'a, Vec<PatchOperation>> {
        Box::pin(async move {
            let rows = sqlx::query_as::<_, PatchRow>(&format!(
                "SELECT {PATCH_COLUMNS} FROM patch_operations
                 WHERE user_id = $1
                 ORDER BY created_at DESC"
            ))
            .bind(user_id.value())
            .fetch_all(self.pool())
            .await
            .map_err(db_error("Failed to list patch operations"))?;
            rows.into_iter().map(PatchOperation::try_from).collect()
        })
    }
}
