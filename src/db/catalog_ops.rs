use super::mappers::{ExceptionRow, ScriptRow};
use super::{db_error, FleetDb};
use crate::store::{CatalogStore, PortFuture};
use crate::types::{
    normalize_os_type, ExceptionId, ExceptionScope, PackageException, PlatformFamily, Script,
    ScriptId,
};

const SCRIPT_COLUMNS: &str =
    "id, name, platform_family, os_version, file_name, sha256, url, created_at";

const EXCEPTION_COLUMNS: &str = "id, agent_id, container_id, package_name, is_active, expires_at";

impl CatalogStore for FleetDb {
    fn insert_script(&self, script: Script) -> PortFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO scripts (id, name, platform_family, os_version, file_name, sha256, url, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(script.id.value())
            .bind(&script.name)
            .bind(script.platform_family.value())
            .bind(script.os_version.as_deref())
            .bind(&script.file_name)
            .bind(&script.sha256)
            .bind(&script.url)
            .bind(script.created_at)
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(db_error("Failed to insert script"))
        })
    }

    fn get_script<'a>(&'a self, script_id: &'a ScriptId) -> PortFuture<'a, Option<Script>> {
        Box::pin(async move {
            sqlx::query_as::<_, ScriptRow>(&format!(
                "SELECT {SCRIPT_COLUMNS} FROM scripts WHERE id = $1"
            ))
            .bind(script_id.value())
            .fetch_optional(self.pool())
            .await
            .map(|row| row.map(Script::from))
            .map_err(db_error("Failed to load script"))
        })
    }

    fn scripts_for_family<'a>(
        &'a self,
        family: &'a PlatformFamily,
    ) -> PortFuture<'a, Vec<Script>> {
        Box::pin(async move {
            sqlx::query_as::<_, ScriptRow>(&format!(
                "SELECT {SCRIPT_COLUMNS} FROM scripts
                 WHERE platform_family = $1
                 ORDER BY created_at DESC, id"
            ))
            .bind(family.value())
            .fetch_all(self.pool())
            .await
            .map(|rows| rows.into_iter().map(Script::from).collect())
            .map_err(db_error("Failed to list scripts"))
        })
    }

    fn map_os_type(&self, os_type: String, family: PlatformFamily) -> PortFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO os_type_map (os_type, platform_family) VALUES ($1, $2)
                 ON CONFLICT (os_type) DO UPDATE SET platform_family = EXCLUDED.platform_family",
            )
            .bind(normalize_os_type(&os_type))
            .bind(family.value())
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(db_error("Failed to map os type"))
        })
    }

    fn family_for_os_type<'a>(
        &'a self,
        os_type: &'a str,
    ) -> PortFuture<'a, Option<PlatformFamily>> {
        Box::pin(async move {
            sqlx::query_scalar::<_, String>(
                "SELECT platform_family FROM os_type_map WHERE os_type = $1",
            )
            .bind(normalize_os_type(os_type))
            .fetch_optional(self.pool())
            .await
            .map(|family| family.map(PlatformFamily::new))
            .map_err(db_error("Failed to look up os type"))
        })
    }

    fn insert_exception(&self, exception: PackageException) -> PortFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO package_exceptions (id, agent_id, container_id, package_name, is_active, expires_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(exception.id.value())
            .bind(exception.scope.agent_id().map(|id| id.value()))
            .bind(exception.scope.container_id().map(|id| id.value()))
            .bind(&exception.package_name)
            .bind(exception.active)
            .bind(exception.expires_at)
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(db_error("Failed to insert package exception"))
        })
    }

    fn delete_exception<'a>(&'a self, exception_id: &'a ExceptionId) -> PortFuture<'a, bool> {
        Box::pin(async move {
            sqlx::query("DELETE FROM package_exceptions WHERE id = $1")
                .bind(exception_id.value())
                .execute(self.pool())
                .await
                .map(|result| result.rows_affected() > 0)
                .map_err(db_error("Failed to delete package exception"))
        })
    }

    fn exceptions_for_scope<'a>(
        &'a self,
        scope: &'a ExceptionScope,
    ) -> PortFuture<'a, Vec<PackageException>> {
        Box::pin(async move {
            let (column, id) = match scope {
                ExceptionScope::Agent(agent_id) => ("agent_id", agent_id.value()),
                ExceptionScope::Container(container_id) => ("container_id", container_id.value()),
            };
            let rows = sqlx::query_as::<_, ExceptionRow>(&format!(
                "SELECT {EXCEPTION_COLUMNS} FROM package_exceptions WHERE {column} = $1"
            ))
            .bind(id)
            .fetch_all(self.pool())
            .await
            .map_err(db_error("Failed to list package exceptions"))?;
            rows.into_iter().map(PackageException::try_from).collect()
        })
    }
}
