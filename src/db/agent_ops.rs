#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

use super::mappers::{AgentRow, ContainerRow};
use super::{db_error, FleetDb};
use crate::store::{AgentDirectory, PortFuture};
use crate::types::{Agent, AgentId, Container, ContainerId, RebootOperationId};
use chrono::{DateTime, Utc};

const AGENT_COLUMNS: &str =
    "id, owner_id, platform_family, os_version, last_seen, pending_reboot_id";

impl AgentDirectory for FleetDb {
    fn upsert_agent(&self, agent: Agent) -> PortFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO agents (id, owner_id, platform_family, os_version, last_seen, pending_reboot_id)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (id) DO UPDATE
                 SET owner_id = EXCLUDED.owner_id,
                     platform_family = EXCLUDED.platform_family,
                     os_version = EXCLUDED.os_version,
                     last_seen = EXCLUDED.last_seen,
                     pending_reboot_id = EXCLUDED.pending_reboot_id",
            )
            .bind(agent.id.value())
            .bind(agent.owner_id.value())
            .bind(agent.platform_family.value())
            .bind(agent.os_version.as_deref())
            .bind(agent.last_seen)
            .bind(agent.pending_reboot_id.as_ref().map(RebootOperationId::value))
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(db_error("Failed to upsert agent"))
        })
    }

    fn get_agent<'a>(&'a self, agent_id: &'a AgentId) -> PortFuture<'a, Option<Agent>> {
        Box::pin(async move {
            sqlx::query_as::<_, AgentRow>(&format!(
                "SELECT {AGENT_COLUMNS} FROM agents WHERE id = $1"
            ))
            .bind(agent_id.value())
            .fetch_optional(self.pool())
            .await
            .map(|row| row.map(Agent::from))
            .map_err(db_error("Failed to load agent"))
        })
    }

    fn record_heartbeat<'a>(
        &'a self,
        agent_id: &'a AgentId,
        seen_at: DateTime<Utc>,
    ) -> PortFuture<'a, bool> {
        Box::pin(async move {
            sqlx::query("UPDATE agents SET last_seen = $2 WHERE id = $1")
                .bind(agent_id.value())
                .bind(seen_at)
                .execute(self.pool())
                .await
                .map(|result| result.rows_affected() > 0)
                .map_err(db_error("Failed to record heartbeat"))
        })
    }

    fn agents_with_pending_reboot(&self) -> PortFuture<'_, Vec<Agent>> {
        Box::pin(async move {
            sqlx::query_as::<_, AgentRow>(&format!(
                "SELECT {AGENT_COLUMNS} FROM agents
                 WHERE pending_reboot_id IS NOT NULL AND pending_reboot_id <> ''
                 ORDER BY id"
            ))
            .fetch_all(self.pool())
            .await
            .map(|rows| rows.into_iter().map(Agent::from).collect())
            .map_err(db_error("Failed to list agents with pending reboots"))
        })
    }

    fn release_pending_reboot<'a>(
        &'a self,
        agent_id: &'a AgentId,
        reboot_id: &'a RebootOperationId,
    ) -> PortFuture<'a, bool> {
        Box::pin(async move {
            sqlx::query(
                "UPDATE agents SET pending_reboot_id = NULL
                 WHERE id = $1 AND pending_reboot_id = $2",
            )
            .bind(agent_id.value())
            .bind(reboot_id.value())
            .execute(self.pool())
            .await
            .map(|result| result.rows_affected() > 0)
            .map_err(db_error("Failed to release pending reboot"))
        })
    }

    fn upsert_container(&self, container: Container) -> PortFuture<'_, ()> {
        Box::pin(async move {
            let vmid = i32::try_from(container.vmid).map_err(|_| {
                crate::error::FleetError::Validation(format!(
                    "vmid out of range: {}",
                    container.vmid
                ))
            })?;
            sqlx::query(
                "INSERT INTO containers (id, agent_id, vmid, os_type)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (id) DO UPDATE
                 SET agent_id = EXCLUDED.agent_id,
                     vmid = EXCLUDED.vmid,
                     os_type = EXCLUDED.os_type",
            )
            .bind(container.id.value())
            .bind(container.agent_id.value())
            .bind(vmid)
            .bind(&container.os_type)
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(db_error("Failed to upsert container"))
        })
    }

    fn get_container<'a>(
        &'a self,
        container_id: &'a ContainerId,
    ) -> PortFuture<'a, Option<Container>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, ContainerRow>(
                "SELECT id, agent_id, vmid, os_type FROM containers WHERE id = $1",
            )
            .bind(container_id.value())
            .fetch_optional(self.pool())
            .await
            .map_err(db_error("Failed to load container"))?;
            row.map(Container::try_from).transpose()
        })
    }
}
