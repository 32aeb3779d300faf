use super::target::TargetResolver;
use crate::clock::Clock;
use crate::error::{FleetError, Result};
use crate::store::FleetStore;
use crate::types::{
    AgentId, ContainerId, Identity, RebootFilter, RebootOperation, RebootOperationId,
    RebootStatus, RebootTransition, UserId, DEFAULT_REBOOT_TIMEOUT_SECS,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Most records a reboot listing returns.
pub const REBOOT_LIST_LIMIT: usize = 50;

pub const PENDING_REBOOT_MESSAGE: &str = "agent already has a pending reboot";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebootRequest {
    pub agent_id: AgentId,
    pub container_id: Option<ContainerId>,
    pub reason: Option<String>,
    pub timeout_seconds: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebootQuery {
    pub agent_id: Option<AgentId>,
    pub status: Option<RebootStatus>,
}

#[derive(Clone)]
pub struct RebootManager {
    store: Arc<dyn FleetStore>,
    clock: Arc<dyn Clock>,
    targets: TargetResolver,
    default_timeout_secs: u32,
}

impl RebootManager {
    #[must_use]
    pub fn new(store: Arc<dyn FleetStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            targets: TargetResolver::new(store.clone()),
            store,
            clock,
            default_timeout_secs: DEFAULT_REBOOT_TIMEOUT_SECS,
        }
    }

    /// Timeout applied when a request leaves it unset or zero.
    #[must_use]
    pub fn with_default_timeout(mut self, seconds: u32) -> Self {
        if seconds > 0 {
            self.default_timeout_secs = seconds;
        }
        self
    }

    #[must_use]
    pub const fn default_timeout_secs(&self) -> u32 {
        self.default_timeout_secs
    }

    /// # Errors
    /// `Forbidden` for agent callers, otherwise as [`Self::create_for_user`].
    pub async fn create(
        &self,
        identity: &Identity,
        request: RebootRequest,
    ) -> Result<RebootOperation> {
        let user_id = identity.require_user("agents cannot initiate reboots")?;
        self.create_for_user(user_id, request).await
    }

    /// Persist a `sent` reboot and claim the agent's pending-reboot slot in
    /// one store operation.
    ///
    /// # Errors
    /// `Conflict` when the agent already has an outstanding reboot,
    /// ownership and resolution failures otherwise.
    pub async fn create_for_user(
        &self,
        user_id: &UserId,
        request: RebootRequest,
    ) -> Result<RebootOperation> {
        let agent = self.targets.owned_agent(&request.agent_id, user_id).await?;
        if agent.has_pending_reboot() {
            return Err(FleetError::Conflict(PENDING_REBOOT_MESSAGE.to_string()));
        }
        let target = self
            .targets
            .resolve_target(&agent, request.container_id.as_ref())
            .await?;

        let timeout_seconds = request
            .timeout_seconds
            .filter(|seconds| *seconds > 0)
            .unwrap_or(self.default_timeout_secs);
        let operation = RebootOperation::sent(
            user_id.clone(),
            target,
            request.reason,
            timeout_seconds,
            self.clock.now(),
        );

        if !self
            .store
            .insert_reboot_claiming_agent(operation.clone())
            .await?
        {
            debug!(agent_id = %agent.id, "Lost pending-reboot race");
            return Err(FleetError::Conflict(PENDING_REBOOT_MESSAGE.to_string()));
        }

        info!(
            reboot_id = %operation.id,
            target = %operation.target,
            timeout_seconds,
            "Reboot command sent"
        );
        Ok(operation)
    }

    /// Agent confirms it is about to reboot. Repeating the call while the
    /// operation is `rebooting` returns it unchanged.
    ///
    /// # Errors
    /// `Forbidden` for other agents, `NotFound` for unknown ids, `Conflict`
    /// once the operation is terminal.
    pub async fn acknowledge(
        &self,
        identity: &Identity,
        reboot_id: &RebootOperationId,
    ) -> Result<RebootOperation> {
        let agent_id = identity.require_agent("only agents can acknowledge reboots")?;
        let operation = self.load(reboot_id).await?;
        if operation.agent_id() != agent_id {
            return Err(FleetError::Forbidden(
                "not your reboot operation".to_string(),
            ));
        }

        match operation.status {
            RebootStatus::Sent => {
                let transition = RebootTransition::acknowledge(operation.id.clone(), self.clock.now());
                if self.store.apply_reboot_transition(transition).await? {
                    info!(reboot_id = %operation.id, agent_id = %agent_id, "Reboot acknowledged");
                }
                let current = self.load(reboot_id).await?;
                match current.status {
                    RebootStatus::Rebooting => Ok(current),
                    other => Err(not_acknowledgeable(other)),
                }
            }
            RebootStatus::Rebooting => Ok(operation),
            other => Err(not_acknowledgeable(other)),
        }
    }

    /// # Errors
    /// `NotFound`, or `Forbidden` outside the caller's fleet.
    pub async fn get(
        &self,
        identity: &Identity,
        reboot_id: &RebootOperationId,
    ) -> Result<RebootOperation> {
        let operation = self.load(reboot_id).await?;
        if &operation.user_id != identity.scope_user() {
            return Err(FleetError::Forbidden(
                "not your reboot operation".to_string(),
            ));
        }
        Ok(operation)
    }

    /// Users see their own reboots; agents see their owner's fleet.
    ///
    /// # Errors
    /// Returns any store failure.
    pub async fn list(
        &self,
        identity: &Identity,
        query: RebootQuery,
    ) -> Result<Vec<RebootOperation>> {
        self.store
            .list_reboots(RebootFilter {
                user_id: Some(identity.scope_user().clone()),
                agent_id: query.agent_id.filter(|id| !id.is_empty()),
                status: query.status,
                limit: Some(REBOOT_LIST_LIMIT),
            })
            .await
    }

    async fn load(&self, reboot_id: &RebootOperationId) -> Result<RebootOperation> {
        self.store
            .get_reboot(reboot_id)
            .await?
            .ok_or_else(|| FleetError::NotFound("reboot operation not found".to_string()))
    }
}

fn not_acknowledgeable(status: RebootStatus) -> FleetError {
    FleetError::Conflict(format!(
        "reboot operation is {status}, only sent reboots can be acknowledged"
    ))
}
