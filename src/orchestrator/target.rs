use crate::error::{FleetError, Result};
use crate::store::FleetStore;
use crate::types::{
    Agent, AgentId, ContainerId, PlatformIdentity, ResolvedTarget, Target, UserId,
};
use std::sync::Arc;

/// Turns `(agent, container?)` into a [`Target`] and the platform its
/// patch script is chosen for. Pure lookups, no writes.
#[derive(Clone)]
pub struct TargetResolver {
    store: Arc<dyn FleetStore>,
}

impl TargetResolver {
    #[must_use]
    pub fn new(store: Arc<dyn FleetStore>) -> Self {
        Self { store }
    }

    /// Load `agent_id` and check that `user_id` owns it.
    ///
    /// # Errors
    /// `Validation` for a blank id, `NotFound` for an unknown agent,
    /// `Forbidden` when another user owns it.
    pub async fn owned_agent(&self, agent_id: &AgentId, user_id: &UserId) -> Result<Agent> {
        if agent_id.is_empty() {
            return Err(FleetError::Validation("agent_id is required".to_string()));
        }
        let agent = self
            .store
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| FleetError::NotFound("agent not found".to_string()))?;
        if !agent.is_owned_by(user_id) {
            return Err(FleetError::Forbidden(
                "unauthorized: agent does not belong to user".to_string(),
            ));
        }
        Ok(agent)
    }

    /// Ownership and instance id only; reboots need nothing more.
    ///
    /// # Errors
    /// `NotFound` for an unknown container, `TargetMismatch` when it is
    /// reported by a different agent.
    pub async fn resolve_target(
        &self,
        agent: &Agent,
        container_id: Option<&ContainerId>,
    ) -> Result<Target> {
        match container_id.filter(|id| !id.is_empty()) {
            None => Ok(Target::host(agent.id.clone())),
            Some(container_id) => {
                let container = self.container_of(agent, container_id).await?;
                Ok(Target::Container {
                    agent_id: agent.id.clone(),
                    container_id: container.id,
                    vmid: container.vmid,
                })
            }
        }
    }

    /// Target plus platform identity, for script selection.
    ///
    /// # Errors
    /// As [`Self::resolve_target`], plus `UnsupportedPlatform` naming the
    /// container's OS type when it has no family mapping.
    pub async fn resolve(
        &self,
        agent: &Agent,
        container_id: Option<&ContainerId>,
    ) -> Result<ResolvedTarget> {
        match container_id.filter(|id| !id.is_empty()) {
            None => Ok(ResolvedTarget {
                target: Target::host(agent.id.clone()),
                platform: PlatformIdentity::new(
                    agent.platform_family.clone(),
                    agent.os_version.clone(),
                ),
            }),
            Some(container_id) => {
                let container = self.container_of(agent, container_id).await?;
                let family = self
                    .store
                    .family_for_os_type(&container.os_type)
                    .await?
                    .ok_or_else(|| FleetError::UnsupportedPlatform(container.os_type.clone()))?;
                Ok(ResolvedTarget {
                    target: Target::Container {
                        agent_id: agent.id.clone(),
                        container_id: container.id,
                        vmid: container.vmid,
                    },
                    platform: PlatformIdentity::new(family, None),
                })
            }
        }
    }

    async fn container_of(
        &self,
        agent: &Agent,
        container_id: &ContainerId,
    ) -> Result<crate::types::Container> {
        let container = self
            .store
            .get_container(container_id)
            .await?
            .ok_or_else(|| FleetError::NotFound("container not found".to_string()))?;
        if container.agent_id != agent.id {
            return Err(FleetError::TargetMismatch(
                "container does not belong to the specified agent".to_string(),
            ));
        }
        Ok(container)
    }
}
