use super::exclusions::ExclusionResolver;
use super::scripts::ScriptCatalog;
use super::target::TargetResolver;
use crate::artifacts::{artifact_ref, ArtifactStore};
use crate::clock::Clock;
use crate::error::{FleetError, Result};
use crate::store::FleetStore;
use crate::types::{
    AgentId, ContainerId, Identity, PatchMode, PatchOperation, PatchOperationId, PatchStatus,
    ScriptId, ScriptValidation, UserId,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const STDOUT_ARTIFACT: &str = "stdout.log";
pub const STDERR_ARTIFACT: &str = "stderr.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRequest {
    pub agent_id: AgentId,
    pub container_id: Option<ContainerId>,
    pub mode: PatchMode,
}

/// What an agent reports after running a patch script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[derive(Clone)]
pub struct PatchManager {
    store: Arc<dyn FleetStore>,
    clock: Arc<dyn Clock>,
    artifacts: Arc<dyn ArtifactStore>,
    targets: TargetResolver,
    scripts: ScriptCatalog,
    exclusions: ExclusionResolver,
}

impl PatchManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn FleetStore>,
        clock: Arc<dyn Clock>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            targets: TargetResolver::new(store.clone()),
            scripts: ScriptCatalog::new(store.clone(), clock.clone()),
            exclusions: ExclusionResolver::new(store.clone(), clock.clone()),
            store,
            clock,
            artifacts,
        }
    }

    /// # Errors
    /// `Forbidden` for agent callers, otherwise as [`Self::create_for_user`].
    pub async fn create(&self, identity: &Identity, request: PatchRequest) -> Result<PatchOperation> {
        let user_id = identity.require_user("agents cannot create patch operations")?;
        self.create_for_user(user_id, request).await
    }

    /// Resolve target, script and exclusions, then persist a `pending`
    /// operation holding a snapshot of all three.
    ///
    /// # Errors
    /// Ownership, resolution or store failures, unchanged.
    pub async fn create_for_user(
        &self,
        user_id: &UserId,
        request: PatchRequest,
    ) -> Result<PatchOperation> {
        let agent = self.targets.owned_agent(&request.agent_id, user_id).await?;
        let resolved = self
            .targets
            .resolve(&agent, request.container_id.as_ref())
            .await?;
        let script = self.scripts.resolve(&resolved.platform).await?;
        let exclusions = self.exclusions.resolve(&resolved.target).await?;

        let operation = PatchOperation::pending(
            user_id.clone(),
            resolved.target,
            request.mode,
            &script,
            exclusions,
            self.clock.now(),
        );
        self.store.insert_patch(operation.clone()).await?;

        info!(
            patch_id = %operation.id,
            target = %operation.target,
            mode = %operation.mode,
            script_id = %operation.script_id,
            exclusions = operation.exclusions.len(),
            "Created patch operation"
        );
        Ok(operation)
    }

    /// Agent signal that the script has started.
    ///
    /// # Errors
    /// `Forbidden` for non-owners, `Conflict` unless the operation is `pending`.
    pub async fn mark_running(
        &self,
        identity: &Identity,
        operation_id: &PatchOperationId,
    ) -> Result<PatchOperation> {
        let agent_id = identity.require_agent("only agents can start patch operations")?;
        let mut operation = self.load_for_agent(operation_id, agent_id).await?;
        if operation.status != PatchStatus::Pending {
            return Err(FleetError::Conflict(format!(
                "patch operation is {}, expected pending",
                operation.status
            )));
        }
        operation.status = PatchStatus::Running;
        operation.started_at = Some(self.clock.now());
        if !self
            .store
            .update_patch_if(operation.clone(), PatchStatus::Pending)
            .await?
        {
            return Err(FleetError::Conflict(
                "patch operation changed concurrently, expected pending".to_string(),
            ));
        }
        info!(patch_id = %operation.id, "Patch operation running");
        Ok(operation)
    }

    /// Record the agent's result. The only writer of a terminal patch status.
    ///
    /// # Errors
    /// `Forbidden` when the caller is not the operation's agent, `Conflict`
    /// when a result was already recorded.
    pub async fn upload_result(
        &self,
        identity: &Identity,
        operation_id: &PatchOperationId,
        result: PatchResult,
    ) -> Result<PatchOperation> {
        let agent_id = identity.require_agent("only agents can upload results")?;
        let mut operation = self.load_for_agent(operation_id, agent_id).await?;
        if operation.status.is_terminal() {
            return Err(FleetError::Conflict(format!(
                "patch operation already {}",
                operation.status
            )));
        }

        let observed = operation.status;
        let id = operation.id.value().to_string();
        operation.stdout_ref = Some(artifact_ref(&id, STDOUT_ARTIFACT)?);
        operation.stderr_ref = Some(artifact_ref(&id, STDERR_ARTIFACT)?);
        operation.exit_code = Some(result.exit_code);
        operation.completed_at = Some(self.clock.now());
        if result.exit_code == 0 {
            operation.status = PatchStatus::Completed;
        } else {
            operation.status = PatchStatus::Failed;
            operation.error_message = Some(format!(
                "patch script exited with code {}",
                result.exit_code
            ));
        }
        // Only the upload that wins the status change writes artifacts.
        if !self.store.update_patch_if(operation.clone(), observed).await? {
            return Err(FleetError::Conflict(
                "patch operation result already recorded".to_string(),
            ));
        }
        for (name, bytes) in [(STDOUT_ARTIFACT, result.stdout), (STDERR_ARTIFACT, result.stderr)] {
            if let Err(e) = self.artifacts.put(&id, name, bytes).await {
                error!(patch_id = %id, artifact = name, error = %e, "Failed to store patch artifact");
                return Err(e);
            }
        }

        if operation.status == PatchStatus::Failed {
            warn!(patch_id = %operation.id, exit_code = result.exit_code, "Patch operation failed");
        } else {
            info!(patch_id = %operation.id, "Patch operation completed");
        }
        Ok(operation)
    }

    /// # Errors
    /// `NotFound` or `Forbidden` when the caller's user does not own it.
    pub async fn get(
        &self,
        identity: &Identity,
        operation_id: &PatchOperationId,
    ) -> Result<PatchOperation> {
        let operation = self.load(operation_id).await?;
        if &operation.user_id != identity.scope_user() {
            return Err(FleetError::Forbidden(
                "unauthorized: operation does not belong to user".to_string(),
            ));
        }
        Ok(operation)
    }

    /// Newest first.
    ///
    /// # Errors
    /// Returns any store failure.
    pub async fn list(&self, identity: &Identity) -> Result<Vec<PatchOperation>> {
        self.store.patches_for_user(identity.scope_user()).await
    }

    /// # Errors
    /// `Forbidden` for user callers, `ScriptNotFound` for unknown ids.
    pub async fn validate_script(
        &self,
        identity: &Identity,
        script_id: &ScriptId,
    ) -> Result<ScriptValidation> {
        identity.require_agent("only agents can validate scripts")?;
        self.scripts.validate(script_id).await
    }

    async fn load(&self, operation_id: &PatchOperationId) -> Result<PatchOperation> {
        self.store
            .get_patch(operation_id)
            .await?
            .ok_or_else(|| FleetError::NotFound("patch operation not found".to_string()))
    }

    async fn load_for_agent(
        &self,
        operation_id: &PatchOperationId,
        agent_id: &AgentId,
    ) -> Result<PatchOperation> {
        let operation = self.load(operation_id).await?;
        if operation.target.agent_id() != agent_id {
            return Err(FleetError::Forbidden(
                "unauthorized: operation does not belong to agent".to_string(),
            ));
        }
        Ok(operation)
    }
}
