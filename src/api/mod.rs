//! Transport-agnostic request handlers. A caller's bearer credential is
//! resolved to an [`Identity`] before it reaches this layer; every handler
//! answers with a status code and a JSON body.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

pub mod dto;

use crate::error::{get_error_info, FleetError, Result};
use crate::orchestrator::{
    FleetServices, PatchRequest, PatchResult, RebootQuery, RebootRequest, ScheduleDraft,
    ScheduleUpdate,
};
use crate::types::{
    AgentId, ContainerId, Identity, PatchMode, PatchOperationId, RebootOperationId, RebootStatus,
    ScheduleId, ScheduleKind, ScriptId,
};
use dto::{
    Acknowledged, CreatePatchBody, CreateRebootBody, CreateScheduleBody, ErrorBody,
    PatchResultForm, RebootCreated, RebootListParams, ScriptChecksum, UpdateScheduleBody,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

pub const REBOOT_SENT_MESSAGE: &str =
    "Reboot command sent. Agent will receive it on its command channel.";
pub const REBOOT_ACKNOWLEDGED_MESSAGE: &str =
    "Reboot acknowledged. Agent should proceed with reboot.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn json<T: Serialize>(status: u16, payload: &T) -> Self {
        match serde_json::to_value(payload) {
            Ok(body) => Self { status, body },
            Err(e) => Self::from_error(&FleetError::from(e)),
        }
    }

    /// Render an error as `{error, code, fix}`. Internal failures are logged
    /// and reported without their detail.
    #[must_use]
    pub fn from_error(err: &FleetError) -> Self {
        let code = err.code();
        let message = if err.is_internal() {
            error!(error = %err, code, "Request failed");
            "internal error".to_string()
        } else {
            err.to_string()
        };
        let body = ErrorBody {
            error: message,
            code: code.to_string(),
            fix: get_error_info(code).map(|(_, fix)| fix.to_string()),
        };
        Self {
            status: err.http_status(),
            body: serde_json::to_value(&body)
                .unwrap_or_else(|_| json!({ "error": body.error, "code": body.code })),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status < 400
    }
}

fn respond<T: Serialize>(status: u16, result: Result<T>) -> ApiResponse {
    match result {
        Ok(payload) => ApiResponse::json(status, &payload),
        Err(e) => ApiResponse::from_error(&e),
    }
}

fn optional_id(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct FleetApi {
    services: FleetServices,
}

impl FleetApi {
    #[must_use]
    pub const fn new(services: FleetServices) -> Self {
        Self { services }
    }

    #[must_use]
    pub const fn services(&self) -> &FleetServices {
        &self.services
    }

    /// `POST /patches`
    pub async fn create_patch(&self, identity: &Identity, body: CreatePatchBody) -> ApiResponse {
        let result = async {
            let mode = PatchMode::parse(body.mode.trim())?;
            let request = PatchRequest {
                agent_id: AgentId::new(body.agent_id.trim()),
                container_id: optional_id(body.container_id).map(ContainerId::new),
                mode,
            };
            self.services.patches.create(identity, request).await
        }
        .await;
        respond(201, result)
    }

    /// `GET /patches`
    pub async fn list_patches(&self, identity: &Identity) -> ApiResponse {
        respond(200, self.services.patches.list(identity).await)
    }

    /// `GET /patches/{id}`
    pub async fn get_patch(&self, identity: &Identity, patch_id: &str) -> ApiResponse {
        let id = PatchOperationId::new(patch_id);
        respond(200, self.services.patches.get(identity, &id).await)
    }

    /// `POST /patches/{id}/start`
    pub async fn start_patch(&self, identity: &Identity, patch_id: &str) -> ApiResponse {
        let id = PatchOperationId::new(patch_id);
        respond(200, self.services.patches.mark_running(identity, &id).await)
    }

    /// `POST /patches/{id}/result`
    pub async fn upload_patch_result(
        &self,
        identity: &Identity,
        patch_id: &str,
        form: PatchResultForm,
    ) -> ApiResponse {
        let result = async {
            identity.require_agent("only agents can upload results")?;
            let exit_code = form.exit_code.trim().parse::<i32>().map_err(|_| {
                FleetError::Validation(format!("invalid exit_code: {:?}", form.exit_code))
            })?;
            let id = PatchOperationId::new(patch_id);
            self.services
                .patches
                .upload_result(
                    identity,
                    &id,
                    PatchResult {
                        exit_code,
                        stdout: form.stdout_file,
                        stderr: form.stderr_file,
                    },
                )
                .await?;
            Ok(json!({ "status": "updated" }))
        }
        .await;
        respond(200, result)
    }

    /// `GET /scripts/{id}/validate`
    pub async fn validate_script(&self, identity: &Identity, script_id: &str) -> ApiResponse {
        let id = ScriptId::new(script_id);
        let result = self
            .services
            .patches
            .validate_script(identity, &id)
            .await
            .map(|validation| ScriptChecksum {
                name: validation.name,
                sha256: validation.sha256,
            });
        respond(200, result)
    }

    /// `POST /reboot`
    pub async fn create_reboot(&self, identity: &Identity, body: CreateRebootBody) -> ApiResponse {
        let request = RebootRequest {
            agent_id: AgentId::new(body.agent_id.trim()),
            container_id: optional_id(body.container_id).map(ContainerId::new),
            reason: body.reason.filter(|r| !r.trim().is_empty()),
            timeout_seconds: body.timeout_seconds,
        };
        let result = self
            .services
            .reboots
            .create(identity, request)
            .await
            .map(|operation| RebootCreated {
                success: true,
                reboot_id: operation.id.to_string(),
                status: operation.status.to_string(),
                message: REBOOT_SENT_MESSAGE.to_string(),
            });
        respond(200, result)
    }

    /// `GET /reboot`
    pub async fn list_reboots(&self, identity: &Identity, params: RebootListParams) -> ApiResponse {
        let result = async {
            let status = optional_id(params.status)
                .map(|s| RebootStatus::try_from(s.as_str()).map_err(FleetError::Validation))
                .transpose()?;
            let query = RebootQuery {
                agent_id: optional_id(params.agent_id).map(AgentId::new),
                status,
            };
            self.services.reboots.list(identity, query).await
        }
        .await;
        respond(200, result)
    }

    /// `GET /reboot/{id}`
    pub async fn get_reboot(&self, identity: &Identity, reboot_id: &str) -> ApiResponse {
        let id = RebootOperationId::new(reboot_id);
        respond(200, self.services.reboots.get(identity, &id).await)
    }

    /// `POST /reboot/{id}/acknowledge`
    pub async fn acknowledge_reboot(&self, identity: &Identity, reboot_id: &str) -> ApiResponse {
        let id = RebootOperationId::new(reboot_id);
        let result = self
            .services
            .reboots
            .acknowledge(identity, &id)
            .await
            .map(|_| Acknowledged {
                success: true,
                message: REBOOT_ACKNOWLEDGED_MESSAGE.to_string(),
            });
        respond(200, result)
    }

    /// `POST /schedules`
    pub async fn create_schedule(
        &self,
        identity: &Identity,
        body: CreateScheduleBody,
    ) -> ApiResponse {
        let result = async {
            let kind =
                ScheduleKind::try_from(body.kind.trim()).map_err(FleetError::Validation)?;
            let draft = ScheduleDraft {
                kind,
                agent_id: AgentId::new(body.agent_id.trim()),
                container_id: optional_id(body.container_id).map(ContainerId::new),
                cron_expression: body.cron_expression,
                active: body.active,
                reason: body.reason,
            };
            self.services.schedules.create(identity, draft).await
        }
        .await;
        respond(201, result)
    }

    /// `GET /schedules`
    pub async fn list_schedules(&self, identity: &Identity) -> ApiResponse {
        respond(200, self.services.schedules.list(identity).await)
    }

    /// `GET /schedules/{id}`
    pub async fn get_schedule(&self, identity: &Identity, schedule_id: &str) -> ApiResponse {
        let id = ScheduleId::new(schedule_id);
        respond(200, self.services.schedules.get(identity, &id).await)
    }

    /// `PATCH /schedules/{id}`
    pub async fn update_schedule(
        &self,
        identity: &Identity,
        schedule_id: &str,
        body: UpdateScheduleBody,
    ) -> ApiResponse {
        let id = ScheduleId::new(schedule_id);
        let update = ScheduleUpdate {
            cron_expression: body.cron_expression,
            active: body.active,
            reason: body.reason,
        };
        respond(200, self.services.schedules.update(identity, &id, update).await)
    }

    /// `DELETE /schedules/{id}`
    pub async fn delete_schedule(&self, identity: &Identity, schedule_id: &str) -> ApiResponse {
        let id = ScheduleId::new(schedule_id);
        let result = self
            .services
            .schedules
            .delete(identity, &id)
            .await
            .map(|()| json!({ "status": "deleted" }));
        respond(200, result)
    }
}
