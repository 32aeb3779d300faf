use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePatchBody {
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub container_id: Option<String>,
    #[serde(default)]
    pub mode: String,
}

/// Multipart form of a result upload: `exit_code` arrives as text.
#[derive(Debug, Clone, Default)]
pub struct PatchResultForm {
    pub exit_code: String,
    pub stdout_file: Vec<u8>,
    pub stderr_file: Vec<u8>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRebootBody {
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub container_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RebootListParams {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateScheduleBody {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub container_id: Option<String>,
    #[serde(default)]
    pub cron_expression: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateScheduleBody {
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RebootCreated {
    pub success: bool,
    pub reboot_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct Acknowledged {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ScriptChecksum {
    pub name: String,
    pub sha256: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,
}

const fn default_active() -> bool {
    true
}
