#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use thiserror::Error;

/// Error code constants for type-safe error handling
pub mod code {
    pub const VALIDATION: &str = "VALIDATION";
    pub const NOTFOUND: &str = "NOTFOUND";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const CONFLICT: &str = "CONFLICT";
    pub const TARGET_MISMATCH: &str = "TARGET_MISMATCH";
    pub const UNSUPPORTED_PLATFORM: &str = "UNSUPPORTED_PLATFORM";
    pub const SCRIPT_NOT_FOUND: &str = "SCRIPT_NOT_FOUND";
    pub const INVALID_CRON: &str = "INVALID_CRON";
    pub const CONFIG: &str = "CONFIG";
    pub const INTERNAL: &str = "INTERNAL";
}

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    TargetMismatch(String),

    #[error("unsupported platform: no OS mapping found for ostype: {0}")]
    UnsupportedPlatform(String),

    #[error("script not found")]
    ScriptNotFound,

    #[error("invalid cron expression '{expression}': {reason}")]
    Cron { expression: String, reason: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FleetError {
    /// Returns the protocol error code for this error
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::Serialization(_) => code::VALIDATION,
            Self::NotFound(_) => code::NOTFOUND,
            Self::Forbidden(_) => code::FORBIDDEN,
            Self::Conflict(_) => code::CONFLICT,
            Self::TargetMismatch(_) => code::TARGET_MISMATCH,
            Self::UnsupportedPlatform(_) => code::UNSUPPORTED_PLATFORM,
            Self::ScriptNotFound => code::SCRIPT_NOT_FOUND,
            Self::Cron { .. } => code::INVALID_CRON,
            Self::Config(_) => code::CONFIG,
            Self::Database(_) | Self::Sqlx(_) | Self::Io(_) | Self::Internal(_) => code::INTERNAL,
        }
    }

    /// HTTP status the request surface answers with.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_)
            | Self::Serialization(_)
            | Self::TargetMismatch(_)
            | Self::UnsupportedPlatform(_)
            | Self::Cron { .. } => 400,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) | Self::ScriptNotFound => 404,
            Self::Conflict(_) => 409,
            Self::Database(_)
            | Self::Sqlx(_)
            | Self::Io(_)
            | Self::Config(_)
            | Self::Internal(_) => 500,
        }
    }

    /// Returns the process exit code for this error
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Database(_) | Self::Sqlx(_) => 3,
            Self::Io(_) => 7,
            _ => 9,
        }
    }

    #[must_use]
    pub const fn is_internal(&self) -> bool {
        self.http_status() >= 500
    }
}

/// Protocol error codes with a description and a fix hint.
pub const ERROR_CODES: &[(&str, &str, &str)] = &[
    (
        code::VALIDATION,
        "Invalid request payload",
        "Check required fields and allowed values",
    ),
    (
        code::NOTFOUND,
        "Resource was not found",
        "List resources and verify identifier",
    ),
    (
        code::FORBIDDEN,
        "Caller does not own the resource",
        "Use the owning user or agent identity",
    ),
    (
        code::CONFLICT,
        "Another outstanding operation or schedule holds the target",
        "Wait for the outstanding operation to finish or update the existing schedule",
    ),
    (
        code::TARGET_MISMATCH,
        "Container does not belong to the agent",
        "Pass the container's owning agent id",
    ),
    (
        code::UNSUPPORTED_PLATFORM,
        "Container OS type has no platform mapping",
        "Add an OS type mapping for the container",
    ),
    (
        code::SCRIPT_NOT_FOUND,
        "No patch script for the platform",
        "Register a script for the platform family",
    ),
    (
        code::INVALID_CRON,
        "Cron expression could not be parsed",
        "Use five fields: minute hour day-of-month month day-of-week",
    ),
    (
        code::CONFIG,
        "Configuration could not be loaded",
        "Check environment variables and .fleet/config.toml",
    ),
    (
        code::INTERNAL,
        "Unexpected internal failure",
        "Inspect logs and retry",
    ),
];

/// Get error code details (description and fix) for a given error code
#[must_use]
pub fn get_error_info(error_code: &str) -> Option<(&'static str, &'static str)> {
    ERROR_CODES
        .iter()
        .find(|(code, _, _)| *code == error_code)
        .map(|(_, desc, fix)| (*desc, *fix))
}

pub type Result<T> = std::result::Result<T, FleetError>;
