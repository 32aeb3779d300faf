mod agent;
mod catalog;
mod identifiers;
mod identity;
mod patch;
mod platform;
mod reboot;
mod schedule;

pub use agent::{Agent, Container};
pub use catalog::{ExceptionScope, PackageException, Script, ScriptValidation};
pub use identifiers::{
    AgentId, ContainerId, ExceptionId, PatchOperationId, RebootOperationId, ScheduleId, ScriptId,
    UserId,
};
pub use identity::Identity;
pub use patch::{PatchMode, PatchOperation, PatchStatus};
pub use platform::{
    normalize_os_type, PlatformFamily, PlatformIdentity, ResolvedTarget, Target,
    DEFAULT_OS_TYPE_MAP,
};
pub use reboot::{
    RebootFilter, RebootOperation, RebootStatus, RebootTransition, DEFAULT_REBOOT_TIMEOUT_SECS,
};
pub use schedule::{Schedule, ScheduleKind};
