use super::identifiers::{AgentId, ContainerId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Container OS types known out of the box, mapped to the platform family
/// whose patch script handles them.
pub const DEFAULT_OS_TYPE_MAP: &[(&str, &str)] = &[
    ("alpine", "alpine"),
    ("debian", "debian"),
    ("ubuntu", "debian"),
    ("centos", "rhel"),
    ("fedora", "rhel"),
    ("archlinux", "arch"),
    ("opensuse", "suse"),
];

/// Normalized OS family string (`debian`, `rhel`, `alpine`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformFamily(String);

impl PlatformFamily {
    #[must_use]
    pub fn new(family: impl AsRef<str>) -> Self {
        Self(normalize_os_type(family.as_ref()))
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[must_use]
pub fn normalize_os_type(os_type: &str) -> String {
    os_type.trim().to_ascii_lowercase()
}

/// What a script is selected by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformIdentity {
    pub family: PlatformFamily,
    pub os_version: Option<String>,
}

impl PlatformIdentity {
    #[must_use]
    pub fn new(family: PlatformFamily, os_version: Option<String>) -> Self {
        Self {
            family,
            os_version: os_version.filter(|v| !v.trim().is_empty()),
        }
    }
}

/// The addressable unit of a patch or reboot operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    Host {
        agent_id: AgentId,
    },
    Container {
        agent_id: AgentId,
        container_id: ContainerId,
        vmid: u32,
    },
}

impl Target {
    #[must_use]
    pub const fn host(agent_id: AgentId) -> Self {
        Self::Host { agent_id }
    }

    #[must_use]
    pub const fn agent_id(&self) -> &AgentId {
        match self {
            Self::Host { agent_id } | Self::Container { agent_id, .. } => agent_id,
        }
    }

    #[must_use]
    pub const fn container_id(&self) -> Option<&ContainerId> {
        match self {
            Self::Host { .. } => None,
            Self::Container { container_id, .. } => Some(container_id),
        }
    }

    #[must_use]
    pub const fn vmid(&self) -> Option<u32> {
        match self {
            Self::Host { .. } => None,
            Self::Container { vmid, .. } => Some(*vmid),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host { agent_id } => write!(f, "host:{agent_id}"),
            Self::Container {
                agent_id,
                container_id,
                vmid,
            } => write!(f, "container:{agent_id}/{container_id}({vmid})"),
        }
    }
}

/// A target together with the platform its script is chosen for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub target: Target,
    pub platform: PlatformIdentity,
}
