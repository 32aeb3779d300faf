use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Fresh opaque id for a record about to be inserted.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4().simple().to_string())
            }

            #[must_use]
            pub fn value(&self) -> &str {
                &self.0
            }

            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

record_id!(
    /// Owning user of agents, operations and schedules.
    UserId
);
record_id!(AgentId);
record_id!(
    /// Host-managed VM or LXC container reported by an agent.
    ContainerId
);
record_id!(ScriptId);
record_id!(ExceptionId);
record_id!(PatchOperationId);
record_id!(RebootOperationId);
record_id!(ScheduleId);

#[cfg(test)]
mod tests {
    use super::{AgentId, RebootOperationId};

    #[test]
    fn generated_ids_are_unique_and_non_empty() {
        let a = RebootOperationId::generate();
        let b = RebootOperationId::generate();
        assert_ne!(a, b);
        assert!(!a.is_empty());
        assert_eq!(a.value().len(), 32);
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = AgentId::new("agent-1");
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, "\"agent-1\"");
    }
}
