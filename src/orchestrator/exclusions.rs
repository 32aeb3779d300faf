use crate::clock::Clock;
use crate::error::Result;
use crate::store::FleetStore;
use crate::types::{ExceptionScope, Target};
use itertools::Itertools;
use std::sync::Arc;

/// Package names withheld from a patch run.
///
/// Only exceptions scoped to the exact target count: a container run sees
/// container-scoped exceptions, a host run sees agent-scoped ones.
#[derive(Clone)]
pub struct ExclusionResolver {
    store: Arc<dyn FleetStore>,
    clock: Arc<dyn Clock>,
}

impl ExclusionResolver {
    #[must_use]
    pub fn new(store: Arc<dyn FleetStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Sorted, de-duplicated names of exceptions active right now.
    ///
    /// # Errors
    /// Returns any store failure.
    pub async fn resolve(&self, target: &Target) -> Result<Vec<String>> {
        let scope = match target {
            Target::Host { agent_id } => ExceptionScope::Agent(agent_id.clone()),
            Target::Container { container_id, .. } => {
                ExceptionScope::Container(container_id.clone())
            }
        };
        let now = self.clock.now();
        let exceptions = self.store.exceptions_for_scope(&scope).await?;
        Ok(exceptions
            .into_iter()
            .filter(|exception| exception.is_active_at(now))
            .map(|exception| exception.package_name)
            .sorted()
            .dedup()
            .collect())
    }
}
