//! Operation orchestration: target, script and exclusion resolution, the
//! patch and reboot managers, the completion monitor and the scheduler.

pub mod cron;
pub mod exclusions;
pub mod monitor;
pub mod patch;
pub mod reboot;
pub mod schedule;
pub mod scripts;
pub mod target;

pub use cron::CronSchedule;
pub use exclusions::ExclusionResolver;
pub use monitor::{CompletionMonitor, MonitorReport, ReconcileOutcome};
pub use patch::{PatchManager, PatchRequest, PatchResult};
pub use reboot::{RebootManager, RebootQuery, RebootRequest};
pub use schedule::{DueReport, ScheduleDraft, ScheduleEngine, ScheduleRun, ScheduleUpdate};
pub use scripts::{ScriptCatalog, ScriptUpload};
pub use target::TargetResolver;

use crate::artifacts::ArtifactStore;
use crate::clock::Clock;
use crate::store::FleetStore;
use std::sync::Arc;

/// Every service wired to one store, clock and artifact store.
#[derive(Clone)]
pub struct FleetServices {
    pub scripts: ScriptCatalog,
    pub patches: PatchManager,
    pub reboots: RebootManager,
    pub schedules: ScheduleEngine,
    pub monitor: CompletionMonitor,
}

impl FleetServices {
    #[must_use]
    pub fn new(
        store: Arc<dyn FleetStore>,
        clock: Arc<dyn Clock>,
        artifacts: Arc<dyn ArtifactStore>,
        default_reboot_timeout_secs: u32,
    ) -> Self {
        let patches = PatchManager::new(store.clone(), clock.clone(), artifacts);
        let reboots = RebootManager::new(store.clone(), clock.clone())
            .with_default_timeout(default_reboot_timeout_secs);
        Self {
            scripts: ScriptCatalog::new(store.clone(), clock.clone()),
            schedules: ScheduleEngine::new(
                store.clone(),
                clock.clone(),
                patches.clone(),
                reboots.clone(),
            ),
            monitor: CompletionMonitor::new(store, clock),
            patches,
            reboots,
        }
    }
}
