use crate::error::{FleetError, Result};
use crate::orchestrator::FleetServices;
use futures_util::future::join_all;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// The completion monitor and the schedule driver, each on its own task.
/// They share nothing but the store behind `services`.
pub struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    #[must_use]
    pub fn spawn(
        services: &FleetServices,
        monitor_interval: Duration,
        schedule_tick_interval: Duration,
    ) -> Self {
        let (shutdown, signal) = watch::channel(false);
        let handles = vec![
            tokio::spawn(services.monitor.clone().run(monitor_interval, signal.clone())),
            tokio::spawn(
                services
                    .schedules
                    .clone()
                    .run(schedule_tick_interval, signal),
            ),
        ];
        Self { shutdown, handles }
    }

    /// Signal both loops and wait up to `grace` for them to finish their
    /// current sweep.
    ///
    /// # Errors
    /// `Internal` when the loops are already gone or do not stop in time.
    pub async fn shutdown(self, grace: Duration) -> Result<()> {
        info!("Stopping background tasks");
        self.shutdown
            .send(true)
            .map_err(|_| FleetError::Internal("background tasks already stopped".to_string()))?;

        match tokio::time::timeout(grace, join_all(self.handles)).await {
            Ok(results) => {
                for joined in results {
                    if let Err(e) = joined {
                        warn!(error = %e, "Background task ended abnormally");
                    }
                }
                Ok(())
            }
            Err(_) => Err(FleetError::Internal(format!(
                "background tasks did not stop within {}s",
                grace.as_secs()
            ))),
        }
    }
}
