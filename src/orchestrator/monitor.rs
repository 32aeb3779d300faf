use crate::clock::Clock;
use crate::error::Result;
use crate::store::FleetStore;
use crate::types::{Agent, RebootStatus, RebootTransition};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const NOT_ACKNOWLEDGED_MESSAGE: &str = "Agent did not acknowledge reboot command";
pub const NOT_RECONNECTED_MESSAGE: &str = "Agent did not reconnect within timeout period";

/// What one agent's reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Completed,
    TimedOut,
    OrphanCleared,
    Unchanged,
}

/// Tally of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub examined: usize,
    pub completed: usize,
    pub timed_out: usize,
    pub orphans_cleared: usize,
    pub failures: usize,
}

impl MonitorReport {
    fn record(&mut self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Completed => self.completed += 1,
            ReconcileOutcome::TimedOut => self.timed_out += 1,
            ReconcileOutcome::OrphanCleared => self.orphans_cleared += 1,
            ReconcileOutcome::Unchanged => {}
        }
    }

    #[must_use]
    pub const fn changed(&self) -> usize {
        self.completed + self.timed_out + self.orphans_cleared
    }
}

/// Finalizes reboots from heartbeats and timeouts, without any agent
/// request driving it.
#[derive(Clone)]
pub struct CompletionMonitor {
    store: Arc<dyn FleetStore>,
    clock: Arc<dyn Clock>,
}

impl CompletionMonitor {
    #[must_use]
    pub fn new(store: Arc<dyn FleetStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// One sweep over every agent holding a pending reboot. A failure on one
    /// agent is logged and counted; the rest of the fleet is still handled.
    ///
    /// # Errors
    /// Only when the list of agents itself cannot be read.
    pub async fn reconcile(&self) -> Result<MonitorReport> {
        let agents = self.store.agents_with_pending_reboot().await?;
        let mut report = MonitorReport {
            examined: agents.len(),
            ..MonitorReport::default()
        };

        for agent in &agents {
            match self.reconcile_agent(agent).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    report.failures += 1;
                    warn!(agent_id = %agent.id, error = %e, "Reboot reconciliation failed");
                }
            }
        }

        if report.changed() > 0 || report.failures > 0 {
            info!(
                examined = report.examined,
                completed = report.completed,
                timed_out = report.timed_out,
                orphans_cleared = report.orphans_cleared,
                failures = report.failures,
                "Completion monitor sweep"
            );
        }
        Ok(report)
    }

    /// # Errors
    /// Returns any store failure for this agent.
    pub async fn reconcile_agent(&self, agent: &Agent) -> Result<ReconcileOutcome> {
        let Some(reboot_id) = agent.pending_reboot_id.as_ref().filter(|id| !id.is_empty()) else {
            return Ok(ReconcileOutcome::Unchanged);
        };

        let Some(operation) = self.store.get_reboot(reboot_id).await? else {
            let released = self.store.release_pending_reboot(&agent.id, reboot_id).await?;
            if released {
                info!(agent_id = %agent.id, reboot_id = %reboot_id, "Cleared orphaned pending reboot");
                return Ok(ReconcileOutcome::OrphanCleared);
            }
            return Ok(ReconcileOutcome::Unchanged);
        };

        let now = self.clock.now();
        let (transition, outcome) = match operation.status {
            RebootStatus::Rebooting => {
                let acknowledged_at = operation.acknowledged_at.unwrap_or_else(|| {
                    warn!(
                        reboot_id = %operation.id,
                        agent_id = %agent.id,
                        "Rebooting operation has no acknowledgement time, measuring from request"
                    );
                    operation.requested_at
                });
                if agent.seen_after(acknowledged_at) {
                    (
                        RebootTransition::complete(operation.id.clone(), agent.id.clone(), now),
                        ReconcileOutcome::Completed,
                    )
                } else if operation.expired_since(acknowledged_at, now) {
                    (
                        RebootTransition::time_out(
                            operation.id.clone(),
                            agent.id.clone(),
                            RebootStatus::Rebooting,
                            now,
                            NOT_RECONNECTED_MESSAGE,
                        ),
                        ReconcileOutcome::TimedOut,
                    )
                } else {
                    return Ok(ReconcileOutcome::Unchanged);
                }
            }
            RebootStatus::Sent if operation.expired_since(operation.requested_at, now) => (
                RebootTransition::time_out(
                    operation.id.clone(),
                    agent.id.clone(),
                    RebootStatus::Sent,
                    now,
                    NOT_ACKNOWLEDGED_MESSAGE,
                ),
                ReconcileOutcome::TimedOut,
            ),
            _ => return Ok(ReconcileOutcome::Unchanged),
        };

        if !self.store.apply_reboot_transition(transition).await? {
            debug!(reboot_id = %operation.id, "Reboot changed underneath the monitor");
            return Ok(ReconcileOutcome::Unchanged);
        }

        match outcome {
            ReconcileOutcome::Completed => {
                info!(reboot_id = %operation.id, agent_id = %agent.id, "Reboot completed");
            }
            _ => {
                warn!(
                    reboot_id = %operation.id,
                    agent_id = %agent.id,
                    from = %operation.status,
                    "Reboot timed out"
                );
            }
        }
        Ok(outcome)
    }

    /// Sweep every `period` until `shutdown` flips to `true`.
    pub async fn run(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_secs = period.as_secs(), "Completion monitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile().await {
                        warn!(error = %e, "Completion monitor sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Completion monitor shutting down");
                        break;
                    }
                }
            }
        }
    }
}
