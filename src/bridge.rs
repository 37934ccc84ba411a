//! Host lifecycle events to scheduler calls.
//!
//! No decisions are made here; each event maps to exactly one scheduler
//! operation and the outcome is logged.

use crate::host::HostEvent;
use crate::scheduler::{Scheduler, SchedulerError};

pub struct Bridge {
    scheduler: Scheduler,
}

impl Bridge {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    pub fn handle(&mut self, event: HostEvent) {
        match event {
            HostEvent::ControlBecameVisible { instance, settings }
            | HostEvent::SettingsChanged { instance, settings } => {
                match self.scheduler.activate(instance.clone(), settings) {
                    Ok(state) => tracing::debug!(
                        %instance,
                        ?state,
                        next_sync = ?self.scheduler.next_sync_at(&instance),
                        "instance activated"
                    ),
                    Err(e @ SchedulerError::MissingCredentials { .. }) => {
                        tracing::info!(%instance, reason = %e, "instance not configured")
                    }
                    Err(e) => tracing::warn!(%instance, error = %e, "instance misconfigured"),
                }
            }
            HostEvent::ControlActivated { instance, settings } => {
                if let Err(e) = self.scheduler.open_review_page(&instance, &settings) {
                    tracing::warn!(%instance, error = %e, "cannot open review page");
                }
            }
            HostEvent::ControlRemoved { instance } => {
                if self.scheduler.teardown(&instance) {
                    tracing::debug!(%instance, "instance torn down");
                }
            }
        }
    }

    #[cfg(test)]
    fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}
