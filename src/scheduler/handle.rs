//! The live periodic timer for one instance.

use chrono::{DateTime, TimeDelta, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::timing::{first_fire_delay, SYNC_INTERVAL};
use super::SyncContext;
use crate::settings::{InstanceId, InstanceSettings};

/// A periodic sync registration.
///
/// Dropping the handle cancels future fires.  A sync the timer already
/// started runs in its own task and is not affected.
#[derive(Debug)]
pub struct ScheduleHandle {
    instance: InstanceId,
    first_fire_at: DateTime<Utc>,
    task: JoinHandle<()>,
}

impl ScheduleHandle {
    /// Start the timer: first fire just past the next ten-minute boundary,
    /// then every [`SYNC_INTERVAL`].
    pub(super) fn arm(
        ctx: SyncContext,
        instance: InstanceId,
        settings: InstanceSettings,
        now: DateTime<Utc>,
    ) -> Self {
        let first = first_fire_delay(now);
        let first_fire_at = now + TimeDelta::seconds(first.as_secs() as i64);

        let timer_instance = instance.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(first).await;

            let mut ticker = tokio::time::interval(SYNC_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // The first tick completes immediately.
                ticker.tick().await;
                tracing::debug!(instance = %timer_instance, "periodic sync due");
                ctx.spawn_sync(timer_instance.clone(), settings.clone());
            }
        });

        tracing::debug!(instance = %instance, first_fire_at = %first_fire_at, "schedule armed");

        Self {
            instance,
            first_fire_at,
            task,
        }
    }

    /// Wall-clock time of the next fire at or after `now`.
    pub fn next_fire_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if now <= self.first_fire_at {
            return self.first_fire_at;
        }
        let interval = SYNC_INTERVAL.as_secs() as i64;
        let elapsed = (now - self.first_fire_at).num_seconds();
        let periods = (elapsed + interval - 1) / interval;
        self.first_fire_at + TimeDelta::seconds(periods * interval)
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.task.abort();
        tracing::debug!(instance = %self.instance, "schedule cancelled");
    }
}
