//! Review-count synchronization scheduler.
//!
//! Decides when each button talks to its remote site.  Per instance the
//! lifecycle is:
//!
//! ```text
//!  activate ──► Unconfigured        (unknown site / missing credentials)
//!     │
//!     └──────► Idle ──timer/stale──► Syncing ──done──► Idle ...
//! ```
//!
//! * **Re-renders are free**: a count synced less than ten minutes ago is
//!   shown straight from the persisted settings.
//! * **One timer per instance**: arming a schedule drops (and so cancels)
//!   whatever handle the instance had before.
//! * **One fetch per instance**: a sync requested while another is still in
//!   flight for the same account is skipped.  A request for different
//!   settings is queued behind the running fetch, whose result is then
//!   discarded; only the newest queued settings run.
//! * **Failures are quiet**: a failed fetch is logged and leaves both the
//!   display and the stored count alone; the next tick retries.
//!
//! Cancelling a schedule never aborts a fetch already in flight; its result
//! is still rendered and persisted when it lands.

mod handle;
mod timing;

pub use handle::ScheduleHandle;
pub use timing::{Clock, SystemClock};

#[cfg(test)]
pub use timing::ManualClock;

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::host::HostCommand;
use crate::render::{DisplayValue, Render};
use crate::settings::{InstanceId, InstanceSettings};
use crate::source::{Registry, UnknownSite};

/// Where an instance sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// No schedule: never activated, torn down, or missing configuration.
    Unconfigured,
    /// Schedule armed, nothing in flight.
    Idle,
    /// Schedule armed and a fetch is in flight.
    Syncing,
}

/// Why an activation did not arm a schedule.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    UnknownSite(#[from] UnknownSite),

    #[error("{site} needs {missing:?} before it can sync")]
    MissingCredentials {
        site: String,
        missing: Vec<&'static str>,
    },
}

/// Owns every instance's schedule.
pub struct Scheduler {
    ctx: SyncContext,
    schedules: HashMap<InstanceId, ScheduleHandle>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<Registry>,
        renderer: Arc<dyn Render>,
        clock: Arc<dyn Clock>,
        commands: mpsc::UnboundedSender<HostCommand>,
    ) -> Self {
        Self {
            ctx: SyncContext {
                registry,
                renderer,
                clock,
                commands,
                in_flight: Arc::new(Mutex::new(HashMap::new())),
            },
            schedules: HashMap::new(),
        }
    }

    /// A button became visible or its settings changed.
    ///
    /// Renders immediately (cached count, pending placeholder, or a
    /// configuration placeholder), starts an out-of-band sync when the cache
    /// is stale, and (re)arms the periodic schedule.
    pub fn activate(
        &mut self,
        instance: InstanceId,
        settings: InstanceSettings,
    ) -> Result<InstanceState, SchedulerError> {
        let source = match self.ctx.registry.resolve(&settings.website) {
            Ok(source) => source,
            Err(e) => {
                self.teardown(&instance);
                self.ctx.display(&instance, None, DisplayValue::UnknownSite);
                return Err(e.into());
            }
        };

        let required = source.required_credentials();
        if !settings.credentials.has_all(required) {
            self.teardown(&instance);
            self.ctx
                .display(&instance, Some(source.icon()), DisplayValue::MissingCredentials);
            let missing = required
                .iter()
                .copied()
                .filter(|k| settings.credentials.get(k).is_none())
                .collect();
            return Err(SchedulerError::MissingCredentials {
                site: source.id().to_string(),
                missing,
            });
        }

        self.schedules.remove(&instance);

        let now = self.ctx.clock.now();
        match settings.last_count {
            Some(count) if settings.is_fresh(now, timing::freshness_window()) => {
                tracing::debug!(instance = %instance, count, "showing cached count");
                self.ctx
                    .display(&instance, Some(source.icon()), DisplayValue::Count(count));
            }
            _ => {
                self.ctx
                    .display(&instance, Some(source.icon()), DisplayValue::Pending);
                self.ctx.spawn_sync(instance.clone(), settings.clone());
            }
        }

        let handle = ScheduleHandle::arm(self.ctx.clone(), instance.clone(), settings, now);
        self.schedules.insert(instance.clone(), handle);

        Ok(self.state(&instance))
    }

    /// Cancel the instance's schedule.  Returns whether one existed.
    pub fn teardown(&mut self, instance: &InstanceId) -> bool {
        self.schedules.remove(instance).is_some()
    }

    /// The user pressed the button: ask the host to open the review page.
    pub fn open_review_page(
        &self,
        instance: &InstanceId,
        settings: &InstanceSettings,
    ) -> Result<(), SchedulerError> {
        let source = self.ctx.registry.resolve(&settings.website)?;
        tracing::debug!(instance = %instance, url = source.review_url(), "opening review page");
        self.ctx.send(HostCommand::OpenUrl {
            url: source.review_url().to_string(),
        });
        Ok(())
    }

    pub fn state(&self, instance: &InstanceId) -> InstanceState {
        if !self.schedules.contains_key(instance) {
            InstanceState::Unconfigured
        } else if self.ctx.is_in_flight(instance) {
            InstanceState::Syncing
        } else {
            InstanceState::Idle
        }
    }

    /// When the instance's timer fires next, if it has one.
    pub fn next_sync_at(&self, instance: &InstanceId) -> Option<DateTime<Utc>> {
        let now = self.ctx.clock.now();
        self.schedules
            .get(instance)
            .map(|handle| handle.next_fire_at(now))
    }
}

// ---------------------------------------------------------------------------
// Sync machinery shared with the timer tasks
// ---------------------------------------------------------------------------

/// Everything a sync needs, cheap to clone into spawned tasks.
#[derive(Clone)]
pub(crate) struct SyncContext {
    registry: Arc<Registry>,
    renderer: Arc<dyn Render>,
    clock: Arc<dyn Clock>,
    commands: mpsc::UnboundedSender<HostCommand>,
    in_flight: InFlightMap,
}

impl SyncContext {
    /// Start one fetch cycle in its own task.
    ///
    /// If a fetch is already running for this instance the request is either
    /// skipped (same account) or queued to run once that fetch returns.
    fn spawn_sync(&self, instance: InstanceId, settings: InstanceSettings) {
        let mut guard = match InFlightGuard::acquire(&self.in_flight, &instance, &settings) {
            Acquire::Started(guard) => guard,
            Acquire::Skipped => {
                tracing::debug!(instance = %instance, "sync already in flight, skipping");
                return;
            }
            Acquire::Queued => {
                tracing::debug!(instance = %instance, "settings changed mid-sync, queued");
                return;
            }
        };

        let ctx = self.clone();
        tokio::spawn(async move {
            let mut settings = settings;
            loop {
                ctx.sync(&instance, &settings, &guard).await;
                match guard.next() {
                    Some(queued) => settings = queued,
                    None => break,
                }
            }
        });
    }

    async fn sync(
        &self,
        instance: &InstanceId,
        settings: &InstanceSettings,
        guard: &InFlightGuard,
    ) {
        let source = match self.registry.resolve(&settings.website) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(instance = %instance, error = %e, "cannot sync");
                return;
            }
        };

        let delay = source.min_call_delay();
        if !delay.is_zero() {
            tracing::trace!(instance = %instance, ?delay, "waiting before fetch");
            tokio::time::sleep(delay).await;
        }

        match source.fetch_count(&settings.credentials).await {
            Ok(count) if guard.is_superseded() => {
                tracing::debug!(
                    instance = %instance,
                    site = source.id(),
                    count,
                    "settings changed during fetch, dropping result"
                );
            }
            Ok(count) => {
                tracing::info!(instance = %instance, site = source.id(), count, "reviews synced");
                self.display(instance, Some(source.icon()), DisplayValue::Count(count));
                let updated = settings.with_sync_result(count, self.clock.now());
                self.send(HostCommand::PersistSettings {
                    instance: instance.clone(),
                    settings: updated,
                });
            }
            Err(e) => {
                tracing::warn!(
                    instance = %instance,
                    site = source.id(),
                    error = %e,
                    "sync failed, keeping last value"
                );
            }
        }
    }

    /// Render and push an image.  Render failures are logged, not returned.
    fn display(&self, instance: &InstanceId, icon: Option<&str>, value: DisplayValue) {
        match self.renderer.render(icon, &value.label()) {
            Ok(image) => self.send(HostCommand::SetImage {
                instance: instance.clone(),
                image,
            }),
            Err(e) => {
                tracing::warn!(instance = %instance, error = %e, "failed to render image");
            }
        }
    }

    fn send(&self, command: HostCommand) {
        if self.commands.send(command).is_err() {
            tracing::debug!("host connection gone, dropping command");
        }
    }

    fn is_in_flight(&self, instance: &InstanceId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(instance)
    }
}

type InFlightMap = Arc<Mutex<HashMap<InstanceId, InFlight>>>;

/// The fetch running for one instance and the settings waiting behind it.
struct InFlight {
    running: InstanceSettings,
    queued: Option<InstanceSettings>,
}

enum Acquire {
    Started(InFlightGuard),
    Skipped,
    Queued,
}

/// Marks an instance as syncing for as long as the guard lives.
struct InFlightGuard {
    map: InFlightMap,
    instance: InstanceId,
    released: bool,
}

impl InFlightGuard {
    fn acquire(map: &InFlightMap, instance: &InstanceId, settings: &InstanceSettings) -> Acquire {
        let mut entries = map.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.entry(instance.clone()) {
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                if entry.running.same_account(settings) {
                    // The newest request matches what is running, so anything
                    // queued earlier is obsolete.
                    entry.queued = None;
                    Acquire::Skipped
                } else {
                    entry.queued = Some(settings.clone());
                    Acquire::Queued
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(InFlight {
                    running: settings.clone(),
                    queued: None,
                });
                Acquire::Started(Self {
                    map: Arc::clone(map),
                    instance: instance.clone(),
                    released: false,
                })
            }
        }
    }

    /// Whether newer settings are waiting behind the running fetch.
    fn is_superseded(&self) -> bool {
        self.map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&self.instance)
            .is_some_and(|entry| entry.queued.is_some())
    }

    /// Promote queued settings to running, or release the slot if there are
    /// none.  Checked and released under one lock so no request is lost.
    fn next(&mut self) -> Option<InstanceSettings> {
        let mut entries = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        let queued = entries
            .get_mut(&self.instance)
            .and_then(|entry| {
                let queued = entry.queued.take()?;
                entry.running = queued.clone();
                Some(queued)
            });
        if queued.is_none() {
            entries.remove(&self.instance);
            self.released = true;
        }
        queued
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.released {
            self.map
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.instance);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
