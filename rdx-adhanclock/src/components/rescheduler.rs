//! The reconcile pass.
//!
//! A pass recomputes the schedule window, compares it with the armed set
//! (after checking the armed set against what the gateway really has
//! pending), and issues only the cancels and schedules needed to make them
//! agree. Passes are serialized by an exclusive lock held for the whole
//! read-diff-apply sequence.

use crate::common::{EventId, NotificationHandle};
use crate::components::window::ScheduleWindow;
use crate::config::{ConfigStore, Location, Preferences};
use crate::error::{GatewayError, RescheduleError};
use crate::events::{PrayerEvent, TriggerKind};
use crate::gateway::NotificationGateway;
use crate::provider::PrayerTimeProvider;
use crate::store::{ArmedNotification, ArmedSet, ScheduleStore};
use crate::time::TimeSource;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Why a pass did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No location has been saved.
    NoLocation,
}

/// The gateway operation a partial failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOp {
    Arm,
    Cancel,
}

/// A single event the pass could not bring up to date. Retried on the next trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialFailure {
    pub event_id: EventId,
    pub op: GatewayOp,
    /// For a failed cancel, the handle that may still fire.
    pub handle: Option<NotificationHandle>,
    pub error: GatewayError,
}

/// What one reconcile pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    /// Set when the pass was a no-op.
    pub skipped: Option<SkipReason>,
    /// Events in the computed window after past-due filtering.
    pub window_len: usize,
    /// Events armed by this pass, in firing order.
    pub armed: Vec<EventId>,
    /// Events whose notification was cancelled or dropped by this pass.
    pub cancelled: Vec<EventId>,
    /// Events that were already armed correctly and left alone.
    pub retained: Vec<EventId>,
    /// Stored events the gateway no longer had pending, re-armed by this pass.
    pub drifted: Vec<EventId>,
    /// Stored events whose notification has already fired. They stay recorded
    /// until they leave the window and are never armed again.
    pub fired: Vec<EventId>,
    /// Set when the gateway's pending list could not be read and the store was trusted as-is.
    pub drift_check_skipped: bool,
    pub partial_failures: Vec<PartialFailure>,
}

impl ReconcileResult {
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.partial_failures.is_empty()
    }

    pub fn is_noop(&self) -> bool {
        self.armed.is_empty() && self.cancelled.is_empty() && self.partial_failures.is_empty()
    }
}

/// The minimal set of gateway operations bringing an armed set in line with a window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub to_cancel: Vec<ArmedNotification>,
    pub to_arm: Vec<PrayerEvent>,
    pub retained: Vec<EventId>,
}

impl ReconcilePlan {
    /// Diffs a window against an armed set.
    ///
    /// A record is kept only when its event is in the window at the same
    /// instant; a record for an event that moved is cancelled and the event
    /// re-armed.
    pub fn diff(window: &ScheduleWindow, armed: &ArmedSet) -> Self {
        let mut plan = ReconcilePlan::default();
        for record in armed.records() {
            match window.get(&record.event_id) {
                Some(event) if event.scheduled_for == record.scheduled_for => {
                    plan.retained.push(record.event_id)
                }
                _ => plan.to_cancel.push(record),
            }
        }
        plan.to_arm = window
            .iter()
            .filter(|event| {
                armed
                    .get(&event.event_id)
                    .map_or(true, |r| r.scheduled_for != event.scheduled_for)
            })
            .cloned()
            .collect();
        plan
    }
}

/// Keeps the gateway's armed notifications in line with freshly computed prayer times.
pub struct Rescheduler {
    clock: Arc<dyn TimeSource>,
    provider: Arc<dyn PrayerTimeProvider>,
    store: Arc<dyn ScheduleStore>,
    gateway: Arc<dyn NotificationGateway>,
    pass_lock: Mutex<()>,
}

impl Rescheduler {
    pub fn new(
        clock: Arc<dyn TimeSource>,
        provider: Arc<dyn PrayerTimeProvider>,
        store: Arc<dyn ScheduleStore>,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self {
            clock,
            provider,
            store,
            gateway,
            pass_lock: Mutex::new(()),
        }
    }

    pub fn clock(&self) -> &Arc<dyn TimeSource> {
        &self.clock
    }

    pub fn store(&self) -> &Arc<dyn ScheduleStore> {
        &self.store
    }

    /// Runs a pass for `trigger` with the current time and saved settings.
    pub async fn run(
        &self,
        trigger: TriggerKind,
        settings: &dyn ConfigStore,
    ) -> Result<ReconcileResult, RescheduleError> {
        let location = settings.location()?;
        let preferences = settings.preferences()?;
        let now = self.clock.now();
        debug!(%trigger, %now, "reconcile requested");
        self.reconcile(now, location.as_ref(), &preferences).await
    }

    /// Brings armed notifications in line with the prayer times due after `now`.
    ///
    /// Without a location the pass is a no-op. Provider and store failures
    /// abort the pass; gateway failures are recorded per event and the pass
    /// carries on.
    pub async fn reconcile(
        &self,
        now: DateTime<Utc>,
        location: Option<&Location>,
        preferences: &Preferences,
    ) -> Result<ReconcileResult, RescheduleError> {
        let _pass = self.pass_lock.lock().await;

        let Some(location) = location else {
            info!("No saved location; nothing to schedule.");
            return Ok(ReconcileResult::skipped(SkipReason::NoLocation));
        };

        let tz = location.timezone_or(self.clock.timezone());
        let window = ScheduleWindow::compute(self.provider.as_ref(), now, location, preferences, tz)
            .map_err(|e| {
                error!(error = %e, location = %location.name, "prayer times unavailable; store left untouched");
                e
            })?
            .after(now - preferences.grace());

        let mut armed = self.store.load().await.map_err(|e| {
            error!(error = %e, "schedule store unreadable; keeping last known schedule");
            e
        })?;

        let mut result = ReconcileResult {
            window_len: window.len(),
            ..ReconcileResult::default()
        };

        let mut fired = HashSet::new();
        match self.gateway.list_pending().await {
            Ok(pending) => {
                for record in armed.drifted(&pending) {
                    if record.scheduled_for <= now {
                        debug!(event = %record.event_id, handle = %record.handle, "notification already fired");
                        fired.insert(record.event_id.clone());
                        result.fired.push(record.event_id);
                        continue;
                    }
                    warn!(event = %record.event_id, handle = %record.handle, "armed notification missing from gateway");
                    self.store.remove(&record.event_id).await?;
                    armed.remove(&record.event_id);
                    result.drifted.push(record.event_id);
                }
            }
            Err(e) => {
                warn!(error = %e, "could not list pending notifications; trusting the store");
                result.drift_check_skipped = true;
            }
        }

        let mut plan = ReconcilePlan::diff(&window, &armed);
        plan.to_arm.retain(|event| !fired.contains(&event.event_id));
        result.retained = plan
            .retained
            .into_iter()
            .filter(|id| !fired.contains(id))
            .collect();

        for record in plan.to_cancel {
            if fired.contains(&record.event_id) {
                // Nothing left in the gateway; the record only blocks re-arming
                // until its event is out of the window.
                if !window.contains(&record.event_id) {
                    self.store.remove(&record.event_id).await?;
                    debug!(event = %record.event_id, "fired notification retired");
                }
                continue;
            }
            if let Err(e) = self.gateway.cancel(record.handle).await {
                if !matches!(e, GatewayError::NotFound(_)) {
                    warn!(
                        event = %record.event_id,
                        handle = %record.handle,
                        error = %e,
                        "cancel failed; the old notification may still fire"
                    );
                    result.partial_failures.push(PartialFailure {
                        event_id: record.event_id.clone(),
                        op: GatewayOp::Cancel,
                        handle: Some(record.handle),
                        error: e,
                    });
                }
            }
            self.store.remove(&record.event_id).await?;
            debug!(event = %record.event_id, "disarmed");
            result.cancelled.push(record.event_id);
        }

        for event in plan.to_arm {
            let handle = match self
                .gateway
                .schedule(&event.event_id, event.scheduled_for, &event.label)
                .await
            {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(event = %event.event_id, error = %e, "arming failed; will retry on next trigger");
                    result.partial_failures.push(PartialFailure {
                        event_id: event.event_id,
                        op: GatewayOp::Arm,
                        handle: None,
                        error: e,
                    });
                    continue;
                }
            };
            let record = ArmedNotification {
                event_id: event.event_id.clone(),
                handle,
                scheduled_for: event.scheduled_for,
                armed_at: now,
            };
            if let Err(e) = self.store.insert(record).await {
                self.withdraw(&event.event_id, handle).await;
                return Err(e.into());
            }
            debug!(event = %event.event_id, %handle, at = %event.scheduled_for, "armed");
            result.armed.push(event.event_id);
        }

        info!(
            window = result.window_len,
            armed = result.armed.len(),
            cancelled = result.cancelled.len(),
            retained = result.retained.len(),
            drifted = result.drifted.len(),
            fired = result.fired.len(),
            failures = result.partial_failures.len(),
            "reconcile pass complete"
        );
        Ok(result)
    }

    /// Cancels a handle the store failed to record, so the gateway never holds
    /// a notification the store does not know about.
    async fn withdraw(&self, event_id: &EventId, handle: NotificationHandle) {
        error!(event = %event_id, %handle, "could not record armed notification; withdrawing it");
        if let Err(e) = self.gateway.cancel(handle).await {
            warn!(event = %event_id, %handle, error = %e, "withdrawal failed");
        }
    }
}
