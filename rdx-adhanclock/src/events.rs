//! Defines the event types flowing through the service.
//!
//! `PrayerEvent` is a single computed prayer time. `TriggerKind` names what
//! asked for a reconcile pass, and `EngineEvent` is the stream broadcast by the
//! `AdhanEngine` to anyone observing it.

use crate::common::{EventId, Prayer};
use crate::components::rescheduler::ReconcileResult;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One prayer on one day, resolved to an absolute instant.
///
/// Recomputed on every pass and never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerEvent {
    pub event_id: EventId,
    pub prayer: Prayer,
    /// The prayer day this event belongs to, in the location's timezone.
    pub date: NaiveDate,
    pub scheduled_for: DateTime<Utc>,
    pub label: String,
}

impl PrayerEvent {
    pub fn new(date: NaiveDate, prayer: Prayer, scheduled_for: DateTime<Utc>, place: &str) -> Self {
        let label = if place.is_empty() {
            format!("Time for {} prayer", prayer)
        } else {
            format!("Time for {} prayer in {}", prayer, place)
        };
        Self {
            event_id: EventId::new(date, prayer),
            prayer,
            date,
            scheduled_for,
            label,
        }
    }
}

/// What caused a reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    /// The device finished booting, or the service process started.
    Boot,
    /// The periodic refresh timer fired.
    PeriodicRefresh,
    /// The user changed their location or notification preferences.
    PreferenceChanged,
    /// The device clock or timezone was changed.
    ClockChanged,
    /// Requested explicitly, e.g. from the shell.
    Manual,
}

impl TriggerKind {
    /// Maps an Android broadcast action to the trigger it stands for.
    pub fn from_intent_action(action: &str) -> Option<Self> {
        match action {
            "android.intent.action.BOOT_COMPLETED"
            | "android.intent.action.LOCKED_BOOT_COMPLETED"
            | "android.intent.action.QUICKBOOT_POWERON"
            | "com.htc.intent.action.QUICKBOOT_POWERON" => Some(TriggerKind::Boot),
            "android.intent.action.TIMEZONE_CHANGED" | "android.intent.action.TIME_SET" => {
                Some(TriggerKind::ClockChanged)
            }
            _ => None,
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TriggerKind::Boot => "boot",
            TriggerKind::PeriodicRefresh => "periodic-refresh",
            TriggerKind::PreferenceChanged => "preference-changed",
            TriggerKind::ClockChanged => "clock-changed",
            TriggerKind::Manual => "manual",
        })
    }
}

/// Events broadcast by the `AdhanEngine`.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Fired once when the engine's `run` loop begins.
    EngineStarted { timestamp: DateTime<Utc> },
    /// Fired once when the engine's `run` loop is about to exit.
    EngineShutdown,
    /// A trigger source asked for a reconcile pass.
    TriggerReceived { trigger: TriggerKind },
    /// A pass finished. `result.is_partial()` tells whether some events are still unarmed.
    ReconcileCompleted {
        trigger: TriggerKind,
        result: ReconcileResult,
    },
    /// A pass could not run to completion. `notice` is set when the user should be told.
    ReconcileFailed {
        trigger: TriggerKind,
        error: String,
        notice: Option<&'static str>,
    },
}
