//! Builds the schedule window: the prayer events of the next few days,
//! resolved to absolute instants.

use crate::common::EventId;
use crate::config::{Location, Preferences};
use crate::error::ProviderError;
use crate::events::PrayerEvent;
use crate::provider::PrayerTimeProvider;
use chrono::{DateTime, Days, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::HashSet;

/// Longest daylight-saving gap searched when a local time does not exist.
const MAX_GAP_MINUTES: i64 = 180;

/// Resolves a local wall-clock time to an instant using the rules `tz` has
/// on that local date.
///
/// Ambiguous times (clocks falling back) take the earlier instant. Times that
/// fall in a spring-forward gap move to the first valid instant after it.
pub fn resolve_local(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    if let Some(dt) = tz.from_local_datetime(&local).earliest() {
        return Some(dt.with_timezone(&Utc));
    }
    (1..=MAX_GAP_MINUTES).find_map(|minutes| {
        tz.from_local_datetime(&(local + chrono::Duration::minutes(minutes)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// Prayer events over a bounded horizon, strictly increasing in time with no
/// duplicate event ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleWindow {
    events: Vec<PrayerEvent>,
}

impl ScheduleWindow {
    /// Computes the window starting on `now`'s date in `tz` and covering the
    /// preference horizon. Only enabled prayers are included.
    pub fn compute(
        provider: &dyn PrayerTimeProvider,
        now: DateTime<Utc>,
        location: &Location,
        preferences: &Preferences,
        tz: Tz,
    ) -> Result<Self, ProviderError> {
        let today = now.with_timezone(&tz).date_naive();
        let mut events = Vec::new();
        for offset in 0..preferences.horizon() {
            let date = today
                .checked_add_days(Days::new(u64::from(offset)))
                .ok_or_else(|| ProviderError::Inconsistent(format!("date {} + {}d", today, offset)))?;
            for time in provider.compute_times(date, location)? {
                if !preferences.is_enabled(time.prayer) {
                    continue;
                }
                let instant = resolve_local(&tz, time.local).ok_or_else(|| {
                    ProviderError::Inconsistent(format!(
                        "{} at {} does not exist in {}",
                        time.prayer, time.local, tz
                    ))
                })?;
                events.push(PrayerEvent::new(date, time.prayer, instant, &location.name));
            }
        }
        Self::from_events(events)
    }

    /// Orders events by instant and checks the window invariants.
    pub fn from_events(mut events: Vec<PrayerEvent>) -> Result<Self, ProviderError> {
        events.sort_by_key(|e| e.scheduled_for);
        let mut seen = HashSet::new();
        for event in &events {
            if !seen.insert(&event.event_id) {
                return Err(ProviderError::Inconsistent(format!(
                    "duplicate event {}",
                    event.event_id
                )));
            }
        }
        if let Some(pair) = events
            .windows(2)
            .find(|w| w[0].scheduled_for >= w[1].scheduled_for)
        {
            return Err(ProviderError::Inconsistent(format!(
                "{} and {} share the instant {}",
                pair[0].event_id, pair[1].event_id, pair[1].scheduled_for
            )));
        }
        Ok(Self { events })
    }

    /// Keeps only events strictly after `cutoff`.
    pub fn after(mut self, cutoff: DateTime<Utc>) -> Self {
        self.events.retain(|e| e.scheduled_for > cutoff);
        self
    }

    pub fn get(&self, event_id: &EventId) -> Option<&PrayerEvent> {
        self.events.iter().find(|e| &e.event_id == event_id)
    }

    pub fn contains(&self, event_id: &EventId) -> bool {
        self.get(event_id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PrayerEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
