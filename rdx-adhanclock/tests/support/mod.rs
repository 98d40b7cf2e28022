#![allow(dead_code)]

use adhanclock::prelude::*;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

pub fn timetable() -> TimetableProvider {
    TimetableProvider::new([
        (Prayer::Fajr, hm(5, 0)),
        (Prayer::Sunrise, hm(6, 20)),
        (Prayer::Dhuhr, hm(12, 15)),
        (Prayer::Asr, hm(15, 30)),
        (Prayer::Maghrib, hm(18, 5)),
        (Prayer::Isha, hm(19, 30)),
    ])
}

pub fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// A local wall-clock time in `tz`, as a UTC instant.
pub fn at(tz: Tz, y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    tz.with_ymd_and_hms(y, mo, d, h, mi, 0)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn mecca() -> Location {
    Location::new("Mecca", 21.4225, 39.8262, chrono_tz::Asia::Riyadh)
}

pub fn event(id: &str) -> EventId {
    id.parse().unwrap()
}

pub fn ids(events: &[EventId]) -> Vec<String> {
    events.iter().map(|e| e.to_string()).collect()
}

pub struct Harness {
    pub clock: Arc<ManualTimeSource>,
    pub gateway: Arc<MemoryGateway>,
    pub store: Arc<MemoryScheduleStore>,
    pub rescheduler: Arc<Rescheduler>,
}

impl Harness {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_provider(now, timetable())
    }

    pub fn with_provider(now: DateTime<Utc>, provider: TimetableProvider) -> Self {
        let clock = Arc::new(ManualTimeSource::new(now, Tz::UTC));
        let gateway = Arc::new(MemoryGateway::new());
        let store = Arc::new(MemoryScheduleStore::new());
        let rescheduler = Arc::new(Rescheduler::new(
            clock.clone(),
            Arc::new(provider),
            store.clone(),
            gateway.clone(),
        ));
        Self {
            clock,
            gateway,
            store,
            rescheduler,
        }
    }

    pub async fn reconcile(
        &self,
        location: &Location,
        prefs: &Preferences,
    ) -> Result<ReconcileResult, RescheduleError> {
        self.rescheduler
            .reconcile(self.clock.now(), Some(location), prefs)
            .await
    }

    /// Event ids currently recorded as armed, in firing order.
    pub async fn stored(&self) -> Vec<String> {
        self.store
            .snapshot()
            .await
            .records()
            .into_iter()
            .map(|r| r.event_id.to_string())
            .collect()
    }
}
