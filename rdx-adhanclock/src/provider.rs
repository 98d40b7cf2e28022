//! The prayer-time calculation seam.
//!
//! Astronomical calculation is not done here. A provider answers, for one
//! prayer day and location, the local wall-clock time of each prayer; turning
//! those into absolute instants is left to the schedule window so that each
//! day is resolved against its own timezone rules.

use crate::common::Prayer;
use crate::config::{Location, TimetableConfig};
use crate::error::ProviderError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;

/// A prayer at a local wall-clock time.
///
/// `local` is a full date-time so that a prayer belonging to one day may fall
/// after midnight (late Isha at high latitudes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrayerTime {
    pub prayer: Prayer,
    pub local: NaiveDateTime,
}

/// Computes the prayer times of a day for a location.
///
/// Implementations must be pure: the same date and location always give the
/// same answer.
pub trait PrayerTimeProvider: Send + Sync {
    fn compute_times(
        &self,
        date: NaiveDate,
        location: &Location,
    ) -> Result<Vec<PrayerTime>, ProviderError>;
}

/// Serves the same fixed wall-clock times every day.
#[derive(Debug, Clone, PartialEq)]
pub struct TimetableProvider {
    times: BTreeMap<Prayer, NaiveTime>,
}

impl TimetableProvider {
    pub fn new(times: impl IntoIterator<Item = (Prayer, NaiveTime)>) -> Self {
        Self {
            times: times.into_iter().collect(),
        }
    }

    pub fn from_config(config: &TimetableConfig) -> Self {
        Self::new(config.entries())
    }
}

impl PrayerTimeProvider for TimetableProvider {
    fn compute_times(
        &self,
        date: NaiveDate,
        location: &Location,
    ) -> Result<Vec<PrayerTime>, ProviderError> {
        if !location.has_valid_coordinates() {
            return Err(ProviderError::InvalidCoordinates {
                latitude: location.latitude,
                longitude: location.longitude,
            });
        }
        if self.times.is_empty() {
            return Err(ProviderError::NoTimes { date });
        }
        Ok(self
            .times
            .iter()
            .map(|(&prayer, &time)| PrayerTime {
                prayer,
                local: date.and_time(time),
            })
            .collect())
    }
}
