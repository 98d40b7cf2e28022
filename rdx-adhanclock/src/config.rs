//! Defines all configuration structures for the Adhanclock service.
//!
//! These structs are deserialized from a TOML file (plus `ADHAN__*`
//! environment overrides) through the `config` crate. `AdhanConfig` covers how
//! the service runs; the user's saved location and notification preferences
//! are read through a `ConfigStore` on every trigger so that edits take effect
//! on the next reconcile pass.

use crate::common::Prayer;
use crate::error::ConfigError;
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

/// The top-level configuration for the service.
#[derive(Debug, Clone, Deserialize)]
pub struct AdhanConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub store: StoreConfig,

    /// Wall-clock prayer times used by the built-in `TimetableProvider`.
    #[serde(default)]
    pub timetable: TimetableConfig,

    /// A location baked into the service config. Ignored when `settings_path` is set.
    #[serde(default)]
    pub location: Option<Location>,

    #[serde(default)]
    pub preferences: Preferences,

    /// A user settings file holding `[location]` and `[preferences]`, re-read on every trigger.
    #[serde(default)]
    pub settings_path: Option<PathBuf>,
}

/// Settings for the trigger sources owned by the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Seconds between periodic refresh triggers.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Run a boot-triggered reconcile as soon as the engine starts.
    #[serde(default = "default_true")]
    pub reconcile_on_start: bool,

    /// The device timezone, used when a saved location carries none.
    /// Uses the IANA Time Zone Database names (e.g., "Asia/Riyadh").
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
}

/// Where the armed set is persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

/// Fixed wall-clock time for each prayer, e.g. a mosque's printed timetable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimetableConfig {
    #[serde(default)]
    pub fajr: Option<NaiveTime>,
    #[serde(default)]
    pub sunrise: Option<NaiveTime>,
    #[serde(default)]
    pub dhuhr: Option<NaiveTime>,
    #[serde(default)]
    pub asr: Option<NaiveTime>,
    #[serde(default)]
    pub maghrib: Option<NaiveTime>,
    #[serde(default)]
    pub isha: Option<NaiveTime>,
}

impl TimetableConfig {
    /// The configured times keyed by prayer.
    pub fn entries(&self) -> BTreeMap<Prayer, NaiveTime> {
        [
            (Prayer::Fajr, self.fajr),
            (Prayer::Sunrise, self.sunrise),
            (Prayer::Dhuhr, self.dhuhr),
            (Prayer::Asr, self.asr),
            (Prayer::Maghrib, self.maghrib),
            (Prayer::Isha, self.isha),
        ]
        .into_iter()
        .filter_map(|(prayer, time)| time.map(|t| (prayer, t)))
        .collect()
    }
}

/// The user's saved location.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Falls back to the device timezone when absent.
    #[serde(default)]
    pub timezone: Option<Tz>,
}

impl Location {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64, timezone: Tz) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            timezone: Some(timezone),
        }
    }

    pub fn timezone_or(&self, fallback: Tz) -> Tz {
        self.timezone.unwrap_or(fallback)
    }

    pub fn has_valid_coordinates(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// The user's notification preferences.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Preferences {
    /// How far in the past an event may be and still be armed, to absorb boot delay.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,

    /// Number of days, starting today, for which notifications are armed.
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,

    /// Prayers that produce a notification.
    #[serde(default = "default_enabled_prayers")]
    pub enabled: BTreeSet<Prayer>,
}

impl Preferences {
    /// The grace window, capped at one day.
    pub fn grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.grace_secs.min(86_400) as i64)
    }

    /// The horizon in days, never less than one.
    pub fn horizon(&self) -> u32 {
        self.horizon_days.max(1)
    }

    pub fn is_enabled(&self, prayer: Prayer) -> bool {
        self.enabled.contains(&prayer)
    }
}

/// A snapshot of the user settings held by a `ConfigStore`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub preferences: Preferences,
}

/// Read-only access to the user's saved location and preferences.
pub trait ConfigStore: Send + Sync {
    /// The saved location, or `None` when the user has not configured one.
    fn location(&self) -> Result<Option<Location>, ConfigError>;

    fn preferences(&self) -> Result<Preferences, ConfigError>;
}

/// Settings held in memory; the embedding application updates them in place.
#[derive(Debug, Default)]
pub struct StaticConfigStore {
    settings: RwLock<Settings>,
}

impl StaticConfigStore {
    pub fn new(location: Option<Location>, preferences: Preferences) -> Self {
        Self {
            settings: RwLock::new(Settings {
                location,
                preferences,
            }),
        }
    }

    pub fn set_location(&self, location: Option<Location>) {
        self.settings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .location = location;
    }

    pub fn update_location(&self, update: impl FnOnce(&mut Location)) -> bool {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        match settings.location.as_mut() {
            Some(location) => {
                update(location);
                true
            }
            None => false,
        }
    }

    pub fn update_preferences(&self, update: impl FnOnce(&mut Preferences)) {
        update(
            &mut self
                .settings
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .preferences,
        );
    }
}

impl ConfigStore for StaticConfigStore {
    fn location(&self) -> Result<Option<Location>, ConfigError> {
        Ok(self
            .settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .location
            .clone())
    }

    fn preferences(&self) -> Result<Preferences, ConfigError> {
        Ok(self
            .settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .preferences
            .clone())
    }
}

/// Settings read from a TOML file on every access. A missing file means no
/// location has been saved yet.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> Result<Settings, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(self.path.as_path()).required(false))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}

impl ConfigStore for FileConfigStore {
    fn location(&self) -> Result<Option<Location>, ConfigError> {
        Ok(self.read()?.location)
    }

    fn preferences(&self) -> Result<Preferences, ConfigError> {
        Ok(self.read()?.preferences)
    }
}

impl AdhanConfig {
    /// Loads the configuration from an optional TOML file, layering
    /// `ADHAN__SECTION__KEY` environment variables on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let loaded: AdhanConfig = builder
            .add_source(
                config::Environment::with_prefix("ADHAN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.refresh_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "engine.refresh_interval_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.timetable.entries().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "timetable".to_string(),
                message: "at least one prayer time is required".to_string(),
            });
        }
        Ok(())
    }

    /// The user settings source this configuration points at.
    pub fn config_store(&self) -> Box<dyn ConfigStore> {
        match &self.settings_path {
            Some(path) => Box::new(FileConfigStore::new(path.clone())),
            None => Box::new(StaticConfigStore::new(
                self.location.clone(),
                self.preferences.clone(),
            )),
        }
    }
}

impl EngineConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

// --- Default value functions for serde ---

fn default_refresh_interval_secs() -> u64 {
    6 * 60 * 60
}

fn default_true() -> bool {
    true
}

fn default_timezone() -> Tz {
    Tz::UTC
}

fn default_store_path() -> PathBuf {
    PathBuf::from("adhan-armed.json")
}

fn default_grace_secs() -> u64 {
    120
}

fn default_horizon_days() -> u32 {
    2
}

fn default_enabled_prayers() -> BTreeSet<Prayer> {
    [
        Prayer::Fajr,
        Prayer::Dhuhr,
        Prayer::Asr,
        Prayer::Maghrib,
        Prayer::Isha,
    ]
    .into_iter()
    .collect()
}


impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            reconcile_on_start: default_true(),
            timezone: default_timezone(),
        }
    }
}

impl Default for TimetableConfig {
    fn default() -> Self {
        Self {
            fajr: NaiveTime::from_hms_opt(5, 0, 0),
            sunrise: NaiveTime::from_hms_opt(6, 20, 0),
            dhuhr: NaiveTime::from_hms_opt(12, 15, 0),
            asr: NaiveTime::from_hms_opt(15, 30, 0),
            maghrib: NaiveTime::from_hms_opt(18, 5, 0),
            isha: NaiveTime::from_hms_opt(19, 30, 0),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            grace_secs: default_grace_secs(),
            horizon_days: default_horizon_days(),
            enabled: default_enabled_prayers(),
        }
    }
}

impl Default for AdhanConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            store: StoreConfig::default(),
            timetable: TimetableConfig::default(),
            location: None,
            preferences: Preferences::default(),
            settings_path: None,
        }
    }
}
