//! Error types for the rescheduling service.
//!
//! Each collaborator has its own error enum. `RescheduleError` is what a
//! reconcile pass surfaces to its trigger source when the pass as a whole
//! cannot complete; per-event gateway failures never reach it and are
//! reported inside the `ReconcileResult` instead.

use crate::common::NotificationHandle;
use std::path::PathBuf;
use thiserror::Error;

/// Notice shown to the user when times cannot be computed for their settings.
pub const LOCATION_NOTICE: &str = "unable to schedule prayer times: check location settings";

/// Failures of the prayer-time calculation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("invalid coordinates ({latitude}, {longitude})")]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    #[error("no prayer times available for {date}")]
    NoTimes { date: chrono::NaiveDate },

    #[error("inconsistent prayer times: {0}")]
    Inconsistent(String),
}

/// Failures reported by the notification gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The notification subsystem could not be reached. Retried on the next trigger.
    #[error("notification gateway unavailable: {0}")]
    Unavailable(String),

    /// The handle is not known to the gateway. Never treated as a failure of cancel.
    #[error("notification {0} not found")]
    NotFound(NotificationHandle),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Failures reading or writing the armed set.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to access schedule store at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schedule store at {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("schedule store unavailable: {0}")]
    Unavailable(String),
}

/// Failures reading configuration or saved user settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Hard failure of a whole reconcile pass.
#[derive(Error, Debug)]
pub enum RescheduleError {
    #[error("prayer time calculation failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("schedule store failure: {0}")]
    Store(#[from] StoreError),

    #[error("settings could not be read: {0}")]
    Config(#[from] ConfigError),
}

impl RescheduleError {
    /// The actionable notice to show the user, if this failure warrants one.
    ///
    /// Store failures stay silent: the previous schedule is still armed and the
    /// next trigger retries.
    pub fn user_notice(&self) -> Option<&'static str> {
        match self {
            RescheduleError::Provider(_) | RescheduleError::Config(_) => Some(LOCATION_NOTICE),
            RescheduleError::Store(_) => None,
        }
    }
}
