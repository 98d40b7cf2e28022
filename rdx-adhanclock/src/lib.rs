//! # Adhanclock
//!
//! Keeps prayer-time notifications armed across reboots, timezone changes and
//! flaky notification services.
//!
//! Rather than trusting the platform to resurrect alarms after a restart,
//! Adhanclock runs an explicit, idempotent reconcile pass every time something
//! happens that could invalidate the armed set: the device boots, a periodic
//! refresh timer fires, or the user edits their location or preferences.
//!
//! ## Core Concepts
//!
//! - **Schedule window**: the prayer events of the next few days, each resolved
//!   to an absolute instant with the timezone rules of its own date.
//! - **Armed set**: the durable record of which events have a notification
//!   waiting, checked on every pass against what the gateway really holds.
//! - **Reconcile pass**: a diff of the two that issues only the cancels and
//!   schedules needed. Running it twice in a row does nothing the second time.
//! - **Triggers**: boot, periodic refresh, preference and clock changes. Each
//!   runs one pass to completion; concurrent triggers are serialized.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use adhanclock::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AdhanConfig::default();
//!
//!     // 1. Wire the collaborators.
//!     let rescheduler = Arc::new(Rescheduler::new(
//!         Arc::new(SystemTimeSource::new(config.engine.timezone)),
//!         Arc::new(TimetableProvider::from_config(&config.timetable)),
//!         Arc::new(JsonFileScheduleStore::new(&config.store.path)),
//!         Arc::new(MemoryGateway::new()),
//!     ));
//!     let settings = Arc::new(StaticConfigStore::new(
//!         Some(Location::new("Mecca", 21.4225, 39.8262, chrono_tz::Asia::Riyadh)),
//!         Preferences::default(),
//!     ));
//!
//!     // 2. Create the engine and watch its passes.
//!     let engine = AdhanEngine::new(config.engine.clone(), rescheduler, settings);
//!     let mut events = engine.subscribe_events();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("{:?}", event);
//!         }
//!     });
//!
//!     // 3. Run until Ctrl+C. A boot pass runs immediately.
//!     engine.run().await?;
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Adhan Engine";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod gateway;
pub mod provider;
pub mod store;
pub mod time;

/// A prelude module for easy importing of the most common Adhanclock types.
pub mod prelude {
    pub use crate::common::{EventId, NotificationHandle, Prayer};
    pub use crate::components::rescheduler::{ReconcileResult, Rescheduler};
    pub use crate::config::{
        AdhanConfig, ConfigStore, FileConfigStore, Location, Preferences, StaticConfigStore,
    };
    pub use crate::engine::AdhanEngine;
    pub use crate::error::RescheduleError;
    pub use crate::events::{EngineEvent, PrayerEvent, TriggerKind};
    pub use crate::gateway::{MemoryGateway, NotificationGateway};
    pub use crate::provider::{PrayerTimeProvider, TimetableProvider};
    pub use crate::store::{JsonFileScheduleStore, MemoryScheduleStore, ScheduleStore};
    pub use crate::time::{ManualTimeSource, SystemTimeSource, TimeSource};
}
