//! The notification subsystem seam.
//!
//! The OS notification centre is consumed through `NotificationGateway`.
//! `MemoryGateway` is a self-contained notification centre used by the dev
//! binary, the shell and the tests; it can simulate outages, per-event
//! rejections and the OS silently dropping pending notifications.

use crate::common::{EventId, NotificationHandle};
use crate::error::GatewayError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;

/// Schedules, cancels and lists pending notifications.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Arms a notification to fire at `at`, returning its handle.
    async fn schedule(
        &self,
        event_id: &EventId,
        at: DateTime<Utc>,
        label: &str,
    ) -> Result<NotificationHandle, GatewayError>;

    /// Cancels a pending notification. Implementations report unknown handles
    /// as `GatewayError::NotFound`.
    async fn cancel(&self, handle: NotificationHandle) -> Result<(), GatewayError>;

    /// The handles of every notification still waiting to fire.
    async fn list_pending(&self) -> Result<HashSet<NotificationHandle>, GatewayError>;
}

/// A notification waiting in a `MemoryGateway`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingNotification {
    pub handle: NotificationHandle,
    pub event_id: EventId,
    pub fire_at: DateTime<Utc>,
    pub label: String,
}

/// Record of the mutating calls a `MemoryGateway` has served.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayCalls {
    pub schedules: Vec<EventId>,
    pub cancels: Vec<NotificationHandle>,
}

impl GatewayCalls {
    pub fn total(&self) -> usize {
        self.schedules.len() + self.cancels.len()
    }
}

#[derive(Debug)]
struct GatewayState {
    pending: BTreeMap<NotificationHandle, PendingNotification>,
    next_handle: u64,
    available: bool,
    rejected: HashSet<EventId>,
    calls: GatewayCalls,
}

/// An in-process notification centre.
#[derive(Debug)]
pub struct MemoryGateway {
    state: Mutex<GatewayState>,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GatewayState {
                pending: BTreeMap::new(),
                next_handle: 1,
                available: true,
                rejected: HashSet::new(),
                calls: GatewayCalls::default(),
            }),
        }
    }

    /// While unavailable every call fails with `GatewayError::Unavailable`.
    pub async fn set_available(&self, available: bool) {
        self.state.lock().await.available = available;
    }

    /// Makes every `schedule` call for `event_id` fail until cleared.
    pub async fn reject_event(&self, event_id: EventId) {
        self.state.lock().await.rejected.insert(event_id);
    }

    pub async fn clear_rejections(&self) {
        self.state.lock().await.rejected.clear();
    }

    /// Drops a pending notification without going through `cancel`, the way an
    /// OS may discard alarms across a reboot. Returns `false` if nothing was pending.
    pub async fn forget(&self, event_id: &EventId) -> bool {
        let mut state = self.state.lock().await;
        let before = state.pending.len();
        state.pending.retain(|_, n| &n.event_id != event_id);
        state.pending.len() != before
    }

    /// Removes and returns every notification due at or before `now`, in firing order.
    pub async fn deliver_due(&self, now: DateTime<Utc>) -> Vec<PendingNotification> {
        let mut state = self.state.lock().await;
        let due: Vec<NotificationHandle> = state
            .pending
            .values()
            .filter(|n| n.fire_at <= now)
            .map(|n| n.handle)
            .collect();
        let mut delivered: Vec<PendingNotification> = due
            .into_iter()
            .filter_map(|handle| state.pending.remove(&handle))
            .collect();
        delivered.sort_by_key(|n| n.fire_at);
        delivered
    }

    /// Every pending notification, in firing order.
    pub async fn pending(&self) -> Vec<PendingNotification> {
        let mut pending: Vec<PendingNotification> =
            self.state.lock().await.pending.values().cloned().collect();
        pending.sort_by_key(|n| n.fire_at);
        pending
    }

    pub async fn calls(&self) -> GatewayCalls {
        self.state.lock().await.calls.clone()
    }

    pub async fn reset_calls(&self) {
        self.state.lock().await.calls = GatewayCalls::default();
    }
}

#[async_trait]
impl NotificationGateway for MemoryGateway {
    async fn schedule(
        &self,
        event_id: &EventId,
        at: DateTime<Utc>,
        label: &str,
    ) -> Result<NotificationHandle, GatewayError> {
        let mut state = self.state.lock().await;
        state.calls.schedules.push(event_id.clone());
        if !state.available {
            return Err(GatewayError::Unavailable("notification service offline".into()));
        }
        if state.rejected.contains(event_id) {
            return Err(GatewayError::Unavailable(format!(
                "could not arm {}",
                event_id
            )));
        }
        let handle = NotificationHandle(state.next_handle);
        state.next_handle += 1;
        state.pending.insert(
            handle,
            PendingNotification {
                handle,
                event_id: event_id.clone(),
                fire_at: at,
                label: label.to_string(),
            },
        );
        debug!(%event_id, %handle, fire_at = %at, "notification armed");
        Ok(handle)
    }

    async fn cancel(&self, handle: NotificationHandle) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        state.calls.cancels.push(handle);
        if !state.available {
            return Err(GatewayError::Unavailable("notification service offline".into()));
        }
        match state.pending.remove(&handle) {
            Some(_) => {
                debug!(%handle, "notification cancelled");
                Ok(())
            }
            None => Err(GatewayError::NotFound(handle)),
        }
    }

    async fn list_pending(&self) -> Result<HashSet<NotificationHandle>, GatewayError> {
        let state = self.state.lock().await;
        if !state.available {
            return Err(GatewayError::Unavailable("notification service offline".into()));
        }
        Ok(state.pending.keys().copied().collect())
    }
}
