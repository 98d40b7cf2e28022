//! The engine that owns the trigger sources and drives the rescheduler.

use crate::components::rescheduler::{ReconcileResult, Rescheduler};
use crate::config::{ConfigStore, EngineConfig};
use crate::error::RescheduleError;
use crate::events::{EngineEvent, TriggerKind};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// The main Adhanclock engine.
///
/// It holds the rescheduler and the settings source, runs the periodic
/// refresh timer, and turns every trigger (boot, refresh, preference change,
/// clock change) into a reconcile pass. The engine is cheap to clone; every
/// clone is a handle to the same running instance.
#[derive(Clone)]
pub struct AdhanEngine {
    config: Arc<EngineConfig>,
    rescheduler: Arc<Rescheduler>,
    settings: Arc<dyn ConfigStore>,
    trigger_sender: broadcast::Sender<TriggerKind>,
    event_sender: broadcast::Sender<EngineEvent>,
}

// Core implementation block for internal logic.
impl AdhanEngine {
    /// Creates a new `AdhanEngine`.
    pub fn new(
        config: EngineConfig,
        rescheduler: Arc<Rescheduler>,
        settings: Arc<dyn ConfigStore>,
    ) -> Self {
        let (trigger_sender, _) = broadcast::channel(32);
        let (event_sender, _) = broadcast::channel(64);
        Self {
            config: Arc::new(config),
            rescheduler,
            settings,
            trigger_sender,
            event_sender,
        }
    }

    /// Runs the engine until Ctrl+C is received.
    pub async fn run(&self) -> anyhow::Result<()> {
        self.run_until(tokio::signal::ctrl_c()).await
    }

    /// Runs the engine's trigger loop until `shutdown` resolves.
    ///
    /// This method will:
    /// 1. Spawn the periodic refresh timer.
    /// 2. Spawn the dispatcher that runs a reconcile pass for every trigger.
    /// 3. Queue a boot pass if `reconcile_on_start` is set.
    /// 4. Wait for `shutdown`, then stop both tasks.
    pub async fn run_until<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = std::io::Result<()>>,
    {
        info!("AdhanEngine starting up...");
        let (shutdown_tx, _) = broadcast::channel(1);

        let refresh = tokio::spawn(refresh_loop(
            self.trigger_sender.clone(),
            self.config.refresh_interval(),
            shutdown_tx.subscribe(),
        ));

        // Subscribe before spawning so the boot trigger below cannot be missed.
        let trigger_rx = self.trigger_sender.subscribe();
        let dispatcher = self.clone();
        let dispatcher_shutdown_rx = shutdown_tx.subscribe();
        let dispatch = tokio::spawn(async move {
            dispatcher
                .dispatcher_loop(trigger_rx, dispatcher_shutdown_rx)
                .await
        });

        if self.config.reconcile_on_start {
            self.signal(TriggerKind::Boot);
        }

        info!(
            "Engine running, refreshing every {:?}. Press Ctrl+C to shut down.",
            self.config.refresh_interval()
        );
        let outcome = shutdown.await;

        info!("Shutdown signal received. Stopping trigger sources...");
        if shutdown_tx.send(()).is_err() {
            error!("Failed to send shutdown signal. Some tasks may not terminate gracefully.");
        }
        for task in [refresh, dispatch] {
            if let Err(e) = task.await {
                error!("Engine task ended abnormally: {}", e);
            }
        }
        self.event_sender.send(EngineEvent::EngineShutdown).ok();
        info!("AdhanEngine has shut down.");
        outcome.map_err(Into::into)
    }

    #[doc(hidden)]
    async fn dispatcher_loop(
        self,
        mut trigger_rx: broadcast::Receiver<TriggerKind>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        self.event_sender
            .send(EngineEvent::EngineStarted {
                timestamp: Utc::now(),
            })
            .ok();
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                received = trigger_rx.recv() => match received {
                    Ok(trigger) => {
                        self.fire(trigger).await.ok();
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("{} triggers dropped while busy; running one catch-up pass.", missed);
                        self.fire(TriggerKind::Manual).await.ok();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

// Public API implementation block.
impl AdhanEngine {
    /// Runs a reconcile pass for `trigger` to completion and returns its result.
    ///
    /// Passes are serialized by the rescheduler; a call made while another
    /// pass is running waits for it and then works from its outcome.
    pub async fn fire(&self, trigger: TriggerKind) -> Result<ReconcileResult, RescheduleError> {
        self.event_sender
            .send(EngineEvent::TriggerReceived { trigger })
            .ok();
        match self.rescheduler.run(trigger, self.settings.as_ref()).await {
            Ok(result) => {
                if result.is_partial() {
                    info!(
                        "[{}] {} event(s) left unarmed; retrying on next trigger.",
                        trigger,
                        result.partial_failures.len()
                    );
                }
                self.event_sender
                    .send(EngineEvent::ReconcileCompleted {
                        trigger,
                        result: result.clone(),
                    })
                    .ok();
                Ok(result)
            }
            Err(e) => {
                let notice = e.user_notice();
                error!("[{}] reconcile failed: {}", trigger, e);
                self.event_sender
                    .send(EngineEvent::ReconcileFailed {
                        trigger,
                        error: e.to_string(),
                        notice,
                    })
                    .ok();
                Err(e)
            }
        }
    }

    /// Queues a trigger for the running engine. Returns `false` if the engine
    /// is not running to receive it.
    pub fn signal(&self, trigger: TriggerKind) -> bool {
        self.trigger_sender.send(trigger).is_ok()
    }

    /// Queues the trigger matching an OS broadcast action, if any.
    pub fn signal_intent(&self, action: &str) -> bool {
        match TriggerKind::from_intent_action(action) {
            Some(trigger) => self.signal(trigger),
            None => {
                warn!("Ignoring unrecognised broadcast action '{}'.", action);
                false
            }
        }
    }

    pub fn rescheduler(&self) -> &Arc<Rescheduler> {
        &self.rescheduler
    }

    /// Subscribes to the `EngineEvent` stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_sender.subscribe()
    }
}

/// Sends a `PeriodicRefresh` trigger every `period`, starting one period from now.
async fn refresh_loop(
    sender: broadcast::Sender<TriggerKind>,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                sender.send(TriggerKind::PeriodicRefresh).ok();
            }
        }
    }
}
