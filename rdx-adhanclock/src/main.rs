use adhanclock::prelude::*;
use adhanclock::ENGINE_NAME;
use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // 2. Load the configuration. The first argument overrides the default path.
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("adhan.toml"));
    let config = AdhanConfig::load(Some(&config_path))?;
    info!("Loaded configuration from {}", config_path.display());

    // 3. Wire the collaborators. Notifications go to an in-process centre
    //    that logs each one as it comes due.
    let gateway = Arc::new(MemoryGateway::new());
    let clock = Arc::new(SystemTimeSource::new(config.engine.timezone));
    let rescheduler = Arc::new(Rescheduler::new(
        clock.clone(),
        Arc::new(TimetableProvider::from_config(&config.timetable)),
        Arc::new(JsonFileScheduleStore::new(&config.store.path)),
        gateway.clone(),
    ));
    let settings: Arc<dyn ConfigStore> = Arc::from(config.config_store());

    // 4. Create the engine and attach observers.
    let engine = AdhanEngine::new(config.engine.clone(), rescheduler, settings);
    spawn_event_listener(&engine);
    spawn_delivery_loop(gateway, clock);

    // 5. Run the engine until Ctrl+C.
    info!("{} starting.", ENGINE_NAME.cyan());
    engine.run().await?;

    Ok(())
}

/// Prints every engine event as it is broadcast.
fn spawn_event_listener(engine: &AdhanEngine) {
    let mut events = engine.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                EngineEvent::ReconcileCompleted { trigger, result } => {
                    let line = format!(
                        "[{}] armed {}, cancelled {}, kept {}, failed {}",
                        trigger,
                        result.armed.len(),
                        result.cancelled.len(),
                        result.retained.len(),
                        result.partial_failures.len()
                    );
                    if result.is_partial() {
                        info!("{}", line.yellow());
                    } else {
                        info!("{}", line.green());
                    }
                }
                EngineEvent::ReconcileFailed {
                    trigger,
                    notice: Some(notice),
                    ..
                } => info!("[{}] {}", trigger, notice.red().bold()),
                other => info!("[ENGINE] => {:?}", other),
            }
        }
    });
}

/// Stands in for the OS: delivers notifications whose time has come.
fn spawn_delivery_loop(gateway: Arc<MemoryGateway>, clock: Arc<SystemTimeSource>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(15));
        loop {
            ticker.tick().await;
            for delivered in gateway.deliver_due(clock.now()).await {
                info!("{} {}", "ADHAN".magenta().bold(), delivered.label);
            }
        }
    });
}
