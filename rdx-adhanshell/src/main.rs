use adhanclock::config::EngineConfig;
use adhanclock::prelude::*;
use adhanclock::{ENGINE_NAME, VERSION as LIB_VERSION};
use anyhow::Result;
use chrono::Utc;
use chrono_tz::Tz;
use colored::Colorize;
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct ShellHighlighter;

impl Highlighter for ShellHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            Cow::Owned(format!("{} {}", command.yellow().bold(), rest.yellow()))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

/// Everything the shell pokes at directly, besides the engine.
struct Sim {
    engine: AdhanEngine,
    clock: Arc<ManualTimeSource>,
    gateway: Arc<MemoryGateway>,
    settings: Arc<StaticConfigStore>,
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    // Embedded at compile time from the crate root.
    const LOGO_TEXT: &str = include_str!("../logo.log");
    println!("{}", LOGO_TEXT.cyan());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!("{}", "-".repeat(72).dimmed());
    println!("{}", version_string);
    println!(
        "{}",
        "    The clock is simulated: it only moves with 'advance'.".dimmed()
    );
    println!("{}", "-".repeat(72).dimmed());
}

/// Prints every engine event the background loop produces.
fn spawn_event_listener(engine: &AdhanEngine) {
    let mut events = engine.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                EngineEvent::ReconcileFailed {
                    trigger,
                    notice: Some(notice),
                    ..
                } => println!("\n<-- [{}] {}\n>> ", trigger, notice.red().bold()),
                EngineEvent::ReconcileFailed { trigger, error, .. } => {
                    println!("\n<-- [{}] pass failed: {}\n>> ", trigger, error.red())
                }
                EngineEvent::EngineStarted { .. } | EngineEvent::EngineShutdown => {
                    println!("\n<-- [SYSTEM EVENT] {:?}\n>> ", event)
                }
                _ => {}
            }
        }
    });
}

fn print_result(result: &ReconcileResult) {
    if let Some(reason) = result.skipped {
        println!("--> Nothing scheduled ({:?}). Use 'set location <LAT> <LON>'.", reason);
        return;
    }
    println!(
        "--> window {}, armed {}, cancelled {}, kept {}, drifted {}, fired {}",
        result.window_len,
        result.armed.len().to_string().green(),
        result.cancelled.len().to_string().yellow(),
        result.retained.len(),
        result.drifted.len(),
        result.fired.len()
    );
    for id in &result.armed {
        println!("    + {}", id.to_string().green());
    }
    for id in &result.cancelled {
        println!("    - {}", id.to_string().yellow());
    }
    for failure in &result.partial_failures {
        println!(
            "    ! {} ({:?}): {}",
            failure.event_id.to_string().red(),
            failure.op,
            failure.error
        );
        if let Some(handle) = failure.handle {
            println!("      notification {} may still fire", handle);
        }
    }
    if result.drift_check_skipped {
        println!("    {}", "pending list unavailable; store trusted as-is".dimmed());
    }
}

async fn fire(sim: &Sim, trigger: TriggerKind) {
    match sim.engine.fire(trigger).await {
        Ok(result) => print_result(&result),
        Err(e) => match e.user_notice() {
            Some(notice) => println!("--> {} ({})", notice.red().bold(), e),
            None => println!("--> Pass failed: {}", e.to_string().red()),
        },
    }
}

async fn handle_set(sim: &Sim, args: &[&str]) {
    match args {
        ["grace", secs] => match secs.parse::<u64>() {
            Ok(secs) => sim.settings.update_preferences(|p| p.grace_secs = secs),
            Err(_) => return println!("Error: '{}' is not a number of seconds.", secs),
        },
        ["horizon", days] => match days.parse::<u32>() {
            Ok(days) => sim.settings.update_preferences(|p| p.horizon_days = days),
            Err(_) => return println!("Error: '{}' is not a number of days.", days),
        },
        ["tz", zone] => match zone.parse::<Tz>() {
            Ok(tz) => {
                if !sim.settings.update_location(|l| l.timezone = Some(tz)) {
                    return println!("Error: set a location first.");
                }
            }
            Err(_) => return println!("Error: unknown timezone '{}'.", zone),
        },
        ["location", lat, lon] => match (lat.parse::<f64>(), lon.parse::<f64>()) {
            (Ok(lat), Ok(lon)) => {
                let tz = sim
                    .settings
                    .location()
                    .ok()
                    .flatten()
                    .and_then(|l| l.timezone)
                    .unwrap_or(sim.clock.timezone());
                sim.settings
                    .set_location(Some(Location::new("", lat, lon, tz)));
            }
            _ => return println!("Error: coordinates must be numbers."),
        },
        _ => return println!("Usage: set grace <S> | set horizon <D> | set tz <ZONE> | set location <LAT> <LON>"),
    }
    fire(sim, TriggerKind::PreferenceChanged).await;
}

async fn toggle_prayer(sim: &Sim, name: Option<&&str>, enable: bool) {
    let Some(name) = name else {
        return println!("Usage: enable|disable <PRAYER>");
    };
    match name.parse::<Prayer>() {
        Ok(prayer) => {
            sim.settings.update_preferences(|p| {
                if enable {
                    p.enabled.insert(prayer);
                } else {
                    p.enabled.remove(&prayer);
                }
            });
            fire(sim, TriggerKind::PreferenceChanged).await;
        }
        Err(e) => println!("Error: {}.", e),
    }
}

async fn advance(sim: &Sim, minutes: Option<&&str>) {
    let Some(Ok(minutes)) = minutes.map(|m| m.parse::<i64>()) else {
        return println!("Usage: advance <MINUTES>");
    };
    let now = sim.clock.advance(chrono::Duration::minutes(minutes));
    println!("--> Clock is now {}", now.with_timezone(&sim.clock.timezone()));
    for delivered in sim.gateway.deliver_due(now).await {
        println!(
            "<-- {} {} ({})",
            "ADHAN".magenta().bold(),
            delivered.label,
            delivered.event_id
        );
    }
}

async fn print_status(sim: &Sim) {
    let rescheduler = sim.engine.rescheduler();
    let clock = rescheduler.clock();
    println!("Clock: {}", clock.now().with_timezone(&clock.timezone()));
    let records = match rescheduler.store().load().await {
        Ok(set) => set.records(),
        Err(e) => return println!("Error: {}.", e),
    };
    println!("Armed ({}):", records.len());
    for record in records {
        println!(
            "  {:<22} {:<6} fires {}",
            record.event_id.to_string(),
            record.handle.to_string(),
            record.scheduled_for
        );
    }
}

async fn print_pending(sim: &Sim) {
    let pending = sim.gateway.pending().await;
    println!("Pending in gateway ({}):", pending.len());
    for n in pending {
        println!("  {:<6} {:<22} {}", n.handle.to_string(), n.event_id.to_string(), n.fire_at);
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  boot | refresh            - Runs a pass as that trigger would.");
    println!("  intent <ACTION>           - Delivers an OS broadcast action to the engine.");
    println!("  set grace <S>             - Grace window in seconds, then re-plans.");
    println!("  set horizon <D>           - Days to keep armed, then re-plans.");
    println!("  set tz <ZONE>             - Location timezone (IANA name), then re-plans.");
    println!("  set location <LAT> <LON>  - Saves a location, then re-plans.");
    println!("  clear location            - Forgets the saved location.");
    println!("  enable|disable <PRAYER>   - Toggles a prayer's notification.");
    println!("  advance <M>               - Moves the clock M minutes and delivers due notifications.");
    println!("  drop <EVENT-ID>           - Makes the gateway silently lose a notification.");
    println!("  outage on|off             - Takes the notification gateway down or up.");
    println!("  status                    - Shows the armed set.");
    println!("  pending                   - Shows what the gateway holds.");
    println!("  exit                      - Quits the shell.");
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let clock = Arc::new(ManualTimeSource::new(Utc::now(), chrono_tz::Asia::Riyadh));
    let gateway = Arc::new(MemoryGateway::new());
    let settings = Arc::new(StaticConfigStore::new(
        Some(Location::new("Mecca", 21.4225, 39.8262, chrono_tz::Asia::Riyadh)),
        Preferences::default(),
    ));
    let config = AdhanConfig::default();
    let rescheduler = Arc::new(Rescheduler::new(
        clock.clone(),
        Arc::new(TimetableProvider::from_config(&config.timetable)),
        Arc::new(MemoryScheduleStore::new()),
        gateway.clone(),
    ));
    let engine = AdhanEngine::new(
        EngineConfig {
            reconcile_on_start: false,
            ..config.engine
        },
        rescheduler,
        settings.clone(),
    );
    spawn_event_listener(&engine);

    info!("Spawning {} in the background...", ENGINE_NAME);
    let background = engine.clone();
    tokio::spawn(async move {
        if let Err(e) = background.run().await {
            eprintln!("\nEngine stopped with an error: {}", e);
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let sim = Sim {
        engine,
        clock,
        gateway,
        settings,
    };

    let mut rl = Editor::new()?;
    rl.set_helper(Some(ShellHighlighter));

    println!("{} is running. Type 'help' for commands or 'exit' to quit.", ENGINE_NAME.cyan());

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(_) => {
                println!("Exiting adhanshell...");
                break;
            }
        };
        rl.add_history_entry(line.as_str())?;
        let args = line.split_whitespace().collect::<Vec<_>>();
        let Some(command) = args.first() else {
            continue;
        };

        match *command {
            "boot" => fire(&sim, TriggerKind::Boot).await,
            "refresh" => fire(&sim, TriggerKind::PeriodicRefresh).await,
            "intent" => match args.get(1) {
                Some(action) => {
                    if sim.engine.signal_intent(action) {
                        println!("--> Delivered '{}' to the engine.", action);
                    } else {
                        println!("--> Not a trigger the engine knows.");
                    }
                }
                None => println!("Usage: intent <ACTION>"),
            },
            "set" => handle_set(&sim, &args[1..]).await,
            "clear" => {
                if let Some(&"location") = args.get(1) {
                    sim.settings.set_location(None);
                    fire(&sim, TriggerKind::PreferenceChanged).await;
                } else {
                    println!("Unknown 'clear' command. Try 'clear location'.");
                }
            }
            "enable" => toggle_prayer(&sim, args.get(1), true).await,
            "disable" => toggle_prayer(&sim, args.get(1), false).await,
            "advance" => advance(&sim, args.get(1)).await,
            "drop" => match args.get(1).map(|id| id.parse::<EventId>()) {
                Some(Ok(id)) => {
                    if sim.gateway.forget(&id).await {
                        println!("--> Gateway lost {} without telling anyone.", id);
                    } else {
                        println!("--> {} was not pending.", id);
                    }
                }
                Some(Err(e)) => println!("Error: {}.", e),
                None => println!("Usage: drop <EVENT-ID>"),
            },
            "outage" => match args.get(1) {
                Some(&"on") => {
                    sim.gateway.set_available(false).await;
                    println!("--> Notification gateway is down.");
                }
                Some(&"off") => {
                    sim.gateway.set_available(true).await;
                    println!("--> Notification gateway is back.");
                }
                _ => println!("Usage: outage on|off"),
            },
            "status" => print_status(&sim).await,
            "pending" => print_pending(&sim).await,
            "help" => print_help(),
            "exit" => break,
            _ => println!("Unknown command: '{}'. Type 'help'.", line.trim()),
        }
    }

    Ok(())
}
