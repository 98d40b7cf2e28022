mod support;

use adhanclock::common::{NotificationHandle, Prayer};
use adhanclock::components::rescheduler::{GatewayOp, SkipReason};
use adhanclock::config::{Location, Preferences};
use adhanclock::error::{GatewayError, RescheduleError, LOCATION_NOTICE};
use adhanclock::time::TimeSource;
use chrono::{TimeZone, Utc};
use chrono_tz::Asia::Riyadh;
use std::collections::BTreeSet;
use support::{at, event, ids, mecca, Harness};

fn only(prayers: &[Prayer]) -> Preferences {
    Preferences {
        enabled: prayers.iter().copied().collect::<BTreeSet<_>>(),
        ..Preferences::default()
    }
}

#[tokio::test]
async fn first_pass_arms_the_whole_window() {
    let h = Harness::new(at(Riyadh, 2026, 10, 16, 10, 0));
    let result = h.reconcile(&mecca(), &Preferences::default()).await.unwrap();

    assert_eq!(
        ids(&result.armed),
        vec![
            "2026-10-16/dhuhr",
            "2026-10-16/asr",
            "2026-10-16/maghrib",
            "2026-10-16/isha",
            "2026-10-17/fajr",
            "2026-10-17/dhuhr",
            "2026-10-17/asr",
            "2026-10-17/maghrib",
            "2026-10-17/isha",
        ]
    );
    assert_eq!(result.window_len, 9);
    assert!(!result.is_partial());
    assert_eq!(h.gateway.pending().await.len(), 9);
    assert_eq!(h.stored().await, ids(&result.armed));
}

#[tokio::test]
async fn second_pass_with_unchanged_inputs_makes_no_gateway_calls() {
    let h = Harness::new(at(Riyadh, 2026, 10, 16, 10, 0));
    let prefs = Preferences::default();
    h.reconcile(&mecca(), &prefs).await.unwrap();
    h.gateway.reset_calls().await;

    let again = h.reconcile(&mecca(), &prefs).await.unwrap();

    assert_eq!(h.gateway.calls().await.total(), 0);
    assert!(again.is_noop());
    assert_eq!(again.retained.len(), 9);
}

#[tokio::test]
async fn calls_cover_exactly_the_symmetric_difference() {
    let h = Harness::new(at(Riyadh, 2026, 10, 16, 10, 0));
    h.reconcile(&mecca(), &only(&[Prayer::Fajr, Prayer::Dhuhr]))
        .await
        .unwrap();
    let fajr_handle = h
        .store
        .snapshot()
        .await
        .get(&event("2026-10-17/fajr"))
        .unwrap()
        .handle;
    h.gateway.reset_calls().await;

    let result = h
        .reconcile(&mecca(), &only(&[Prayer::Dhuhr, Prayer::Asr]))
        .await
        .unwrap();

    let calls = h.gateway.calls().await;
    assert_eq!(ids(&calls.schedules), vec!["2026-10-16/asr", "2026-10-17/asr"]);
    assert_eq!(calls.cancels, vec![fajr_handle]);
    assert_eq!(ids(&result.cancelled), vec!["2026-10-17/fajr"]);
    assert_eq!(ids(&result.retained), vec!["2026-10-16/dhuhr", "2026-10-17/dhuhr"]);
    assert_eq!(
        h.stored().await,
        vec![
            "2026-10-16/dhuhr",
            "2026-10-16/asr",
            "2026-10-17/dhuhr",
            "2026-10-17/asr"
        ]
    );
}

#[tokio::test]
async fn events_inside_the_grace_window_are_still_armed() {
    // One minute after Dhuhr; the default grace is two minutes.
    let now = at(Riyadh, 2026, 10, 16, 12, 16);
    let h = Harness::new(now);
    let prefs = Preferences::default();
    let result = h.reconcile(&mecca(), &prefs).await.unwrap();

    assert_eq!(result.armed.first(), Some(&event("2026-10-16/dhuhr")));
    for record in h.store.snapshot().await.iter() {
        assert!(record.scheduled_for > now - prefs.grace());
    }
}

#[tokio::test]
async fn past_events_are_never_armed_without_grace() {
    let now = at(Riyadh, 2026, 10, 16, 12, 16);
    let h = Harness::new(now);
    let prefs = Preferences {
        grace_secs: 0,
        ..Preferences::default()
    };
    let result = h.reconcile(&mecca(), &prefs).await.unwrap();

    assert_eq!(result.armed.first(), Some(&event("2026-10-16/asr")));
    for pending in h.gateway.pending().await {
        assert!(pending.fire_at > now);
    }
}

#[tokio::test]
async fn notification_dropped_by_the_os_is_rearmed() {
    let h = Harness::new(at(Riyadh, 2026, 10, 16, 10, 0));
    let prefs = Preferences::default();
    h.reconcile(&mecca(), &prefs).await.unwrap();
    assert!(h.gateway.forget(&event("2026-10-16/asr")).await);
    h.gateway.reset_calls().await;

    let result = h.reconcile(&mecca(), &prefs).await.unwrap();

    assert_eq!(ids(&result.drifted), vec!["2026-10-16/asr"]);
    assert_eq!(ids(&result.armed), vec!["2026-10-16/asr"]);
    assert!(result.cancelled.is_empty());
    let calls = h.gateway.calls().await;
    assert_eq!(ids(&calls.schedules), vec!["2026-10-16/asr"]);
    assert!(calls.cancels.is_empty());
    assert_eq!(h.gateway.pending().await.len(), 9);
}

#[tokio::test]
async fn event_on_a_dst_change_uses_that_days_offset() {
    let new_york = Location::new("New York", 40.71, -74.0, chrono_tz::America::New_York);
    // Saturday noon, still on EST (UTC-5). Clocks spring forward overnight.
    let now = Utc.with_ymd_and_hms(2026, 3, 7, 17, 0, 0).unwrap();
    let h = Harness::with_provider(
        now,
        adhanclock::provider::TimetableProvider::new([(Prayer::Fajr, support::hm(5, 30))]),
    );

    let result = h.reconcile(&new_york, &Preferences::default()).await.unwrap();

    assert_eq!(ids(&result.armed), vec!["2026-03-08/fajr"]);
    let record = h
        .store
        .snapshot()
        .await
        .get(&event("2026-03-08/fajr"))
        .cloned()
        .unwrap();
    // 05:30 EDT (UTC-4), not 05:30 EST.
    assert_eq!(
        record.scheduled_for,
        Utc.with_ymd_and_hms(2026, 3, 8, 9, 30, 0).unwrap()
    );
}

#[tokio::test]
async fn a_failed_arm_leaves_only_that_event_unarmed() {
    let h = Harness::new(at(Riyadh, 2026, 10, 16, 0, 30));
    let prefs = Preferences {
        horizon_days: 1,
        ..Preferences::default()
    };
    h.gateway.reject_event(event("2026-10-16/asr")).await;

    let result = h.reconcile(&mecca(), &prefs).await.unwrap();

    assert!(result.is_partial());
    assert_eq!(
        ids(&result.armed),
        vec![
            "2026-10-16/fajr",
            "2026-10-16/dhuhr",
            "2026-10-16/maghrib",
            "2026-10-16/isha"
        ]
    );
    assert_eq!(result.partial_failures.len(), 1);
    assert_eq!(result.partial_failures[0].event_id, event("2026-10-16/asr"));
    assert_eq!(result.partial_failures[0].op, GatewayOp::Arm);
    assert_eq!(h.stored().await, ids(&result.armed));

    // The next trigger retries just the missing event.
    h.gateway.clear_rejections().await;
    h.gateway.reset_calls().await;
    let retry = h.reconcile(&mecca(), &prefs).await.unwrap();
    assert_eq!(ids(&retry.armed), vec!["2026-10-16/asr"]);
    assert_eq!(h.gateway.calls().await.total(), 1);
}

#[tokio::test]
async fn no_saved_location_is_a_noop() {
    let h = Harness::new(at(Riyadh, 2026, 10, 16, 10, 0));
    let result = h
        .rescheduler
        .reconcile(h.clock.now(), None, &Preferences::default())
        .await
        .unwrap();

    assert_eq!(result.skipped, Some(SkipReason::NoLocation));
    assert_eq!(h.gateway.calls().await.total(), 0);
    assert!(h.store.snapshot().await.is_empty());
}

#[tokio::test]
async fn provider_failure_aborts_and_keeps_the_store() {
    let h = Harness::new(at(Riyadh, 2026, 10, 16, 10, 0));
    let prefs = Preferences::default();
    h.reconcile(&mecca(), &prefs).await.unwrap();
    h.gateway.reset_calls().await;

    let mut nowhere = mecca();
    nowhere.latitude = 120.0;
    let err = h.reconcile(&nowhere, &prefs).await.unwrap_err();

    assert!(matches!(err, RescheduleError::Provider(_)));
    assert_eq!(err.user_notice(), Some(LOCATION_NOTICE));
    assert_eq!(h.gateway.calls().await.total(), 0);
    assert_eq!(h.store.snapshot().await.len(), 9);
    assert_eq!(h.gateway.pending().await.len(), 9);
}

#[tokio::test]
async fn unreadable_store_is_fatal_and_leaves_notifications_armed() {
    let h = Harness::new(at(Riyadh, 2026, 10, 16, 10, 0));
    let prefs = Preferences::default();
    h.reconcile(&mecca(), &prefs).await.unwrap();
    h.gateway.reset_calls().await;
    h.store.set_fail_reads(true);

    let err = h.reconcile(&mecca(), &prefs).await.unwrap_err();

    assert!(matches!(err, RescheduleError::Store(_)));
    assert_eq!(err.user_notice(), None);
    assert_eq!(h.gateway.calls().await.total(), 0);
    assert_eq!(h.gateway.pending().await.len(), 9);
}

#[tokio::test]
async fn unrecordable_arm_is_withdrawn_from_the_gateway() {
    let h = Harness::new(at(Riyadh, 2026, 10, 16, 10, 0));
    h.store.set_fail_writes(true);

    let err = h
        .reconcile(&mecca(), &Preferences::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RescheduleError::Store(_)));
    assert!(h.gateway.pending().await.is_empty());
    assert_eq!(h.gateway.calls().await.cancels, vec![NotificationHandle(1)]);
}

#[tokio::test]
async fn gateway_outage_is_a_partial_result_not_an_error() {
    let h = Harness::new(at(Riyadh, 2026, 10, 16, 10, 0));
    h.gateway.set_available(false).await;

    let result = h.reconcile(&mecca(), &Preferences::default()).await.unwrap();

    assert!(result.drift_check_skipped);
    assert_eq!(result.partial_failures.len(), 9);
    assert!(result
        .partial_failures
        .iter()
        .all(|f| matches!(f.error, GatewayError::Unavailable(_))));
    assert!(h.store.snapshot().await.is_empty());

    h.gateway.set_available(true).await;
    let recovered = h.reconcile(&mecca(), &Preferences::default()).await.unwrap();
    assert_eq!(recovered.armed.len(), 9);
}

#[tokio::test]
async fn failed_cancel_still_forgets_the_event() {
    let h = Harness::new(at(Riyadh, 2026, 10, 16, 10, 0));
    h.reconcile(&mecca(), &only(&[Prayer::Fajr])).await.unwrap();
    h.gateway.set_available(false).await;

    let result = h.reconcile(&mecca(), &only(&[])).await.unwrap();

    assert_eq!(ids(&result.cancelled), vec!["2026-10-17/fajr"]);
    assert_eq!(result.partial_failures[0].op, GatewayOp::Cancel);
    assert_eq!(result.partial_failures[0].handle, Some(NotificationHandle(1)));
    assert!(h.store.snapshot().await.is_empty());
}

#[tokio::test]
async fn timezone_change_retimes_every_event() {
    let h = Harness::new(at(Riyadh, 2026, 10, 16, 10, 0));
    let prefs = Preferences::default();
    h.reconcile(&mecca(), &prefs).await.unwrap();

    let mut moved = mecca();
    moved.timezone = Some(chrono_tz::Asia::Karachi);
    let result = h.reconcile(&moved, &prefs).await.unwrap();

    assert_eq!(result.cancelled.len(), 9);
    assert_eq!(result.armed.len(), 9);
    assert!(result.retained.is_empty());
    let dhuhr = h
        .store
        .snapshot()
        .await
        .get(&event("2026-10-16/dhuhr"))
        .cloned()
        .unwrap();
    assert_eq!(
        dhuhr.scheduled_for,
        at(chrono_tz::Asia::Karachi, 2026, 10, 16, 12, 15)
    );
    assert_eq!(h.gateway.pending().await.len(), 9);
}

#[tokio::test]
async fn fired_notifications_leave_the_store_on_the_next_pass() {
    let h = Harness::new(at(Riyadh, 2026, 10, 16, 10, 0));
    let prefs = Preferences::default();
    h.reconcile(&mecca(), &prefs).await.unwrap();

    let later = h.clock.advance(chrono::Duration::hours(6));
    let delivered = h.gateway.deliver_due(later).await;
    assert_eq!(delivered.len(), 2);

    let result = h.reconcile(&mecca(), &prefs).await.unwrap();
    assert!(!h.stored().await.contains(&"2026-10-16/dhuhr".to_string()));
    assert!(!h.stored().await.contains(&"2026-10-16/asr".to_string()));
    assert_eq!(h.gateway.calls().await.cancels.len(), 0);
    assert_eq!(ids(&result.fired), vec!["2026-10-16/dhuhr", "2026-10-16/asr"]);
    assert!(result.drifted.is_empty());
    assert!(result.armed.is_empty());
}

#[tokio::test]
async fn fired_notification_is_not_replayed_inside_the_grace_window() {
    let h = Harness::new(at(Riyadh, 2026, 10, 16, 12, 0));
    let prefs = Preferences::default();
    h.reconcile(&mecca(), &prefs).await.unwrap();

    let fired_at = h.clock.advance(chrono::Duration::minutes(15));
    let delivered = h.gateway.deliver_due(fired_at).await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].event_id, event("2026-10-16/dhuhr"));
    h.gateway.reset_calls().await;

    // Two triggers land while Dhuhr is still inside the grace window.
    for _ in 0..2 {
        let now = h.clock.advance(chrono::Duration::seconds(30));
        let result = h.reconcile(&mecca(), &prefs).await.unwrap();
        assert_eq!(ids(&result.fired), vec!["2026-10-16/dhuhr"]);
        assert!(result.drifted.is_empty());
        assert!(result.armed.is_empty());
        assert!(!ids(&result.retained).contains(&"2026-10-16/dhuhr".to_string()));
        assert!(h.gateway.deliver_due(now).await.is_empty());
    }
    assert_eq!(h.gateway.calls().await.total(), 0);

    // Once Dhuhr leaves the window its record is retired without a cancel.
    h.clock.advance(chrono::Duration::minutes(5));
    let result = h.reconcile(&mecca(), &prefs).await.unwrap();
    assert_eq!(ids(&result.fired), vec!["2026-10-16/dhuhr"]);
    assert!(result.armed.is_empty());
    assert!(!h.stored().await.contains(&"2026-10-16/dhuhr".to_string()));
    assert_eq!(h.gateway.calls().await.total(), 0);
    assert_eq!(h.gateway.pending().await.len(), 8);
}

#[tokio::test]
async fn notification_dropped_before_its_time_is_still_rearmed() {
    let h = Harness::new(at(Riyadh, 2026, 10, 16, 12, 0));
    let prefs = Preferences::default();
    h.reconcile(&mecca(), &prefs).await.unwrap();
    assert!(h.gateway.forget(&event("2026-10-16/dhuhr")).await);

    h.clock.advance(chrono::Duration::minutes(10));
    let result = h.reconcile(&mecca(), &prefs).await.unwrap();

    assert_eq!(ids(&result.drifted), vec!["2026-10-16/dhuhr"]);
    assert_eq!(ids(&result.armed), vec!["2026-10-16/dhuhr"]);
    assert!(result.fired.is_empty());
}

#[tokio::test]
async fn concurrent_passes_serialize() {
    let h = Harness::new(at(Riyadh, 2026, 10, 16, 10, 0));
    let prefs = Preferences::default();
    let location = mecca();

    let (a, b) = tokio::join!(
        h.reconcile(&location, &prefs),
        h.reconcile(&location, &prefs)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.armed.len() + b.armed.len(), 9);
    assert!(a.armed.is_empty() || b.armed.is_empty());
    assert_eq!(h.gateway.calls().await.schedules.len(), 9);
    assert_eq!(h.gateway.pending().await.len(), 9);
}
