//! Process restarts against file-backed stores: persisted timers survive, and
//! the startup sweep repairs whatever changed while no process was running.

use crate::helpers::{FakeTabs, T0, assert_one_timer_per_monitored_tab, web_tab};
use lull::alarms::FileAlarmBackend;
use lull::clock::{Clock, MINUTE_MS, ManualClock};
use lull::engine::{AlarmOutcome, Engine, EngineParts, ReconcileReport};
use lull::storage::{JsonFileStore, KeyValueStore, MemoryStore};
use lull::suspended::SuspendedPage;
use std::path::Path;
use std::sync::Arc;

struct Process {
    engine: Engine,
    report: ReconcileReport,
    alarms: Arc<FileAlarmBackend>,
}

async fn boot(dir: &Path, tabs: Arc<FakeTabs>, clock: &ManualClock) -> Process {
    boot_with_session(dir, tabs, clock, None).await
}

async fn boot_with_session(
    dir: &Path,
    tabs: Arc<FakeTabs>,
    clock: &ManualClock,
    session: Option<Arc<dyn KeyValueStore>>,
) -> Process {
    let durable: Arc<dyn KeyValueStore> =
        Arc::new(JsonFileStore::open(dir.join("store.json")).await.unwrap());
    let alarms = Arc::new(FileAlarmBackend::open(dir.join("alarms.json")).await.unwrap());
    let parts = EngineParts {
        alarms: alarms.clone(),
        session,
        durable,
        clock: Arc::new(clock.clone()),
        suspended_page: SuspendedPage::default(),
    };
    let (engine, report) = Engine::start(tabs, parts).await;
    Process {
        engine,
        report,
        alarms,
    }
}

#[tokio::test]
async fn timers_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(T0);
    let tabs = FakeTabs::with(vec![web_tab(1, "https://a.test/")]);

    let first = boot(dir.path(), tabs.clone(), &clock).await;
    assert_eq!(first.report.timers_created, 1);
    let before = first.engine.countdown(1).await;
    drop(first);

    clock.advance_minutes(10);
    let second = boot(dir.path(), tabs.clone(), &clock).await;
    assert_eq!(second.report.timers_created, 0);
    let after = second.engine.countdown(1).await;
    assert_eq!(after.fire_at_absolute_time, before.fire_at_absolute_time);
    assert_eq!(after.remaining_ms, (20 * MINUTE_MS) as i64);

    clock.advance_minutes(20);
    assert_eq!(
        second.engine.fire_due_alarms().await,
        vec![(1, AlarmOutcome::Suspended)]
    );
}

#[tokio::test]
async fn startup_sweep_repairs_drift() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(T0);
    let tabs = FakeTabs::with(vec![
        web_tab(1, "https://keep.test/"),
        web_tab(2, "https://becomes-internal.test/"),
        web_tab(3, "https://closes.test/"),
    ]);

    let first = boot(dir.path(), tabs.clone(), &clock).await;
    assert_eq!(first.report.timers_created, 3);
    first.engine.report_form_status(3, true).await;
    drop(first);

    // While no process runs: tab 2 navigates to an internal page, tab 3
    // closes, tab 4 opens.
    tabs.put(web_tab(2, "chrome://settings"));
    tabs.drop_tab(3);
    tabs.put(web_tab(4, "https://opened.test/"));

    clock.advance_minutes(5);
    let second = boot(dir.path(), tabs.clone(), &clock).await;
    assert_eq!(
        second.report,
        ReconcileReport {
            live_tabs: 3,
            timers_created: 1,
            timers_cancelled: 2,
            activity_purged: 1,
            form_status_purged: 1,
        }
    );
    assert_one_timer_per_monitored_tab(&second.engine, tabs.as_ref(), second.alarms.as_ref())
        .await;

    let rerun = second.engine.reconcile().await.unwrap();
    assert_eq!(rerun.timers_created + rerun.timers_cancelled, 0);
    assert_eq!(rerun.activity_purged + rerun.form_status_purged, 0);
}

#[tokio::test]
async fn overdue_alarm_fires_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(T0);
    let tabs = FakeTabs::with(vec![web_tab(1, "https://a.test/")]);
    drop(boot(dir.path(), tabs.clone(), &clock).await);

    clock.advance_minutes(90);
    let second = boot(dir.path(), tabs.clone(), &clock).await;
    assert_eq!(second.report.timers_created, 0);
    assert_eq!(
        second.engine.fire_due_alarms().await,
        vec![(1, AlarmOutcome::Suspended)]
    );
    assert_one_timer_per_monitored_tab(&second.engine, tabs.as_ref(), second.alarms.as_ref())
        .await;
}

#[tokio::test]
async fn session_activity_lost_on_restart_still_defers_old_timer() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(T0);
    let tabs = FakeTabs::with(vec![web_tab(1, "https://reading.test/")]);

    let first = boot_with_session(
        dir.path(),
        tabs.clone(),
        &clock,
        Some(Arc::new(MemoryStore::new())),
    )
    .await;
    clock.advance_minutes(25);
    first.engine.report_activity(1, None).await;
    drop(first);

    clock.advance_minutes(1);
    let second = boot_with_session(
        dir.path(),
        tabs.clone(),
        &clock,
        Some(Arc::new(MemoryStore::new())),
    )
    .await;
    assert_eq!(second.report.timers_created, 0);
    assert_eq!(second.engine.activity().get(1).await, Some(clock.now_ms()));

    clock.advance_minutes(4);
    assert_eq!(
        second.engine.fire_due_alarms().await,
        vec![(1, AlarmOutcome::Stale)]
    );
    assert!(!tabs.url_of(1).starts_with(SuspendedPage::default().base()));
    assert_one_timer_per_monitored_tab(&second.engine, tabs.as_ref(), second.alarms.as_ref())
        .await;
}
