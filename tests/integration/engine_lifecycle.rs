//! Suspension state machine scenarios driven through the public engine API.

use crate::helpers::{Harness, T0, assert_one_timer_per_monitored_tab, web_tab, write_settings};
use lull::clock::{Clock, MINUTE_MS};
use lull::engine::{AlarmOutcome, RestoreOutcome, SuspendOutcome, TabState};
use lull::tab::TabChange;
use lull::{ExclusionReason, Settings};

#[tokio::test]
async fn created_tab_is_suspended_after_timeout() {
    let h = Harness::start(vec![]).await;
    let tab = lull::Tab {
        title: "Morning news".into(),
        fav_icon_url: Some("https://news.test/icon.png".into()),
        ..web_tab(1, "https://news.test/today?page=2")
    };
    h.tabs.put(tab.clone());
    h.engine.on_tab_created(&tab).await;

    let countdown = h.engine.countdown(1).await;
    assert!(!countdown.is_paused);
    assert_eq!(countdown.remaining_ms, (30 * MINUTE_MS) as i64);
    assert_eq!(countdown.fire_at_absolute_time, Some(T0 + 30 * MINUTE_MS));

    h.clock.advance_minutes(29);
    assert!(h.engine.fire_due_alarms().await.is_empty());

    h.clock.advance_minutes(1);
    let fired = h.engine.fire_due_alarms().await;
    assert_eq!(fired, vec![(1, AlarmOutcome::Suspended)]);

    let url = h.tabs.url_of(1);
    let decoded = h.page().decode(&url).expect("suspended encoding");
    assert_eq!(decoded.url, "https://news.test/today?page=2");
    assert_eq!(decoded.title, "Morning news");
    assert_eq!(decoded.favicon.as_deref(), Some("https://news.test/icon.png"));
    assert_eq!(decoded.time, T0 + 30 * MINUTE_MS);

    assert_eq!(h.engine.state_of(1).await, Some(TabState::Suspended));
    assert!(h.engine.timers().get(1).await.unwrap().is_none());
    let stats = h.engine.stats().load().await.unwrap();
    assert_eq!(stats.tabs_suspended, 1);
    assert_eq!(stats.history[0].url, "https://news.test/today?page=2");
}

#[tokio::test]
async fn recent_activity_makes_an_alarm_stale() {
    let h = Harness::start(vec![web_tab(2, "https://docs.test/")]).await;
    h.clock.advance_minutes(30);

    let now = h.clock.now_ms();
    h.engine.report_activity(2, Some(now - MINUTE_MS)).await;
    assert_eq!(h.engine.on_alarm(2).await, AlarmOutcome::Stale);
    assert!(!h.page().is_suspended_url(&h.tabs.url_of(2)));
    let rearmed = h.engine.timers().get(2).await.unwrap().expect("re-armed");
    assert_eq!(rearmed.fire_at_ms, now + 30 * MINUTE_MS);

    h.engine.report_activity(2, Some(now - 31 * MINUTE_MS)).await;
    assert_eq!(h.engine.on_alarm(2).await, AlarmOutcome::Suspended);
    assert!(h.page().is_suspended_url(&h.tabs.url_of(2)));
}

#[tokio::test]
async fn reused_id_is_not_suspended_by_old_alarm() {
    let h = Harness::start(vec![web_tab(7, "https://old.test/")]).await;
    h.clock.advance_minutes(30);

    // The old tab closes and the host hands its id to a new tab while the
    // old alarm is already in flight.
    h.tabs.drop_tab(7);
    let reborn = web_tab(7, "https://new.test/");
    h.tabs.put(reborn.clone());
    h.engine.on_tab_created(&reborn).await;

    h.clock.advance_ms(MINUTE_MS / 2);
    assert_eq!(h.engine.on_alarm(7).await, AlarmOutcome::Stale);
    assert_eq!(h.tabs.url_of(7), "https://new.test/");
    assert_eq!(h.engine.state_of(7).await, Some(TabState::Monitored));
}

#[tokio::test]
async fn suspend_all_except_reports_each_tab() {
    let mut tabs: Vec<lull::Tab> = (1..=5)
        .map(|id| web_tab(id, &format!("https://site{id}.test/")))
        .collect();
    tabs[1].pinned = true;
    tabs[3].pinned = true;
    let h = Harness::start(tabs).await;

    let results = h.engine.suspend_all_except(None).await;
    assert_eq!(results.len(), 5);
    let suspended: Vec<_> = results
        .iter()
        .filter(|r| r.outcome == SuspendOutcome::Suspended)
        .map(|r| r.tab_id)
        .collect();
    let pinned: Vec<_> = results
        .iter()
        .filter(|r| r.outcome == SuspendOutcome::Excluded(ExclusionReason::Pinned))
        .map(|r| r.tab_id)
        .collect();
    assert_eq!(suspended, vec![1, 3, 5]);
    assert_eq!(pinned, vec![2, 4]);

    assert_one_timer_per_monitored_tab(&h.engine, h.tabs.as_ref(), h.alarms.as_ref()).await;
}

#[tokio::test]
async fn suspend_all_except_keeps_the_given_tab() {
    let h = Harness::start(vec![
        web_tab(1, "https://a.test/"),
        web_tab(2, "https://b.test/"),
        web_tab(3, "chrome://settings"),
    ])
    .await;

    let results = h.engine.suspend_all_except(Some(1)).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].tab_id, 2);
    assert_eq!(h.tabs.url_of(1), "https://a.test/");
    assert_eq!(h.tabs.url_of(3), "chrome://settings");
}

#[tokio::test]
async fn restore_returns_to_original_and_rearms() {
    let h = Harness::start(vec![web_tab(4, "https://mail.test/inbox")]).await;
    assert!(h.engine.suspend(4).await.succeeded());

    h.clock.advance_minutes(5);
    assert_eq!(h.engine.restore(4).await, RestoreOutcome::Restored);
    assert_eq!(h.tabs.url_of(4), "https://mail.test/inbox");
    assert_eq!(h.engine.state_of(4).await, Some(TabState::Monitored));
    assert_eq!(h.engine.activity().get(4).await, Some(h.clock.now_ms()));

    assert_eq!(h.engine.restore(4).await, RestoreOutcome::NotSuspended);
    assert_eq!(h.engine.restore(99).await, RestoreOutcome::Gone);
}

#[tokio::test]
async fn restore_refuses_script_urls() {
    let h = Harness::start(vec![]).await;
    let forged = h.page().encode("javascript:alert(1)", "x", None, T0);
    h.tabs.put(web_tab(5, &forged));

    assert_eq!(h.engine.restore(5).await, RestoreOutcome::InvalidUrl);
    assert_eq!(h.tabs.url_of(5), forged);
    assert!(h.tabs.navigations().is_empty());
}

#[tokio::test]
async fn non_network_tabs_are_never_suspended() {
    let h = Harness::start(vec![
        web_tab(4, "ftp://files.test/readme.txt"),
        web_tab(5, "https://files.test/readme.txt"),
    ])
    .await;
    assert_eq!(h.report.timers_created, 1);
    assert_eq!(h.engine.state_of(4).await, Some(TabState::Unmonitored));

    assert_eq!(
        h.engine.suspend(4).await,
        SuspendOutcome::Excluded(ExclusionReason::SystemPage)
    );
    assert_eq!(h.tabs.url_of(4), "ftp://files.test/readme.txt");

    let bulk = h.engine.suspend_all_except(None).await;
    assert_eq!(bulk.len(), 1);
    assert_eq!(bulk[0].tab_id, 5);
    assert_eq!(h.engine.restore(5).await, RestoreOutcome::Restored);
    assert_eq!(h.tabs.url_of(5), "https://files.test/readme.txt");
}

#[tokio::test]
async fn restore_all_brings_back_every_suspended_tab() {
    let h = Harness::start(vec![
        web_tab(1, "https://a.test/"),
        web_tab(2, "https://b.test/"),
    ])
    .await;
    h.engine.suspend_all_except(None).await;

    let results = h.engine.restore_all().await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.outcome.succeeded()));
    assert_eq!(h.tabs.url_of(2), "https://b.test/");
    assert_one_timer_per_monitored_tab(&h.engine, h.tabs.as_ref(), h.alarms.as_ref()).await;
}

#[tokio::test]
async fn failed_navigation_keeps_the_tab_monitored() {
    let h = Harness::start(vec![web_tab(6, "https://flaky.test/")]).await;
    h.tabs.fail_updates(true);

    assert_eq!(h.engine.suspend(6).await, SuspendOutcome::Failed);
    h.clock.advance_minutes(30);
    assert_eq!(h.engine.fire_due_alarms().await, vec![(6, AlarmOutcome::Failed)]);
    assert_eq!(h.engine.state_of(6).await, Some(TabState::Monitored));
    assert_eq!(h.engine.stats().load().await.unwrap().tabs_suspended, 0);
}

#[tokio::test]
async fn whitelisted_tab_is_deferred_not_dropped() {
    let settings = Settings {
        whitelisted_domains: vec!["mail.com".into()],
        ..Settings::default()
    };
    let h = Harness::start_with(
        vec![
            web_tab(1, "https://inbox.mail.com/"),
            web_tab(2, "https://notmail.com/"),
        ],
        settings,
    )
    .await;

    h.clock.advance_minutes(30);
    let mut fired = h.engine.fire_due_alarms().await;
    fired.sort_by_key(|(id, _)| *id);
    assert_eq!(
        fired,
        vec![
            (1, AlarmOutcome::Deferred(ExclusionReason::Whitelist)),
            (2, AlarmOutcome::Suspended),
        ]
    );
    assert!(h.engine.timers().get(1).await.unwrap().is_some());

    let countdown = h.engine.countdown(1).await;
    assert!(countdown.is_paused);
    assert_eq!(countdown.remaining_ms, -1);
    assert_eq!(countdown.paused_reason, Some(ExclusionReason::Whitelist));
}

#[tokio::test]
async fn unsaved_forms_block_suspension_until_cleared() {
    let h = Harness::start(vec![web_tab(3, "https://form.test/")]).await;
    h.engine.report_form_status(3, true).await;

    h.clock.advance_minutes(30);
    assert_eq!(
        h.engine.on_alarm(3).await,
        AlarmOutcome::Deferred(ExclusionReason::UnsavedForm)
    );

    h.engine.report_form_status(3, false).await;
    h.clock.advance_minutes(30);
    assert_eq!(h.engine.fire_due_alarms().await, vec![(3, AlarmOutcome::Suspended)]);
    assert!(!h.engine.form_status().has_unsaved_forms(3).await);
}

#[tokio::test]
async fn navigation_to_internal_page_stops_monitoring() {
    let h = Harness::start(vec![web_tab(8, "https://x.test/")]).await;
    h.engine.report_form_status(8, true).await;

    let moved = web_tab(8, "chrome://extensions");
    h.tabs.put(moved.clone());
    let change = TabChange {
        url: Some("chrome://extensions".into()),
        status: None,
    };
    h.engine.on_tab_updated(&moved, &change).await;

    assert_eq!(h.engine.state_of(8).await, Some(TabState::Unmonitored));
    assert!(!h.engine.form_status().has_unsaved_forms(8).await);
    assert_one_timer_per_monitored_tab(&h.engine, h.tabs.as_ref(), h.alarms.as_ref()).await;

    let back = web_tab(8, "https://y.test/");
    h.tabs.put(back.clone());
    h.engine
        .on_tab_updated(&back, &TabChange { url: back.url.clone(), status: None })
        .await;
    assert_eq!(h.engine.state_of(8).await, Some(TabState::Monitored));
}

#[tokio::test]
async fn title_only_updates_do_not_rearm() {
    let h = Harness::start(vec![web_tab(9, "https://x.test/")]).await;
    let before = h.engine.timers().get(9).await.unwrap().unwrap();

    h.clock.advance_minutes(10);
    h.engine
        .on_tab_updated(&web_tab(9, "https://x.test/"), &TabChange::default())
        .await;
    assert_eq!(h.engine.timers().get(9).await.unwrap().unwrap(), before);
}

#[tokio::test]
async fn focus_restores_when_enabled() {
    let settings = Settings {
        auto_unsuspend_on_focus: true,
        ..Settings::default()
    };
    let h = Harness::start_with(vec![web_tab(2, "https://focus.test/")], settings).await;
    assert!(h.engine.suspend(2).await.succeeded());

    h.engine.on_tab_activated(2).await;
    assert_eq!(h.tabs.url_of(2), "https://focus.test/");
    assert_eq!(h.engine.state_of(2).await, Some(TabState::Monitored));
}

#[tokio::test]
async fn focus_leaves_suspended_tab_alone_by_default() {
    let h = Harness::start(vec![web_tab(2, "https://focus.test/")]).await;
    assert!(h.engine.suspend(2).await.succeeded());

    h.engine.on_tab_activated(2).await;
    assert_eq!(h.engine.state_of(2).await, Some(TabState::Suspended));
    assert!(h.engine.timers().get(2).await.unwrap().is_none());
}

#[tokio::test]
async fn active_tab_cannot_be_suspended() {
    let mut tab = web_tab(1, "https://here.test/");
    tab.active = true;
    let h = Harness::start(vec![tab]).await;

    assert_eq!(
        h.engine.suspend(1).await,
        SuspendOutcome::Excluded(ExclusionReason::Active)
    );
    assert_eq!(h.engine.suspend(42).await, SuspendOutcome::Gone);
}

#[tokio::test]
async fn removed_tab_leaves_nothing_behind() {
    let h = Harness::start(vec![web_tab(1, "https://a.test/"), web_tab(2, "https://b.test/")]).await;
    h.engine.report_form_status(1, true).await;

    h.tabs.drop_tab(1);
    h.engine.on_tab_removed(1).await;

    assert!(h.engine.timers().get(1).await.unwrap().is_none());
    assert!(h.engine.activity().get(1).await.is_none());
    assert!(!h.engine.form_status().has_unsaved_forms(1).await);
    assert_one_timer_per_monitored_tab(&h.engine, h.tabs.as_ref(), h.alarms.as_ref()).await;
}

#[tokio::test]
async fn alarm_for_closed_tab_is_cleaned_up() {
    let h = Harness::start(vec![web_tab(1, "https://a.test/")]).await;
    h.tabs.drop_tab(1);

    h.clock.advance_minutes(30);
    assert_eq!(h.engine.fire_due_alarms().await, vec![(1, AlarmOutcome::Orphaned)]);
    assert!(h.engine.activity().tracked_ids().await.is_empty());
}

#[tokio::test]
async fn reload_applies_new_timeout_on_next_rearm() {
    let mut h = Harness::start(vec![web_tab(1, "https://a.test/")]).await;

    let settings = Settings {
        suspension_timeout_minutes: 5,
        ..Settings::default()
    };
    write_settings(h.durable.as_ref(), &settings).await;
    assert_eq!(
        h.engine.reload_configuration().await.suspension_timeout_minutes,
        5
    );

    h.engine.on_tab_activated(1).await;
    let countdown = h.engine.countdown(1).await;
    assert_eq!(countdown.remaining_ms, (5 * MINUTE_MS) as i64);
}

#[tokio::test]
async fn all_countdowns_are_sorted_soonest_first() {
    let h = Harness::start(vec![web_tab(1, "https://a.test/")]).await;
    h.clock.advance_minutes(3);
    let second = web_tab(2, "https://b.test/");
    h.tabs.put(second.clone());
    h.engine.on_tab_created(&second).await;
    h.clock.advance_minutes(1);
    h.engine.on_tab_activated(1).await;

    let listing = h.engine.all_countdowns().await;
    let ids: Vec<_> = listing.iter().map(|c| c.tab_id).collect();
    assert_eq!(ids, vec![2, 1]);
    assert_eq!(listing[0].remaining_ms, (29 * MINUTE_MS) as i64);
}

#[tokio::test]
async fn listing_marks_excluded_timers_like_single_countdown() {
    let pinned = lull::Tab {
        pinned: true,
        ..web_tab(2, "https://pinned.test/")
    };
    let h = Harness::start(vec![web_tab(1, "https://a.test/"), pinned]).await;

    let single = h.engine.countdown(2).await;
    assert!(single.is_paused);
    assert_eq!(single.paused_reason, Some(ExclusionReason::Pinned));

    let listing = h.engine.all_countdowns().await;
    assert_eq!(listing.len(), 2);
    let entry = |id| listing.iter().find(|c| c.tab_id == id).unwrap();
    assert_eq!(entry(2).paused_reason, Some(ExclusionReason::Pinned));
    assert_eq!(entry(1).paused_reason, None);
}
