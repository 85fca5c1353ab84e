// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Check-in scheduling, escalation and offline check-ins against the mock server.

use chrono::Duration;
use lifeline_core::{Audience, CheckInStatus, ContactId, LifelineError, NotificationKind};
use lifeline_state::{CheckInOutcome, WriteOutcome};
use lifeline_test_utils::fixtures::{self, t0};
use lifeline_test_utils::{ClockMode, TestHarness};

// ---- Escalation ----

#[tokio::test]
async fn escalation_follows_the_schedule() {
    let h = TestHarness::loaded(TestHarness::builder().with_contact(fixtures::responder("c-r")))
        .await
        .unwrap();
    let checkin = h.session().checkin();

    h.advance(Duration::hours(22) - Duration::seconds(1)).await;
    assert_eq!(checkin.tick().await.unwrap(), None);

    h.advance(Duration::seconds(1)).await;
    assert_eq!(checkin.tick().await.unwrap(), Some(CheckInStatus::Warning));
    let reminders = h.notifier.of_kind(NotificationKind::CheckInReminder).await;
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].0, Audience::SelfUser);

    h.advance(Duration::hours(2)).await;
    assert_eq!(checkin.tick().await.unwrap(), Some(CheckInStatus::Overdue));

    h.advance(Duration::hours(2) - Duration::seconds(1)).await;
    assert_eq!(checkin.tick().await.unwrap(), None);

    h.advance(Duration::seconds(1)).await;
    assert_eq!(checkin.tick().await.unwrap(), Some(CheckInStatus::NonResponsive));
    let overdue = h.notifier.of_kind(NotificationKind::DependentOverdue).await;
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].0, Audience::Contacts(vec![ContactId("c-r".into())]));
    assert_eq!(checkin.next_transition_at(), None);

    // Only one reminder for the whole escalation.
    assert_eq!(h.notifier.count(NotificationKind::CheckInReminder).await, 1);
}

#[tokio::test]
async fn check_in_returns_to_active_from_non_responsive() {
    let h = TestHarness::loaded(TestHarness::builder()).await.unwrap();
    let checkin = h.session().checkin();

    h.advance(Duration::hours(30)).await;
    assert_eq!(checkin.tick().await.unwrap(), Some(CheckInStatus::NonResponsive));

    let CheckInOutcome::Confirmed(user) = checkin.check_in().await.unwrap() else {
        panic!("expected a confirmed check-in");
    };
    assert_eq!(user.status, CheckInStatus::Active);
    assert_eq!(user.last_check_in_at, t0() + Duration::hours(30));
    assert_eq!(user.next_deadline_at, t0() + Duration::hours(54));
    assert_eq!(
        checkin.next_transition_at(),
        Some(t0() + Duration::hours(52))
    );
}

#[tokio::test(start_paused = true)]
async fn timer_escalates_without_intervention() {
    let h = TestHarness::builder()
        .with_clock(ClockMode::Tokio)
        .with_contact(fixtures::responder("c-r"))
        .build()
        .await
        .unwrap();
    h.session().start().await.unwrap();

    let mut reader = h.session().checkin().reader();
    let snapshot = loop {
        let snapshot = reader.current();
        if snapshot.status() == Some(CheckInStatus::NonResponsive) {
            break snapshot;
        }
        reader.changed().await.unwrap();
    };

    // Deadline plus the default grace, which matches the reminder lead.
    let escalated_at = snapshot.published_at();
    assert!(escalated_at >= t0() + Duration::hours(26));
    assert!(escalated_at < t0() + Duration::hours(26) + Duration::seconds(1));
    assert_eq!(h.notifier.count(NotificationKind::CheckInReminder).await, 1);
    assert_eq!(h.notifier.count(NotificationKind::DependentOverdue).await, 1);
    h.session().sign_out().await;
}

// ---- Schedule changes ----

#[tokio::test]
async fn deadline_tracks_interval_after_every_write() {
    let h = TestHarness::loaded(TestHarness::builder()).await.unwrap();
    let checkin = h.session().checkin();

    h.advance(Duration::hours(3)).await;
    let CheckInOutcome::Confirmed(user) = checkin.check_in().await.unwrap() else {
        panic!("expected a confirmed check-in");
    };
    assert_eq!(user.next_deadline_at, user.last_check_in_at + user.check_in_interval);

    let outcome = checkin.set_interval(Duration::hours(12)).await.unwrap();
    assert_eq!(outcome, WriteOutcome::Confirmed);
    let user = checkin.user().unwrap();
    assert_eq!(user.check_in_interval, Duration::hours(12));
    assert_eq!(user.next_deadline_at, t0() + Duration::hours(15));

    let server = h.backend.user().await.unwrap();
    assert_eq!(server.check_in_interval, Duration::hours(12));
    assert_eq!(server.next_deadline_at, user.next_deadline_at);
}

#[tokio::test]
async fn invalid_schedule_is_rejected_before_any_call() {
    let h = TestHarness::loaded(TestHarness::builder()).await.unwrap();
    let checkin = h.session().checkin();

    let err = checkin.set_interval(Duration::hours(1)).await.unwrap_err();
    assert!(matches!(err, LifelineError::Validation(_)));
    let err = checkin.set_reminder_lead_time(Duration::zero()).await.unwrap_err();
    assert!(matches!(err, LifelineError::Validation(_)));

    assert_eq!(h.backend.call_count("set_check_in_interval").await, 0);
    assert_eq!(h.backend.call_count("set_reminder_lead_time").await, 0);
    assert_eq!(checkin.user().unwrap().check_in_interval, Duration::hours(24));
}

#[tokio::test]
async fn out_of_range_interval_leaves_the_schedule_alone() {
    let h = TestHarness::loaded(TestHarness::builder()).await.unwrap();
    let checkin = h.session().checkin();
    let before = checkin.user().unwrap();

    let err = checkin.set_interval(Duration::days(100_000_000)).await.unwrap_err();
    assert!(matches!(err, LifelineError::Validation(_)));
    let err = checkin
        .set_reminder_lead_time(Duration::days(100_000_000))
        .await
        .unwrap_err();
    assert!(matches!(err, LifelineError::Validation(_)));

    let after = checkin.user().unwrap();
    assert_eq!(after.check_in_interval, before.check_in_interval);
    assert_eq!(after.next_deadline_at, before.next_deadline_at);
    assert_eq!(h.backend.call_count("set_check_in_interval").await, 0);
}

#[tokio::test]
async fn rejected_interval_change_rolls_back() {
    let h = TestHarness::loaded(TestHarness::builder()).await.unwrap();
    let checkin = h.session().checkin();
    h.backend
        .fail_next(
            "set_check_in_interval",
            LifelineError::Conflict {
                message: "schedule changed elsewhere".into(),
            },
        )
        .await;

    let err = checkin.set_interval(Duration::hours(8)).await.unwrap_err();
    assert!(err.is_conflict());
    let user = checkin.user().unwrap();
    assert_eq!(user.check_in_interval, Duration::hours(24));
    assert_eq!(user.next_deadline_at, t0() + Duration::hours(24));
}

#[tokio::test]
async fn interval_change_does_not_de_escalate() {
    let h = TestHarness::loaded(TestHarness::builder()).await.unwrap();
    let checkin = h.session().checkin();

    h.advance(Duration::hours(23)).await;
    assert_eq!(checkin.tick().await.unwrap(), Some(CheckInStatus::Warning));

    checkin.set_interval(Duration::hours(48)).await.unwrap();
    assert_eq!(checkin.tick().await.unwrap(), None);
    assert_eq!(checkin.user().unwrap().status, CheckInStatus::Warning);
}

// ---- Retry and offline ----

#[tokio::test]
async fn transient_failures_are_retried() {
    let h = TestHarness::loaded(TestHarness::builder()).await.unwrap();
    h.backend
        .fail_times("check_in", 2, || LifelineError::connectivity("flaky"))
        .await;

    let outcome = h.session().checkin().check_in().await.unwrap();
    assert!(matches!(outcome, CheckInOutcome::Confirmed(_)));
    assert_eq!(h.backend.call_count("check_in").await, 3);
    assert_eq!(h.session().queue().pending().await.unwrap(), 0);
}

#[tokio::test]
async fn exhausted_retries_queue_the_check_in() {
    let h = TestHarness::loaded(TestHarness::builder()).await.unwrap();
    h.backend
        .fail_times("check_in", 3, || LifelineError::connectivity("down"))
        .await;
    h.advance(Duration::minutes(10)).await;

    let CheckInOutcome::PendingSync(user) = h.session().checkin().check_in().await.unwrap() else {
        panic!("expected the check-in to be queued");
    };
    assert_eq!(user.status, CheckInStatus::Active);
    assert_eq!(user.last_check_in_at, t0() + Duration::minutes(10));
    assert_eq!(h.session().queue().pending().await.unwrap(), 1);
    assert!(h.session().sync_status().current().is_pending_sync());
}

#[tokio::test]
async fn offline_check_in_replays_to_the_online_result() {
    let online = TestHarness::loaded(TestHarness::builder()).await.unwrap();
    online.advance(Duration::hours(1)).await;
    online.session().checkin().check_in().await.unwrap();

    let offline = TestHarness::loaded(TestHarness::builder()).await.unwrap();
    offline.backend.set_online(false);
    offline.session().set_online(false).await.unwrap();
    offline.advance(Duration::hours(1)).await;

    let CheckInOutcome::PendingSync(local) = offline.session().checkin().check_in().await.unwrap()
    else {
        panic!("expected the check-in to be queued");
    };
    assert_eq!(local.status, CheckInStatus::Active);

    // Reconnect later; the replay keeps the original logical time.
    offline.advance(Duration::minutes(30)).await;
    offline.backend.set_online(true);
    let reports = offline.session().set_online(true).await.unwrap().unwrap();
    let replayed: usize = reports.iter().map(|r| r.replayed).sum();
    assert_eq!(replayed, 1);

    assert_eq!(
        offline.session().checkin().user(),
        online.session().checkin().user()
    );
    assert_eq!(offline.backend.user().await, online.backend.user().await);
    assert_eq!(offline.session().queue().pending().await.unwrap(), 0);
}

#[tokio::test]
async fn concurrent_check_ins_coalesce() {
    let h = TestHarness::loaded(TestHarness::builder()).await.unwrap();
    h.backend.hold("check_in").await;

    let checkin = h.session().checkin().clone();
    let first = tokio::spawn(async move { checkin.check_in().await });
    h.backend.wait_until_held("check_in").await;

    let second = h.session().checkin().check_in().await.unwrap();
    assert_eq!(second, CheckInOutcome::Coalesced);

    h.backend.release("check_in").await;
    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, CheckInOutcome::Confirmed(_)));
    assert_eq!(h.backend.call_count("check_in").await, 1);
}
