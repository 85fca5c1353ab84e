// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alert activation against the mock server.

use chrono::Duration;
use lifeline_core::types::MutationStatus;
use lifeline_core::{Audience, ContactId, Domain, LifelineError, NotificationKind};
use lifeline_state::AlertOutcome;
use lifeline_test_utils::TestHarness;
use lifeline_test_utils::fixtures::{self, t0};

async fn harness() -> TestHarness {
    TestHarness::loaded(
        TestHarness::builder()
            .with_contact(fixtures::responder("c-r1"))
            .with_contact(fixtures::responder("c-r2"))
            .with_contact(fixtures::dependent("c-d")),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn trigger_notifies_every_responder() {
    let h = harness().await;

    let outcome = h.session().alerts().trigger_alert().await.unwrap();
    let AlertOutcome::Confirmed(alert) = outcome else {
        panic!("expected a confirmed alert, got {outcome:?}");
    };
    assert!(alert.is_active);
    assert_eq!(alert.activated_at, Some(t0()));
    assert!(h.backend.alert().await.is_active);

    let sent = h.notifier.of_kind(NotificationKind::EmergencyAlert).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].0,
        Audience::Contacts(vec![ContactId("c-r1".into()), ContactId("c-r2".into())])
    );
}

#[tokio::test]
async fn triggering_twice_is_idempotent() {
    let h = harness().await;
    h.session().alerts().trigger_alert().await.unwrap();
    h.advance(Duration::minutes(1)).await;

    let outcome = h.session().alerts().trigger_alert().await.unwrap();
    assert!(matches!(outcome, AlertOutcome::Unchanged(_)));
    assert_eq!(outcome.alert().activated_at, Some(t0()));
    assert_eq!(h.backend.call_count("trigger_alert").await, 1);
    assert_eq!(h.notifier.count(NotificationKind::EmergencyAlert).await, 1);
}

#[tokio::test]
async fn cancel_closes_the_activation() {
    let h = harness().await;
    h.session().alerts().trigger_alert().await.unwrap();
    h.advance(Duration::minutes(15)).await;

    let outcome = h.session().alerts().cancel_alert().await.unwrap();
    let alert = outcome.alert();
    assert!(!alert.is_active);
    assert_eq!(alert.activated_at, Some(t0()));
    assert_eq!(alert.deactivated_at, Some(t0() + Duration::minutes(15)));
    assert_eq!(h.notifier.count(NotificationKind::AlertCancelled).await, 1);

    // Cancelling an inactive alert sends nothing.
    let outcome = h.session().alerts().cancel_alert().await.unwrap();
    assert!(matches!(outcome, AlertOutcome::Unchanged(_)));
    assert_eq!(h.backend.call_count("cancel_alert").await, 1);
}

#[tokio::test]
async fn offline_trigger_is_queued_and_replayed() {
    let h = harness().await;
    h.backend.set_online(false);
    h.session().set_online(false).await.unwrap();

    let outcome = h.session().alerts().trigger_alert().await.unwrap();
    assert!(matches!(outcome, AlertOutcome::PendingSync(ref a) if a.is_active));
    // Responders are told immediately, not on replay.
    assert_eq!(h.notifier.count(NotificationKind::EmergencyAlert).await, 1);
    assert_eq!(h.session().queue().list(Some(Domain::Alert)).await.unwrap().len(), 1);

    h.advance(Duration::minutes(10)).await;
    h.backend.set_online(true);
    h.session().set_online(true).await.unwrap();

    let server = h.backend.alert().await;
    assert!(server.is_active);
    assert_eq!(server.activated_at, Some(t0()));
    assert_eq!(h.session().queue().pending().await.unwrap(), 0);
    assert_eq!(h.notifier.count(NotificationKind::EmergencyAlert).await, 1);
}

#[tokio::test]
async fn authorization_failure_is_surfaced_and_queued() {
    let h = harness().await;
    h.backend
        .fail_next(
            "trigger_alert",
            LifelineError::Authorization("session expired".into()),
        )
        .await;

    let err = h.session().alerts().trigger_alert().await.unwrap_err();
    assert!(matches!(err, LifelineError::Authorization(_)));
    assert!(h.session().alerts().reader().current().is_active);
    assert_eq!(h.session().queue().pending().await.unwrap(), 1);

    // Unauthorized replays never exhaust the mutation, even past max attempts.
    for _ in 0..h.config.sync.replay_max_attempts {
        h.backend
            .fail_next(
                "trigger_alert",
                LifelineError::Authorization("session expired".into()),
            )
            .await;
        let reports = h.session().replay_now().await.unwrap();
        let alert_report = reports.iter().find(|r| r.domain == Domain::Alert).unwrap();
        assert_eq!(alert_report.remaining, 1);
        assert_eq!(alert_report.failed, 0);
    }
    let queued = h.session().queue().list(Some(Domain::Alert)).await.unwrap();
    assert_eq!(queued[0].status, MutationStatus::Pending);

    let reports = h.session().replay_now().await.unwrap();
    let alert_report = reports.iter().find(|r| r.domain == Domain::Alert).unwrap();
    assert_eq!(alert_report.replayed, 1);
    assert!(h.backend.alert().await.is_active);
}

#[tokio::test]
async fn stale_cancel_adopts_the_server_alert() {
    let h = harness().await;
    h.session().alerts().trigger_alert().await.unwrap();
    h.backend
        .fail_next(
            "cancel_alert",
            LifelineError::Conflict {
                message: "alert re-raised elsewhere".into(),
            },
        )
        .await;

    let err = h.session().alerts().cancel_alert().await.unwrap_err();
    assert!(err.is_conflict());
    assert!(h.session().alerts().reader().current().is_active);
    assert_eq!(h.session().queue().pending().await.unwrap(), 0);
}
