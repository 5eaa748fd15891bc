//! Local conference bookkeeping

use rvoip_call_control::coordinator::HangUpTarget;
use rvoip_call_control::error::CallControlError;
use rvoip_call_control::session::CoreCallState;
use rvoip_call_control::types::{Reason, SessionId};
use rvoip_call_control_test_utils::fixtures::{self, ALICE, BOB, CAROL};
use rvoip_call_control_test_utils::{CoreCommand, TestHarness};
use tokio_test::{assert_err, assert_ok};

async fn two_call_conference(harness: &mut TestHarness) -> (SessionId, SessionId) {
    let first = harness.establish_incoming("call-1", BOB).await;
    let second = harness.establish_incoming("call-2", CAROL).await;
    assert_ok!(harness.enter_conference().await);
    (first, second)
}

#[tokio::test]
async fn two_running_calls_merge() {
    let mut harness = TestHarness::default_config();
    let (first, second) = two_call_conference(&mut harness).await;

    let snapshot = harness.snapshot();
    assert_eq!(snapshot.conference_size, 2);
    assert!(snapshot.call(&first).unwrap().in_conference);
    assert!(snapshot.call(&second).unwrap().in_conference);
    assert_eq!(
        harness.core.last("enter_conference"),
        Some(CoreCommand::EnterConference(vec![first, second]))
    );
}

#[tokio::test]
async fn ended_member_dissolves_two_call_conference() {
    let mut harness = TestHarness::default_config();
    let (first, _) = two_call_conference(&mut harness).await;
    harness.core.clear();

    harness.report(fixtures::ended("call-2", Reason::Normal)).await;

    let snapshot = harness.snapshot();
    assert_eq!(snapshot.conference_size, 0);
    assert!(!snapshot.call(&first).unwrap().in_conference);
    assert_eq!(harness.core.command_names(), vec!["leave_conference"]);
    assert!(harness.coordinator.conference().active().is_none());
}

#[tokio::test]
async fn removing_a_member_from_a_two_call_conference_leaves_it() {
    let mut harness = TestHarness::default_config();
    let (first, second) = two_call_conference(&mut harness).await;
    harness.core.clear();

    assert_ok!(harness.remove_from_conference(&second).await);

    assert_eq!(
        harness.core.commands(),
        vec![
            CoreCommand::RemoveFromConference(second),
            CoreCommand::LeaveConference,
        ]
    );
    assert_eq!(harness.snapshot().conference_size, 0);
    assert!(!harness.snapshot().call(&first).unwrap().in_conference);
}

#[tokio::test]
async fn three_call_conference_survives_one_removal() {
    let mut harness = TestHarness::default_config();
    harness.establish_incoming("call-1", BOB).await;
    harness.establish_incoming("call-2", CAROL).await;
    let third = harness.establish_incoming("call-3", ALICE).await;
    assert_ok!(harness.enter_conference().await);
    assert_eq!(harness.snapshot().conference_size, 3);
    harness.core.clear();

    assert_ok!(harness.remove_from_conference(&third).await);
    assert_eq!(harness.snapshot().conference_size, 2);
    assert_eq!(harness.core.count("leave_conference"), 0);

    harness.report(fixtures::ended("call-1", Reason::Normal)).await;
    assert_eq!(harness.snapshot().conference_size, 0);
    assert_eq!(harness.core.count("leave_conference"), 1);
}

#[tokio::test]
async fn call_with_pending_hold_is_not_merged() {
    let mut harness = TestHarness::default_config();
    harness.establish_incoming("call-1", BOB).await;
    let second = harness.establish_incoming("call-2", CAROL).await;
    assert_ok!(harness.pause_or_resume(&second).await);
    harness.core.clear();

    let err = assert_err!(harness.enter_conference().await);
    assert!(matches!(err, CallControlError::Conference { .. }));
    assert_eq!(harness.core.count("enter_conference"), 0);
    assert_eq!(harness.snapshot().conference_size, 0);

    // Once the core confirms the pause the call is settled and can join
    harness.report_state("call-2", CoreCallState::Paused).await;
    assert_ok!(harness.enter_conference().await);
    assert_eq!(harness.snapshot().conference_size, 2);
}

#[tokio::test]
async fn ringing_call_is_not_merged() {
    let mut harness = TestHarness::default_config();
    harness.establish_incoming("call-1", BOB).await;
    harness.report(fixtures::incoming("call-2", CAROL)).await;

    assert_err!(harness.enter_conference().await);
}

#[tokio::test]
async fn late_call_joins_the_existing_conference() {
    let mut harness = TestHarness::default_config();
    two_call_conference(&mut harness).await;
    let conference = harness.coordinator.conference().active().unwrap().id;

    let third = harness.establish_incoming("call-3", ALICE).await;
    assert_eq!(assert_ok!(harness.enter_conference().await), conference);
    assert_eq!(harness.snapshot().conference_size, 3);
    assert_eq!(harness.current(), Some(third));
}

#[tokio::test]
async fn leave_conference_keeps_the_calls() {
    let mut harness = TestHarness::default_config();
    two_call_conference(&mut harness).await;

    assert_ok!(harness.leave_conference().await);
    let snapshot = harness.snapshot();
    assert_eq!(snapshot.conference_size, 0);
    assert_eq!(snapshot.calls.len(), 2);
    assert!(snapshot.calls.iter().all(|call| !call.in_conference));

    let err = assert_err!(harness.leave_conference().await);
    assert!(matches!(err, CallControlError::Conference { .. }));
}

#[tokio::test]
async fn hanging_up_the_current_call_ends_the_whole_conference() {
    let mut harness = TestHarness::default_config();
    let (first, second) = two_call_conference(&mut harness).await;
    harness.establish_incoming("call-3", ALICE).await;
    // Bring the conference back to the foreground
    assert_ok!(harness.pause_or_resume(&SessionId::from("call-3")).await);
    harness.report_state("call-3", CoreCallState::Paused).await;
    harness.core.clear();

    assert_ok!(harness.hang_up(HangUpTarget::Current).await);
    assert_eq!(
        harness.core.commands(),
        vec![CoreCommand::Terminate(first), CoreCommand::Terminate(second)]
    );
}
