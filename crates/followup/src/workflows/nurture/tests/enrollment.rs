use chrono::Duration;

use super::common::*;
use crate::workflows::nurture::domain::{EnrollmentStatus, SequenceId};
use crate::workflows::nurture::enrollment::EnrollmentError;

#[test]
fn enroll_creates_active_enrollment_pointing_at_the_first_step() {
    let fx = fixture();
    let (sequence, _) = create_sequence(&fx, two_step_draft());

    let (enrollment, _) = fx
        .engine
        .enroll(&agent_id(), &lead_id(), &sequence.id, t0())
        .expect("enrolls");

    assert_eq!(enrollment.status, EnrollmentStatus::Active);
    assert_eq!(enrollment.current_step, 0);
    assert_eq!(enrollment.enrolled_at, t0());
    // First step has no delay, so the next send is due immediately.
    assert_eq!(enrollment.next_send_at, Some(t0()));
    assert!(enrollment.completed_at.is_none());
}

#[test]
fn duplicate_active_enrollment_is_rejected() {
    let fx = fixture();
    let (sequence, _) = create_sequence(&fx, two_step_draft());

    fx.engine
        .enroll(&agent_id(), &lead_id(), &sequence.id, t0())
        .expect("first enrollment");

    match fx.engine.enroll(&agent_id(), &lead_id(), &sequence.id, t0()) {
        Err(EnrollmentError::DuplicateEnrollment) => {}
        other => panic!("expected duplicate enrollment rejection, got {other:?}"),
    }
}

#[test]
fn enroll_rejects_sequences_owned_by_another_agent() {
    let fx = fixture();
    let (sequence, _) = create_sequence(&fx, two_step_draft());

    match fx
        .engine
        .enroll(&other_agent_id(), &lead_id(), &sequence.id, t0())
    {
        Err(EnrollmentError::PermissionDenied) => {}
        other => panic!("expected permission denial, got {other:?}"),
    }
}

#[test]
fn enroll_rejects_missing_sequence() {
    let fx = fixture();

    match fx.engine.enroll(
        &agent_id(),
        &lead_id(),
        &SequenceId("seq-missing".to_string()),
        t0(),
    ) {
        Err(EnrollmentError::SequenceNotFound) => {}
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn enroll_rejects_inactive_sequence() {
    let fx = fixture();
    let mut draft = two_step_draft();
    draft.is_active = false;
    let (sequence, _) = create_sequence(&fx, draft);

    match fx.engine.enroll(&agent_id(), &lead_id(), &sequence.id, t0()) {
        Err(EnrollmentError::SequenceInactive) => {}
        other => panic!("expected inactive rejection, got {other:?}"),
    }
}

#[test]
fn advance_moves_one_step_and_computes_next_send_time() {
    let fx = fixture();
    let (sequence, _) = create_sequence(&fx, two_step_draft());
    let (enrollment, _) = fx
        .engine
        .enroll(&agent_id(), &lead_id(), &sequence.id, t0())
        .expect("enrolls");

    let tracker = crate::workflows::nurture::enrollment::EnrollmentTracker::new(fx.store.clone());
    let advanced = tracker.advance(&enrollment.id, 1, t0()).expect("advances");

    assert_eq!(advanced.current_step, 1);
    assert_eq!(advanced.status, EnrollmentStatus::Active);
    // Second step carries a three-day delay.
    assert_eq!(advanced.next_send_at, Some(t0() + Duration::days(3)));
}

#[test]
fn advance_below_current_step_is_a_noop() {
    let fx = fixture();
    let (sequence, _) = create_sequence(&fx, two_step_draft());
    let (enrollment, _) = fx
        .engine
        .enroll(&agent_id(), &lead_id(), &sequence.id, t0())
        .expect("enrolls");

    let tracker = crate::workflows::nurture::enrollment::EnrollmentTracker::new(fx.store.clone());
    tracker.advance(&enrollment.id, 1, t0()).expect("advances");
    let repeated = tracker
        .advance(&enrollment.id, 1, t0())
        .expect("repeat advance is a no-op");

    assert_eq!(repeated.current_step, 1);
    assert_eq!(repeated.status, EnrollmentStatus::Active);
}

#[test]
fn advance_rejects_skipping_ahead() {
    let fx = fixture();
    let (sequence, _) = create_sequence(&fx, two_step_draft());
    let (enrollment, _) = fx
        .engine
        .enroll(&agent_id(), &lead_id(), &sequence.id, t0())
        .expect("enrolls");

    let tracker = crate::workflows::nurture::enrollment::EnrollmentTracker::new(fx.store.clone());
    match tracker.advance(&enrollment.id, 2, t0()) {
        Err(EnrollmentError::OutOfOrderAdvance {
            current: 0,
            completed: 2,
        }) => {}
        other => panic!("expected out-of-order rejection, got {other:?}"),
    }
}

#[test]
fn advancing_past_the_last_step_completes_the_enrollment() {
    let fx = fixture();
    let (sequence, _) = create_sequence(&fx, two_step_draft());
    let (enrollment, _) = fx
        .engine
        .enroll(&agent_id(), &lead_id(), &sequence.id, t0())
        .expect("enrolls");

    let tracker = crate::workflows::nurture::enrollment::EnrollmentTracker::new(fx.store.clone());
    tracker.advance(&enrollment.id, 1, t0()).expect("step one");
    let done = tracker.advance(&enrollment.id, 2, t0()).expect("step two");

    assert_eq!(done.status, EnrollmentStatus::Completed);
    assert_eq!(done.current_step, 2);
    assert_eq!(done.completed_at, Some(t0()));
    assert!(done.next_send_at.is_none());

    // Terminal enrollments never move again.
    match tracker.advance(&done.id, 3, t0()) {
        Err(EnrollmentError::NotActive) => {}
        other => panic!("expected terminal rejection, got {other:?}"),
    }
}

#[test]
fn cancel_is_terminal_and_idempotent() {
    let fx = fixture();
    let (sequence, _) = create_sequence(&fx, two_step_draft());
    let (enrollment, _) = fx
        .engine
        .enroll(&agent_id(), &lead_id(), &sequence.id, t0())
        .expect("enrolls");

    let view = fx
        .engine
        .cancel_enrollment(&agent_id(), &enrollment.id)
        .expect("cancels");
    assert_eq!(view.status, "Cancelled");
    assert!(view.next_send_at.is_none());

    let again = fx
        .engine
        .cancel_enrollment(&agent_id(), &enrollment.id)
        .expect("cancel is idempotent");
    assert_eq!(again.status, "Cancelled");

    let tracker = crate::workflows::nurture::enrollment::EnrollmentTracker::new(fx.store.clone());
    match tracker.advance(&enrollment.id, 1, t0()) {
        Err(EnrollmentError::NotActive) => {}
        other => panic!("expected terminal rejection, got {other:?}"),
    }
}

#[test]
fn enrollment_view_enforces_ownership() {
    let fx = fixture();
    let (sequence, _) = create_sequence(&fx, two_step_draft());
    let (enrollment, _) = fx
        .engine
        .enroll(&agent_id(), &lead_id(), &sequence.id, t0())
        .expect("enrolls");

    match fx.engine.enrollment_view(&other_agent_id(), &enrollment.id) {
        Err(EnrollmentError::PermissionDenied) => {}
        other => panic!("expected permission denial, got {other:?}"),
    }
}
