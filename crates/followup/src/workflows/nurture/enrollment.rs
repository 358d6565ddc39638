use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::domain::{
    self, AgentId, Enrollment, EnrollmentId, EnrollmentStatus, LeadId, SequenceDefinitionError,
    SequenceId,
};
use super::store::{NurtureStore, StoreError};

static ENROLLMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_enrollment_id() -> EnrollmentId {
    let id = ENROLLMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    EnrollmentId(format!("enr-{id:06}"))
}

/// Owns the enrollment lifecycle: creation, monotonic advancement, and
/// explicit cancellation.
pub struct EnrollmentTracker<S> {
    store: Arc<S>,
}

impl<S> Clone for EnrollmentTracker<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S> EnrollmentTracker<S>
where
    S: NurtureStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Enroll a lead into a sequence owned by `agent_id`. A lead with an
    /// existing active enrollment in the same sequence is rejected with
    /// [`EnrollmentError::DuplicateEnrollment`].
    pub fn enroll(
        &self,
        agent_id: &AgentId,
        lead_id: &LeadId,
        sequence_id: &SequenceId,
        now: DateTime<Utc>,
    ) -> Result<Enrollment, EnrollmentError> {
        let sequence = self
            .store
            .sequence(sequence_id)?
            .ok_or(EnrollmentError::SequenceNotFound)?;
        if sequence.agent_id != *agent_id {
            return Err(EnrollmentError::PermissionDenied);
        }
        if !sequence.is_active {
            return Err(EnrollmentError::SequenceInactive);
        }

        let steps = self.store.steps_after(sequence_id, 0)?;
        domain::validate_step_order(&steps)?;
        let first = steps
            .first()
            .ok_or(SequenceDefinitionError::Empty)
            .map_err(EnrollmentError::Definition)?;

        let enrollment = Enrollment {
            id: next_enrollment_id(),
            lead_id: lead_id.clone(),
            sequence_id: sequence_id.clone(),
            agent_id: agent_id.clone(),
            current_step: 0,
            status: EnrollmentStatus::Active,
            next_send_at: Some(now + Duration::days(i64::from(first.delay_days))),
            enrolled_at: now,
            completed_at: None,
        };

        match self.store.insert_enrollment(enrollment) {
            Ok(stored) => Ok(stored),
            Err(StoreError::Conflict) => Err(EnrollmentError::DuplicateEnrollment),
            Err(other) => Err(other.into()),
        }
    }

    /// Record that `completed_step_order` was dispatched successfully.
    ///
    /// Advancement is monotonic: a call for a step at or below the current
    /// position is a no-op (the second record of a `both` step lands here).
    /// Skipping ahead is rejected. When no further step exists the
    /// enrollment transitions to `Completed`; terminal enrollments never
    /// move again.
    pub fn advance(
        &self,
        enrollment_id: &EnrollmentId,
        completed_step_order: u32,
        now: DateTime<Utc>,
    ) -> Result<Enrollment, EnrollmentError> {
        let enrollment = self
            .store
            .enrollment(enrollment_id)?
            .ok_or(EnrollmentError::EnrollmentNotFound)?;

        if enrollment.status.is_terminal() {
            return Err(EnrollmentError::NotActive);
        }
        if completed_step_order <= enrollment.current_step {
            return Ok(enrollment);
        }
        if completed_step_order != enrollment.current_step + 1 {
            return Err(EnrollmentError::OutOfOrderAdvance {
                current: enrollment.current_step,
                completed: completed_step_order,
            });
        }

        let expected = enrollment.current_step;
        let next = self
            .store
            .steps_after(&enrollment.sequence_id, completed_step_order)?
            .into_iter()
            .next();

        let mut updated = enrollment;
        updated.current_step = completed_step_order;
        match next {
            Some(step) => {
                updated.next_send_at = Some(now + Duration::days(i64::from(step.delay_days)));
            }
            None => {
                updated.status = EnrollmentStatus::Completed;
                updated.completed_at = Some(now);
                updated.next_send_at = None;
            }
        }

        match self.store.update_enrollment(expected, updated.clone()) {
            Ok(()) => Ok(updated),
            Err(StoreError::Conflict) => Err(EnrollmentError::Stale),
            Err(other) => Err(other.into()),
        }
    }

    /// Explicit external cancellation. Terminal; idempotent on already
    /// cancelled enrollments.
    pub fn cancel(
        &self,
        agent_id: &AgentId,
        enrollment_id: &EnrollmentId,
    ) -> Result<Enrollment, EnrollmentError> {
        let enrollment = self
            .store
            .enrollment(enrollment_id)?
            .ok_or(EnrollmentError::EnrollmentNotFound)?;
        if enrollment.agent_id != *agent_id {
            return Err(EnrollmentError::PermissionDenied);
        }
        if enrollment.status == EnrollmentStatus::Cancelled {
            return Ok(enrollment);
        }
        if enrollment.status.is_terminal() {
            return Err(EnrollmentError::NotActive);
        }

        let expected = enrollment.current_step;
        let mut updated = enrollment;
        updated.status = EnrollmentStatus::Cancelled;
        updated.next_send_at = None;

        match self.store.update_enrollment(expected, updated.clone()) {
            Ok(()) => Ok(updated),
            Err(StoreError::Conflict) => Err(EnrollmentError::Stale),
            Err(other) => Err(other.into()),
        }
    }

    pub fn enrollment(
        &self,
        agent_id: &AgentId,
        enrollment_id: &EnrollmentId,
    ) -> Result<Enrollment, EnrollmentError> {
        let enrollment = self
            .store
            .enrollment(enrollment_id)?
            .ok_or(EnrollmentError::EnrollmentNotFound)?;
        if enrollment.agent_id != *agent_id {
            return Err(EnrollmentError::PermissionDenied);
        }
        Ok(enrollment)
    }
}

/// Error raised by the enrollment tracker.
#[derive(Debug, thiserror::Error)]
pub enum EnrollmentError {
    #[error("sequence not found")]
    SequenceNotFound,
    #[error("enrollment not found")]
    EnrollmentNotFound,
    #[error("resource belongs to another agent")]
    PermissionDenied,
    #[error("sequence is not active")]
    SequenceInactive,
    #[error("lead already has an active enrollment in this sequence")]
    DuplicateEnrollment,
    #[error("enrollment is no longer active")]
    NotActive,
    #[error("advance skipped a step: current {current}, completed {completed}")]
    OutOfOrderAdvance { current: u32, completed: u32 },
    #[error("enrollment was advanced concurrently")]
    Stale,
    #[error(transparent)]
    Definition(#[from] SequenceDefinitionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
