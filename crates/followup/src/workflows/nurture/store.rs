use chrono::{DateTime, Utc};

use super::domain::{
    AgentId, AgentProfile, Enrollment, EnrollmentId, LeadContact, LeadId, MessageId,
    ScheduledMessage, Sequence, SequenceId, SequenceStep,
};

/// Persistence abstraction over sequences, steps, enrollments, and dispatch
/// records, so the scheduling services can be exercised in isolation.
///
/// Implementations must honor three atomicity contracts:
/// - `insert_enrollment` rejects a second *active* enrollment for the same
///   (lead, sequence) pair with `Conflict`;
/// - `insert_message_if_absent` is a single check-and-insert on the
///   idempotency key `(enrollment_id, step_id, channel)`;
/// - `claim_due` transitions matched records `Pending -> Sending` before
///   returning them, and `update_enrollment` applies only when the stored
///   `current_step` still matches `expected_step`.
pub trait NurtureStore: Send + Sync {
    fn insert_sequence(
        &self,
        sequence: Sequence,
        steps: Vec<SequenceStep>,
    ) -> Result<(), StoreError>;

    fn sequence(&self, id: &SequenceId) -> Result<Option<Sequence>, StoreError>;

    /// Ordered steps with `step_order > threshold`, ascending.
    fn steps_after(
        &self,
        sequence_id: &SequenceId,
        threshold: u32,
    ) -> Result<Vec<SequenceStep>, StoreError>;

    fn insert_enrollment(&self, enrollment: Enrollment) -> Result<Enrollment, StoreError>;

    fn enrollment(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, StoreError>;

    fn active_enrollments_for_lead(
        &self,
        agent_id: &AgentId,
        lead_id: &LeadId,
    ) -> Result<Vec<Enrollment>, StoreError>;

    /// Conditional write: applies only while the stored enrollment still has
    /// `current_step == expected_step`, otherwise `Conflict`.
    fn update_enrollment(
        &self,
        expected_step: u32,
        enrollment: Enrollment,
    ) -> Result<(), StoreError>;

    /// Insert-or-ignore on the idempotency key. Returns the stored record
    /// when it was newly inserted, `None` when the key already existed.
    fn insert_message_if_absent(
        &self,
        message: ScheduledMessage,
    ) -> Result<Option<ScheduledMessage>, StoreError>;

    fn message(&self, id: &MessageId) -> Result<Option<ScheduledMessage>, StoreError>;

    /// Claim up to `limit` due records for one agent: `Pending` with
    /// `scheduled_for <= now`, oldest `scheduled_for` first (ties broken by
    /// insertion order), atomically marked `Sending`.
    fn claim_due(
        &self,
        agent_id: &AgentId,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledMessage>, StoreError>;

    /// Write back a claimed record's final (or retry) state.
    fn complete_message(&self, message: ScheduledMessage) -> Result<(), StoreError>;
}

/// Error enumeration for persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read-only lookup of lead contact fields and agent profiles.
pub trait Directory: Send + Sync {
    fn lead(&self, id: &LeadId) -> Result<Option<LeadContact>, StoreError>;
    fn agent(&self, id: &AgentId) -> Result<Option<AgentProfile>, StoreError>;
    /// Every agent with an active messaging integration, for scheduled runs.
    fn messaging_agents(&self) -> Result<Vec<AgentId>, StoreError>;
}
