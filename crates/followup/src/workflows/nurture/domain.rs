use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::template::MessageTemplate;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(AgentId);
string_id!(LeadId);
string_id!(SequenceId);
string_id!(StepId);
string_id!(EnrollmentId);
string_id!(MessageId);

/// Channel selection at sequence-authoring time. `Both` expands into two
/// independent dispatch records at scheduling time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepChannel {
    Email,
    Sms,
    Both,
}

impl StepChannel {
    pub const fn expand(self) -> &'static [DispatchChannel] {
        match self {
            Self::Email => &[DispatchChannel::Email],
            Self::Sms => &[DispatchChannel::Sms],
            Self::Both => &[DispatchChannel::Email, DispatchChannel::Sms],
        }
    }
}

/// Concrete channel carried by a single dispatch record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchChannel {
    Email,
    Sms,
}

impl DispatchChannel {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Email => "Email",
            Self::Sms => "SMS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Cancelled,
}

impl EnrollmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Lifecycle of a dispatch record. `Sending` is the in-flight claim marker:
/// a record moves `Pending -> Sending` atomically before any delivery
/// attempt so overlapping batch runs cannot double-send it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Pending,
    Sending,
    Sent,
    Failed,
}

impl DispatchStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Sending => "Sending",
            Self::Sent => "Sent",
            Self::Failed => "Failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

/// Whether AI enhancement was requested and what actually happened to the
/// content. `Fallback` records that enhancement was attempted but the
/// unenhanced rendering was sent instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhancementStatus {
    NotRequested,
    Applied,
    Fallback,
}

/// An agent-authored nurture sequence. Immutable once steps are attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub id: SequenceId,
    pub agent_id: AgentId,
    pub name: String,
    pub description: String,
    pub is_active: bool,
}

/// One timed action within a sequence. `step_order` is 1-based and must be
/// contiguous and ascending within the owning sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceStep {
    pub id: StepId,
    pub sequence_id: SequenceId,
    pub step_order: u32,
    pub delay_days: u32,
    pub channel: StepChannel,
    pub subject: Option<MessageTemplate>,
    pub message_template: MessageTemplate,
    pub use_ai_enhancement: bool,
}

/// A lead's live progress through one sequence instance. `current_step`
/// starts at 0 ("no step completed yet") and never decreases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub lead_id: LeadId,
    pub sequence_id: SequenceId,
    pub agent_id: AgentId,
    pub current_step: u32,
    pub status: EnrollmentStatus,
    pub next_send_at: Option<DateTime<Utc>>,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    pub fn status_view(&self) -> EnrollmentStatusView {
        EnrollmentStatusView {
            enrollment_id: self.id.clone(),
            lead_id: self.lead_id.clone(),
            sequence_id: self.sequence_id.clone(),
            status: self.status.label(),
            current_step: self.current_step,
            next_send_at: self.next_send_at,
            enrolled_at: self.enrolled_at,
            completed_at: self.completed_at,
        }
    }
}

/// Sanitized representation of an enrollment's exposed status.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentStatusView {
    pub enrollment_id: EnrollmentId,
    pub lead_id: LeadId,
    pub sequence_id: SequenceId,
    pub status: &'static str,
    pub current_step: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_send_at: Option<DateTime<Utc>>,
    pub enrolled_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// One concrete, channel-specific send task derived from a step. The tuple
/// `(enrollment_id, step_id, channel)` is the idempotency key: re-running
/// the scheduling routine never creates a second record for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: MessageId,
    pub enrollment_id: EnrollmentId,
    pub step_id: StepId,
    pub lead_id: LeadId,
    pub agent_id: AgentId,
    pub channel: DispatchChannel,
    pub scheduled_for: DateTime<Utc>,
    pub status: DispatchStatus,
    pub subject: Option<String>,
    pub message_content: String,
    pub ai_enhanced: bool,
    pub enhancement: EnhancementStatus,
    pub attempts: u32,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl ScheduledMessage {
    pub fn idempotency_key(&self) -> (EnrollmentId, StepId, DispatchChannel) {
        (
            self.enrollment_id.clone(),
            self.step_id.clone(),
            self.channel,
        )
    }
}

/// Read-only lead projection resolved from the directory collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadContact {
    pub id: LeadId,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub property_address: Option<String>,
}

/// Read-only agent profile resolved from the directory collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    pub name: String,
    pub signature: String,
    pub messaging_enabled: bool,
}

/// Violations of the 1-based, gap-free step ordering invariant.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SequenceDefinitionError {
    #[error("sequence has no steps")]
    Empty,
    #[error("step order must be contiguous: expected {expected}, found {found}")]
    NonContiguous { expected: u32, found: u32 },
}

/// Validate a full step list: 1-based, ascending, gap-free.
pub fn validate_step_order(steps: &[SequenceStep]) -> Result<(), SequenceDefinitionError> {
    if steps.is_empty() {
        return Err(SequenceDefinitionError::Empty);
    }
    validate_step_window(0, steps)
}

/// Validate a suffix of a sequence's steps as returned by a
/// `steps_after(threshold)` query: contiguous starting at `threshold + 1`.
/// An empty window is valid (the enrollment has no further steps).
pub(crate) fn validate_step_window(
    threshold: u32,
    steps: &[SequenceStep],
) -> Result<(), SequenceDefinitionError> {
    let mut expected = threshold + 1;
    for step in steps {
        if step.step_order != expected {
            return Err(SequenceDefinitionError::NonContiguous {
                expected,
                found: step.step_order,
            });
        }
        expected += 1;
    }
    Ok(())
}
