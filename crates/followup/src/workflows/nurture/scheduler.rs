use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::domain::{
    self, AgentId, DispatchStatus, EnhancementStatus, Enrollment, EnrollmentStatus, LeadId,
    MessageId, ScheduledMessage, SequenceDefinitionError,
};
use super::store::{NurtureStore, StoreError};

static MESSAGE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_message_id() -> MessageId {
    let id = MESSAGE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    MessageId(format!("msg-{id:06}"))
}

/// Expands an enrollment's next due step into concrete dispatch records.
///
/// Scheduling is decoupled from dispatch so re-enrollment flows and manual
/// retriggers can re-run it at any time: the store's check-and-insert on
/// `(enrollment_id, step_id, channel)` is the sole duplicate-send guard.
pub struct MessageScheduler<S> {
    store: Arc<S>,
}

impl<S> Clone for MessageScheduler<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S> MessageScheduler<S>
where
    S: NurtureStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Materialize pending dispatch records for every active enrollment of
    /// one lead. Returns only newly created records; an empty list is a
    /// valid, non-error outcome and re-invocation never duplicates.
    pub fn schedule_for_lead(
        &self,
        agent_id: &AgentId,
        lead_id: &LeadId,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledMessage>, ScheduleError> {
        let enrollments = self.store.active_enrollments_for_lead(agent_id, lead_id)?;
        let mut created = Vec::new();
        for enrollment in &enrollments {
            created.extend(self.schedule_next_step(enrollment, now)?);
        }
        Ok(created)
    }

    /// Materialize records for the enrollment's next step (the minimum
    /// `step_order > current_step`). Later steps are materialized one at a
    /// time as each send succeeds, so a stalled or failed step never lets a
    /// later one jump the queue. A `both` step yields one email and one sms
    /// record.
    pub fn schedule_next_step(
        &self,
        enrollment: &Enrollment,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledMessage>, ScheduleError> {
        if enrollment.status != EnrollmentStatus::Active {
            return Ok(Vec::new());
        }

        let steps = self
            .store
            .steps_after(&enrollment.sequence_id, enrollment.current_step)?;
        domain::validate_step_window(enrollment.current_step, &steps)?;

        let Some(step) = steps.into_iter().next() else {
            return Ok(Vec::new());
        };

        let scheduled_for = now + Duration::days(i64::from(step.delay_days));
        let mut created = Vec::new();

        for channel in step.channel.expand() {
            let message = ScheduledMessage {
                id: next_message_id(),
                enrollment_id: enrollment.id.clone(),
                step_id: step.id.clone(),
                lead_id: enrollment.lead_id.clone(),
                agent_id: enrollment.agent_id.clone(),
                channel: *channel,
                scheduled_for,
                status: DispatchStatus::Pending,
                subject: step.subject.as_ref().map(|s| s.raw().to_string()),
                message_content: step.message_template.raw().to_string(),
                ai_enhanced: step.use_ai_enhancement,
                enhancement: EnhancementStatus::NotRequested,
                attempts: 0,
                sent_at: None,
                error_message: None,
            };

            if let Some(inserted) = self.store.insert_message_if_absent(message)? {
                debug!(
                    enrollment = %enrollment.id,
                    step = %inserted.step_id,
                    channel = inserted.channel.label(),
                    %scheduled_for,
                    "scheduled dispatch record"
                );
                created.push(inserted);
            }
        }

        Ok(created)
    }
}

/// Error raised while expanding steps into dispatch records.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error(transparent)]
    Definition(#[from] SequenceDefinitionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
