use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::channels::{ContentEnhancer, EmailSender, SmsSender, PRESERVE_FACTS_HINT};
use super::domain::{
    AgentId, AgentProfile, DispatchChannel, DispatchStatus, EnhancementStatus, LeadContact,
    MessageId, ScheduledMessage,
};
use super::enrollment::{EnrollmentError, EnrollmentTracker};
use super::scheduler::{MessageScheduler, ScheduleError};
use super::store::{Directory, NurtureStore, StoreError};
use super::template::MessageTemplate;

/// Tuning for a single dispatch batch.
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    /// Maximum records claimed per `process_pending` call.
    pub batch_limit: usize,
    /// Delivery attempts before a record is terminally failed.
    pub max_attempts: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_limit: 50,
            max_attempts: 3,
        }
    }
}

/// Per-record outcome surfaced for observability.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub message_id: MessageId,
    pub status: DispatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one agent-scoped batch run.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub agent_id: AgentId,
    pub outcomes: Vec<DispatchOutcome>,
}

impl DispatchReport {
    pub fn sent_count(&self) -> usize {
        self.count(DispatchStatus::Sent)
    }

    pub fn failed_count(&self) -> usize {
        self.count(DispatchStatus::Failed)
    }

    /// Records returned to `Pending` for a later retry pass.
    pub fn retried_count(&self) -> usize {
        self.count(DispatchStatus::Pending)
    }

    fn count(&self, status: DispatchStatus) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == status)
            .count()
    }
}

/// Pulls due dispatch records, renders and optionally enhances their
/// content, attempts delivery, and advances the owning enrollment.
///
/// Records within one batch are handled strictly one at a time, oldest
/// `scheduled_for` first, so rate-limited delivery providers never see a
/// burst and enrollment advancement never races against itself.
pub struct DispatchProcessor<S> {
    store: Arc<S>,
    directory: Arc<dyn Directory>,
    enhancer: Arc<dyn ContentEnhancer>,
    email: Arc<dyn EmailSender>,
    sms: Arc<dyn SmsSender>,
    tracker: EnrollmentTracker<S>,
    scheduler: MessageScheduler<S>,
    config: DispatchConfig,
}

impl<S> DispatchProcessor<S>
where
    S: NurtureStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        directory: Arc<dyn Directory>,
        enhancer: Arc<dyn ContentEnhancer>,
        email: Arc<dyn EmailSender>,
        sms: Arc<dyn SmsSender>,
        config: DispatchConfig,
    ) -> Self {
        let tracker = EnrollmentTracker::new(store.clone());
        let scheduler = MessageScheduler::new(store.clone());
        Self {
            store,
            directory,
            enhancer,
            email,
            sms,
            tracker,
            scheduler,
            config,
        }
    }

    /// Process up to `batch_limit` due records for one agent.
    ///
    /// Individual record failures are captured on the record itself and in
    /// the returned report; only store unavailability aborts the batch, and
    /// unprocessed records stay `Pending` for the next pass.
    pub fn process_pending(
        &self,
        agent_id: &AgentId,
        now: DateTime<Utc>,
    ) -> Result<DispatchReport, DispatchError> {
        let due = self
            .store
            .claim_due(agent_id, now, self.config.batch_limit)?;
        debug!(agent = %agent_id, claimed = due.len(), "processing due dispatch records");

        let mut outcomes = Vec::with_capacity(due.len());
        let mut queue = due.into_iter();
        while let Some(message) = queue.next() {
            match self.dispatch_one(message, now) {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    // Claimed records behind the failure go back to Pending
                    // so the next pass retries them instead of stranding
                    // them in Sending.
                    for unprocessed in queue {
                        self.release(unprocessed);
                    }
                    return Err(err);
                }
            }
        }

        Ok(DispatchReport {
            agent_id: agent_id.clone(),
            outcomes,
        })
    }

    fn dispatch_one(
        &self,
        message: ScheduledMessage,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, DispatchError> {
        // A cancel or completion that raced ahead of this record wins: the
        // record was claimed, but its enrollment no longer wants the send.
        let enrollment_active = match self.store.enrollment(&message.enrollment_id) {
            Ok(enrollment) => enrollment.is_some_and(|e| !e.status.is_terminal()),
            Err(err) => return Err(self.release_on_error(message, err.into())),
        };
        if !enrollment_active {
            return self.fail_terminal(message, "enrollment no longer active".to_string());
        }

        let lead = match self.directory.lead(&message.lead_id) {
            Ok(Some(lead)) => lead,
            Ok(None) => {
                return self.fail_terminal(message, "lead not found in directory".to_string());
            }
            Err(err) => return Err(self.release_on_error(message, err.into())),
        };

        // Best effort: a missing profile only degrades signature content.
        let agent_profile = self.agent_profile(&message.agent_id);

        let template = match MessageTemplate::parse(&message.message_content) {
            Ok(template) => template,
            Err(err) => {
                return self.fail_terminal(message, format!("stored template invalid: {err}"));
            }
        };
        let rendered = template.render(&lead, agent_profile.as_ref());
        let subject = self.render_subject(&message, &lead, agent_profile.as_ref());

        let (body, enhancement) = if message.ai_enhanced {
            match self.enhancer.try_enhance(&rendered, PRESERVE_FACTS_HINT) {
                Ok(enhanced) => (enhanced, EnhancementStatus::Applied),
                Err(err) => {
                    warn!(message = %message.id, %err, "content enhancement unavailable, sending unenhanced text");
                    (rendered, EnhancementStatus::Fallback)
                }
            }
        } else {
            (rendered, EnhancementStatus::NotRequested)
        };

        let delivery = match message.channel {
            DispatchChannel::Email => match lead.email.as_deref() {
                Some(to) => self.email.send_email(to, subject.as_deref().unwrap_or(""), &body),
                None => {
                    return self.fail_terminal(message, "lead has no email address".to_string());
                }
            },
            DispatchChannel::Sms => match lead.phone.as_deref() {
                Some(to) => self.sms.send_sms(to, &body),
                None => {
                    return self.fail_terminal(message, "lead has no phone number".to_string());
                }
            },
        };

        let mut message = message;
        message.attempts += 1;
        message.enhancement = enhancement;

        match delivery {
            Ok(receipt) => {
                message.status = DispatchStatus::Sent;
                message.sent_at = Some(now);
                // Persist the final rendered content for audit.
                message.message_content = body;
                message.subject = subject;
                message.error_message = None;
                // A failed write-back after a successful send stays claimed:
                // releasing it to Pending would send the lead a duplicate.
                self.store.complete_message(message.clone())?;
                debug!(
                    message = %message.id,
                    channel = message.channel.label(),
                    provider_id = %receipt.provider_message_id,
                    "dispatched"
                );

                self.advance_enrollment(&message, now)?;

                Ok(DispatchOutcome {
                    message_id: message.id,
                    status: DispatchStatus::Sent,
                    error: None,
                })
            }
            Err(err) => {
                let detail = err.to_string();
                message.error_message = Some(detail.clone());
                if message.attempts >= self.config.max_attempts {
                    message.status = DispatchStatus::Failed;
                } else {
                    // Linear backoff at day granularity: one extra day per
                    // attempt already made.
                    message.status = DispatchStatus::Pending;
                    message.scheduled_for = now + Duration::days(i64::from(message.attempts));
                }
                let status = message.status;
                if let Err(store_err) = self.store.complete_message(message.clone()) {
                    return Err(self.release_on_error(message, store_err.into()));
                }
                warn!(
                    message = %message.id,
                    attempts = message.attempts,
                    status = status.label(),
                    error = %detail,
                    "delivery failed"
                );

                Ok(DispatchOutcome {
                    message_id: message.id,
                    status,
                    error: Some(detail),
                })
            }
        }
    }

    /// Advance the owning enrollment past the sent step, then materialize
    /// the next step's records so the sequence never stalls. Advancement
    /// bookkeeping failures are logged but never undo a completed send;
    /// store unavailability still aborts the batch.
    ///
    /// For a `both` step the first sibling to deliver advances the
    /// enrollment; the other sibling keeps its own retry schedule, and its
    /// later success is a no-op advance (the idempotent next-step insert
    /// prevents duplicates).
    fn advance_enrollment(
        &self,
        message: &ScheduledMessage,
        now: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let Some(enrollment) = self.store.enrollment(&message.enrollment_id)? else {
            warn!(message = %message.id, enrollment = %message.enrollment_id, "enrollment missing after send");
            return Ok(());
        };

        let steps = self.store.steps_after(&enrollment.sequence_id, 0)?;
        let Some(step_order) = steps
            .iter()
            .find(|step| step.id == message.step_id)
            .map(|step| step.step_order)
        else {
            warn!(message = %message.id, step = %message.step_id, "sent step no longer present in sequence");
            return Ok(());
        };

        let updated = match self.tracker.advance(&enrollment.id, step_order, now) {
            Ok(updated) => updated,
            Err(EnrollmentError::Store(err)) => return Err(err.into()),
            Err(err) => {
                warn!(enrollment = %enrollment.id, %err, "enrollment did not advance");
                return Ok(());
            }
        };

        match self.scheduler.schedule_next_step(&updated, now) {
            Ok(_) => Ok(()),
            Err(ScheduleError::Store(err)) => Err(err.into()),
            Err(err) => {
                warn!(enrollment = %updated.id, %err, "next step could not be scheduled");
                Ok(())
            }
        }
    }

    fn fail_terminal(
        &self,
        mut message: ScheduledMessage,
        reason: String,
    ) -> Result<DispatchOutcome, DispatchError> {
        message.status = DispatchStatus::Failed;
        message.attempts += 1;
        message.error_message = Some(reason.clone());
        message.sent_at = None;
        if let Err(err) = self.store.complete_message(message.clone()) {
            return Err(self.release_on_error(message, err.into()));
        }
        warn!(message = %message.id, error = %reason, "dispatch failed terminally");
        Ok(DispatchOutcome {
            message_id: message.id,
            status: DispatchStatus::Failed,
            error: Some(reason),
        })
    }

    /// Put a claimed record back to `Pending` so a later pass can claim it
    /// again. Only called on paths where nothing has been delivered for the
    /// record, so re-claiming cannot double-send. Best effort: if the store
    /// is down the release fails too, and the record surfaces through the
    /// batch error instead.
    fn release(&self, mut message: ScheduledMessage) {
        message.status = DispatchStatus::Pending;
        if let Err(err) = self.store.complete_message(message.clone()) {
            warn!(message = %message.id, %err, "claimed record could not be released");
        }
    }

    fn release_on_error(&self, message: ScheduledMessage, err: DispatchError) -> DispatchError {
        self.release(message);
        err
    }

    fn agent_profile(&self, agent_id: &AgentId) -> Option<AgentProfile> {
        match self.directory.agent(agent_id) {
            Ok(profile) => profile,
            Err(err) => {
                warn!(agent = %agent_id, %err, "agent profile lookup failed, degrading signature");
                None
            }
        }
    }

    fn render_subject(
        &self,
        message: &ScheduledMessage,
        lead: &LeadContact,
        agent: Option<&AgentProfile>,
    ) -> Option<String> {
        let raw = message.subject.as_deref()?;
        match MessageTemplate::parse(raw) {
            Ok(template) => Some(template.render(lead, agent)),
            Err(err) => {
                warn!(message = %message.id, %err, "stored subject invalid, sending raw subject");
                Some(raw.to_string())
            }
        }
    }
}

/// Error fatal to a whole batch invocation. Per-record failures are never
/// raised; they are captured in the [`DispatchReport`].
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
}
