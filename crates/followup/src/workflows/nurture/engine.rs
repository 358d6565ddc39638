use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::authoring::{AuthoringError, SequenceAuthoring, SequenceDraft};
use super::channels::{ContentEnhancer, EmailSender, SmsSender};
use super::dispatch::{DispatchConfig, DispatchError, DispatchProcessor, DispatchReport};
use super::domain::{
    AgentId, Enrollment, EnrollmentId, EnrollmentStatusView, LeadId, MessageId, ScheduledMessage,
    Sequence, SequenceId, SequenceStep,
};
use super::enrollment::{EnrollmentError, EnrollmentTracker};
use super::orchestrator::{BatchOrchestrator, OrchestratorReport};
use super::preview::{MessagePreview, PreviewError, PreviewService};
use super::scheduler::{MessageScheduler, ScheduleError};
use super::store::{Directory, NurtureStore, StoreError};

impl From<ScheduleError> for EnrollmentError {
    fn from(value: ScheduleError) -> Self {
        match value {
            ScheduleError::Definition(err) => Self::Definition(err),
            ScheduleError::Store(err) => Self::Store(err),
        }
    }
}

/// Facade composing the authoring, enrollment, scheduling, dispatch,
/// preview, and orchestration services over one store and one set of
/// collaborators. This is the single entry point held by the API layer.
pub struct NurtureEngine<S> {
    authoring: SequenceAuthoring<S>,
    tracker: EnrollmentTracker<S>,
    scheduler: MessageScheduler<S>,
    preview: PreviewService<S>,
    orchestrator: BatchOrchestrator<S>,
}

impl<S> NurtureEngine<S>
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
        let processor = DispatchProcessor::new(
            store.clone(),
            directory.clone(),
            enhancer.clone(),
            email,
            sms,
            config,
        );
        Self {
            authoring: SequenceAuthoring::new(store.clone()),
            tracker: EnrollmentTracker::new(store.clone()),
            scheduler: MessageScheduler::new(store.clone()),
            preview: PreviewService::new(store, directory.clone(), enhancer),
            orchestrator: BatchOrchestrator::new(processor, directory),
        }
    }

    pub fn create_sequence(
        &self,
        agent_id: &AgentId,
        draft: SequenceDraft,
    ) -> Result<(Sequence, Vec<SequenceStep>), AuthoringError> {
        self.authoring.create_sequence(agent_id, draft)
    }

    pub fn sequence_steps(
        &self,
        agent_id: &AgentId,
        sequence_id: &SequenceId,
    ) -> Result<(Sequence, Vec<SequenceStep>), AuthoringError> {
        self.authoring.sequence_steps(agent_id, sequence_id)
    }

    /// Enroll a lead and immediately materialize the first step's dispatch
    /// records. Returns the enrollment together with the newly created
    /// records.
    pub fn enroll(
        &self,
        agent_id: &AgentId,
        lead_id: &LeadId,
        sequence_id: &SequenceId,
        now: DateTime<Utc>,
    ) -> Result<(Enrollment, Vec<ScheduledMessage>), EnrollmentError> {
        let enrollment = self.tracker.enroll(agent_id, lead_id, sequence_id, now)?;
        let created = self.scheduler.schedule_next_step(&enrollment, now)?;
        Ok((enrollment, created))
    }

    /// Idempotent re-scheduling entry point for re-enrollment flows and
    /// manual retriggers.
    pub fn schedule_for_lead(
        &self,
        agent_id: &AgentId,
        lead_id: &LeadId,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledMessage>, ScheduleError> {
        self.scheduler.schedule_for_lead(agent_id, lead_id, now)
    }

    pub fn enrollment_view(
        &self,
        agent_id: &AgentId,
        enrollment_id: &EnrollmentId,
    ) -> Result<EnrollmentStatusView, EnrollmentError> {
        let enrollment = self.tracker.enrollment(agent_id, enrollment_id)?;
        Ok(enrollment.status_view())
    }

    pub fn cancel_enrollment(
        &self,
        agent_id: &AgentId,
        enrollment_id: &EnrollmentId,
    ) -> Result<EnrollmentStatusView, EnrollmentError> {
        let enrollment = self.tracker.cancel(agent_id, enrollment_id)?;
        Ok(enrollment.status_view())
    }

    pub fn preview(
        &self,
        agent_id: &AgentId,
        message_id: &MessageId,
    ) -> Result<MessagePreview, PreviewError> {
        self.preview.preview(agent_id, message_id)
    }

    pub fn run_for_agent(
        &self,
        agent_id: &AgentId,
        now: DateTime<Utc>,
    ) -> Result<DispatchReport, DispatchError> {
        self.orchestrator.run_for_agent(agent_id, now)
    }

    pub fn run_all_agents(&self, now: DateTime<Utc>) -> Result<OrchestratorReport, StoreError> {
        self.orchestrator.run_all_agents(now)
    }
}
