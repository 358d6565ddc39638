use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};

use crate::workflows::nurture::authoring::{SequenceDraft, StepDraft};
use crate::workflows::nurture::channels::{
    ContentEnhancer, DeliveryError, DeliveryReceipt, EmailSender, EnhancerError, SmsSender,
};
use crate::workflows::nurture::dispatch::DispatchConfig;
use crate::workflows::nurture::domain::{
    AgentId, AgentProfile, Enrollment, EnrollmentId, LeadContact, LeadId, MessageId,
    ScheduledMessage, Sequence, SequenceId, SequenceStep, StepChannel,
};
use crate::workflows::nurture::engine::NurtureEngine;
use crate::workflows::nurture::memory::{InMemoryDirectory, InMemoryNurtureStore};
use crate::workflows::nurture::store::{NurtureStore, StoreError};

pub(super) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).single().expect("valid timestamp")
}

pub(super) fn agent_id() -> AgentId {
    AgentId("agent-100".to_string())
}

pub(super) fn other_agent_id() -> AgentId {
    AgentId("agent-200".to_string())
}

pub(super) fn lead_id() -> LeadId {
    LeadId("lead-500".to_string())
}

pub(super) fn agent_profile(id: &AgentId) -> AgentProfile {
    AgentProfile {
        id: id.clone(),
        name: "Morgan Reyes".to_string(),
        signature: "Morgan Reyes, Lakeshore Realty".to_string(),
        messaging_enabled: true,
    }
}

pub(super) fn lead_contact(id: &LeadId) -> LeadContact {
    LeadContact {
        id: id.clone(),
        first_name: "Dana".to_string(),
        last_name: "Whitfield".to_string(),
        email: Some("dana@example.com".to_string()),
        phone: Some("+15155550134".to_string()),
        property_address: Some("412 Maple Ct".to_string()),
    }
}

/// The two-step reference sequence: immediate email, then sms three days
/// later.
pub(super) fn two_step_draft() -> SequenceDraft {
    SequenceDraft {
        name: "New buyer nurture".to_string(),
        description: "Post-showing follow-up".to_string(),
        is_active: true,
        steps: vec![
            StepDraft {
                step_order: 1,
                delay_days: 0,
                channel: StepChannel::Email,
                subject: Some("Thanks for touring {property_address}".to_string()),
                message_template: "Hi {first_name}, great meeting you! {agent_signature}"
                    .to_string(),
                use_ai_enhancement: false,
            },
            StepDraft {
                step_order: 2,
                delay_days: 3,
                channel: StepChannel::Sms,
                subject: None,
                message_template: "Hi {first_name}, any questions about the listing?".to_string(),
                use_ai_enhancement: false,
            },
        ],
    }
}

pub(super) fn both_channel_draft() -> SequenceDraft {
    SequenceDraft {
        name: "Open house blast".to_string(),
        description: String::new(),
        is_active: true,
        steps: vec![StepDraft {
            step_order: 1,
            delay_days: 0,
            channel: StepChannel::Both,
            subject: Some("Open house this weekend".to_string()),
            message_template: "Hi {first_name}, join us Saturday.".to_string(),
            use_ai_enhancement: false,
        }],
    }
}

pub(super) fn enhanced_draft() -> SequenceDraft {
    SequenceDraft {
        name: "Warm check-in".to_string(),
        description: String::new(),
        is_active: true,
        steps: vec![StepDraft {
            step_order: 1,
            delay_days: 0,
            channel: StepChannel::Email,
            subject: Some("Checking in".to_string()),
            message_template: "Hi {first_name}, just checking in.".to_string(),
            use_ai_enhancement: true,
        }],
    }
}

#[derive(Default)]
pub(super) struct RecordingEmailSender {
    sent: Mutex<Vec<(String, String, String)>>,
    fail_times: Mutex<u32>,
}

impl RecordingEmailSender {
    pub(super) fn failing(times: u32) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_times: Mutex::new(times),
        }
    }

    pub(super) fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().expect("sender mutex poisoned").clone()
    }
}

impl EmailSender for RecordingEmailSender {
    fn send_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let mut remaining = self.fail_times.lock().expect("sender mutex poisoned");
        if *remaining > 0 {
            *remaining -= 1;
            return Err(DeliveryError::Timeout("smtp relay timed out".to_string()));
        }
        let mut sent = self.sent.lock().expect("sender mutex poisoned");
        sent.push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(DeliveryReceipt {
            provider_message_id: format!("email-{}", sent.len()),
        })
    }
}

#[derive(Default)]
pub(super) struct RecordingSmsSender {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSmsSender {
    pub(super) fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("sender mutex poisoned").clone()
    }
}

impl SmsSender for RecordingSmsSender {
    fn send_sms(&self, to: &str, body: &str) -> Result<DeliveryReceipt, DeliveryError> {
        let mut sent = self.sent.lock().expect("sender mutex poisoned");
        sent.push((to.to_string(), body.to_string()));
        Ok(DeliveryReceipt {
            provider_message_id: format!("sms-{}", sent.len()),
        })
    }
}

/// Decorates text so tests can tell enhanced output from the plain render.
pub(super) struct DecoratingEnhancer;

impl ContentEnhancer for DecoratingEnhancer {
    fn try_enhance(&self, text: &str, _intent_hint: &str) -> Result<String, EnhancerError> {
        Ok(format!("{text} Warm regards!"))
    }
}

pub(super) struct UnavailableEnhancer;

impl ContentEnhancer for UnavailableEnhancer {
    fn try_enhance(&self, _text: &str, _intent_hint: &str) -> Result<String, EnhancerError> {
        Err(EnhancerError::Unavailable("upstream timeout".to_string()))
    }
}

pub(super) struct Fixture {
    pub(super) store: Arc<InMemoryNurtureStore>,
    pub(super) directory: Arc<InMemoryDirectory>,
    pub(super) email: Arc<RecordingEmailSender>,
    pub(super) sms: Arc<RecordingSmsSender>,
    pub(super) engine: NurtureEngine<InMemoryNurtureStore>,
}

pub(super) fn fixture() -> Fixture {
    fixture_with(
        Arc::new(DecoratingEnhancer),
        Arc::new(RecordingEmailSender::default()),
        DispatchConfig::default(),
    )
}

pub(super) fn fixture_with(
    enhancer: Arc<dyn ContentEnhancer>,
    email: Arc<RecordingEmailSender>,
    config: DispatchConfig,
) -> Fixture {
    let store = Arc::new(InMemoryNurtureStore::default());
    let directory = Arc::new(InMemoryDirectory::default());
    let sms = Arc::new(RecordingSmsSender::default());

    directory.insert_agent(agent_profile(&agent_id()));
    directory.insert_agent(agent_profile(&other_agent_id()));
    directory.insert_lead(lead_contact(&lead_id()));

    let engine = NurtureEngine::new(
        store.clone(),
        directory.clone(),
        enhancer,
        email.clone(),
        sms.clone(),
        config,
    );

    Fixture {
        store,
        directory,
        email,
        sms,
        engine,
    }
}

/// Store wrapper with injectable faults for outage scenarios. Everything
/// passes through to an in-memory store except the configured failure.
pub(super) struct FaultyStore {
    pub(super) inner: InMemoryNurtureStore,
    claims_refused_for: Option<AgentId>,
    enrollment_read_failures: Mutex<u32>,
}

impl FaultyStore {
    /// Every `claim_due` call for the given agent fails.
    pub(super) fn refusing_claims_for(agent: AgentId) -> Self {
        Self {
            inner: InMemoryNurtureStore::default(),
            claims_refused_for: Some(agent),
            enrollment_read_failures: Mutex::new(0),
        }
    }

    /// The next `times` enrollment lookups fail, then reads recover.
    pub(super) fn failing_enrollment_reads(times: u32) -> Self {
        Self {
            inner: InMemoryNurtureStore::default(),
            claims_refused_for: None,
            enrollment_read_failures: Mutex::new(times),
        }
    }
}

impl NurtureStore for FaultyStore {
    fn insert_sequence(
        &self,
        sequence: Sequence,
        steps: Vec<SequenceStep>,
    ) -> Result<(), StoreError> {
        self.inner.insert_sequence(sequence, steps)
    }

    fn sequence(&self, id: &SequenceId) -> Result<Option<Sequence>, StoreError> {
        self.inner.sequence(id)
    }

    fn steps_after(
        &self,
        sequence_id: &SequenceId,
        threshold: u32,
    ) -> Result<Vec<SequenceStep>, StoreError> {
        self.inner.steps_after(sequence_id, threshold)
    }

    fn insert_enrollment(&self, enrollment: Enrollment) -> Result<Enrollment, StoreError> {
        self.inner.insert_enrollment(enrollment)
    }

    fn enrollment(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, StoreError> {
        let mut remaining = self
            .enrollment_read_failures
            .lock()
            .expect("store mutex poisoned");
        if *remaining > 0 {
            *remaining -= 1;
            return Err(StoreError::Unavailable(
                "enrollment lookup offline".to_string(),
            ));
        }
        drop(remaining);
        self.inner.enrollment(id)
    }

    fn active_enrollments_for_lead(
        &self,
        agent_id: &AgentId,
        lead_id: &LeadId,
    ) -> Result<Vec<Enrollment>, StoreError> {
        self.inner.active_enrollments_for_lead(agent_id, lead_id)
    }

    fn update_enrollment(
        &self,
        expected_step: u32,
        enrollment: Enrollment,
    ) -> Result<(), StoreError> {
        self.inner.update_enrollment(expected_step, enrollment)
    }

    fn insert_message_if_absent(
        &self,
        message: ScheduledMessage,
    ) -> Result<Option<ScheduledMessage>, StoreError> {
        self.inner.insert_message_if_absent(message)
    }

    fn message(&self, id: &MessageId) -> Result<Option<ScheduledMessage>, StoreError> {
        self.inner.message(id)
    }

    fn claim_due(
        &self,
        agent_id: &AgentId,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledMessage>, StoreError> {
        if self.claims_refused_for.as_ref() == Some(agent_id) {
            return Err(StoreError::Unavailable("partition offline".to_string()));
        }
        self.inner.claim_due(agent_id, now, limit)
    }

    fn complete_message(&self, message: ScheduledMessage) -> Result<(), StoreError> {
        self.inner.complete_message(message)
    }
}

/// Author the reference sequence for the fixture agent.
pub(super) fn create_sequence(fixture: &Fixture, draft: SequenceDraft) -> (Sequence, Vec<SequenceStep>) {
    fixture
        .engine
        .create_sequence(&agent_id(), draft)
        .expect("sequence authors cleanly")
}
