//! In-memory collaborator adapters backing the demo server and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::domain::{
    AgentId, AgentProfile, DispatchStatus, Enrollment, EnrollmentId, EnrollmentStatus,
    LeadContact, LeadId, MessageId, ScheduledMessage, Sequence, SequenceId, SequenceStep,
};
use super::store::{Directory, NurtureStore, StoreError};

#[derive(Default)]
struct StoreInner {
    sequences: HashMap<SequenceId, Sequence>,
    steps: HashMap<SequenceId, Vec<SequenceStep>>,
    enrollments: HashMap<EnrollmentId, Enrollment>,
    // Vec keeps insertion order: the due-query tie-break.
    messages: Vec<ScheduledMessage>,
}

/// Single-lock store. Every trait method runs under one mutex acquisition,
/// which gives the check-and-insert and conditional-transition contracts
/// their atomicity.
#[derive(Default)]
pub struct InMemoryNurtureStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryNurtureStore {
    /// Snapshot of every dispatch record, in insertion order.
    pub fn messages_snapshot(&self) -> Vec<ScheduledMessage> {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .messages
            .clone()
    }

    pub fn messages_for_enrollment(&self, enrollment_id: &EnrollmentId) -> Vec<ScheduledMessage> {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .messages
            .iter()
            .filter(|message| message.enrollment_id == *enrollment_id)
            .cloned()
            .collect()
    }
}

impl NurtureStore for InMemoryNurtureStore {
    fn insert_sequence(
        &self,
        sequence: Sequence,
        steps: Vec<SequenceStep>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        if inner.sequences.contains_key(&sequence.id) {
            return Err(StoreError::Conflict);
        }
        inner.steps.insert(sequence.id.clone(), steps);
        inner.sequences.insert(sequence.id.clone(), sequence);
        Ok(())
    }

    fn sequence(&self, id: &SequenceId) -> Result<Option<Sequence>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.sequences.get(id).cloned())
    }

    fn steps_after(
        &self,
        sequence_id: &SequenceId,
        threshold: u32,
    ) -> Result<Vec<SequenceStep>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let mut steps: Vec<SequenceStep> = inner
            .steps
            .get(sequence_id)
            .map(|steps| {
                steps
                    .iter()
                    .filter(|step| step.step_order > threshold)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        steps.sort_by_key(|step| step.step_order);
        Ok(steps)
    }

    fn insert_enrollment(&self, enrollment: Enrollment) -> Result<Enrollment, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let duplicate = inner.enrollments.values().any(|existing| {
            existing.lead_id == enrollment.lead_id
                && existing.sequence_id == enrollment.sequence_id
                && existing.status == EnrollmentStatus::Active
        });
        if duplicate || inner.enrollments.contains_key(&enrollment.id) {
            return Err(StoreError::Conflict);
        }
        inner
            .enrollments
            .insert(enrollment.id.clone(), enrollment.clone());
        Ok(enrollment)
    }

    fn enrollment(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.enrollments.get(id).cloned())
    }

    fn active_enrollments_for_lead(
        &self,
        agent_id: &AgentId,
        lead_id: &LeadId,
    ) -> Result<Vec<Enrollment>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let mut enrollments: Vec<Enrollment> = inner
            .enrollments
            .values()
            .filter(|enrollment| {
                enrollment.agent_id == *agent_id
                    && enrollment.lead_id == *lead_id
                    && enrollment.status == EnrollmentStatus::Active
            })
            .cloned()
            .collect();
        enrollments.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(enrollments)
    }

    fn update_enrollment(
        &self,
        expected_step: u32,
        enrollment: Enrollment,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let stored = inner
            .enrollments
            .get_mut(&enrollment.id)
            .ok_or(StoreError::NotFound)?;
        if stored.current_step != expected_step {
            return Err(StoreError::Conflict);
        }
        *stored = enrollment;
        Ok(())
    }

    fn insert_message_if_absent(
        &self,
        message: ScheduledMessage,
    ) -> Result<Option<ScheduledMessage>, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let exists = inner.messages.iter().any(|existing| {
            existing.enrollment_id == message.enrollment_id
                && existing.step_id == message.step_id
                && existing.channel == message.channel
        });
        if exists {
            return Ok(None);
        }
        inner.messages.push(message.clone());
        Ok(Some(message))
    }

    fn message(&self, id: &MessageId) -> Result<Option<ScheduledMessage>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner
            .messages
            .iter()
            .find(|message| message.id == *id)
            .cloned())
    }

    fn claim_due(
        &self,
        agent_id: &AgentId,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledMessage>, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");

        let mut due: Vec<usize> = inner
            .messages
            .iter()
            .enumerate()
            .filter(|(_, message)| {
                message.agent_id == *agent_id
                    && message.status == DispatchStatus::Pending
                    && message.scheduled_for <= now
            })
            .map(|(index, _)| index)
            .collect();
        // Stable sort on scheduled_for keeps insertion order for ties.
        due.sort_by_key(|&index| inner.messages[index].scheduled_for);
        due.truncate(limit);

        let mut claimed = Vec::with_capacity(due.len());
        for index in due {
            let message = &mut inner.messages[index];
            message.status = DispatchStatus::Sending;
            claimed.push(message.clone());
        }
        Ok(claimed)
    }

    fn complete_message(&self, message: ScheduledMessage) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let stored = inner
            .messages
            .iter_mut()
            .find(|existing| existing.id == message.id)
            .ok_or(StoreError::NotFound)?;
        *stored = message;
        Ok(())
    }
}

#[derive(Default)]
struct DirectoryInner {
    leads: HashMap<LeadId, LeadContact>,
    agents: HashMap<AgentId, AgentProfile>,
}

/// In-memory lead/agent directory with registration helpers for seeding.
#[derive(Default)]
pub struct InMemoryDirectory {
    inner: Mutex<DirectoryInner>,
}

impl InMemoryDirectory {
    pub fn insert_lead(&self, lead: LeadContact) {
        let mut inner = self.inner.lock().expect("directory mutex poisoned");
        inner.leads.insert(lead.id.clone(), lead);
    }

    pub fn insert_agent(&self, agent: AgentProfile) {
        let mut inner = self.inner.lock().expect("directory mutex poisoned");
        inner.agents.insert(agent.id.clone(), agent);
    }

    pub fn remove_lead(&self, id: &LeadId) {
        let mut inner = self.inner.lock().expect("directory mutex poisoned");
        inner.leads.remove(id);
    }
}

impl Directory for InMemoryDirectory {
    fn lead(&self, id: &LeadId) -> Result<Option<LeadContact>, StoreError> {
        let inner = self.inner.lock().expect("directory mutex poisoned");
        Ok(inner.leads.get(id).cloned())
    }

    fn agent(&self, id: &AgentId) -> Result<Option<AgentProfile>, StoreError> {
        let inner = self.inner.lock().expect("directory mutex poisoned");
        Ok(inner.agents.get(id).cloned())
    }

    fn messaging_agents(&self) -> Result<Vec<AgentId>, StoreError> {
        let inner = self.inner.lock().expect("directory mutex poisoned");
        let mut agents: Vec<AgentId> = inner
            .agents
            .values()
            .filter(|agent| agent.messaging_enabled)
            .map(|agent| agent.id.clone())
            .collect();
        agents.sort();
        Ok(agents)
    }
}
