use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Deserialize;

use super::domain::{
    self, AgentId, Sequence, SequenceDefinitionError, SequenceId, SequenceStep, StepChannel,
    StepId,
};
use super::store::{NurtureStore, StoreError};
use super::template::{MessageTemplate, TemplateError};

static SEQUENCE_COUNTER: AtomicU64 = AtomicU64::new(1);
static STEP_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_sequence_id() -> SequenceId {
    let id = SEQUENCE_COUNTER.fetch_add(1, Ordering::Relaxed);
    SequenceId(format!("seq-{id:06}"))
}

fn next_step_id() -> StepId {
    let id = STEP_COUNTER.fetch_add(1, Ordering::Relaxed);
    StepId(format!("step-{id:06}"))
}

/// Authoring payload for a sequence and its ordered steps.
#[derive(Debug, Clone, Deserialize)]
pub struct SequenceDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub steps: Vec<StepDraft>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepDraft {
    pub step_order: u32,
    pub delay_days: u32,
    pub channel: StepChannel,
    #[serde(default)]
    pub subject: Option<String>,
    pub message_template: String,
    #[serde(default)]
    pub use_ai_enhancement: bool,
}

/// Validates and persists sequence definitions. Templates and step ordering
/// are rejected here, at authoring time, so the dispatch path never meets an
/// unknown placeholder or a gapped step list.
pub struct SequenceAuthoring<S> {
    store: Arc<S>,
}

impl<S> Clone for SequenceAuthoring<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S> SequenceAuthoring<S>
where
    S: NurtureStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn create_sequence(
        &self,
        agent_id: &AgentId,
        draft: SequenceDraft,
    ) -> Result<(Sequence, Vec<SequenceStep>), AuthoringError> {
        let sequence_id = next_sequence_id();
        let mut steps = Vec::with_capacity(draft.steps.len());

        for step in draft.steps {
            let message_template = MessageTemplate::parse(&step.message_template)?;
            let subject = step
                .subject
                .as_deref()
                .map(MessageTemplate::parse)
                .transpose()?;

            steps.push(SequenceStep {
                id: next_step_id(),
                sequence_id: sequence_id.clone(),
                step_order: step.step_order,
                delay_days: step.delay_days,
                channel: step.channel,
                subject,
                message_template,
                use_ai_enhancement: step.use_ai_enhancement,
            });
        }

        domain::validate_step_order(&steps)?;

        let sequence = Sequence {
            id: sequence_id,
            agent_id: agent_id.clone(),
            name: draft.name,
            description: draft.description,
            is_active: draft.is_active,
        };

        self.store
            .insert_sequence(sequence.clone(), steps.clone())?;
        Ok((sequence, steps))
    }

    pub fn sequence_steps(
        &self,
        agent_id: &AgentId,
        sequence_id: &SequenceId,
    ) -> Result<(Sequence, Vec<SequenceStep>), AuthoringError> {
        let sequence = self
            .store
            .sequence(sequence_id)?
            .ok_or(AuthoringError::SequenceNotFound)?;
        if sequence.agent_id != *agent_id {
            return Err(AuthoringError::PermissionDenied);
        }
        let steps = self.store.steps_after(sequence_id, 0)?;
        Ok((sequence, steps))
    }
}

/// Error raised while authoring a sequence.
#[derive(Debug, thiserror::Error)]
pub enum AuthoringError {
    #[error("sequence not found")]
    SequenceNotFound,
    #[error("resource belongs to another agent")]
    PermissionDenied,
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Definition(#[from] SequenceDefinitionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
