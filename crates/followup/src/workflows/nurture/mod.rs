//! Lead follow-up sequence scheduling: enrollment, step expansion,
//! dispatch, preview, and cross-agent orchestration.

pub mod authoring;
pub mod channels;
pub mod dispatch;
pub mod domain;
pub mod engine;
pub mod enrollment;
pub mod memory;
pub mod orchestrator;
pub mod preview;
pub mod scheduler;
pub mod store;
pub mod template;

#[cfg(test)]
mod tests;

pub use authoring::{AuthoringError, SequenceAuthoring, SequenceDraft, StepDraft};
pub use channels::{
    ContentEnhancer, DeliveryError, DeliveryReceipt, EmailSender, EnhancerError, SmsSender,
};
pub use dispatch::{DispatchConfig, DispatchError, DispatchOutcome, DispatchProcessor, DispatchReport};
pub use domain::{
    AgentId, AgentProfile, DispatchChannel, DispatchStatus, EnhancementStatus, Enrollment,
    EnrollmentId, EnrollmentStatus, EnrollmentStatusView, LeadContact, LeadId, MessageId,
    ScheduledMessage, Sequence, SequenceDefinitionError, SequenceId, SequenceStep, StepChannel,
    StepId,
};
pub use engine::NurtureEngine;
pub use enrollment::{EnrollmentError, EnrollmentTracker};
pub use orchestrator::{AgentRunReport, BatchOrchestrator, OrchestratorReport};
pub use preview::{MessagePreview, PreviewError, PreviewService};
pub use scheduler::{MessageScheduler, ScheduleError};
pub use store::{Directory, NurtureStore, StoreError};
pub use template::{MessageTemplate, Placeholder, TemplateError};
