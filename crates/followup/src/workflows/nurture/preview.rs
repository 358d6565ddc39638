use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use super::channels::{ContentEnhancer, PRESERVE_FACTS_HINT};
use super::domain::{AgentId, EnhancementStatus, MessageId};
use super::store::{Directory, NurtureStore, StoreError};
use super::template::{MessageTemplate, TemplateError};

/// What the agent will see in the UI before (or without) sending.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePreview {
    pub message_id: MessageId,
    pub original_template: String,
    pub rendered_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub enhancement: EnhancementStatus,
}

/// Non-mutating rendering path: performs the same rendering and optional
/// enhancement as dispatch, with no delivery and no state writes.
pub struct PreviewService<S> {
    store: Arc<S>,
    directory: Arc<dyn Directory>,
    enhancer: Arc<dyn ContentEnhancer>,
}

impl<S> PreviewService<S>
where
    S: NurtureStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        directory: Arc<dyn Directory>,
        enhancer: Arc<dyn ContentEnhancer>,
    ) -> Self {
        Self {
            store,
            directory,
            enhancer,
        }
    }

    pub fn preview(
        &self,
        agent_id: &AgentId,
        message_id: &MessageId,
    ) -> Result<MessagePreview, PreviewError> {
        let message = self
            .store
            .message(message_id)?
            .ok_or(PreviewError::MessageNotFound)?;
        if message.agent_id != *agent_id {
            return Err(PreviewError::PermissionDenied);
        }

        let lead = self
            .directory
            .lead(&message.lead_id)?
            .ok_or(PreviewError::LeadNotFound)?;
        let agent = match self.directory.agent(agent_id) {
            Ok(profile) => profile,
            Err(err) => {
                warn!(agent = %agent_id, %err, "agent profile lookup failed during preview");
                None
            }
        };

        let template = MessageTemplate::parse(&message.message_content)?;
        let rendered = template.render(&lead, agent.as_ref());
        let subject = message
            .subject
            .as_deref()
            .map(MessageTemplate::parse)
            .transpose()?
            .map(|s| s.render(&lead, agent.as_ref()));

        let (rendered_content, enhancement) = if message.ai_enhanced {
            match self.enhancer.try_enhance(&rendered, PRESERVE_FACTS_HINT) {
                Ok(enhanced) => (enhanced, EnhancementStatus::Applied),
                Err(err) => {
                    warn!(message = %message.id, %err, "enhancement unavailable during preview");
                    (rendered, EnhancementStatus::Fallback)
                }
            }
        } else {
            (rendered, EnhancementStatus::NotRequested)
        };

        Ok(MessagePreview {
            message_id: message.id,
            original_template: message.message_content,
            rendered_content,
            subject,
            enhancement,
        })
    }
}

/// Error raised by the preview path.
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("scheduled message not found")]
    MessageNotFound,
    #[error("lead not found in directory")]
    LeadNotFound,
    #[error("resource belongs to another agent")]
    PermissionDenied,
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
