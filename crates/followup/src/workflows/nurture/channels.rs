use serde::{Deserialize, Serialize};

/// Receipt returned by a channel collaborator on successful delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub provider_message_id: String,
}

/// Delivery failure reported by a channel collaborator. Both variants are
/// retryable by a later batch pass.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("channel rejected message: {0}")]
    Rejected(String),
    #[error("channel timed out: {0}")]
    Timeout(String),
}

pub trait EmailSender: Send + Sync {
    fn send_email(&self, to: &str, subject: &str, body: &str)
        -> Result<DeliveryReceipt, DeliveryError>;
}

pub trait SmsSender: Send + Sync {
    fn send_sms(&self, to: &str, body: &str) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Best-effort content enhancement. Callers always fall back to the
/// unenhanced rendering on failure; enhancement is never a hard dependency.
pub trait ContentEnhancer: Send + Sync {
    fn try_enhance(&self, text: &str, intent_hint: &str) -> Result<String, EnhancerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EnhancerError {
    #[error("enhancement service unavailable: {0}")]
    Unavailable(String),
    #[error("enhancement service rate limited")]
    RateLimited,
}

/// Instruction passed to the enhancer alongside rendered content.
pub const PRESERVE_FACTS_HINT: &str =
    "Improve tone and engagement while preserving all facts and approximate length.";
