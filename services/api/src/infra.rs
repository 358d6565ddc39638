use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use followup::workflows::nurture::memory::InMemoryDirectory;
use followup::workflows::nurture::{
    AgentId, AgentProfile, ContentEnhancer, DeliveryError, DeliveryReceipt, EmailSender,
    EnhancerError, LeadContact, LeadId, SmsSender,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) cron_secret: Option<String>,
}

/// Email adapter that logs instead of delivering. Stands in for the SMTP
/// integration in local and demo runs.
#[derive(Default)]
pub(crate) struct LoggingEmailSender {
    counter: AtomicU64,
}

impl EmailSender for LoggingEmailSender {
    fn send_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        info!(%to, %subject, body_len = body.len(), "email dispatched (logging transport)");
        Ok(DeliveryReceipt {
            provider_message_id: format!("log-email-{id:06}"),
        })
    }
}

#[derive(Default)]
pub(crate) struct LoggingSmsSender {
    counter: AtomicU64,
}

impl SmsSender for LoggingSmsSender {
    fn send_sms(&self, to: &str, body: &str) -> Result<DeliveryReceipt, DeliveryError> {
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        info!(%to, body_len = body.len(), "sms dispatched (logging transport)");
        Ok(DeliveryReceipt {
            provider_message_id: format!("log-sms-{id:06}"),
        })
    }
}

/// Enhancer that returns the rendered text untouched. Local runs exercise
/// the full dispatch path without an LLM integration.
pub(crate) struct PassthroughEnhancer;

impl ContentEnhancer for PassthroughEnhancer {
    fn try_enhance(&self, text: &str, _intent_hint: &str) -> Result<String, EnhancerError> {
        Ok(text.to_string())
    }
}

pub(crate) struct SeededDirectory {
    pub(crate) directory: Arc<InMemoryDirectory>,
    pub(crate) agent: AgentId,
    pub(crate) lead: LeadId,
}

/// Directory with one messaging-enabled agent and one contactable lead, so
/// the service is exercisable immediately after startup.
pub(crate) fn seeded_directory() -> SeededDirectory {
    let directory = Arc::new(InMemoryDirectory::default());

    let agent = AgentId("agent-demo".to_string());
    directory.insert_agent(AgentProfile {
        id: agent.clone(),
        name: "Jordan Avery".to_string(),
        signature: "Jordan Avery, Meridian Realty Group".to_string(),
        messaging_enabled: true,
    });

    let lead = LeadId("lead-demo".to_string());
    directory.insert_lead(LeadContact {
        id: lead.clone(),
        first_name: "Casey".to_string(),
        last_name: "Nguyen".to_string(),
        email: Some("casey.nguyen@example.com".to_string()),
        phone: Some("+15155550177".to_string()),
        property_address: Some("27 Alder Point Dr".to_string()),
    });

    SeededDirectory {
        directory,
        agent,
        lead,
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
