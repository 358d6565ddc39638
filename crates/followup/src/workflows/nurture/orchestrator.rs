use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use super::dispatch::{DispatchError, DispatchProcessor, DispatchReport};
use super::domain::AgentId;
use super::store::{Directory, NurtureStore, StoreError};

/// Summary of one agent's batch inside an all-agents run.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRunReport {
    pub agent_id: AgentId,
    pub sent: usize,
    pub failed: usize,
    pub retried: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a scheduled all-agents pass.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorReport {
    pub runs: Vec<AgentRunReport>,
}

impl OrchestratorReport {
    pub fn failed_agents(&self) -> usize {
        self.runs.iter().filter(|run| run.error.is_some()).count()
    }

    pub fn total_sent(&self) -> usize {
        self.runs.iter().map(|run| run.sent).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.runs.iter().map(|run| run.failed).sum()
    }
}

/// Drives dispatch across agents. Interactive callers run a single
/// authenticated agent; the scheduled trigger enumerates every agent with a
/// messaging integration, with cross-agent failure isolation.
pub struct BatchOrchestrator<S> {
    processor: DispatchProcessor<S>,
    directory: Arc<dyn Directory>,
}

impl<S> BatchOrchestrator<S>
where
    S: NurtureStore + 'static,
{
    pub fn new(processor: DispatchProcessor<S>, directory: Arc<dyn Directory>) -> Self {
        Self {
            processor,
            directory,
        }
    }

    /// Interactive mode: one authenticated agent's due records.
    pub fn run_for_agent(
        &self,
        agent_id: &AgentId,
        now: DateTime<Utc>,
    ) -> Result<DispatchReport, DispatchError> {
        self.processor.process_pending(agent_id, now)
    }

    /// Scheduled mode: every agent with an active messaging integration,
    /// each batch independent. A failure in one agent's batch is recorded
    /// and logged; the loop proceeds to the next agent.
    pub fn run_all_agents(&self, now: DateTime<Utc>) -> Result<OrchestratorReport, StoreError> {
        let agents = self.directory.messaging_agents()?;
        let mut runs = Vec::with_capacity(agents.len());

        for agent_id in agents {
            match self.processor.process_pending(&agent_id, now) {
                Ok(report) => {
                    info!(
                        agent = %agent_id,
                        sent = report.sent_count(),
                        failed = report.failed_count(),
                        retried = report.retried_count(),
                        "agent batch complete"
                    );
                    runs.push(AgentRunReport {
                        agent_id,
                        sent: report.sent_count(),
                        failed: report.failed_count(),
                        retried: report.retried_count(),
                        error: None,
                    });
                }
                Err(err) => {
                    error!(agent = %agent_id, %err, "agent batch aborted");
                    runs.push(AgentRunReport {
                        agent_id,
                        sent: 0,
                        failed: 0,
                        retried: 0,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        Ok(OrchestratorReport { runs })
    }
}
