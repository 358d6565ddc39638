use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use followup::error::AppError;
use followup::workflows::nurture::memory::InMemoryNurtureStore;
use followup::workflows::nurture::{
    AgentId, DispatchReport, Enrollment, EnrollmentId, EnrollmentStatusView, LeadId, MessageId,
    MessagePreview, NurtureEngine, OrchestratorReport, ScheduledMessage, Sequence, SequenceDraft,
    SequenceId, SequenceStep,
};

use crate::infra::AppState;

pub(crate) type ApiEngine = Arc<NurtureEngine<InMemoryNurtureStore>>;

const CRON_SECRET_HEADER: &str = "x-cron-secret";

#[derive(Debug, Deserialize)]
pub(crate) struct CreateSequenceRequest {
    pub(crate) agent_id: AgentId,
    #[serde(flatten)]
    pub(crate) draft: SequenceDraft,
}

#[derive(Debug, Serialize)]
pub(crate) struct SequenceResponse {
    pub(crate) sequence: Sequence,
    pub(crate) steps: Vec<SequenceStep>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EnrollRequest {
    pub(crate) agent_id: AgentId,
    pub(crate) lead_id: LeadId,
    pub(crate) sequence_id: SequenceId,
}

#[derive(Debug, Serialize)]
pub(crate) struct EnrollResponse {
    pub(crate) enrollment: Enrollment,
    pub(crate) scheduled: Vec<ScheduledMessage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AgentQuery {
    pub(crate) agent_id: AgentId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AgentBody {
    pub(crate) agent_id: AgentId,
}

pub(crate) fn nurture_router() -> axum::Router {
    axum::Router::new()
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/nurture/sequences",
            axum::routing::post(create_sequence_endpoint),
        )
        .route(
            "/api/v1/nurture/sequences/:id",
            axum::routing::get(sequence_steps_endpoint),
        )
        .route(
            "/api/v1/nurture/enrollments",
            axum::routing::post(enroll_endpoint),
        )
        .route(
            "/api/v1/nurture/enrollments/:id",
            axum::routing::get(enrollment_view_endpoint),
        )
        .route(
            "/api/v1/nurture/enrollments/:id/cancel",
            axum::routing::post(cancel_enrollment_endpoint),
        )
        .route(
            "/api/v1/nurture/messages/:id/preview",
            axum::routing::get(preview_endpoint),
        )
        .route(
            "/api/v1/nurture/dispatch/run",
            axum::routing::post(dispatch_run_endpoint),
        )
        .route(
            "/internal/nurture/dispatch/run-all",
            axum::routing::post(dispatch_run_all_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn create_sequence_endpoint(
    Extension(engine): Extension<ApiEngine>,
    Json(payload): Json<CreateSequenceRequest>,
) -> Result<(StatusCode, Json<SequenceResponse>), AppError> {
    let (sequence, steps) = engine.create_sequence(&payload.agent_id, payload.draft)?;
    Ok((StatusCode::CREATED, Json(SequenceResponse { sequence, steps })))
}

pub(crate) async fn sequence_steps_endpoint(
    Extension(engine): Extension<ApiEngine>,
    Path(sequence_id): Path<SequenceId>,
    Query(query): Query<AgentQuery>,
) -> Result<Json<SequenceResponse>, AppError> {
    let (sequence, steps) = engine.sequence_steps(&query.agent_id, &sequence_id)?;
    Ok(Json(SequenceResponse { sequence, steps }))
}

pub(crate) async fn enroll_endpoint(
    Extension(engine): Extension<ApiEngine>,
    Json(payload): Json<EnrollRequest>,
) -> Result<(StatusCode, Json<EnrollResponse>), AppError> {
    let (enrollment, scheduled) = engine.enroll(
        &payload.agent_id,
        &payload.lead_id,
        &payload.sequence_id,
        Utc::now(),
    )?;
    Ok((
        StatusCode::CREATED,
        Json(EnrollResponse {
            enrollment,
            scheduled,
        }),
    ))
}

pub(crate) async fn enrollment_view_endpoint(
    Extension(engine): Extension<ApiEngine>,
    Path(enrollment_id): Path<EnrollmentId>,
    Query(query): Query<AgentQuery>,
) -> Result<Json<EnrollmentStatusView>, AppError> {
    let view = engine.enrollment_view(&query.agent_id, &enrollment_id)?;
    Ok(Json(view))
}

pub(crate) async fn cancel_enrollment_endpoint(
    Extension(engine): Extension<ApiEngine>,
    Path(enrollment_id): Path<EnrollmentId>,
    Json(payload): Json<AgentBody>,
) -> Result<Json<EnrollmentStatusView>, AppError> {
    let view = engine.cancel_enrollment(&payload.agent_id, &enrollment_id)?;
    Ok(Json(view))
}

pub(crate) async fn preview_endpoint(
    Extension(engine): Extension<ApiEngine>,
    Path(message_id): Path<MessageId>,
    Query(query): Query<AgentQuery>,
) -> Result<Json<MessagePreview>, AppError> {
    let preview = engine.preview(&query.agent_id, &message_id)?;
    Ok(Json(preview))
}

pub(crate) async fn dispatch_run_endpoint(
    Extension(engine): Extension<ApiEngine>,
    Json(payload): Json<AgentBody>,
) -> Result<Json<DispatchReport>, AppError> {
    let report = engine.run_for_agent(&payload.agent_id, Utc::now())?;
    Ok(Json(report))
}

/// Scheduled all-agents trigger. Unauthenticated by design, so it is gated
/// by a shared secret header when `APP_CRON_SECRET` is configured.
pub(crate) async fn dispatch_run_all_endpoint(
    Extension(state): Extension<AppState>,
    Extension(engine): Extension<ApiEngine>,
    headers: HeaderMap,
) -> Response {
    if let Some(expected) = state.cron_secret.as_deref() {
        let presented = headers
            .get(CRON_SECRET_HEADER)
            .and_then(|value| value.to_str().ok());
        if presented != Some(expected) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "missing or invalid cron secret" })),
            )
                .into_response();
        }
    }

    match engine.run_all_agents(Utc::now()) {
        Ok(report) => Json::<OrchestratorReport>(report).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{seeded_directory, LoggingEmailSender, LoggingSmsSender, PassthroughEnhancer};
    use axum::http::HeaderValue;
    use followup::workflows::nurture::{DispatchConfig, LeadId, StepChannel, StepDraft};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    struct TestApi {
        engine: ApiEngine,
        agent: AgentId,
        lead: LeadId,
    }

    fn test_api() -> TestApi {
        let seeded = seeded_directory();
        let engine = Arc::new(NurtureEngine::new(
            Arc::new(InMemoryNurtureStore::default()),
            seeded.directory,
            Arc::new(PassthroughEnhancer),
            Arc::new(LoggingEmailSender::default()),
            Arc::new(LoggingSmsSender::default()),
            DispatchConfig::default(),
        ));
        TestApi {
            engine,
            agent: seeded.agent,
            lead: seeded.lead,
        }
    }

    fn test_state(cron_secret: Option<&str>) -> AppState {
        AppState {
            readiness: Arc::new(AtomicBool::new(true)),
            metrics: Arc::new(
                metrics_exporter_prometheus::PrometheusBuilder::new()
                    .build_recorder()
                    .handle(),
            ),
            cron_secret: cron_secret.map(str::to_string),
        }
    }

    fn draft() -> SequenceDraft {
        SequenceDraft {
            name: "Post-showing follow-up".to_string(),
            description: String::new(),
            is_active: true,
            steps: vec![StepDraft {
                step_order: 1,
                delay_days: 0,
                channel: StepChannel::Email,
                subject: Some("Hello {first_name}".to_string()),
                message_template: "Hi {first_name}, thanks for stopping by. {agent_signature}"
                    .to_string(),
                use_ai_enhancement: false,
            }],
        }
    }

    #[tokio::test]
    async fn sequence_enroll_and_dispatch_round_trip() {
        let api = test_api();

        let (status, Json(created)) = create_sequence_endpoint(
            Extension(api.engine.clone()),
            Json(CreateSequenceRequest {
                agent_id: api.agent.clone(),
                draft: draft(),
            }),
        )
        .await
        .expect("sequence created");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.steps.len(), 1);

        let (status, Json(enrolled)) = enroll_endpoint(
            Extension(api.engine.clone()),
            Json(EnrollRequest {
                agent_id: api.agent.clone(),
                lead_id: api.lead.clone(),
                sequence_id: created.sequence.id.clone(),
            }),
        )
        .await
        .expect("enrolled");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(enrolled.scheduled.len(), 1);

        let Json(preview) = preview_endpoint(
            Extension(api.engine.clone()),
            Path(enrolled.scheduled[0].id.clone()),
            Query(AgentQuery {
                agent_id: api.agent.clone(),
            }),
        )
        .await
        .expect("previewed");
        assert!(preview.rendered_content.starts_with("Hi Casey,"));

        let Json(report) = dispatch_run_endpoint(
            Extension(api.engine.clone()),
            Json(AgentBody {
                agent_id: api.agent.clone(),
            }),
        )
        .await
        .expect("dispatched");
        assert_eq!(report.sent_count(), 1);

        let Json(view) = enrollment_view_endpoint(
            Extension(api.engine),
            Path(enrolled.enrollment.id),
            Query(AgentQuery {
                agent_id: api.agent,
            }),
        )
        .await
        .expect("viewed");
        assert_eq!(view.status, "Completed");
    }

    #[tokio::test]
    async fn cancel_endpoint_returns_terminal_view() {
        let api = test_api();
        let (sequence, _) = api
            .engine
            .create_sequence(&api.agent, draft())
            .expect("sequence created");
        let (enrollment, _) = api
            .engine
            .enroll(&api.agent, &api.lead, &sequence.id, Utc::now())
            .expect("enrolled");

        let Json(view) = cancel_enrollment_endpoint(
            Extension(api.engine),
            Path(enrollment.id),
            Json(AgentBody {
                agent_id: api.agent,
            }),
        )
        .await
        .expect("cancelled");
        assert_eq!(view.status, "Cancelled");
    }

    #[tokio::test]
    async fn run_all_rejects_a_bad_cron_secret() {
        let api = test_api();
        let state = test_state(Some("s3cret"));

        let mut headers = HeaderMap::new();
        headers.insert(CRON_SECRET_HEADER, HeaderValue::from_static("wrong"));
        let response =
            dispatch_run_all_endpoint(Extension(state.clone()), Extension(api.engine.clone()), headers)
                .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut headers = HeaderMap::new();
        headers.insert(CRON_SECRET_HEADER, HeaderValue::from_static("s3cret"));
        let response =
            dispatch_run_all_endpoint(Extension(state), Extension(api.engine), headers).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn run_all_is_open_when_no_secret_is_configured() {
        let api = test_api();
        let state = test_state(None);

        let response =
            dispatch_run_all_endpoint(Extension(state), Extension(api.engine), HeaderMap::new())
                .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn foreign_agent_access_maps_to_forbidden() {
        let api = test_api();
        let (sequence, _) = api
            .engine
            .create_sequence(&api.agent, draft())
            .expect("sequence created");

        let err = sequence_steps_endpoint(
            Extension(api.engine),
            Path(sequence.id),
            Query(AgentQuery {
                agent_id: AgentId("agent-intruder".to_string()),
            }),
        )
        .await
        .expect_err("ownership enforced");
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }
}
