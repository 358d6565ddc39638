use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use followup::config::AppConfig;
use followup::error::AppError;
use followup::telemetry;
use followup::workflows::nurture::memory::InMemoryNurtureStore;
use followup::workflows::nurture::NurtureEngine;
use tracing::info;

use crate::cli::ServeArgs;
use crate::infra::{seeded_directory, AppState, LoggingEmailSender, LoggingSmsSender, PassthroughEnhancer};
use crate::routes::nurture_router;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        cron_secret: config.cron_secret.clone(),
    };

    let seeded = seeded_directory();
    let engine = Arc::new(NurtureEngine::new(
        Arc::new(InMemoryNurtureStore::default()),
        seeded.directory,
        Arc::new(PassthroughEnhancer),
        Arc::new(LoggingEmailSender::default()),
        Arc::new(LoggingSmsSender::default()),
        config.dispatch,
    ));

    let app = nurture_router()
        .layer(Extension(engine))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        seeded_agent = %seeded.agent,
        seeded_lead = %seeded.lead,
        "lead follow-up scheduler ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
