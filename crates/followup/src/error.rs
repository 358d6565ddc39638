use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::nurture::authoring::AuthoringError;
use crate::workflows::nurture::dispatch::DispatchError;
use crate::workflows::nurture::enrollment::EnrollmentError;
use crate::workflows::nurture::preview::PreviewError;
use crate::workflows::nurture::scheduler::ScheduleError;
use crate::workflows::nurture::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Authoring(AuthoringError),
    Enrollment(EnrollmentError),
    Schedule(ScheduleError),
    Dispatch(DispatchError),
    Preview(PreviewError),
    Store(StoreError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Authoring(err) => write!(f, "sequence authoring error: {}", err),
            AppError::Enrollment(err) => write!(f, "enrollment error: {}", err),
            AppError::Schedule(err) => write!(f, "scheduling error: {}", err),
            AppError::Dispatch(err) => write!(f, "dispatch error: {}", err),
            AppError::Preview(err) => write!(f, "preview error: {}", err),
            AppError::Store(err) => write!(f, "store error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Authoring(err) => Some(err),
            AppError::Enrollment(err) => Some(err),
            AppError::Schedule(err) => Some(err),
            AppError::Dispatch(err) => Some(err),
            AppError::Preview(err) => Some(err),
            AppError::Store(err) => Some(err),
        }
    }
}

impl AppError {
    /// HTTP status for the error taxonomy: missing resources are 404,
    /// duplicates and lost races 409, cross-agent access 403, invalid
    /// definitions 422, unreachable collaborators 503, the rest 500.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Authoring(err) => match err {
                AuthoringError::SequenceNotFound => StatusCode::NOT_FOUND,
                AuthoringError::PermissionDenied => StatusCode::FORBIDDEN,
                AuthoringError::Template(_) | AuthoringError::Definition(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                AuthoringError::Store(err) => store_status(err),
            },
            AppError::Enrollment(err) => match err {
                EnrollmentError::SequenceNotFound | EnrollmentError::EnrollmentNotFound => {
                    StatusCode::NOT_FOUND
                }
                EnrollmentError::PermissionDenied => StatusCode::FORBIDDEN,
                EnrollmentError::DuplicateEnrollment | EnrollmentError::Stale => {
                    StatusCode::CONFLICT
                }
                EnrollmentError::SequenceInactive
                | EnrollmentError::NotActive
                | EnrollmentError::OutOfOrderAdvance { .. }
                | EnrollmentError::Definition(_) => StatusCode::UNPROCESSABLE_ENTITY,
                EnrollmentError::Store(err) => store_status(err),
            },
            AppError::Schedule(err) => match err {
                ScheduleError::Definition(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ScheduleError::Store(err) => store_status(err),
            },
            AppError::Dispatch(DispatchError::Store(err)) => store_status(err),
            AppError::Preview(err) => match err {
                PreviewError::MessageNotFound | PreviewError::LeadNotFound => {
                    StatusCode::NOT_FOUND
                }
                PreviewError::PermissionDenied => StatusCode::FORBIDDEN,
                PreviewError::Template(_) => StatusCode::UNPROCESSABLE_ENTITY,
                PreviewError::Store(err) => store_status(err),
            },
            AppError::Store(err) => store_status(err),
        }
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Conflict => StatusCode::CONFLICT,
        StoreError::NotFound => StatusCode::NOT_FOUND,
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<AuthoringError> for AppError {
    fn from(value: AuthoringError) -> Self {
        Self::Authoring(value)
    }
}

impl From<EnrollmentError> for AppError {
    fn from(value: EnrollmentError) -> Self {
        Self::Enrollment(value)
    }
}

impl From<ScheduleError> for AppError {
    fn from(value: ScheduleError) -> Self {
        Self::Schedule(value)
    }
}

impl From<DispatchError> for AppError {
    fn from(value: DispatchError) -> Self {
        Self::Dispatch(value)
    }
}

impl From<PreviewError> for AppError {
    fn from(value: PreviewError) -> Self {
        Self::Preview(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
