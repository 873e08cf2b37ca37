use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::engine::{EngineError, ErrorKind, FieldError};

pub type ApiResult<T> = Result<T, ApiError>;

/// Error returned by every handler. Rendered as
/// `{"message", "code", "errors"?}` with a status picked from the error kind.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    errors: Vec<FieldError>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
    code: &'a str,
    #[serde(skip_serializing_if = "no_errors")]
    errors: &'a [FieldError],
}

fn no_errors(errors: &&[FieldError]) -> bool {
    errors.is_empty()
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        EngineError::field(field, message).into()
    }

    pub fn internal(context: impl std::fmt::Display) -> Self {
        tracing::error!("internal error: {context}");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "Internal server error")
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let status = match e.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Validation | ErrorKind::Conflict | ErrorKind::LimitExceeded => StatusCode::BAD_REQUEST,
            ErrorKind::UpstreamUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(code = e.code(), "request failed: {e}");
        }
        let code = e.code();
        let (message, errors) = match e {
            EngineError::Validation(errors) => ("Validation failed".to_string(), errors),
            EngineError::WalError(_) => ("Reservation store is unavailable".to_string(), Vec::new()),
            other => (other.to_string(), Vec::new()),
        };
        Self { status, code, message, errors }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            message: &self.message,
            code: self.code,
            errors: &self.errors,
        };
        (self.status, Json(body)).into_response()
    }
}

/// `Json<T>` whose rejection is a 400 in the API's error shape.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::validation("body", rejection.body_text())),
        }
    }
}
