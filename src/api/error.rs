use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::store::StoreError;

pub const ERROR_CODE_HEADER: &str = "x-error-code";

/// Error type for the HTTP handlers.
///
/// Each variant maps to a status code, a machine-readable code (sent in the
/// `x-error-code` header) and a plain-text body shown to the browser.
#[derive(Debug)]
pub enum ApiError {
    /// 500 - Error mode tripped; the body names the failed operation.
    InjectedFault(&'static str),
    /// 500 - Catch-all internal error.
    InternalError(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InjectedFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InjectedFault(_) => "injected_fault",
            ApiError::InternalError(_) => "internal_error",
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::InjectedFault(what) => (*what).to_string(),
            // Details stay in the logs.
            ApiError::InternalError(_) => "An unexpected error occurred.".to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "store operation failed");
        ApiError::InternalError(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            [(
                HeaderName::from_static(ERROR_CODE_HEADER),
                HeaderValue::from_static(self.code()),
            )],
            self.message(),
        )
            .into_response()
    }
}
