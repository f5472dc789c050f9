//! Mapping [`RepoVizError`] onto HTTP responses.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

use repoviz_shared::RepoVizError;

/// Message returned to rate-limited clients.
const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please try again later.";

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

/// Handler error; every failure body is `{ "message": ... }`.
#[derive(Debug)]
pub struct AppError(pub RepoVizError);

impl From<RepoVizError> for AppError {
    fn from(err: RepoVizError) -> Self {
        Self(err)
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RepoVizError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            RepoVizError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            RepoVizError::UpstreamGeneration(_) | RepoVizError::Network(_) => StatusCode::BAD_GATEWAY,
            RepoVizError::Config { .. } | RepoVizError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let RepoVizError::QuotaExceeded {
            retry_after_secs, ..
        } = &self.0
        {
            let mut response = (
                status,
                Json(ErrorBody {
                    message: RATE_LIMIT_MESSAGE.to_string(),
                }),
            )
                .into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            return response;
        }

        if status.is_server_error() {
            error!(error = %self.0, %status, "request failed");
        } else {
            warn!(error = %self.0, %status, "request rejected");
        }

        (
            status,
            Json(ErrorBody {
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}
