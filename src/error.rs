//! Errors surfaced by the transit proxy endpoint.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    /// The server has no upstream key.
    #[error("API key not configured on server")]
    MissingConfiguration,

    /// `stopCode` or `agency` was absent or empty.
    #[error("Missing required parameters: stopCode and agency")]
    MissingParameters,

    /// Upstream answered with a non-success status.
    #[error("{message}")]
    Upstream { status: u16, message: String },

    /// Upstream could not be reached or its body could not be read.
    #[error("{0}")]
    Transport(String),
}

impl ProxyError {
    /// HTTP status returned to the caller.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingConfiguration | Self::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MissingParameters => StatusCode::BAD_REQUEST,
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ProxyError::MissingConfiguration.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ProxyError::MissingParameters.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ProxyError::Upstream {
                status: 401,
                message: "Request failed with status code 401".to_string()
            }
            .status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ProxyError::Transport("connection refused".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_invalid_upstream_status_maps_to_bad_gateway() {
        let err = ProxyError::Upstream {
            status: 42,
            message: "odd".to_string(),
        };
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            ProxyError::MissingParameters.to_string(),
            "Missing required parameters: stopCode and agency"
        );
        assert_eq!(
            ProxyError::MissingConfiguration.to_string(),
            "API key not configured on server"
        );
    }
}
