//! API and session error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use aural_models::SessionId;
use aural_rtc::RtcError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),

    #[error("No peer connection for session {0}")]
    NoPeerConnection(SessionId),

    #[error(transparent)]
    Rtc(#[from] RtcError),
}

impl SessionError {
    pub fn unknown_session(id: &SessionId) -> Self {
        Self::UnknownSession(id.clone())
    }

    pub fn no_peer_connection(id: &SessionId) -> Self {
        Self::NoPeerConnection(id.clone())
    }

    /// The message referred to a session or peer that no longer exists.
    /// Such messages are dropped rather than reported.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            SessionError::UnknownSession(_) | SessionError::NoPeerConnection(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::unavailable("full").into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::bad_request("nope").into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_stale_errors() {
        let id = SessionId::from_string("gone");
        assert!(SessionError::unknown_session(&id).is_stale());
        assert!(SessionError::no_peer_connection(&id).is_stale());
        assert!(!SessionError::from(RtcError::negotiation("bad offer")).is_stale());
    }
}
