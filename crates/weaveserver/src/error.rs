use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::fmt;
use weavecore::EngineError;

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Engine errors rendered as `{"error": ...}` with the matching status code.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_class()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.0.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weavecore::{RecorderError, WorkflowError};

    #[test]
    fn test_status_codes() {
        let status = |e: EngineError| ApiError(e).status_code().as_u16();
        assert_eq!(status(EngineError::Validation("x".into())), 400);
        assert_eq!(status(EngineError::Unauthorized), 401);
        assert_eq!(status(EngineError::NotFound("x".into())), 404);
        assert_eq!(status(WorkflowError::NodeNotFound("n".into()).into()), 404);
        assert_eq!(status(WorkflowError::InvalidConnection("no".into()).into()), 400);
        assert_eq!(status(RecorderError::RunNotFound("r".into()).into()), 404);
        assert_eq!(status(EngineError::Internal("boom".into())), 500);
    }
}
