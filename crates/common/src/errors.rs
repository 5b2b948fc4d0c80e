use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::{Error as HyperError, Response, StatusCode};
use serde_json::json;
use thiserror::Error;

// -----------------------------------------------------------------------------
// Convoscope Errors (Standardized)
// -----------------------------------------------------------------------------
#[derive(Debug, Error)]
pub enum ConvoscopeError {
    #[error("Conversation {0} not found")]
    ConversationNotFound(i64),

    #[error("Analysis report {0} not found")]
    ReportNotFound(i64),

    #[error("Analysis job {0} not found")]
    JobNotFound(String),

    #[error("Invalid request")]
    InvalidRequest(String),

    #[error("Analysis queue is unavailable")]
    QueueUnavailable(String),

    #[error("Internal server error")]
    InternalServerError(String),

    #[error("Failed to create response: {0}")]
    ResponseCreationFailed(#[from] hyper::http::Error),
}

impl ConvoscopeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ConvoscopeError::ConversationNotFound(_)
            | ConvoscopeError::ReportNotFound(_)
            | ConvoscopeError::JobNotFound(_) => StatusCode::NOT_FOUND,
            ConvoscopeError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ConvoscopeError::QueueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ConvoscopeError::InternalServerError(_)
            | ConvoscopeError::ResponseCreationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn into_response(self) -> Response<BoxBody<Bytes, HyperError>> {
        let status = self.status_code();
        let (code, details) = match &self {
            ConvoscopeError::ConversationNotFound(id) => {
                ("ConversationNotFound", json!({ "conversation_id": id }))
            }
            ConvoscopeError::ReportNotFound(id) => ("ReportNotFound", json!({ "report_id": id })),
            ConvoscopeError::JobNotFound(id) => ("JobNotFound", json!({ "task_id": id })),
            ConvoscopeError::InvalidRequest(reason) => {
                ("InvalidRequest", json!({ "reason": reason }))
            }
            ConvoscopeError::QueueUnavailable(reason) => {
                ("QueueUnavailable", json!({ "reason": reason }))
            }
            ConvoscopeError::InternalServerError(reason) => {
                ("InternalServerError", json!({ "reason": reason }))
            }
            ConvoscopeError::ResponseCreationFailed(reason) => (
                "ResponseCreationFailed",
                json!({ "reason": reason.to_string() }),
            ),
        };

        let body_json = json!({
            "error": {
                "code": code,
                "message": self.to_string(),
                "details": details
            }
        });

        let boxed_body = Full::new(Bytes::from(body_json.to_string()))
            .map_err(|never| match never {})
            .boxed();

        Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(boxed_body)
            .unwrap_or_else(|_| {
                Response::new(
                    Full::new(Bytes::from("Internal Error"))
                        .map_err(|never| match never {})
                        .boxed(),
                )
            })
    }
}
