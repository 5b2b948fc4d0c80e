use std::sync::Arc;

use bytes::Bytes;
use common::errors::ConvoscopeError;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::utils::{json_response, HandlerResponse};
use crate::jobs::{AnalysisQueue, JobId, JobTracker};
use crate::state::{ConversationId, ConversationStorage};

#[derive(Debug, Serialize)]
struct QueuedResponse {
    message: &'static str,
    task_id: JobId,
    conversation_id: ConversationId,
}

pub async fn trigger_analysis(
    request: Request<Incoming>,
    storage: Arc<dyn ConversationStorage>,
    queue: AnalysisQueue,
) -> Result<HandlerResponse, hyper::Error> {
    let body = request.collect().await?.to_bytes();
    Ok(queue_analysis(body, storage.as_ref(), &queue).await)
}

/// POST /api/analyze with an already-collected body
pub async fn queue_analysis(
    body: Bytes,
    storage: &dyn ConversationStorage,
    queue: &AnalysisQueue,
) -> HandlerResponse {
    let conversation_id = match requested_conversation_id(&body) {
        Some(id) => id,
        None => {
            return ConvoscopeError::InvalidRequest("conversation_id is required".to_string())
                .into_response()
        }
    };

    match storage.exists(conversation_id).await {
        Ok(true) => {}
        Ok(false) => {
            return ConvoscopeError::ConversationNotFound(conversation_id).into_response();
        }
        Err(e) => {
            warn!(conversation_id, error = %e, "failed to look up conversation");
            return ConvoscopeError::InternalServerError(e.to_string()).into_response();
        }
    }

    match queue.enqueue(conversation_id).await {
        Ok(task_id) => {
            info!(conversation_id, task_id = %task_id, "analysis requested");
            json_response(
                StatusCode::ACCEPTED,
                &QueuedResponse {
                    message: "Analysis queued",
                    task_id,
                    conversation_id,
                },
            )
        }
        Err(e) => ConvoscopeError::QueueUnavailable(e.to_string()).into_response(),
    }
}

/// Accepts a positive integer id, either as a JSON number or a numeric string
fn requested_conversation_id(body: &[u8]) -> Option<ConversationId> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let id = match value.get("conversation_id")? {
        Value::Number(number) => number.as_i64()?,
        Value::String(raw) => raw.trim().parse::<ConversationId>().ok()?,
        _ => return None,
    };
    (id > 0).then_some(id)
}

/// GET /api/jobs/{task_id}
pub async fn job_status(task_id: &str, tracker: &JobTracker) -> HandlerResponse {
    let record = match JobId::parse(task_id) {
        Some(id) => tracker.get(&id).await,
        None => None,
    };

    match record {
        Some(record) => json_response(StatusCode::OK, &record),
        None => ConvoscopeError::JobNotFound(task_id.to_string()).into_response(),
    }
}
