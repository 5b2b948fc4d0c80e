use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use common::errors::ConvoscopeError;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, StatusCode};
use serde::Deserialize;
use tracing::{info, warn};

use super::utils::{json_response, HandlerResponse};
use crate::signals::{Sender, Turn};
use crate::state::{ConversationStorage, NewConversation};

#[derive(Debug, Deserialize)]
struct UploadRequest {
    #[serde(default)]
    title: Option<String>,
    messages: Vec<UploadMessage>,
}

#[derive(Debug, Deserialize)]
struct UploadMessage {
    sender: String,
    message: String,
    /// Receipt time is used when absent
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

pub async fn upload_conversation(
    request: Request<Incoming>,
    storage: Arc<dyn ConversationStorage>,
) -> Result<HandlerResponse, hyper::Error> {
    let body = request.collect().await?.to_bytes();
    Ok(store_upload(body, storage.as_ref()).await)
}

/// POST /api/conversations with an already-collected body
pub async fn store_upload(body: Bytes, storage: &dyn ConversationStorage) -> HandlerResponse {
    let conversation = match parse_upload(&body, Utc::now()) {
        Ok(conversation) => conversation,
        Err(reason) => {
            warn!(reason = %reason, "rejected conversation upload");
            return ConvoscopeError::InvalidRequest(reason).into_response();
        }
    };

    match storage.create_conversation(conversation).await {
        Ok(summary) => {
            info!(conversation_id = summary.id, title = %summary.title, "conversation uploaded");
            json_response(StatusCode::CREATED, &summary)
        }
        Err(e) => {
            warn!(error = %e, "failed to store conversation");
            ConvoscopeError::InternalServerError(e.to_string()).into_response()
        }
    }
}

fn parse_upload(body: &[u8], received_at: DateTime<Utc>) -> Result<NewConversation, String> {
    let upload: UploadRequest =
        serde_json::from_slice(body).map_err(|e| format!("invalid conversation body: {}", e))?;

    let turns = upload
        .messages
        .into_iter()
        .enumerate()
        .map(|(index, message)| {
            let sender = message
                .sender
                .parse::<Sender>()
                .map_err(|e| format!("messages[{}]: {}", index, e))?;
            if message.message.trim().is_empty() {
                return Err(format!("messages[{}]: message may not be blank", index));
            }
            Ok(Turn::new(
                sender,
                message.message,
                message.timestamp.unwrap_or(received_at),
            ))
        })
        .collect::<Result<Vec<_>, String>>()?;

    Ok(NewConversation {
        title: upload.title,
        turns,
    })
}
