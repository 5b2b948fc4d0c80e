use common::errors::ConvoscopeError;
use hyper::StatusCode;
use tracing::warn;

use super::utils::{json_response, HandlerResponse};
use crate::state::{ConversationStorage, ReportId, StateStorageError};

/// GET /api/reports
pub async fn list_reports(storage: &dyn ConversationStorage) -> HandlerResponse {
    match storage.list_reports().await {
        Ok(reports) => json_response(StatusCode::OK, &reports),
        Err(e) => {
            warn!(error = %e, "failed to list reports");
            ConvoscopeError::InternalServerError(e.to_string()).into_response()
        }
    }
}

/// GET /api/reports/{id}
pub async fn get_report(raw_id: &str, storage: &dyn ConversationStorage) -> HandlerResponse {
    let Ok(report_id) = raw_id.parse::<ReportId>() else {
        return ConvoscopeError::InvalidRequest(format!("invalid report id '{}'", raw_id))
            .into_response();
    };

    match storage.get_report(report_id).await {
        Ok(report) => json_response(StatusCode::OK, &report),
        Err(StateStorageError::NotFound(_)) => {
            ConvoscopeError::ReportNotFound(report_id).into_response()
        }
        Err(e) => {
            warn!(report_id, error = %e, "failed to fetch report");
            ConvoscopeError::InternalServerError(e.to_string()).into_response()
        }
    }
}
