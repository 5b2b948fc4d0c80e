use thiserror::Error;
use tracing::{debug, info, warn};

use crate::signals::ConversationAnalyzer;
use crate::state::{ConversationId, ConversationSource, ReportSink, StateStorageError, StoredReport};

pub mod queue;
pub mod sweep;

pub use queue::{AnalysisQueue, JobId, JobStatus, JobTracker, QueueError};
pub use sweep::{run_sweep, spawn_sweep_schedule, SweepSummary};

/// Reasons a conversation produced no report
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("conversation {0} not found")]
    ConversationNotFound(ConversationId),

    /// One side of the conversation has no turns
    #[error("conversation {0} has no user or no assistant turns")]
    EmptyStream(ConversationId),

    #[error("analysis of conversation {conversation_id} failed: {reason}")]
    Unexpected {
        conversation_id: ConversationId,
        reason: String,
    },
}

impl AnalysisError {
    fn from_storage(conversation_id: ConversationId, err: StateStorageError) -> Self {
        match err {
            StateStorageError::NotFound(_) => AnalysisError::ConversationNotFound(conversation_id),
            other => AnalysisError::Unexpected {
                conversation_id,
                reason: other.to_string(),
            },
        }
    }
}

/// Load, score and persist one conversation.
///
/// Scoring runs against the snapshot returned by the source, so nothing the
/// source does after `turns` returns can leak into a half-computed report.
pub async fn run_analysis<Src, Snk>(
    conversation_id: ConversationId,
    source: &Src,
    sink: &Snk,
    analyzer: &dyn ConversationAnalyzer,
) -> Result<StoredReport, AnalysisError>
where
    Src: ConversationSource + ?Sized,
    Snk: ReportSink + ?Sized,
{
    let input = source
        .turns(conversation_id)
        .await
        .map_err(|e| AnalysisError::from_storage(conversation_id, e))?;

    let report = analyzer
        .analyze(&input)
        .ok_or(AnalysisError::EmptyStream(conversation_id))?;

    debug!(
        conversation_id,
        overall = report.overall,
        sentiment = %report.sentiment,
        "scored conversation"
    );

    sink.upsert_report(conversation_id, report)
        .await
        .map_err(|e| AnalysisError::from_storage(conversation_id, e))
}

/// Like [`run_analysis`], but every failure is logged and reported as `None`
pub async fn perform_analysis<Src, Snk>(
    conversation_id: ConversationId,
    source: &Src,
    sink: &Snk,
    analyzer: &dyn ConversationAnalyzer,
) -> Option<StoredReport>
where
    Src: ConversationSource + ?Sized,
    Snk: ReportSink + ?Sized,
{
    match run_analysis(conversation_id, source, sink, analyzer).await {
        Ok(stored) => {
            info!(
                conversation_id,
                analysis_id = stored.id,
                overall = stored.report.overall,
                "analysis completed"
            );
            Some(stored)
        }
        Err(AnalysisError::EmptyStream(_)) => {
            info!(conversation_id, "no user or assistant turns, skipping analysis");
            None
        }
        Err(e) => {
            warn!(conversation_id, error = %e, "analysis failed");
            None
        }
    }
}
