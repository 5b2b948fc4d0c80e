use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, info_span, warn, Instrument};

use super::perform_analysis;
use crate::signals::ConversationAnalyzer;
use crate::state::{ConversationStorage, StateStorageError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub analyzed: usize,
    /// Conversations that produced no report, including one-sided ones
    pub failed: usize,
}

/// Analyze every conversation that has no report yet.
///
/// A failing conversation is logged and skipped; only failing to list the
/// candidates aborts the sweep.
pub async fn run_sweep(
    storage: &dyn ConversationStorage,
    analyzer: &dyn ConversationAnalyzer,
) -> Result<SweepSummary, StateStorageError> {
    let pending = storage.conversations_without_report().await?;
    info!(pending = pending.len(), "starting analysis sweep");

    let mut summary = SweepSummary::default();
    for conversation_id in pending {
        match perform_analysis(conversation_id, storage, storage, analyzer).await {
            Some(_) => summary.analyzed += 1,
            None => summary.failed += 1,
        }
    }

    info!(
        analyzed = summary.analyzed,
        failed = summary.failed,
        "analysis sweep finished"
    );
    Ok(summary)
}

/// Run [`run_sweep`] on a fixed interval, first tick one interval after start
pub fn spawn_sweep_schedule(
    storage: Arc<dyn ConversationStorage>,
    analyzer: Arc<dyn ConversationAnalyzer>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(start) = tokio::time::Instant::now().checked_add(every) else {
            warn!(interval = ?every, "sweep interval out of range, sweep disabled");
            return;
        };
        let mut ticker = tokio::time::interval_at(start, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let result = run_sweep(storage.as_ref(), analyzer.as_ref())
                .instrument(info_span!("analysis_sweep"))
                .await;
            if let Err(e) = result {
                warn!(error = %e, "analysis sweep aborted");
            }
        }
    })
}
