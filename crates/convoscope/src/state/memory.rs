use super::{
    default_title, ConversationId, ConversationSource, ConversationStorage,
    ConversationSummary, NewConversation, ReportId, ReportSink, StateStorageError, StoredReport,
};
use crate::signals::{AnalysisReport, ConversationInput, Turn};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Default)]
struct MemoryState {
    last_conversation_id: ConversationId,
    last_report_id: ReportId,
    conversations: HashMap<ConversationId, Vec<Turn>>,
    /// Keyed by conversation id
    reports: HashMap<ConversationId, StoredReport>,
}

/// In-memory storage backend for conversations and their reports
/// Uses a HashMap wrapped in Arc<RwLock<>> for thread-safe access
#[derive(Clone, Default)]
pub struct MemoryConversationStorage {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryConversationStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationSource for MemoryConversationStorage {
    async fn turns(
        &self,
        conversation_id: ConversationId,
    ) -> Result<ConversationInput, StateStorageError> {
        let state = self.state.read().await;

        match state.conversations.get(&conversation_id) {
            Some(stored_turns) => {
                // stable sort keeps insertion order for equal timestamps
                let mut turns = stored_turns.clone();
                turns.sort_by_key(|turn| turn.timestamp);
                debug!(
                    conversation_id,
                    turns = turns.len(),
                    "retrieved conversation turns"
                );
                Ok(ConversationInput::new(turns))
            }
            None => {
                warn!(conversation_id, "conversation not found");
                Err(StateStorageError::NotFound(format!(
                    "conversation {}",
                    conversation_id
                )))
            }
        }
    }

    async fn exists(&self, conversation_id: ConversationId) -> Result<bool, StateStorageError> {
        let state = self.state.read().await;
        Ok(state.conversations.contains_key(&conversation_id))
    }
}

#[async_trait]
impl ReportSink for MemoryConversationStorage {
    async fn upsert_report(
        &self,
        conversation_id: ConversationId,
        report: AnalysisReport,
    ) -> Result<StoredReport, StateStorageError> {
        let mut state = self.state.write().await;

        if !state.conversations.contains_key(&conversation_id) {
            return Err(StateStorageError::NotFound(format!(
                "conversation {}",
                conversation_id
            )));
        }

        if let Some(existing) = state.reports.get_mut(&conversation_id) {
            existing.report = report;
            debug!(
                conversation_id,
                report_id = existing.id,
                "replaced analysis report"
            );
            return Ok(existing.clone());
        }

        state.last_report_id += 1;
        let stored = StoredReport {
            id: state.last_report_id,
            conversation_id,
            report,
            created_at: Utc::now(),
        };
        debug!(conversation_id, report_id = stored.id, "stored analysis report");
        state.reports.insert(conversation_id, stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl ConversationStorage for MemoryConversationStorage {
    async fn create_conversation(
        &self,
        conversation: NewConversation,
    ) -> Result<ConversationSummary, StateStorageError> {
        let mut state = self.state.write().await;

        state.last_conversation_id += 1;
        let id = state.last_conversation_id;
        let summary = ConversationSummary {
            id,
            title: conversation
                .title
                .filter(|title| !title.is_empty())
                .unwrap_or_else(|| default_title(id)),
            created_at: Utc::now(),
        };

        debug!(
            conversation_id = id,
            turns = conversation.turns.len(),
            "stored conversation"
        );

        state.conversations.insert(id, conversation.turns);
        Ok(summary)
    }

    async fn get_report(&self, report_id: ReportId) -> Result<StoredReport, StateStorageError> {
        let state = self.state.read().await;
        state
            .reports
            .values()
            .find(|stored| stored.id == report_id)
            .cloned()
            .ok_or_else(|| StateStorageError::NotFound(format!("report {}", report_id)))
    }

    async fn list_reports(&self) -> Result<Vec<StoredReport>, StateStorageError> {
        let state = self.state.read().await;
        let mut reports: Vec<StoredReport> = state.reports.values().cloned().collect();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(reports)
    }

    async fn conversations_without_report(
        &self,
    ) -> Result<Vec<ConversationId>, StateStorageError> {
        let state = self.state.read().await;
        let mut ids: Vec<ConversationId> = state
            .conversations
            .keys()
            .filter(|id| !state.reports.contains_key(*id))
            .copied()
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}
