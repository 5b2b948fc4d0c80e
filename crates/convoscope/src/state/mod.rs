use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signals::{AnalysisReport, ConversationInput, Turn};

pub mod memory;
pub mod postgresql;

pub type ConversationId = i64;
pub type ReportId = i64;

/// A conversation to be stored, turns already in conversation order
#[derive(Debug, Clone)]
pub struct NewConversation {
    /// Defaults to "Chat {id}" when absent
    pub title: Option<String>,
    pub turns: Vec<Turn>,
}

/// Stored conversation metadata, as returned on creation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// An analysis report as persisted, at most one per conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredReport {
    pub id: ReportId,
    pub conversation_id: ConversationId,
    #[serde(flatten)]
    pub report: AnalysisReport,
    pub created_at: DateTime<Utc>,
}

/// Error types for storage operations
#[derive(Debug, Error)]
pub enum StateStorageError {
    /// No record for the given id
    #[error("not found: {0}")]
    NotFound(String),

    /// Storage backend error (network, database, etc.)
    #[error("storage error: {0}")]
    StorageError(String),

    /// Stored data could not be mapped back to domain types
    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Supplies the ordered turns of a conversation
#[async_trait]
pub trait ConversationSource: Send + Sync {
    /// Turns ordered by timestamp, ties in insertion order.
    /// Fails with `NotFound` for an unknown conversation.
    async fn turns(
        &self,
        conversation_id: ConversationId,
    ) -> Result<ConversationInput, StateStorageError>;

    async fn exists(&self, conversation_id: ConversationId) -> Result<bool, StateStorageError>;
}

/// Accepts computed reports
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Create or replace the report of a conversation
    async fn upsert_report(
        &self,
        conversation_id: ConversationId,
        report: AnalysisReport,
    ) -> Result<StoredReport, StateStorageError>;
}

/// Full storage backend used by the HTTP surface and the analysis jobs
#[async_trait]
pub trait ConversationStorage: ConversationSource + ReportSink {
    async fn create_conversation(
        &self,
        conversation: NewConversation,
    ) -> Result<ConversationSummary, StateStorageError>;

    async fn get_report(&self, report_id: ReportId) -> Result<StoredReport, StateStorageError>;

    /// All reports, newest first
    async fn list_reports(&self) -> Result<Vec<StoredReport>, StateStorageError>;

    /// Ids of conversations that have never been analyzed, ascending
    async fn conversations_without_report(
        &self,
    ) -> Result<Vec<ConversationId>, StateStorageError>;
}

pub(crate) fn default_title(id: ConversationId) -> String {
    format!("Chat {}", id)
}
