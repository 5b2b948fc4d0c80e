use super::{
    ConversationId, ConversationSource, ConversationStorage, ConversationSummary,
    NewConversation, ReportId, ReportSink, StateStorageError, StoredReport,
};
use crate::signals::{AnalysisReport, ConversationInput, Sender, Sentiment, Turn};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, info, warn};

const REQUIRED_TABLES: [&str; 3] = ["conversations", "messages", "conversation_analyses"];

const REPORT_COLUMNS: &str = "id, conversation_id, clarity_score, relevance_score, \
    accuracy_score, completeness_score, sentiment, empathy_score, response_time_avg, \
    resolution_rate, escalation_need, fallback_frequency, overall_score, created_at";

/// PostgreSQL storage backend for conversations and analysis reports
#[derive(Clone)]
pub struct PostgreSQLConversationStorage {
    client: Arc<Client>,
    tables_verified: Arc<OnceCell<()>>,
}

impl PostgreSQLConversationStorage {
    pub async fn new(connection_string: String) -> Result<Self, StateStorageError> {
        let (client, connection) = tokio_postgres::connect(&connection_string, NoTls)
            .await
            .map_err(|e| {
                StateStorageError::StorageError(format!("Failed to connect to database: {}", e))
            })?;

        // Spawn the connection to run in the background
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "database connection error");
            }
        });

        Ok(Self {
            client: Arc::new(client),
            tables_verified: Arc::new(OnceCell::new()),
        })
    }

    /// Ensures the schema exists (checks once, caches result)
    async fn ensure_ready(&self) -> Result<(), StateStorageError> {
        self.tables_verified
            .get_or_try_init(|| async {
                let tables: Vec<String> = REQUIRED_TABLES.iter().map(|t| t.to_string()).collect();
                let row = self
                    .client
                    .query_one(
                        "SELECT COUNT(DISTINCT tablename) FROM pg_tables WHERE tablename = ANY($1)",
                        &[&tables],
                    )
                    .await
                    .map_err(|e| {
                        StateStorageError::StorageError(format!(
                            "Failed to verify table existence: {}",
                            e
                        ))
                    })?;

                let found: i64 = row.get(0);
                if found < REQUIRED_TABLES.len() as i64 {
                    return Err(StateStorageError::StorageError(
                        "Conversation tables do not exist. \
                         Please run the setup SQL from docs/db_setup/conversation_analysis.sql"
                            .to_string(),
                    ));
                }

                info!("conversation analysis tables verified");
                Ok(())
            })
            .await?;

        Ok(())
    }
}

fn row_to_turn(row: &Row) -> Result<Turn, StateStorageError> {
    let sender: String = row.get("sender");
    let sender = sender
        .parse::<Sender>()
        .map_err(StateStorageError::SerializationError)?;
    let text: String = row.get("text");
    let timestamp: DateTime<Utc> = row.get("created_at");
    Ok(Turn::new(sender, text, timestamp))
}

fn row_to_report(row: &Row) -> Result<StoredReport, StateStorageError> {
    let sentiment: String = row.get("sentiment");
    let fallback_frequency: i64 = row.get("fallback_frequency");

    Ok(StoredReport {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        report: AnalysisReport {
            clarity: row.get("clarity_score"),
            relevance: row.get("relevance_score"),
            accuracy: row.get("accuracy_score"),
            completeness: row.get("completeness_score"),
            sentiment: sentiment
                .parse::<Sentiment>()
                .map_err(StateStorageError::SerializationError)?,
            empathy: row.get("empathy_score"),
            avg_response_time_seconds: row.get("response_time_avg"),
            resolved: row.get("resolution_rate"),
            escalation_needed: row.get("escalation_need"),
            fallback_count: usize::try_from(fallback_frequency).map_err(|e| {
                StateStorageError::SerializationError(format!(
                    "invalid fallback_frequency {}: {}",
                    fallback_frequency, e
                ))
            })?,
            overall: row.get("overall_score"),
        },
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl ConversationSource for PostgreSQLConversationStorage {
    async fn turns(
        &self,
        conversation_id: ConversationId,
    ) -> Result<ConversationInput, StateStorageError> {
        if !self.exists(conversation_id).await? {
            return Err(StateStorageError::NotFound(format!(
                "conversation {}",
                conversation_id
            )));
        }

        let rows = self
            .client
            .query(
                r#"
                SELECT sender, text, created_at
                FROM messages
                WHERE conversation_id = $1
                ORDER BY created_at, position
                "#,
                &[&conversation_id],
            )
            .await
            .map_err(|e| {
                StateStorageError::StorageError(format!(
                    "Failed to fetch messages for conversation {}: {}",
                    conversation_id, e
                ))
            })?;

        let turns = rows.iter().map(row_to_turn).collect::<Result<Vec<_>, _>>()?;
        debug!(conversation_id, turns = turns.len(), "retrieved conversation turns");
        Ok(ConversationInput::new(turns))
    }

    async fn exists(&self, conversation_id: ConversationId) -> Result<bool, StateStorageError> {
        self.ensure_ready().await?;

        let row = self
            .client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = $1)",
                &[&conversation_id],
            )
            .await
            .map_err(|e| {
                StateStorageError::StorageError(format!(
                    "Failed to check existence for conversation {}: {}",
                    conversation_id, e
                ))
            })?;

        Ok(row.get(0))
    }
}

#[async_trait]
impl ReportSink for PostgreSQLConversationStorage {
    async fn upsert_report(
        &self,
        conversation_id: ConversationId,
        report: AnalysisReport,
    ) -> Result<StoredReport, StateStorageError> {
        self.ensure_ready().await?;

        let fallback_frequency = i64::try_from(report.fallback_count).map_err(|e| {
            StateStorageError::SerializationError(format!("fallback_count out of range: {}", e))
        })?;
        let sentiment = report.sentiment.as_str();

        let statement = format!(
            r#"
            INSERT INTO conversation_analyses
                (conversation_id, clarity_score, relevance_score, accuracy_score,
                 completeness_score, sentiment, empathy_score, response_time_avg,
                 resolution_rate, escalation_need, fallback_frequency, overall_score, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW())
            ON CONFLICT (conversation_id)
            DO UPDATE SET
                clarity_score = EXCLUDED.clarity_score,
                relevance_score = EXCLUDED.relevance_score,
                accuracy_score = EXCLUDED.accuracy_score,
                completeness_score = EXCLUDED.completeness_score,
                sentiment = EXCLUDED.sentiment,
                empathy_score = EXCLUDED.empathy_score,
                response_time_avg = EXCLUDED.response_time_avg,
                resolution_rate = EXCLUDED.resolution_rate,
                escalation_need = EXCLUDED.escalation_need,
                fallback_frequency = EXCLUDED.fallback_frequency,
                overall_score = EXCLUDED.overall_score
            RETURNING {}
            "#,
            REPORT_COLUMNS
        );

        let row = self
            .client
            .query_one(
                statement.as_str(),
                &[
                    &conversation_id,
                    &report.clarity,
                    &report.relevance,
                    &report.accuracy,
                    &report.completeness,
                    &sentiment,
                    &report.empathy,
                    &report.avg_response_time_seconds,
                    &report.resolved,
                    &report.escalation_needed,
                    &fallback_frequency,
                    &report.overall,
                ],
            )
            .await
            .map_err(|e| {
                StateStorageError::StorageError(format!(
                    "Failed to store analysis for conversation {}: {}",
                    conversation_id, e
                ))
            })?;

        let stored = row_to_report(&row)?;
        debug!(conversation_id, report_id = stored.id, "stored analysis report");
        Ok(stored)
    }
}

#[async_trait]
impl ConversationStorage for PostgreSQLConversationStorage {
    async fn create_conversation(
        &self,
        conversation: NewConversation,
    ) -> Result<ConversationSummary, StateStorageError> {
        self.ensure_ready().await?;

        let title = conversation.title.filter(|title| !title.is_empty());
        let positions: Vec<i64> = (0..conversation.turns.len() as i64).collect();
        let senders: Vec<String> = conversation
            .turns
            .iter()
            .map(|turn| turn.sender.as_str().to_string())
            .collect();
        let texts: Vec<String> = conversation
            .turns
            .iter()
            .map(|turn| turn.text.clone())
            .collect();
        let timestamps: Vec<DateTime<Utc>> =
            conversation.turns.iter().map(|turn| turn.timestamp).collect();

        // Single statement so the conversation and its messages land atomically
        let row = self
            .client
            .query_one(
                r#"
                WITH new_id AS (
                    SELECT nextval(pg_get_serial_sequence('conversations', 'id')) AS id
                ),
                convo AS (
                    INSERT INTO conversations (id, title, created_at)
                    SELECT id, COALESCE($1, 'Chat ' || id), NOW() FROM new_id
                    RETURNING id, title, created_at
                ),
                msgs AS (
                    INSERT INTO messages (conversation_id, position, sender, text, created_at)
                    SELECT convo.id, m.position, m.sender, m.text, m.created_at
                    FROM convo,
                         UNNEST($2::BIGINT[], $3::TEXT[], $4::TEXT[], $5::TIMESTAMPTZ[])
                            AS m(position, sender, text, created_at)
                )
                SELECT id, title, created_at FROM convo
                "#,
                &[&title, &positions, &senders, &texts, &timestamps],
            )
            .await
            .map_err(|e| {
                StateStorageError::StorageError(format!("Failed to store conversation: {}", e))
            })?;

        let summary = ConversationSummary {
            id: row.get("id"),
            title: row.get("title"),
            created_at: row.get("created_at"),
        };
        debug!(
            conversation_id = summary.id,
            turns = conversation.turns.len(),
            "stored conversation"
        );
        Ok(summary)
    }

    async fn get_report(&self, report_id: ReportId) -> Result<StoredReport, StateStorageError> {
        self.ensure_ready().await?;

        let statement = format!(
            "SELECT {} FROM conversation_analyses WHERE id = $1",
            REPORT_COLUMNS
        );
        let row = self
            .client
            .query_opt(statement.as_str(), &[&report_id])
            .await
            .map_err(|e| {
                StateStorageError::StorageError(format!(
                    "Failed to fetch report {}: {}",
                    report_id, e
                ))
            })?;

        match row {
            Some(row) => row_to_report(&row),
            None => Err(StateStorageError::NotFound(format!("report {}", report_id))),
        }
    }

    async fn list_reports(&self) -> Result<Vec<StoredReport>, StateStorageError> {
        self.ensure_ready().await?;

        let statement = format!(
            "SELECT {} FROM conversation_analyses ORDER BY created_at DESC, id DESC",
            REPORT_COLUMNS
        );
        let rows = self
            .client
            .query(statement.as_str(), &[])
            .await
            .map_err(|e| StateStorageError::StorageError(format!("Failed to list reports: {}", e)))?;

        rows.iter().map(row_to_report).collect()
    }

    async fn conversations_without_report(
        &self,
    ) -> Result<Vec<ConversationId>, StateStorageError> {
        self.ensure_ready().await?;

        let rows = self
            .client
            .query(
                r#"
                SELECT c.id
                FROM conversations c
                LEFT JOIN conversation_analyses a ON a.conversation_id = c.id
                WHERE a.id IS NULL
                ORDER BY c.id
                "#,
                &[],
            )
            .await
            .map_err(|e| {
                StateStorageError::StorageError(format!(
                    "Failed to list unanalyzed conversations: {}",
                    e
                ))
            })?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }
}

/*
PostgreSQL schema is maintained in docs/db_setup/conversation_analysis.sql
Run that SQL file against your database before using this storage backend.
*/
