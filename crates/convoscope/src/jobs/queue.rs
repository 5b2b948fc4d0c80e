use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use common::consts::DEFAULT_JOB_RETENTION_SECONDS;

use super::perform_analysis;
use crate::signals::ConversationAnalyzer;
use crate::state::{ConversationId, ConversationStorage, ReportId};

/// Handle returned to callers of the analyze endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok().map(Self)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Succeeded { analysis_id: ReportId },
    /// No report was produced
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub task_id: JobId,
    pub conversation_id: ConversationId,
    #[serde(flatten)]
    pub status: JobStatus,
    #[serde(skip)]
    finished_at: Option<Instant>,
}

/// Outcome of recently enqueued jobs. Finished records are dropped once they
/// are older than the retention period.
#[derive(Clone)]
pub struct JobTracker {
    jobs: Arc<RwLock<HashMap<JobId, JobRecord>>>,
    retention: Duration,
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::with_retention(Duration::from_secs(DEFAULT_JOB_RETENTION_SECONDS))
    }
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    pub async fn get(&self, id: &JobId) -> Option<JobRecord> {
        self.jobs.read().await.get(id).cloned()
    }

    async fn insert(&self, id: JobId, conversation_id: ConversationId) {
        self.jobs.write().await.insert(
            id,
            JobRecord {
                task_id: id,
                conversation_id,
                status: JobStatus::Queued,
                finished_at: None,
            },
        );
    }

    /// Record a job's outcome and forget finished jobs past retention
    async fn set_status(&self, id: &JobId, status: JobStatus) {
        let now = Instant::now();
        let mut jobs = self.jobs.write().await;
        if let Some(record) = jobs.get_mut(id) {
            record.finished_at = (status != JobStatus::Queued).then_some(now);
            record.status = status;
        }

        let before = jobs.len();
        jobs.retain(|_, record| match record.finished_at {
            Some(finished_at) => now.duration_since(finished_at) <= self.retention,
            None => true,
        });
        let pruned = before - jobs.len();
        if pruned > 0 {
            debug!(pruned, "forgot expired job records");
        }
    }

    async fn remove(&self, id: &JobId) {
        self.jobs.write().await.remove(id);
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("analysis queue is full")]
    Full,
    #[error("analysis workers have stopped")]
    Closed,
}

#[derive(Debug)]
struct AnalysisJob {
    id: JobId,
    conversation_id: ConversationId,
}

/// Bounded queue of analysis jobs drained by a fixed pool of workers
#[derive(Clone)]
pub struct AnalysisQueue {
    sender: mpsc::Sender<AnalysisJob>,
    tracker: JobTracker,
}

impl AnalysisQueue {
    /// Spawn `workers` tasks sharing one receiver. Workers exit once every
    /// queue handle has been dropped and the backlog is drained.
    pub fn start(
        storage: Arc<dyn ConversationStorage>,
        analyzer: Arc<dyn ConversationAnalyzer>,
        tracker: JobTracker,
        workers: usize,
        capacity: usize,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (sender, receiver) = mpsc::channel::<AnalysisJob>(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let storage = Arc::clone(&storage);
                let analyzer = Arc::clone(&analyzer);
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    debug!(worker, "analysis worker started");
                    loop {
                        let job = receiver.lock().await.recv().await;
                        let Some(job) = job else {
                            break;
                        };

                        let span = info_span!(
                            "analysis_job",
                            task_id = %job.id,
                            conversation_id = job.conversation_id
                        );
                        let status = async {
                            match perform_analysis(
                                job.conversation_id,
                                storage.as_ref(),
                                storage.as_ref(),
                                analyzer.as_ref(),
                            )
                            .await
                            {
                                Some(stored) => JobStatus::Succeeded {
                                    analysis_id: stored.id,
                                },
                                None => JobStatus::Failed,
                            }
                        }
                        .instrument(span)
                        .await;

                        tracker.set_status(&job.id, status).await;
                    }
                    debug!(worker, "analysis worker stopped");
                })
            })
            .collect();

        info!(workers, capacity, "analysis queue started");
        (Self { sender, tracker }, handles)
    }

    /// Queue a conversation for analysis without waiting for a free slot
    pub async fn enqueue(&self, conversation_id: ConversationId) -> Result<JobId, QueueError> {
        let id = JobId::new();
        self.tracker.insert(id, conversation_id).await;

        match self.sender.try_send(AnalysisJob {
            id,
            conversation_id,
        }) {
            Ok(()) => {
                debug!(task_id = %id, conversation_id, "analysis queued");
                Ok(id)
            }
            Err(err) => {
                self.tracker.remove(&id).await;
                let err = match err {
                    mpsc::error::TrySendError::Full(_) => QueueError::Full,
                    mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
                };
                warn!(conversation_id, error = %err, "failed to queue analysis");
                Err(err)
            }
        }
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }
}
