//! Background generation jobs.
//!
//! A job is a session run to completion without an attached observer; callers
//! poll its status by id. Finished jobs are evicted once they are older than
//! the configured TTL.

use crate::client::GenerationClient;
use crate::feature::GenerationFeature;
use crate::session::StreamSession;
use crate::types::SessionSnapshot;
use crate::Error;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Progress of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed { data: Value },
    Failed { error: String },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

/// A tracked job.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub created_at: Instant,
    /// When the job completed or failed.
    pub finished_at: Option<Instant>,
}

/// Counts of tracked jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStats {
    pub total: usize,
    pub processing: usize,
    pub finished: usize,
}

/// In-memory job store.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: DashMap<String, Job>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Track a new job as processing.
    pub fn create(&self, id: impl Into<String>) {
        let id = id.into();
        tracing::debug!(job_id = %id, "job created");
        self.jobs.insert(
            id.clone(),
            Job {
                id,
                status: JobStatus::Processing,
                created_at: Instant::now(),
                finished_at: None,
            },
        );
    }

    pub fn complete(&self, id: &str, data: Value) {
        self.finish(id, JobStatus::Completed { data });
    }

    pub fn fail(&self, id: &str, error: impl Into<String>) {
        self.finish(id, JobStatus::Failed { error: error.into() });
    }

    fn finish(&self, id: &str, status: JobStatus) {
        match self.jobs.get_mut(id) {
            Some(mut job) => {
                job.status = status;
                job.finished_at = Some(Instant::now());
            }
            None => tracing::warn!(job_id = %id, "finishing unknown job"),
        }
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        self.jobs.get(id).map(|job| job.clone())
    }

    pub fn remove(&self, id: &str) {
        self.jobs.remove(id);
    }

    /// Evict finished jobs older than `ttl`. Jobs still processing are kept.
    /// Returns the number of jobs removed.
    pub fn cleanup(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let before = self.jobs.len();
        self.jobs.retain(|_, job| match job.finished_at {
            Some(finished_at) => now.duration_since(finished_at) < ttl,
            None => true,
        });
        let removed = before.saturating_sub(self.jobs.len());
        if removed > 0 {
            tracing::info!(removed, remaining = self.jobs.len(), "evicted finished jobs");
        }
        removed
    }

    pub fn stats(&self) -> JobStats {
        let total = self.jobs.len();
        let processing = self
            .jobs
            .iter()
            .filter(|job| !job.status.is_finished())
            .count();
        JobStats {
            total,
            processing,
            finished: total - processing,
        }
    }
}

/// Spawn a background task that periodically evicts expired jobs.
pub fn spawn_cleanup_task(
    store: Arc<JobStore>,
    interval: Duration,
    ttl: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("job cleanup task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    store.cleanup(ttl);
                }
            }
        }
    })
}

/// Runs generation sessions as background jobs.
#[derive(Debug, Clone)]
pub struct JobRunner {
    client: GenerationClient,
    store: Arc<JobStore>,
    shutdown: CancellationToken,
}

impl JobRunner {
    /// Create a runner and start evicting finished jobs from `store` every
    /// `cleanup_interval`, keeping them for `job_ttl`. Must be called inside a
    /// Tokio runtime. The cleanup task stops on [`JobRunner::shutdown`].
    pub fn new(client: GenerationClient, store: Arc<JobStore>) -> Self {
        let shutdown = CancellationToken::new();
        let config = client.config();
        spawn_cleanup_task(
            Arc::clone(&store),
            config.cleanup_interval,
            config.job_ttl,
            shutdown.child_token(),
        );
        Self {
            client,
            store,
            shutdown,
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Validate the request and start it in the background. Returns the job id.
    pub fn submit<F: GenerationFeature>(&self, request: F) -> Result<String, Error> {
        request.validate()?;

        let id = format!("{}-{}", F::RESOURCE, uuid::Uuid::new_v4());
        self.store.create(id.clone());

        let (snapshots, _) = watch::channel(SessionSnapshot::idle(String::new()));
        let session = StreamSession::new(
            request,
            self.client.config().clone(),
            self.shutdown.child_token(),
            snapshots,
        );
        let client = self.client.clone();
        let store = Arc::clone(&self.store);
        let job_id = id.clone();

        tokio::spawn(async move {
            match session.run(&client).await {
                Ok(outcome) => {
                    let data = serde_json::json!({
                        "id": outcome.id,
                        "downloadToken": outcome.artifact_token,
                        "result": outcome.accumulated,
                        "saved": outcome.saved,
                    });
                    store.complete(&job_id, data);
                }
                Err(e) => store.fail(&job_id, e.to_string()),
            }
        });

        Ok(id)
    }

    pub fn status(&self, id: &str) -> Option<JobStatus> {
        self.store.get(id).map(|job| job.status)
    }

    /// Cancel every running job and stop the cleanup task.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
