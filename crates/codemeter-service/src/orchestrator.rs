use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use codemeter_core::analyzer::AnalyzerRegistry;
use codemeter_core::config::Config;
use codemeter_core::metrics::MetricsCalculator;

use crate::error::{Result, ServiceError};
use crate::job::{
    job_cache_key, summary_cache_key, AggregateMetrics, AnalysisEvent, AnalysisJob,
    FileAnalysisResult, JobStatus,
};
use crate::pipeline::{self, FileAnalyzer, ProgressSink, MAX_WORKERS};
use crate::ports::{Cache, EventBus, JobStore, MetricsStore, ProjectLookup};

/// Failure reason recorded when a user cancels a job.
pub const CANCEL_REASON: &str = "analysis cancelled by user";

/// External services the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub projects: Arc<dyn ProjectLookup>,
    pub jobs: Arc<dyn JobStore>,
    pub metrics: Arc<dyn MetricsStore>,
    pub cache: Arc<dyn Cache>,
    pub events: Arc<dyn EventBus>,
}

/// Worker count when none is configured: max(4, 2 x logical CPUs).
pub fn default_worker_count() -> usize {
    (2 * num_cpus::get()).clamp(4, MAX_WORKERS)
}

#[derive(Clone)]
struct JobHandle {
    cancel: CancellationToken,
    /// Serializes status transitions and progress cache writes for one job.
    transitions: Arc<tokio::sync::Mutex<()>>,
}

impl JobHandle {
    fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            transitions: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

/// Runs analysis jobs in the background and tracks their lifecycle.
///
/// Cloning is cheap and clones share running jobs.
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    files: Arc<FileAnalyzer>,
    collaborators: Collaborators,
    workers: usize,
    cache_ttl: Duration,
    handles: DashMap<String, JobHandle>,
}

impl AnalysisOrchestrator {
    pub fn new(registry: AnalyzerRegistry, collaborators: Collaborators, config: &Config) -> Self {
        let workers = match config.service.worker_pool_size {
            0 => default_worker_count(),
            n if n > MAX_WORKERS => {
                warn!(
                    configured = n,
                    max = MAX_WORKERS,
                    "worker_pool_size too large, clamping"
                );
                MAX_WORKERS
            }
            n => n,
        };
        let calculator = MetricsCalculator::new(config.metrics.clone());

        Self {
            inner: Arc::new(Inner {
                files: Arc::new(FileAnalyzer::new(registry, calculator)),
                collaborators,
                workers,
                cache_ttl: config.service.cache_ttl(),
                handles: DashMap::new(),
            }),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.inner.workers
    }

    /// Create a job for `project_id` and start analyzing it in the background.
    ///
    /// Only lookup and job creation errors are returned; everything after
    /// that is reported through the job's status.
    pub async fn start_analysis(&self, project_id: &str) -> Result<AnalysisJob> {
        let inner = &self.inner;
        let project = inner
            .collaborators
            .projects
            .get_by_id(project_id)
            .await
            .map_err(|e| ServiceError::infrastructure("get project", e))?
            .ok_or_else(|| ServiceError::ProjectNotFound(project_id.to_string()))?;

        let job = AnalysisJob::new(project.id.clone());
        inner
            .collaborators
            .jobs
            .create(&job)
            .await
            .map_err(|e| ServiceError::infrastructure("create job", e))?;
        inner.cache_job(&job).await;

        let handle = JobHandle::new();
        inner.handles.insert(job.id.clone(), handle.clone());

        info!(
            job_id = %job.id,
            project_id = %project.id,
            project = %project.name,
            workers = inner.workers,
            "analysis started"
        );

        tokio::spawn(inner.clone().supervise(job.id.clone(), project.id, handle));
        Ok(job)
    }

    /// Current state of a job, from the cache when possible.
    pub async fn get_analysis(&self, job_id: &str) -> Result<AnalysisJob> {
        let inner = &self.inner;
        match inner.collaborators.cache.get(&job_cache_key(job_id)).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(job) => return Ok(job),
                Err(e) => debug!(job_id, error = %e, "ignoring undecodable cached job"),
            },
            Ok(None) => {}
            Err(e) => warn!(job_id, error = ?e, "cache read failed"),
        }

        inner
            .collaborators
            .jobs
            .get(job_id)
            .await
            .map_err(|e| ServiceError::infrastructure("get job", e))?
            .ok_or_else(|| ServiceError::JobNotFound(job_id.to_string()))
    }

    /// Stop a job. Cancelling a job that already finished is a no-op.
    pub async fn cancel_analysis(&self, job_id: &str) -> Result<()> {
        let inner = &self.inner;
        let handle = inner.handles.get(job_id).map(|h| h.value().clone());
        let handle = match handle {
            Some(handle) => {
                handle.cancel.cancel();
                handle
            }
            // Not running in this process; only the stored status can change
            None => JobHandle::new(),
        };

        let cancelled = inner
            .update_job(job_id, &handle, |job| {
                job.transition(JobStatus::Cancelled, Some(CANCEL_REASON.to_string()))
            })
            .await?;

        match cancelled {
            Some(_) => info!(job_id, "analysis cancelled"),
            None => debug!(job_id, "cancel ignored, job already finished"),
        }
        Ok(())
    }
}

impl Inner {
    /// Runs the job and turns every way it can end into a final status.
    async fn supervise(self: Arc<Self>, job_id: String, project_id: String, handle: JobHandle) {
        let task = tokio::spawn(self.clone().run_job(
            job_id.clone(),
            project_id,
            handle.clone(),
        ));

        let failure = match task.await {
            Ok(Ok(())) => None,
            Ok(Err(ServiceError::Cancelled)) => {
                debug!(job_id = %job_id, "analysis stopped after cancellation");
                None
            }
            Ok(Err(e)) => {
                error!(job_id = %job_id, error = %e, "analysis failed");
                Some(e.to_string())
            }
            Err(e) if e.is_panic() => {
                let msg = panic_message(e.into_panic());
                error!(job_id = %job_id, panic = %msg, "analysis panicked");
                Some(format!("analysis panic: {msg}"))
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "analysis task aborted");
                Some(format!("analysis aborted: {e}"))
            }
        };

        if let Some(reason) = failure {
            let failed = self
                .update_job(&job_id, &handle, |job| {
                    job.transition(JobStatus::Failed, Some(reason))
                })
                .await;
            if let Err(e) = failed {
                error!(job_id = %job_id, error = %e, "could not record job failure");
            }
        }

        self.handles.remove(&job_id);
    }

    async fn run_job(
        self: Arc<Self>,
        job_id: String,
        project_id: String,
        handle: JobHandle,
    ) -> Result<()> {
        let running = self
            .update_job(&job_id, &handle, |job| {
                !handle.cancel.is_cancelled() && job.transition(JobStatus::Running, None)
            })
            .await?
            .ok_or(ServiceError::Cancelled)?;

        let files = self
            .collaborators
            .projects
            .get_files(&project_id)
            .await
            .map_err(|e| ServiceError::infrastructure("list project files", e))?;
        let total = files.len();
        debug!(job_id = %job_id, files = total, "project files listed");

        let running = self
            .update_job(&job_id, &handle, |job| {
                if job.status.is_terminal() {
                    return false;
                }
                job.total_files = total;
                true
            })
            .await?
            .unwrap_or(running);

        let tracker = Arc::new(ProgressTracker {
            inner: self.clone(),
            handle: handle.clone(),
            snapshot: Mutex::new(running),
        });
        let results =
            pipeline::run(files, self.files.clone(), self.workers, &handle.cancel, tracker).await?;

        // A cancelled job records no results
        if handle.cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }
        let aggregate = AggregateMetrics::from_results(&results);
        tokio::select! {
            biased;
            _ = handle.cancel.cancelled() => return Err(ServiceError::Cancelled),
            saved = self.collaborators.metrics.save(&job_id, &results, &aggregate) => {
                saved.map_err(|e| ServiceError::infrastructure("save metrics", e))?;
            }
        }

        let collected = results.len();
        let completed = self
            .update_job(&job_id, &handle, |job| {
                job.progress = collected;
                job.total_files = total;
                job.transition(JobStatus::Completed, None)
            })
            .await?
            .ok_or(ServiceError::Cancelled)?;

        match serde_json::to_string(&aggregate) {
            Ok(summary) => self.cache_set(&summary_cache_key(&job_id), summary).await,
            Err(e) => warn!(job_id = %job_id, error = %e, "could not encode summary"),
        }

        info!(
            job_id = %job_id,
            files = aggregate.total_files,
            errors = aggregate.error_count,
            loc = aggregate.total_loc,
            "analysis completed"
        );

        self.publish_completed(&completed).await;
        Ok(())
    }

    /// Load, modify, and store a job under its transition lock.
    ///
    /// `apply` returns false to leave the job unchanged; the result is then
    /// `None`.
    async fn update_job<F>(
        &self,
        job_id: &str,
        handle: &JobHandle,
        apply: F,
    ) -> Result<Option<AnalysisJob>>
    where
        F: FnOnce(&mut AnalysisJob) -> bool + Send,
    {
        let _guard = handle.transitions.lock().await;

        let mut job = self
            .collaborators
            .jobs
            .get(job_id)
            .await
            .map_err(|e| ServiceError::infrastructure("get job", e))?
            .ok_or_else(|| ServiceError::JobNotFound(job_id.to_string()))?;

        let before = job.status;
        if !apply(&mut job) {
            return Ok(None);
        }

        self.collaborators
            .jobs
            .update(&job)
            .await
            .map_err(|e| ServiceError::infrastructure("update job", e))?;
        self.cache_job(&job).await;

        if before != job.status {
            debug!(job_id, from = %before, to = %job.status, "job status changed");
        }
        Ok(Some(job))
    }

    async fn publish_completed(&self, job: &AnalysisJob) {
        let payload = match serde_json::to_vec(&AnalysisEvent::completed(job)) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "could not encode completion event");
                return;
            }
        };
        if let Err(e) = self.collaborators.events.publish(&job.id, payload).await {
            warn!(job_id = %job.id, error = ?e, "could not publish completion event");
        }
    }

    async fn cache_job(&self, job: &AnalysisJob) {
        match serde_json::to_string(job) {
            Ok(value) => self.cache_set(&job_cache_key(&job.id), value).await,
            Err(e) => warn!(job_id = %job.id, error = %e, "could not encode job"),
        }
    }

    /// Cache writes are best effort.
    async fn cache_set(&self, key: &str, value: String) {
        if let Err(e) = self.collaborators.cache.set(key, value, self.cache_ttl).await {
            warn!(key, error = ?e, "cache write failed");
        }
    }
}

/// Caches the job's progress after every collected file.
struct ProgressTracker {
    inner: Arc<Inner>,
    handle: JobHandle,
    snapshot: Mutex<AnalysisJob>,
}

#[async_trait]
impl ProgressSink for ProgressTracker {
    async fn file_done(&self, result: &FileAnalysisResult, progress: usize) {
        if let Some(err) = &result.error {
            debug!(file = %result.file_path, error = %err, "file not analyzed");
        }

        let _guard = self.handle.transitions.lock().await;
        // A cancelled job's cached status must not be overwritten
        if self.handle.cancel.is_cancelled() {
            return;
        }
        let job = {
            let mut snapshot = self.snapshot.lock();
            snapshot.progress = progress;
            snapshot.clone()
        };
        self.inner.cache_job(&job).await;
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_worker_count_has_floor() {
        assert!(default_worker_count() >= 4);
        assert!(default_worker_count() <= MAX_WORKERS);
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("bang".to_string())), "bang");
        assert_eq!(panic_message(Box::new(42)), "unknown panic");
    }
}
