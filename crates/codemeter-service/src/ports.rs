//! Collaborators the orchestrator depends on. Every method may fail with an
//! infrastructure error; implementations must be safe to share across tasks.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::job::{AggregateMetrics, AnalysisJob, FileAnalysisResult, Project, ProjectFile};

#[async_trait]
pub trait ProjectLookup: Send + Sync {
    async fn get_by_id(&self, project_id: &str) -> Result<Option<Project>>;

    async fn get_files(&self, project_id: &str) -> Result<Vec<ProjectFile>>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: &AnalysisJob) -> Result<()>;

    async fn get(&self, job_id: &str) -> Result<Option<AnalysisJob>>;

    async fn update(&self, job: &AnalysisJob) -> Result<()>;
}

#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn save(
        &self,
        job_id: &str,
        results: &[FileAnalysisResult],
        aggregate: &AggregateMetrics,
    ) -> Result<()>;
}

/// Key/value cache with per-entry expiry.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, key: &str, payload: Vec<u8>) -> Result<()>;
}
