//! In-process collaborator implementations for the CLI and tests.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::job::{AggregateMetrics, AnalysisJob, FileAnalysisResult, Project, ProjectFile};
use crate::ports::{Cache, EventBus, JobStore, MetricsStore, ProjectLookup};

#[derive(Debug, Default)]
pub struct InMemoryProjects {
    projects: RwLock<HashMap<String, (Project, Vec<ProjectFile>)>>,
}

impl InMemoryProjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, project: Project, files: Vec<ProjectFile>) {
        self.projects
            .write()
            .insert(project.id.clone(), (project, files));
    }
}

#[async_trait]
impl ProjectLookup for InMemoryProjects {
    async fn get_by_id(&self, project_id: &str) -> Result<Option<Project>> {
        Ok(self.projects.read().get(project_id).map(|(p, _)| p.clone()))
    }

    async fn get_files(&self, project_id: &str) -> Result<Vec<ProjectFile>> {
        self.projects
            .read()
            .get(project_id)
            .map(|(_, files)| files.clone())
            .ok_or_else(|| anyhow::anyhow!("project '{project_id}' has no file listing"))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, AnalysisJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: &AnalysisJob) -> Result<()> {
        let mut jobs = self.jobs.write();
        anyhow::ensure!(!jobs.contains_key(&job.id), "job '{}' already exists", job.id);
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<AnalysisJob>> {
        Ok(self.jobs.read().get(job_id).cloned())
    }

    async fn update(&self, job: &AnalysisJob) -> Result<()> {
        let mut jobs = self.jobs.write();
        let slot = jobs
            .get_mut(&job.id)
            .ok_or_else(|| anyhow::anyhow!("job '{}' does not exist", job.id))?;
        *slot = job.clone();
        Ok(())
    }
}

/// Everything persisted for one finished job.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedAnalysis {
    pub results: Vec<FileAnalysisResult>,
    pub aggregate: AggregateMetrics,
}

#[derive(Debug, Default)]
pub struct InMemoryMetricsStore {
    saved: RwLock<HashMap<String, SavedAnalysis>>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, job_id: &str) -> Option<SavedAnalysis> {
        self.saved.read().get(job_id).cloned()
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn save(
        &self,
        job_id: &str,
        results: &[FileAnalysisResult],
        aggregate: &AggregateMetrics,
    ) -> Result<()> {
        self.saved.write().insert(
            job_id.to_string(),
            SavedAnalysis {
                results: results.to_vec(),
                aggregate: aggregate.clone(),
            },
        );
        Ok(())
    }
}

/// Cache whose entries expire after their TTL. Expired entries are dropped
/// lazily on read.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if matches!(entries.get(key), Some((_, expires)) if *expires <= now) {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }
}

/// Records every published message.
#[derive(Debug, Default)]
pub struct InMemoryEventBus {
    messages: Mutex<Vec<(String, Vec<u8>)>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(String, Vec<u8>)> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, key: &str, payload: Vec<u8>) -> Result<()> {
        self.messages.lock().push((key.to_string(), payload));
        Ok(())
    }
}
