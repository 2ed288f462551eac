use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use codemeter_core::language::Language;
use codemeter_core::metrics::{FileMetrics, QualitySummary};

/// Event type published when a job completes.
pub const COMPLETED_EVENT: &str = "analysis.completed";

/// Cache key for a job's status record.
pub fn job_cache_key(job_id: &str) -> String {
    format!("analysis:job:{job_id}")
}

/// Cache key for a job's aggregate metrics.
pub fn summary_cache_key(job_id: &str) -> String {
    format!("analysis:summary:{job_id}")
}

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Status only moves forward. Pending may be cancelled or failed before
    /// it starts running.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Pending => next != JobStatus::Pending,
            JobStatus::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One analysis run over a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: String,
    pub project_id: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub progress: usize,
    pub total_files: usize,
}

impl AnalysisJob {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            status: JobStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
            progress: 0,
            total_files: 0,
        }
    }

    /// Move to `next`, stamping `completed_at` on the first terminal state.
    /// Returns false and leaves the job untouched if the move is not allowed.
    pub fn transition(&mut self, next: JobStatus, error: Option<String>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        if error.is_some() {
            self.error = error;
        }
        true
    }
}

/// Outcome of analyzing one file. Exactly one of `metrics` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAnalysisResult {
    pub file_path: String,
    pub language: Language,
    pub loc: usize,
    pub complexity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<FileMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileAnalysisResult {
    pub fn success(file_path: String, language: Language, metrics: FileMetrics) -> Self {
        Self {
            file_path,
            language,
            loc: metrics.loc,
            complexity: metrics.cyclomatic_complexity,
            metrics: Some(metrics),
            error: None,
        }
    }

    pub fn failure(file_path: String, language: Language, error: impl Into<String>) -> Self {
        Self {
            file_path,
            language,
            loc: 0,
            complexity: 0,
            metrics: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Project-level totals for a finished job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub total_files: usize,
    pub total_loc: usize,
    pub total_complexity: u32,
    pub average_complexity: f64,
    /// Successful files per language.
    pub language_distribution: BTreeMap<String, usize>,
    pub error_count: usize,
    pub analysis_timestamp: DateTime<Utc>,
    pub quality: QualitySummary,
}

impl AggregateMetrics {
    /// Totals over `results`. Errored files count toward `total_files` and
    /// `error_count` only.
    pub fn from_results(results: &[FileAnalysisResult]) -> Self {
        let mut total_loc = 0;
        let mut total_complexity = 0;
        let mut error_count = 0;
        let mut language_distribution = BTreeMap::new();

        for result in results {
            if result.is_error() {
                error_count += 1;
                continue;
            }
            total_loc += result.loc;
            total_complexity += result.complexity;
            *language_distribution
                .entry(result.language.to_string())
                .or_insert(0) += 1;
        }

        let successful = results.len() - error_count;
        let average_complexity = if successful > 0 {
            total_complexity as f64 / successful as f64
        } else {
            0.0
        };

        let quality = codemeter_core::metrics::summarize(
            results.iter().filter_map(|r| r.metrics.as_ref()),
        );

        Self {
            total_files: results.len(),
            total_loc,
            total_complexity,
            average_complexity,
            language_distribution,
            error_count,
            analysis_timestamp: Utc::now(),
            quality,
        }
    }
}

/// Message published on the event bus when a job completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisEvent {
    pub analysis_id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub data: CompletionData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionData {
    pub project_id: String,
    pub analysis_id: String,
    pub total_files: usize,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisEvent {
    pub fn completed(job: &AnalysisJob) -> Self {
        Self {
            analysis_id: job.id.clone(),
            event_type: COMPLETED_EVENT.to_string(),
            timestamp: Utc::now(),
            data: CompletionData {
                project_id: job.project_id.clone(),
                analysis_id: job.id.clone(),
                total_files: job.total_files,
                completed_at: job.completed_at,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

/// A file belonging to a project, with its raw content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFile {
    pub path: String,
    pub content: Vec<u8>,
}

impl ProjectFile {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}
