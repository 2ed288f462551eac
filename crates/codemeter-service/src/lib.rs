pub mod error;
pub mod job;
pub mod memory;
pub mod orchestrator;
pub mod pipeline;
pub mod ports;

pub use error::{Result, ServiceError};
pub use job::{AggregateMetrics, AnalysisEvent, AnalysisJob, FileAnalysisResult, JobStatus};
pub use orchestrator::{AnalysisOrchestrator, Collaborators};
