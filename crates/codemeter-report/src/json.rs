use serde::Serialize;

use codemeter_service::job::{AggregateMetrics, AnalysisJob, FileAnalysisResult};

/// Machine-readable report: the job, its aggregate, and every file result.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub job: &'a AnalysisJob,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<&'a AggregateMetrics>,
    pub files: &'a [FileAnalysisResult],
}

/// Format a finished analysis as JSON.
pub fn format_report(
    job: &AnalysisJob,
    results: &[FileAnalysisResult],
    aggregate: Option<&AggregateMetrics>,
    compact: bool,
) -> serde_json::Result<String> {
    let report = Report {
        job,
        summary: aggregate,
        files: results,
    };
    if compact {
        serde_json::to_string(&report)
    } else {
        serde_json::to_string_pretty(&report)
    }
}
