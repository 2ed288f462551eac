use colored::{ColoredString, Colorize};

use codemeter_service::job::{AggregateMetrics, AnalysisJob, FileAnalysisResult, JobStatus};

/// Files listed in the "most complex" section.
const TOP_FILES: usize = 5;

/// Format a finished analysis for terminal output.
///
/// `results` and `aggregate` are absent when the job did not complete.
pub fn format_report(
    job: &AnalysisJob,
    results: &[FileAnalysisResult],
    aggregate: Option<&AggregateMetrics>,
) -> String {
    let mut out = String::new();

    out.push_str(&format!("\n{}\n", "codemeter - Code Metrics Report".bold()));
    out.push_str(&format!("{}\n\n", "=".repeat(40)));

    out.push_str(&format!(
        "{}: {} ({})\n",
        "Analysis".bold(),
        job.id,
        status_label(job.status)
    ));
    out.push_str(&format!(
        "  Files processed: {}/{}\n",
        job.progress, job.total_files
    ));
    if let Some(ref error) = job.error {
        out.push_str(&format!("  {}: {}\n", "Reason".red(), error));
    }

    if let Some(agg) = aggregate {
        out.push_str(&format_summary(agg));
        out.push_str(&format_quality(agg));
    }

    let mut ranked: Vec<_> = results.iter().filter(|r| !r.is_error()).collect();
    if !ranked.is_empty() {
        ranked.sort_by(|a, b| {
            b.complexity
                .cmp(&a.complexity)
                .then_with(|| a.file_path.cmp(&b.file_path))
        });
        out.push_str(&format!(
            "\n{}\n{}\n",
            "Most Complex Files".bold(),
            "-".repeat(40)
        ));
        for r in ranked.iter().take(TOP_FILES) {
            let mi = r
                .metrics
                .as_ref()
                .map(|m| format!("{:.1}", m.maintainability_index))
                .unwrap_or_default();
            out.push_str(&format!(
                "  {:>4}  {}  (loc {}, MI {})\n",
                r.complexity, r.file_path, r.loc, mi
            ));
        }
    }

    let errors: Vec<_> = results.iter().filter(|r| r.is_error()).collect();
    if !errors.is_empty() {
        out.push_str(&format!(
            "\n{} ({} files)\n{}\n",
            "Skipped".yellow().bold(),
            errors.len(),
            "-".repeat(40)
        ));
        for r in errors {
            out.push_str(&format!(
                "  {}: {}\n",
                r.file_path,
                r.error.as_deref().unwrap_or_default()
            ));
        }
    }

    out.push('\n');
    out
}

fn format_summary(agg: &AggregateMetrics) -> String {
    let mut out = String::new();
    out.push_str(&format!("\n{}\n{}\n", "Summary".bold(), "-".repeat(40)));
    out.push_str(&format!("  Files:               {}\n", agg.total_files));
    out.push_str(&format!("  Lines of code:       {}\n", agg.total_loc));
    out.push_str(&format!("  Total complexity:    {}\n", agg.total_complexity));
    out.push_str(&format!(
        "  Average complexity:  {:.2}\n",
        agg.average_complexity
    ));
    out.push_str(&format!("  Errors:              {}\n", agg.error_count));

    if !agg.language_distribution.is_empty() {
        out.push_str("  Languages:\n");
        for (lang, count) in &agg.language_distribution {
            out.push_str(&format!("    {lang}: {count}\n"));
        }
    }
    out
}

fn format_quality(agg: &AggregateMetrics) -> String {
    let q = &agg.quality;
    let mut out = String::new();
    out.push_str(&format!("\n{}\n{}\n", "Quality".bold(), "-".repeat(40)));
    out.push_str(&format!(
        "  Maintainability:     {}/100\n",
        score_color(q.average_maintainability)
    ));
    out.push_str(&format!("  Functions:           {}\n", q.total_functions));
    out.push_str(&format!("  Types:               {}\n", q.total_classes));
    out.push_str(&format!("  Code smells:         {}\n", q.total_code_smells));
    out.push_str(&format!(
        "  Technical debt:      {:.2}h\n",
        q.total_technical_debt
    ));
    out.push_str(&format!(
        "  Est. test coverage:  {:.1}%\n",
        q.average_test_coverage
    ));
    out
}

fn score_color(score: f64) -> ColoredString {
    let s = format!("{score:.1}");
    if score >= 80.0 {
        s.green()
    } else if score >= 50.0 {
        s.yellow()
    } else {
        s.red()
    }
}

fn status_label(status: JobStatus) -> ColoredString {
    match status {
        JobStatus::Completed => status.as_str().green().bold(),
        JobStatus::Failed => status.as_str().red().bold(),
        JobStatus::Cancelled => status.as_str().yellow().bold(),
        JobStatus::Pending | JobStatus::Running => status.as_str().blue(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codemeter_core::language::Language;
    use codemeter_core::metrics::FileMetrics;

    fn results() -> Vec<FileAnalysisResult> {
        vec![
            FileAnalysisResult::success(
                "cmd/main.go".into(),
                Language::Go,
                FileMetrics {
                    loc: 40,
                    cyclomatic_complexity: 3,
                    maintainability_index: 90.5,
                    ..Default::default()
                },
            ),
            FileAnalysisResult::success(
                "internal/parse.go".into(),
                Language::Go,
                FileMetrics {
                    loc: 300,
                    cyclomatic_complexity: 42,
                    maintainability_index: 41.0,
                    ..Default::default()
                },
            ),
            FileAnalysisResult::failure(
                "web/app.ts".into(),
                Language::TypeScript,
                "no analyzer registered for language: typescript",
            ),
        ]
    }

    fn completed_job() -> AnalysisJob {
        let mut job = AnalysisJob::new("p1");
        job.transition(JobStatus::Running, None);
        job.total_files = 3;
        job.progress = 3;
        job.transition(JobStatus::Completed, None);
        job
    }

    #[test]
    fn test_completed_report() {
        let results = results();
        let agg = AggregateMetrics::from_results(&results);
        let report = format_report(&completed_job(), &results, Some(&agg));

        assert!(report.contains("Files processed: 3/3"));
        assert!(report.contains("Lines of code:       340"));
        assert!(report.contains("go: 2"));
        assert!(report.contains("web/app.ts: no analyzer registered"));

        // most complex first
        let parse = report.find("internal/parse.go").unwrap();
        let main = report.find("cmd/main.go").unwrap();
        assert!(parse < main);
    }

    #[test]
    fn test_failed_report_shows_reason() {
        let mut job = AnalysisJob::new("p1");
        job.transition(JobStatus::Failed, Some("list project files failed".into()));
        let report = format_report(&job, &[], None);

        assert!(report.contains("list project files failed"));
        assert!(!report.contains("Summary"));
    }
}
