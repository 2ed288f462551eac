//! Per-job worker group: one producer feeds a bounded file queue, W workers
//! analyze files, and a single collector gathers exactly one result per file.
//! All tasks share a cancellation token; the first failure cancels the rest.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use codemeter_core::analyzer::AnalyzerRegistry;
use codemeter_core::language::detect_language;
use codemeter_core::metrics::MetricsCalculator;

use crate::error::{Result, ServiceError};
use crate::job::{FileAnalysisResult, ProjectFile};

/// Upper bound on workers per job.
pub const MAX_WORKERS: usize = 256;

/// Detect, parse, and score a single file.
#[derive(Debug, Clone)]
pub struct FileAnalyzer {
    registry: AnalyzerRegistry,
    calculator: MetricsCalculator,
}

impl FileAnalyzer {
    pub fn new(registry: AnalyzerRegistry, calculator: MetricsCalculator) -> Self {
        Self {
            registry,
            calculator,
        }
    }

    /// Never fails: unsupported languages and analyzer errors are recorded on
    /// the result.
    pub fn analyze_file(&self, file: &ProjectFile) -> FileAnalysisResult {
        let language = detect_language(Path::new(&file.path), &file.content);

        let analyzer = match self.registry.resolve(language) {
            Ok(analyzer) => analyzer,
            Err(e) => return FileAnalysisResult::failure(file.path.clone(), language, e.to_string()),
        };

        match analyzer.analyze(&file.content) {
            Ok(parsed) => {
                if !parsed.errors.is_empty() {
                    debug!(file = %file.path, errors = parsed.errors.len(), "file has syntax errors");
                }
                let metrics = self.calculator.calculate(&parsed);
                FileAnalysisResult::success(file.path.clone(), language, metrics)
            }
            Err(e) => FileAnalysisResult::failure(file.path.clone(), language, format!("{e:#}")),
        }
    }
}

/// Receives each result as the collector accepts it.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// `progress` is the number of results collected so far, this one included.
    async fn file_done(&self, result: &FileAnalysisResult, progress: usize);
}

enum TaskOutput {
    Done,
    Collected(Vec<FileAnalysisResult>),
}

enum Failure {
    Error(ServiceError),
    Panic(Box<dyn Any + Send>),
}

/// Run the worker group over `files`.
///
/// Returns results in completion order. Cancelling `parent` stops dispatch
/// and collection; analysis already running on the blocking pool finishes
/// but its result is discarded. A panic in any task is re-raised here once
/// every task has stopped.
pub async fn run(
    files: Vec<ProjectFile>,
    analyzer: Arc<FileAnalyzer>,
    workers: usize,
    parent: &CancellationToken,
    sink: Arc<dyn ProgressSink>,
) -> Result<Vec<FileAnalysisResult>> {
    let token = parent.child_token();
    let total = files.len();
    let workers = workers.clamp(1, MAX_WORKERS);

    let (file_tx, file_rx) = mpsc::channel::<ProjectFile>(workers * 2);
    let (result_tx, result_rx) = mpsc::channel::<FileAnalysisResult>(workers);
    let file_rx = Arc::new(Mutex::new(file_rx));

    let mut set: JoinSet<Result<TaskOutput>> = JoinSet::new();

    set.spawn(produce(files, file_tx, token.clone()));
    for _ in 0..workers {
        set.spawn(work(
            file_rx.clone(),
            result_tx.clone(),
            analyzer.clone(),
            token.clone(),
        ));
    }
    // Workers hold the only senders now
    drop(result_tx);
    set.spawn(collect(result_rx, total, sink, token.clone()));

    let mut collected = None;
    let mut failure: Option<Failure> = None;

    while let Some(joined) = set.join_next().await {
        let outcome = match joined {
            Ok(Ok(TaskOutput::Done)) => continue,
            Ok(Ok(TaskOutput::Collected(results))) => {
                collected = Some(results);
                continue;
            }
            Ok(Err(e)) => Failure::Error(e),
            Err(e) if e.is_panic() => Failure::Panic(e.into_panic()),
            Err(e) => Failure::Error(ServiceError::Pipeline(format!("worker task failed: {e}"))),
        };

        token.cancel();
        // Keep the root cause; the others just observed the cancellation
        let replace = match &failure {
            None => true,
            Some(Failure::Error(ServiceError::Cancelled)) => {
                !matches!(outcome, Failure::Error(ServiceError::Cancelled))
            }
            Some(_) => false,
        };
        if replace {
            failure = Some(outcome);
        }
    }

    match failure {
        Some(Failure::Panic(payload)) => std::panic::resume_unwind(payload),
        Some(Failure::Error(e)) => Err(e),
        None => collected
            .ok_or_else(|| ServiceError::Pipeline("collector returned no results".to_string())),
    }
}

async fn produce(
    files: Vec<ProjectFile>,
    queue: mpsc::Sender<ProjectFile>,
    token: CancellationToken,
) -> Result<TaskOutput> {
    for file in files {
        tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ServiceError::Cancelled),
            sent = queue.send(file) => {
                if sent.is_err() {
                    return Err(ServiceError::Pipeline("file queue closed early".to_string()));
                }
            }
        }
    }
    Ok(TaskOutput::Done)
}

async fn work(
    queue: Arc<Mutex<mpsc::Receiver<ProjectFile>>>,
    results: mpsc::Sender<FileAnalysisResult>,
    analyzer: Arc<FileAnalyzer>,
    token: CancellationToken,
) -> Result<TaskOutput> {
    loop {
        let next = {
            let mut queue = queue.lock().await;
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(ServiceError::Cancelled),
                file = queue.recv() => file,
            }
        };
        let Some(file) = next else {
            return Ok(TaskOutput::Done);
        };

        let analyzer = analyzer.clone();
        let result = match tokio::task::spawn_blocking(move || analyzer.analyze_file(&file)).await
        {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => return Err(ServiceError::Pipeline(format!("analysis task failed: {e}"))),
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ServiceError::Cancelled),
            sent = results.send(result) => {
                if sent.is_err() {
                    return Err(ServiceError::Pipeline("result channel closed early".to_string()));
                }
            }
        }
    }
}

async fn collect(
    mut results: mpsc::Receiver<FileAnalysisResult>,
    total: usize,
    sink: Arc<dyn ProgressSink>,
    token: CancellationToken,
) -> Result<TaskOutput> {
    let mut collected = Vec::with_capacity(total);

    while collected.len() < total {
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ServiceError::Cancelled),
            result = results.recv() => result,
        };
        let Some(result) = result else {
            return Err(ServiceError::Pipeline(format!(
                "workers stopped after {} of {total} files",
                collected.len()
            )));
        };
        sink.file_done(&result, collected.len() + 1).await;
        collected.push(result);
    }

    Ok(TaskOutput::Collected(collected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use codemeter_core::analyzer::{Analyzer, ParsedResult};
    use codemeter_core::language::Language;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink(AtomicUsize);

    #[async_trait]
    impl ProgressSink for CountingSink {
        async fn file_done(&self, _result: &FileAnalysisResult, progress: usize) {
            let prev = self.0.fetch_add(1, Ordering::SeqCst);
            assert_eq!(prev + 1, progress);
        }
    }

    struct EmptyAnalyzer;

    impl Analyzer for EmptyAnalyzer {
        fn language(&self) -> Language {
            Language::Go
        }

        fn analyze(&self, _content: &[u8]) -> anyhow::Result<ParsedResult> {
            Ok(ParsedResult::new(Language::Go))
        }
    }

    struct PanickingAnalyzer;

    impl Analyzer for PanickingAnalyzer {
        fn language(&self) -> Language {
            Language::Python
        }

        fn analyze(&self, _content: &[u8]) -> anyhow::Result<ParsedResult> {
            panic!("parser exploded");
        }
    }

    fn file_analyzer() -> Arc<FileAnalyzer> {
        let registry = AnalyzerRegistry::new()
            .with(Arc::new(EmptyAnalyzer))
            .with(Arc::new(PanickingAnalyzer));
        Arc::new(FileAnalyzer::new(registry, MetricsCalculator::default()))
    }

    fn go_files(n: usize) -> Vec<ProjectFile> {
        (0..n)
            .map(|i| ProjectFile::new(format!("pkg/file{i}.go"), "package pkg\n"))
            .collect()
    }

    #[test]
    fn test_analyze_file_unsupported_language() {
        let result = file_analyzer().analyze_file(&ProjectFile::new("Main.java", "class A {}"));
        assert_eq!(result.language, Language::Java);
        assert!(result.metrics.is_none());
        assert_eq!(
            result.error.as_deref(),
            Some("no analyzer registered for language: java")
        );
    }

    #[tokio::test]
    async fn test_one_result_per_file() {
        let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let results = run(
            go_files(25),
            file_analyzer(),
            4,
            &CancellationToken::new(),
            sink.clone(),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 25);
        assert!(results.iter().all(|r| !r.is_error()));
        assert_eq!(sink.0.load(Ordering::SeqCst), 25);

        let mut paths: Vec<_> = results.iter().map(|r| r.file_path.clone()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 25);
    }

    #[tokio::test]
    async fn test_more_workers_than_files() {
        let results = run(
            go_files(2),
            file_analyzer(),
            16,
            &CancellationToken::new(),
            Arc::new(CountingSink(AtomicUsize::new(0))),
        )
        .await
        .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_oversized_worker_count_is_clamped() {
        let results = run(
            go_files(3),
            file_analyzer(),
            usize::MAX,
            &CancellationToken::new(),
            Arc::new(CountingSink(AtomicUsize::new(0))),
        )
        .await
        .unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_no_files() {
        let results = run(
            Vec::new(),
            file_analyzer(),
            4,
            &CancellationToken::new(),
            Arc::new(CountingSink(AtomicUsize::new(0))),
        )
        .await
        .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let err = run(
            go_files(10),
            file_analyzer(),
            4,
            &token,
            Arc::new(CountingSink(AtomicUsize::new(0))),
        )
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_worker_panic_is_reraised() {
        let mut files = go_files(5);
        files.push(ProjectFile::new("tool.py", "print(1)\n"));

        let handle = tokio::spawn(async move {
            run(
                files,
                file_analyzer(),
                2,
                &CancellationToken::new(),
                Arc::new(CountingSink(AtomicUsize::new(0))),
            )
            .await
        });

        let err = handle.await.unwrap_err();
        assert!(err.is_panic());
    }
}
