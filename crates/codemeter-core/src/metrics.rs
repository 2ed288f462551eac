use serde::{Deserialize, Serialize};

use crate::analyzer::ParsedResult;
use crate::config::MetricsConfig;

/// Share of a declaration span assumed to be code rather than comments or blanks.
const CODE_LINE_RATIO: f64 = 0.7;
/// Share of LOC assumed to be blank lines.
const BLANK_LINE_RATIO: f64 = 0.15;
/// Comment ratio above which the maintainability bonus applies.
const WELL_DOCUMENTED_RATIO: f64 = 0.1;
const MAINTAINABILITY_BONUS: f64 = 5.0;
/// Comment ratio below which a file counts as under-documented.
const UNDER_DOCUMENTED_RATIO: f64 = 0.05;
/// Placeholder until duplication detection exists.
pub const DUPLICATION_PLACEHOLDER: f64 = 0.05;

const DEBT_HOURS_PER_COMPLEXITY_POINT: f64 = 0.5;
const DEBT_HOURS_PER_EXTRA_LINE: f64 = 0.01;
const DEBT_HOURS_PER_UNDOCUMENTED: f64 = 0.25;
const DEBT_HOURS_PER_SMELL: f64 = 0.5;

/// Quantitative metrics for a single file.
///
/// Line counts are estimated from declaration spans, not counted from the
/// raw source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMetrics {
    pub loc: usize,
    pub code_lines: usize,
    pub comment_lines: usize,
    pub blank_lines: usize,
    pub cyclomatic_complexity: u32,
    pub function_count: usize,
    pub class_count: usize,
    pub import_count: usize,
    pub average_complexity: f64,
    pub max_complexity: u32,
    /// 0-100, higher is better.
    pub maintainability_index: f64,
    pub technical_debt_hours: f64,
    pub code_smells: usize,
    /// 0-1. Always [`DUPLICATION_PLACEHOLDER`].
    pub duplication_ratio: f64,
    /// 0-100, estimated from the share of test functions.
    pub test_coverage: f64,
}

impl FileMetrics {
    /// Comment lines per LOC, or `None` for an empty file.
    pub fn comment_ratio(&self) -> Option<f64> {
        (self.loc > 0).then(|| self.comment_lines as f64 / self.loc as f64)
    }
}

/// Turns a [`ParsedResult`] into [`FileMetrics`].
#[derive(Debug, Clone, Default)]
pub struct MetricsCalculator {
    config: MetricsConfig,
}

impl MetricsCalculator {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    pub fn calculate(&self, parsed: &ParsedResult) -> FileMetrics {
        let mut metrics = FileMetrics {
            function_count: parsed.functions.len(),
            class_count: parsed.classes.len(),
            import_count: parsed.imports.len(),
            ..Default::default()
        };

        count_lines(parsed, &mut metrics);
        complexity_stats(parsed, &mut metrics);
        metrics.maintainability_index = maintainability_index(&metrics);
        metrics.code_smells = self.count_code_smells(parsed, &metrics);
        metrics.technical_debt_hours = self.technical_debt(parsed, &metrics);
        metrics.duplication_ratio = DUPLICATION_PLACEHOLDER;
        metrics.test_coverage = estimate_test_coverage(parsed);
        metrics
    }

    fn count_code_smells(&self, parsed: &ParsedResult, metrics: &FileMetrics) -> usize {
        let cfg = &self.config;
        let mut smells = 0;

        for func in parsed.all_functions() {
            if func.line_span() > cfg.long_function_lines {
                smells += 1;
            }
            if func.parameters.len() > cfg.max_parameters {
                smells += 1;
            }
            if effective_complexity(func.complexity) > cfg.complexity_threshold {
                smells += 1;
            }
        }

        for class in &parsed.classes {
            if class.methods.len() > cfg.max_class_methods {
                smells += 1;
            }
            if class.properties.len() > cfg.max_class_properties {
                smells += 1;
            }
        }

        if metrics.import_count > cfg.max_imports {
            smells += 1;
        }

        if metrics
            .comment_ratio()
            .is_some_and(|ratio| ratio < UNDER_DOCUMENTED_RATIO)
        {
            smells += 1;
        }

        smells
    }

    /// Estimated remediation effort in hours. Expects `code_smells` to be set.
    fn technical_debt(&self, parsed: &ParsedResult, metrics: &FileMetrics) -> f64 {
        let cfg = &self.config;

        let excess_complexity: u32 = parsed
            .all_functions()
            .map(|f| effective_complexity(f.complexity).saturating_sub(cfg.complexity_threshold))
            .sum();
        let extra_lines = metrics.loc.saturating_sub(cfg.loc_threshold);
        let undocumented = parsed
            .all_functions()
            .filter(|f| f.is_public && f.documentation.trim().is_empty())
            .count();

        let debt = excess_complexity as f64 * DEBT_HOURS_PER_COMPLEXITY_POINT
            + extra_lines as f64 * DEBT_HOURS_PER_EXTRA_LINE
            + undocumented as f64 * DEBT_HOURS_PER_UNDOCUMENTED
            + metrics.code_smells as f64 * DEBT_HOURS_PER_SMELL;

        round2(debt)
    }
}

/// A reported complexity of 0 means the analyzer did not compute one.
fn effective_complexity(complexity: u32) -> u32 {
    complexity.max(1)
}

fn code_lines(span: usize) -> usize {
    (span as f64 * CODE_LINE_RATIO) as usize
}

fn count_lines(parsed: &ParsedResult, metrics: &mut FileMetrics) {
    for func in &parsed.functions {
        let span = func.line_span();
        metrics.loc += span;
        metrics.code_lines += code_lines(span);
    }

    for class in &parsed.classes {
        let span = class.line_span();
        metrics.loc += span;
        metrics.code_lines += code_lines(span);

        // Method bodies contribute code lines but not LOC
        for method in &class.methods {
            metrics.function_count += 1;
            metrics.code_lines += code_lines(method.line_span());
        }
    }

    metrics.comment_lines = parsed.comments.iter().map(|c| c.line_span()).sum();
    metrics.blank_lines = (metrics.loc as f64 * BLANK_LINE_RATIO) as usize;
}

fn complexity_stats(parsed: &ParsedResult, metrics: &mut FileMetrics) {
    let mut total = 0u32;
    let mut max = 0u32;
    let mut count = 0usize;

    for func in parsed.all_functions() {
        let complexity = effective_complexity(func.complexity);
        total += complexity;
        max = max.max(complexity);
        count += 1;
    }

    metrics.cyclomatic_complexity = total;
    metrics.max_complexity = max;
    metrics.average_complexity = if count > 0 {
        total as f64 / count as f64
    } else {
        0.0
    };
}

/// Simplified SEI maintainability index without Halstead volume:
/// MI = 171 - 0.23 * CC - 16.2 * ln(LOC), clamped to 0-100, with a bonus
/// for well-commented files.
fn maintainability_index(metrics: &FileMetrics) -> f64 {
    if metrics.loc == 0 {
        return 100.0;
    }

    let raw = 171.0
        - 0.23 * metrics.cyclomatic_complexity as f64
        - 16.2 * (metrics.loc as f64).ln();
    let mut mi = raw.clamp(0.0, 100.0);

    if metrics
        .comment_ratio()
        .is_some_and(|ratio| ratio > WELL_DOCUMENTED_RATIO)
    {
        mi = (mi + MAINTAINABILITY_BONUS).min(100.0);
    }

    round2(mi)
}

/// Assumes each test exercises two functions.
fn estimate_test_coverage(parsed: &ParsedResult) -> f64 {
    let (total, tests) = parsed
        .all_functions()
        .fold((0usize, 0usize), |(total, tests), f| {
            (total + 1, tests + usize::from(f.is_test))
        });

    if total == 0 {
        return 0.0;
    }

    let coverage = (tests * 2) as f64 / total as f64 * 100.0;
    round2(coverage).min(100.0)
}

fn round2(val: f64) -> f64 {
    (val * 100.0).round() / 100.0
}

/// Totals and averages across many files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualitySummary {
    pub file_count: usize,
    pub total_loc: usize,
    pub total_complexity: u32,
    pub total_functions: usize,
    pub total_classes: usize,
    pub total_technical_debt: f64,
    pub total_code_smells: usize,
    pub average_maintainability: f64,
    pub average_test_coverage: f64,
}

/// Summarize metrics for a set of files.
pub fn summarize<'a, I>(files: I) -> QualitySummary
where
    I: IntoIterator<Item = &'a FileMetrics>,
{
    let mut summary = QualitySummary::default();
    let mut maintainability = 0.0;
    let mut coverage = 0.0;

    for m in files {
        summary.file_count += 1;
        summary.total_loc += m.loc;
        summary.total_complexity += m.cyclomatic_complexity;
        summary.total_functions += m.function_count;
        summary.total_classes += m.class_count;
        summary.total_technical_debt += m.technical_debt_hours;
        summary.total_code_smells += m.code_smells;
        maintainability += m.maintainability_index;
        coverage += m.test_coverage;
    }

    if summary.file_count > 0 {
        summary.average_maintainability = round2(maintainability / summary.file_count as f64);
        summary.average_test_coverage = round2(coverage / summary.file_count as f64);
    }
    summary.total_technical_debt = round2(summary.total_technical_debt);
    summary
}
