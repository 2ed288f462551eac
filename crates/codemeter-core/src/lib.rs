pub mod analyzer;
pub mod config;
pub mod language;
pub mod metrics;

pub use analyzer::{
    Analyzer, AnalyzerRegistry, Class, ClassKind, Comment, Function, Import, Parameter,
    ParseError, ParsedResult, Property, UnsupportedLanguage,
};
pub use config::Config;
pub use language::{detect_language, Language};
pub use metrics::{summarize, FileMetrics, MetricsCalculator, QualitySummary};
