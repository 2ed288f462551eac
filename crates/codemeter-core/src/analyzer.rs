use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::language::Language;

/// Structured output of parsing one source file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedResult {
    pub language: Language,
    pub functions: Vec<Function>,
    pub classes: Vec<Class>,
    pub imports: Vec<Import>,
    pub comments: Vec<Comment>,
    pub errors: Vec<ParseError>,
}

impl ParsedResult {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            ..Default::default()
        }
    }

    /// A soft failure: one parse error and no extracted structure.
    pub fn with_error(language: Language, error: ParseError) -> Self {
        Self {
            language,
            errors: vec![error],
            ..Default::default()
        }
    }

    /// Standalone functions followed by every class method.
    pub fn all_functions(&self) -> impl Iterator<Item = &Function> {
        self.functions
            .iter()
            .chain(self.classes.iter().flat_map(|c| c.methods.iter()))
    }
}

/// A function or method declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    pub parameters: Vec<Parameter>,
    pub return_type: String,
    pub complexity: u32,
    pub is_public: bool,
    pub is_test: bool,
    pub documentation: String,
}

impl Function {
    /// Number of source lines covered by the declaration.
    pub fn line_span(&self) -> usize {
        line_span(self.start_line, self.end_line)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub type_name: String,
}

/// Kind of a type declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassKind {
    Struct,
    Interface,
    Alias,
}

/// A class, struct, interface, or other named type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Class {
    pub name: String,
    pub kind: ClassKind,
    pub start_line: usize,
    pub end_line: usize,
    pub methods: Vec<Function>,
    pub properties: Vec<Property>,
    pub is_public: bool,
    pub documentation: String,
}

impl Class {
    pub fn line_span(&self) -> usize {
        line_span(self.start_line, self.end_line)
    }
}

/// A field of a class or struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub type_name: String,
    pub is_public: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Import {
    pub path: String,
    pub alias: Option<String>,
    pub line: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    pub start_line: usize,
    pub end_line: usize,
    pub is_block: bool,
}

impl Comment {
    pub fn line_span(&self) -> usize {
        line_span(self.start_line, self.end_line)
    }
}

/// A syntax error. Line and column are 1-based, or 0 when unknown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

fn line_span(start: usize, end: usize) -> usize {
    end.saturating_sub(start) + 1
}

/// Trait that each language analyzer must implement.
///
/// Parsing is synchronous and runs to completion once started. Syntax errors
/// are reported inside the returned `ParsedResult`; `Err` is reserved for the
/// analyzer itself being unusable.
pub trait Analyzer: Send + Sync {
    /// Language this analyzer handles.
    fn language(&self) -> Language;

    /// Parse source content into functions, types, imports, and comments.
    fn analyze(&self, content: &[u8]) -> Result<ParsedResult>;
}

/// Raised when no analyzer is registered for a language.
#[derive(Debug, Clone, thiserror::Error)]
#[error("no analyzer registered for language: {0}")]
pub struct UnsupportedLanguage(pub Language);

/// Language to analyzer mapping, built once at startup.
#[derive(Clone, Default)]
pub struct AnalyzerRegistry {
    analyzers: HashMap<Language, Arc<dyn Analyzer>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an analyzer under the language it reports.
    /// A later registration for the same language replaces the earlier one.
    pub fn register(&mut self, analyzer: Arc<dyn Analyzer>) {
        self.analyzers.insert(analyzer.language(), analyzer);
    }

    pub fn with(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.register(analyzer);
        self
    }

    pub fn resolve(&self, language: Language) -> Result<Arc<dyn Analyzer>, UnsupportedLanguage> {
        self.analyzers
            .get(&language)
            .cloned()
            .ok_or(UnsupportedLanguage(language))
    }

    /// Registered languages in a stable order.
    pub fn languages(&self) -> Vec<Language> {
        let mut langs: Vec<_> = self.analyzers.keys().copied().collect();
        langs.sort();
        langs
    }
}

impl std::fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerRegistry")
            .field("languages", &self.languages())
            .finish()
    }
}

/// Documentation for a declaration starting at `start_line`.
///
/// Only a comment ending on the declaration line or the line directly above
/// it qualifies. The last qualifying comment wins.
pub fn extract_documentation(comments: &[Comment], start_line: usize) -> String {
    comments
        .iter()
        .rev()
        .find(|c| c.end_line == start_line || c.end_line + 1 == start_line)
        .map(|c| c.text.trim().to_string())
        .unwrap_or_default()
}
