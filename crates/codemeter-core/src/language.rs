use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Number of leading bytes inspected when sniffing content.
const SNIFF_LEN: usize = 100;

/// Programming language of a source file.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Go,
    Java,
    Python,
    JavaScript,
    TypeScript,
    CSharp,
    #[default]
    Unknown,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Go => "go",
            Language::Java => "java",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::CSharp => "csharp",
            Language::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "go" | "golang" => Ok(Language::Go),
            "java" => Ok(Language::Java),
            "python" | "py" => Ok(Language::Python),
            "javascript" | "js" => Ok(Language::JavaScript),
            "typescript" | "ts" => Ok(Language::TypeScript),
            "csharp" | "c#" | "cs" => Ok(Language::CSharp),
            "unknown" => Ok(Language::Unknown),
            _ => Err(anyhow::anyhow!("unknown language: {s}")),
        }
    }
}

/// Detect the language of a file from its path and a sample of its content.
///
/// Extension lookup wins, then well-known file names (manifests), then a
/// shebang check over the first 100 bytes. Anything else is `Unknown`.
pub fn detect_language(path: &Path, content: &[u8]) -> Language {
    if let Some(lang) = by_extension(path) {
        return lang;
    }
    if let Some(lang) = by_file_name(path, content) {
        return lang;
    }
    by_shebang(content).unwrap_or(Language::Unknown)
}

fn by_extension(path: &Path) -> Option<Language> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "go" => Some(Language::Go),
        "java" => Some(Language::Java),
        "py" => Some(Language::Python),
        "js" | "mjs" | "cjs" => Some(Language::JavaScript),
        "ts" | "tsx" => Some(Language::TypeScript),
        "cs" => Some(Language::CSharp),
        _ => None,
    }
}

fn by_file_name(path: &Path, content: &[u8]) -> Option<Language> {
    let name = path.file_name()?.to_str()?;
    match name {
        _ if name.ends_with(".d.ts") => Some(Language::TypeScript),
        "go.mod" | "go.sum" => Some(Language::Go),
        "pom.xml" | "build.gradle" => Some(Language::Java),
        "requirements.txt" | "setup.py" => Some(Language::Python),
        // A JS manifest is ambiguous on its own
        "package.json" | "tsconfig.json" => {
            if String::from_utf8_lossy(content).contains("typescript") {
                Some(Language::TypeScript)
            } else {
                Some(Language::JavaScript)
            }
        }
        _ => None,
    }
}

fn by_shebang(content: &[u8]) -> Option<Language> {
    let sample = &content[..content.len().min(SNIFF_LEN)];
    let head = String::from_utf8_lossy(sample);
    if head.starts_with("#!/usr/bin/env python") || head.starts_with("#!/usr/bin/python") {
        Some(Language::Python)
    } else if head.starts_with("#!/usr/bin/env node") {
        Some(Language::JavaScript)
    } else {
        None
    }
}
