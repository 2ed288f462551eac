use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use codemeter_core::language::{detect_language, Language};
use codemeter_service::job::{Project, ProjectFile};
use codemeter_service::ports::ProjectLookup;

/// Directories never analyzed.
const SKIP_DIRS: &[&str] = &[".git", "vendor", "node_modules", "target"];

/// Serves a single local directory as a project whose id is its canonical path.
pub struct FsProjectLookup {
    root: PathBuf,
    id: String,
}

impl FsProjectLookup {
    pub fn new(root: PathBuf) -> Self {
        let id = root.to_string_lossy().into_owned();
        Self { root, id }
    }

    pub fn project_id(&self) -> &str {
        &self.id
    }

    fn project_name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id.clone())
    }
}

fn is_skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIP_DIRS.contains(&name))
}

/// Every file under `root` with a recognizable language, paths relative to
/// `root` with `/` separators.
fn list_source_files(root: &Path) -> Result<Vec<ProjectFile>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
    {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let content =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        if detect_language(path, &content) == Language::Unknown {
            continue;
        }

        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        files.push(ProjectFile::new(relative, content));
    }

    debug!(root = %root.display(), files = files.len(), "source files listed");
    Ok(files)
}

#[async_trait]
impl ProjectLookup for FsProjectLookup {
    async fn get_by_id(&self, project_id: &str) -> Result<Option<Project>> {
        if project_id != self.id {
            return Ok(None);
        }
        Ok(Some(Project {
            id: self.id.clone(),
            name: self.project_name(),
        }))
    }

    async fn get_files(&self, project_id: &str) -> Result<Vec<ProjectFile>> {
        anyhow::ensure!(project_id == self.id, "unknown project '{project_id}'");
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || list_source_files(&root))
            .await
            .context("file listing task failed")?
    }
}
