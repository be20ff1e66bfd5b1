//! Locating the file a diagnosis points at.
//!
//! Models often name a file by a partial or slightly wrong path, so
//! resolution searches the project tree by file name and ranks candidates:
//! the requested path itself (or a component-wise suffix match when it has
//! directories), then the shallowest match under a `src` directory, then
//! the shallowest match.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::traits::{FileResolver, ResolvedFile};

/// Directory names never searched.
pub const IGNORED_DIRS: &[&str] = &[
    "node_modules",
    "__pycache__",
    ".git",
    "venv",
    ".venv",
    "target",
];

fn is_ignored(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| IGNORED_DIRS.contains(&name))
}

fn under_src(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::Normal(name) if name == "src"))
}

fn depth(path: &Path) -> usize {
    path.components().count()
}

/// Pick the best candidate for `wanted` among paths relative to the root.
fn rank(wanted: &Path, mut matches: Vec<PathBuf>) -> Option<PathBuf> {
    matches.sort();
    let multi = depth(wanted) > 1;
    if let Some(exact) = matches
        .iter()
        .find(|m| m.as_path() == wanted || (multi && m.ends_with(wanted)))
    {
        return Some(exact.clone());
    }
    let src_best = matches
        .iter()
        .filter(|m| under_src(m))
        .min_by_key(|m| depth(m));
    src_best
        .or_else(|| matches.iter().min_by_key(|m| depth(m)))
        .cloned()
}

fn search(root: &Path, relative: &str) -> Option<ResolvedFile> {
    let wanted = Path::new(relative.trim().trim_start_matches("./"));
    let name = wanted.file_name()?.to_owned();

    let matches: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_ignored(e))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && e.file_name() == name)
        .filter_map(|e| e.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .collect();

    debug!(requested = relative, candidates = matches.len(), "File search complete");
    rank(wanted, matches).map(|rel| ResolvedFile::under(root, &rel))
}

/// Resolves paths by walking a project root, memoizing answers.
#[derive(Debug)]
pub struct ProjectFileResolver {
    root: PathBuf,
    memo: Mutex<HashMap<String, Option<ResolvedFile>>>,
}

impl ProjectFileResolver {
    /// Create a resolver rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// The project root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Forget every memoized answer.
    pub fn clear(&self) {
        if let Ok(mut memo) = self.memo.lock() {
            memo.clear();
        }
    }

    fn remembered(&self, relative: &str) -> Option<Option<ResolvedFile>> {
        self.memo.lock().ok()?.get(relative).cloned()
    }
}

#[async_trait]
impl FileResolver for ProjectFileResolver {
    async fn resolve(&self, relative: &str) -> Option<ResolvedFile> {
        if let Some(hit) = self.remembered(relative) {
            return hit;
        }

        let root = self.root.clone();
        let wanted = relative.to_string();
        let found = match tokio::task::spawn_blocking(move || search(&root, &wanted)).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "File search task failed");
                return None;
            }
        };

        if let Ok(mut memo) = self.memo.lock() {
            memo.insert(relative.to_string(), found.clone());
        }
        found
    }
}
