// SPDX-License-Identifier: MIT OR Apache-2.0

//! File scanner using the ignore crate (same as ripgrep)

use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing::debug;

use crate::embedding::storage::INDEX_DIR;
use crate::errors::{CodevecError, Result};
use crate::filters::{is_excluded, CompiledGlob};

/// Scanned source file
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedFile {
    /// Path relative to the scan root, `/`-separated
    pub path: String,
    pub content: String,
    pub language: String,
}

/// File scanner that respects .gitignore
pub struct FileScanner {
    root: PathBuf,
    excludes: Vec<CompiledGlob>,
    max_file_size: u64,
}

impl FileScanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            excludes: Vec::new(),
            max_file_size: 1024 * 1024,
        }
    }

    /// Glob patterns matched against root-relative paths
    pub fn with_excludes<S: AsRef<str>>(mut self, patterns: &[S]) -> Self {
        self.excludes = patterns
            .iter()
            .filter_map(|p| CompiledGlob::new(p.as_ref()))
            .collect();
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Scan all source files under the root, sorted by path
    pub fn scan(&self) -> Result<Vec<ScannedFile>> {
        if !self.root.is_dir() {
            return Err(CodevecError::validation(format!(
                "not a directory: {}",
                self.root.display()
            )));
        }

        let (tx, rx) = mpsc::channel();

        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(true)
            .git_exclude(true)
            .filter_entry(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map(|name| name != INDEX_DIR && name != ".git")
                    .unwrap_or(true)
            })
            .build_parallel();

        walker.run(|| {
            let tx = tx.clone();
            let root = self.root.clone();
            let excludes = self.excludes.clone();
            let max_file_size = self.max_file_size;

            Box::new(move |entry| {
                let Ok(entry) = entry else {
                    return ignore::WalkState::Continue;
                };
                let path = entry.path();
                if !path.is_file() {
                    return ignore::WalkState::Continue;
                }
                let Some(language) = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .and_then(detect_language)
                else {
                    return ignore::WalkState::Continue;
                };
                let Some(relative) = relative_path(&root, path) else {
                    return ignore::WalkState::Continue;
                };
                if is_excluded(&relative, &excludes) {
                    return ignore::WalkState::Continue;
                }
                if let Some(content) = read_source(path, max_file_size) {
                    let _ = tx.send(ScannedFile {
                        path: relative,
                        content,
                        language: language.to_string(),
                    });
                }
                ignore::WalkState::Continue
            })
        });

        drop(tx);
        let mut files: Vec<ScannedFile> = rx.into_iter().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(root = %self.root.display(), files = files.len(), "scan complete");
        Ok(files)
    }
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

/// Reads a text file, skipping oversized and binary ones.
fn read_source(path: &Path, max_file_size: u64) -> Option<String> {
    let size = std::fs::metadata(path).ok()?.len();
    if size > max_file_size {
        debug!(path = %path.display(), size, "skipping large file");
        return None;
    }
    let bytes = std::fs::read(path).ok()?;
    if bytes.contains(&0) {
        debug!(path = %path.display(), "skipping binary file");
        return None;
    }
    String::from_utf8(bytes).ok()
}

/// Detect language from file extension
pub fn detect_language(ext: &str) -> Option<&'static str> {
    match ext.to_lowercase().as_str() {
        "rs" => Some("rust"),
        "ts" | "tsx" | "mts" | "cts" => Some("typescript"),
        "js" | "jsx" | "mjs" | "cjs" => Some("javascript"),
        "py" => Some("python"),
        "go" => Some("go"),
        "java" => Some("java"),
        "c" | "h" => Some("c"),
        "cpp" | "cc" | "cxx" | "hpp" | "hh" => Some("cpp"),
        "cs" => Some("csharp"),
        "rb" => Some("ruby"),
        "php" => Some("php"),
        "swift" => Some("swift"),
        "kt" | "kts" => Some("kotlin"),
        "scala" => Some("scala"),
        "lua" => Some("lua"),
        _ => None,
    }
}
