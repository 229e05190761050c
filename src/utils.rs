// SPDX-License-Identifier: MIT OR Apache-2.0

//! Locating the index directory and default repository identity

use std::path::{Path, PathBuf};

use crate::embedding::storage::{DB_FILE, INDEX_DIR};

/// Result of finding an index root
#[derive(Debug)]
pub struct IndexRoot {
    /// The directory containing the .codevec folder
    pub root: PathBuf,
    /// The full path to the .codevec folder
    pub index_path: PathBuf,
    /// Whether this is the current directory or a parent
    pub is_parent: bool,
}

/// Find the nearest .codevec directory by walking up from the given path.
pub fn find_index_root(start: impl AsRef<Path>) -> Option<IndexRoot> {
    let mut current = start.as_ref().to_path_buf();
    if let Ok(canonical) = current.canonicalize() {
        current = canonical;
    }
    let original = current.clone();

    loop {
        let index_path = current.join(INDEX_DIR);
        if index_path.is_dir() {
            return Some(IndexRoot {
                is_parent: current != original,
                root: current,
                index_path,
            });
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Database path for `start`: an explicit path wins, then the nearest
/// enclosing index, then `<start>/.codevec/embeddings.sqlite`.
pub fn resolve_db_path(explicit: Option<&Path>, start: impl AsRef<Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match find_index_root(&start) {
        Some(root) => root.index_path.join(DB_FILE),
        None => start.as_ref().join(INDEX_DIR).join(DB_FILE),
    }
}

/// Repository id derived from a directory name.
pub fn default_repository_id(root: &Path) -> String {
    let canonical = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    canonical
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("default")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn find_index_root_in_parent() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(INDEX_DIR)).unwrap();
        let subdir = dir.path().join("subdir");
        fs::create_dir(&subdir).unwrap();

        let result = find_index_root(&subdir).unwrap();
        assert_eq!(result.root, dir.path().canonicalize().unwrap());
        assert!(result.is_parent);
        assert!(!find_index_root(dir.path()).unwrap().is_parent);
    }

    #[test]
    fn resolve_db_path_fallbacks() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            resolve_db_path(None, dir.path()),
            dir.path().join(INDEX_DIR).join(DB_FILE)
        );
        let explicit = dir.path().join("x.sqlite");
        assert_eq!(resolve_db_path(Some(&explicit), dir.path()), explicit);
    }

    #[test]
    fn repository_id_from_directory_name() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("my-service");
        fs::create_dir(&repo).unwrap();
        assert_eq!(default_repository_id(&repo), "my-service");
    }
}
