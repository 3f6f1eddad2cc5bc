use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use walkdir::{DirEntry, WalkDir};

use crate::error::IoError;
use crate::language::python::PythonProgram;

/// Directories never worth scanning: VCS metadata, caches and virtualenvs.
pub const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".tox",
    ".venv",
    "venv",
    "node_modules",
    "site-packages",
];

pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub include_hidden: bool,
    pub excluded_dirs: Vec<String>,
    pub max_file_size: u64,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            include_hidden: false,
            excluded_dirs: EXCLUDED_DIRS.iter().map(|d| d.to_string()).collect(),
            max_file_size: MAX_FILE_SIZE,
        }
    }
}

impl DiscoveryOptions {
    fn is_excluded_dir(&self, name: &str) -> bool {
        self.excluded_dirs.iter().any(|d| d == name)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    // the root is always walked, even when it is a dot directory
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

/// Python sources under `root`, sorted. A file root is returned as is when
/// it is a Python file.
pub fn discover_files(root: &Path, options: &DiscoveryOptions) -> Result<Vec<PathBuf>, IoError> {
    if !root.exists() {
        return Err(IoError::root_not_found(root));
    }
    if root.is_file() {
        let found = if PythonProgram::is_python_file(root) {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        };
        return Ok(found);
    }

    let walker = WalkDir::new(root).follow_links(false).into_iter().filter_entry(|e| {
        if !options.include_hidden && is_hidden(e) {
            return false;
        }
        !(e.depth() > 0
            && e.file_type().is_dir()
            && options.is_excluded_dir(&e.file_name().to_string_lossy()))
    });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| IoError::walk_failed(root, e))?;
        if !entry.file_type().is_file() || !PythonProgram::is_python_file(entry.path()) {
            continue;
        }
        let too_large = entry
            .metadata()
            .map(|m| m.len() > options.max_file_size)
            .unwrap_or(false);
        if too_large {
            debug!(path = %entry.path().display(), "skipping oversized file");
            continue;
        }
        trace!(path = %entry.path().display(), "discovered file");
        files.push(entry.into_path());
    }

    files.sort();
    debug!(root = %root.display(), files = files.len(), "discovery complete");
    Ok(files)
}
