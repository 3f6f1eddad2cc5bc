use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, trace, warn};

use crate::engine::{DetectionSession, DEFAULT_MAX_DEPTH};
use crate::error::{Error, IoError};
use crate::language::python::PythonProgram;
use crate::output::StoreReport;
use crate::rules::DetectionRule;

#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub file_path: String,
    pub detections: Vec<StoreReport>,
    pub errors: Vec<String>,
}

impl ScanResult {
    pub fn new(file_path: String) -> Self {
        Self {
            file_path,
            detections: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: impl Into<Error>) {
        self.errors.push(error.into().to_string());
    }

    pub fn detection_count(&self) -> usize {
        self.detections.len()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Runs one detection session per file against a fixed rule set.
pub struct Scanner {
    rules: Vec<Arc<DetectionRule>>,
    max_depth: usize,
}

impl Scanner {
    pub fn new(rules: Vec<Arc<DetectionRule>>) -> Self {
        Self {
            rules,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn rules(&self) -> &[Arc<DetectionRule>] {
        &self.rules
    }

    /// Visits every call in `source` in source order and reports the
    /// resulting store trees.
    pub fn scan_source(&self, file_path: &str, source: &str) -> ScanResult {
        trace!(file_path, bytes = source.len(), "scanning source");
        let mut result = ScanResult::new(file_path.to_string());

        let program = match PythonProgram::parse(file_path, source) {
            Ok(program) => program,
            Err(e) => {
                warn!(file_path, error = %e, "parse failed");
                result.add_error(e);
                return result;
            }
        };
        if program.has_syntax_errors() {
            debug!(file_path, "source has syntax errors, results may be partial");
        }

        let session = DetectionSession::new(&program, self.rules.clone()).with_max_depth(self.max_depth);
        for site in program.call_sites() {
            session.visit(&site);
        }
        let stores = session.finish();

        result.detections = stores
            .iter()
            .map(|store| StoreReport::from_store(&program, store))
            .collect();

        debug!(
            file_path,
            detections = result.detection_count(),
            errors = result.errors.len(),
            "scan complete"
        );
        result
    }

    pub fn scan_file(&self, path: &Path) -> ScanResult {
        let label = path.display().to_string();
        match fs::read_to_string(path) {
            Ok(source) => self.scan_source(&label, &source),
            Err(e) => {
                warn!(path = %label, error = %e, "failed to read file");
                let mut result = ScanResult::new(label);
                result.add_error(IoError::unreadable_source(path, e));
                result
            }
        }
    }

    /// Scans files in parallel. Results keep the order of `paths`.
    pub fn scan_files(&self, paths: &[PathBuf]) -> Vec<ScanResult> {
        debug!(files = paths.len(), rules = self.rules.len(), "scanning files");
        paths.par_iter().map(|path| self.scan_file(path)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::catalog::RuleCatalog;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn scanner() -> Scanner {
        Scanner::new(RuleCatalog::bundled().unwrap().entry_rules())
    }

    #[test]
    fn test_scan_source_hashlib() {
        let result = scanner().scan_source("digest.py", "import hashlib\nhashlib.sha256(b'data')\n");
        assert!(!result.has_errors());
        assert_eq!(result.detection_count(), 1);
        assert_eq!(result.detections[0].rule, "hashlib.digest");
    }

    #[test]
    fn test_scan_source_without_crypto() {
        let result = scanner().scan_source("plain.py", "print('hello')\n");
        assert!(result.detections.is_empty());
        assert!(!result.has_errors());
    }

    #[test]
    fn test_missing_file_is_reported() {
        let result = scanner().scan_file(Path::new("/nonexistent/app.py"));
        assert!(result.has_errors());
        assert!(result.detections.is_empty());
        assert_eq!(result.file_path, "/nonexistent/app.py");
    }

    #[test]
    fn test_scan_files_keeps_order() {
        let mut first = NamedTempFile::with_suffix(".py").unwrap();
        writeln!(first, "import hashlib\nhashlib.md5()").unwrap();
        let second = NamedTempFile::with_suffix(".py").unwrap();

        let paths = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let results = scanner().scan_files(&paths);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].file_path, first.path().display().to_string());
        assert_eq!(results[0].detection_count(), 1);
        assert_eq!(results[1].detection_count(), 0);
    }

    #[test]
    fn test_max_depth_zero_detects_nothing() {
        let result = scanner()
            .with_max_depth(0)
            .scan_source("digest.py", "import hashlib\nhashlib.sha256()\n");
        assert!(result.detections.is_empty());
    }
}
