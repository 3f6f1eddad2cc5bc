use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("scan root does not exist: {path}")]
    RootNotFound { path: PathBuf },

    #[error("cannot read source file '{path}': {source}")]
    UnreadableSource {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("directory walk failed under '{path}': {source}")]
    WalkFailed {
        path: PathBuf,
        source: walkdir::Error,
    },
}

impl IoError {
    pub fn root_not_found(path: impl Into<PathBuf>) -> Self {
        Self::RootNotFound { path: path.into() }
    }

    pub fn unreadable_source(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::UnreadableSource {
            path: path.into(),
            source,
        }
    }

    pub fn walk_failed(path: impl Into<PathBuf>, source: walkdir::Error) -> Self {
        Self::WalkFailed {
            path: path.into(),
            source,
        }
    }
}
