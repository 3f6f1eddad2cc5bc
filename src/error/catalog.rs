use std::path::PathBuf;
use thiserror::Error;

use super::RuleError;

/// Failures loading a rule catalog. Every variant names the file it came from.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("cannot read rules file '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed rules file '{path}': {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("rules file '{path}' has unsupported extension '{extension}' (expected .json, .yaml or .yml)")]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("invalid rules in '{path}': {source}")]
    InvalidRules { path: PathBuf, source: RuleError },
}

impl CatalogError {
    pub fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Unreadable {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn unsupported_format(path: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            path: path.into(),
            extension: extension.into(),
        }
    }

    pub fn invalid_rules(path: impl Into<PathBuf>, source: RuleError) -> Self {
        Self::InvalidRules {
            path: path.into(),
            source,
        }
    }
}
