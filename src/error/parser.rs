use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("tree-sitter grammar for {language} could not be loaded")]
    GrammarUnavailable { language: &'static str },

    #[error("tree-sitter produced no syntax tree for '{path}'")]
    NoSyntaxTree { path: PathBuf },
}

impl ParserError {
    pub fn grammar_unavailable(language: &'static str) -> Self {
        Self::GrammarUnavailable { language }
    }

    pub fn no_syntax_tree(path: impl Into<PathBuf>) -> Self {
        Self::NoSyntaxTree { path: path.into() }
    }
}
