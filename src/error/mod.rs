mod catalog;
mod io;
mod parser;
mod rule;

pub use catalog::CatalogError;
pub use io::IoError;
pub use parser::ParserError;
pub use rule::RuleError;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Parser(#[from] ParserError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

pub type Result<T> = std::result::Result<T, Error>;
