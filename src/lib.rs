/// Crypto Detector
///
/// A rule-driven engine that finds cryptographic API usage in source code
/// and reports the algorithms, sizes, modes and actions it can establish.
/// Rules are declarative and host independent; the Python front end is
/// built on Tree-sitter.
pub mod cli;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod language;
pub mod logging;
pub mod model;
pub mod output;
pub mod rules;
pub mod scanner;

pub use engine::{DetectionSession, DetectionStore};
pub use error::{Error, Result};
pub use rules::catalog::RuleCatalog;
pub use rules::DetectionRule;
