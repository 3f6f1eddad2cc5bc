mod formatter;
mod report;
pub mod tree;

pub use formatter::{FileReport, JsonOutput, OutputFormatter};
pub use report::{StoreReport, ValueReport};
