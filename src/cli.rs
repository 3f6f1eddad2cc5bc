use anyhow::{Context as AnyhowContext, Result};
use clap::{Parser, ValueEnum};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::engine::DEFAULT_MAX_DEPTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Tree,
}

#[derive(Parser, Debug)]
#[command(name = "crypto-detector")]
#[command(about = "Detect cryptographic API usage in Python code and report the assets found", long_about = None)]
pub struct Args {
    /// Path to file or directory to analyze
    #[arg(long, value_name = "PATH")]
    pub path: PathBuf,

    /// Additional rules file (YAML or JSON). Can be specified multiple times.
    #[arg(long, value_name = "FILE")]
    pub rules: Vec<PathBuf>,

    /// Only load rules from --rules files, not the bundled catalog
    #[arg(long)]
    pub no_bundled: bool,

    /// Restrict detection to rules of this bundle. Can be specified multiple times.
    #[arg(long, value_name = "BUNDLE")]
    pub bundle: Vec<String>,

    /// Output file path (prints to stdout if not specified)
    #[arg(short = 'O', long, value_name = "FILE")]
    pub output_file: Option<PathBuf>,

    /// Output format (json, tree)
    #[arg(short = 'f', long, default_value = "json")]
    pub format: OutputFormat,

    /// Maximum nesting depth of rule matches
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    pub max_depth: usize,

    /// Also scan hidden files and directories
    #[arg(long)]
    pub include_hidden: bool,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    pub fn validate(&self) -> Result<()> {
        validate_path(&self.path)?;
        for rules_path in &self.rules {
            if !rules_path.is_file() {
                anyhow::bail!("Rules file does not exist: {}", rules_path.display());
            }
        }
        if self.no_bundled && self.rules.is_empty() {
            anyhow::bail!("--no-bundled requires at least one --rules file");
        }
        if self.max_depth == 0 {
            anyhow::bail!("--max-depth must be at least 1");
        }
        Ok(())
    }
}

/// The scan root must be a directory or a single `.py` file.
pub fn validate_path(path: &Path) -> Result<()> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            anyhow::bail!("Path does not exist: {}", path.display())
        }
        Err(e) => return Err(e).with_context(|| format!("Cannot access {}", path.display())),
    };

    if metadata.is_file() {
        if path.extension().and_then(|ext| ext.to_str()) != Some("py") {
            anyhow::bail!("Not a Python source file: {}", path.display());
        }
    } else if !metadata.is_dir() {
        anyhow::bail!("Path is neither a file nor a directory: {}", path.display());
    }

    Ok(())
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Tree => "tree",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
