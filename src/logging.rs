//! Log setup for the binary. Reports are printed to stdout, so log lines
//! always go to stderr.

use tracing::Level;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Targets the verbosity flags apply to: the library and the binary.
const TARGETS: &[&str] = &["crypto_detector_core", "crypto_detector"];

/// Declaration order is the ordering: quietest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    Debug,
    Trace,
}

impl Verbosity {
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Normal,
            1 => Self::Verbose,
            2 => Self::Debug,
            _ => Self::Trace,
        }
    }

    fn level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::WARN,
            Self::Verbose => Level::INFO,
            Self::Debug => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    fn directives(self) -> String {
        let level = self.level();
        TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    // detection trees are logged at debug; source positions only help there
    fn shows_source(self) -> bool {
        self >= Self::Debug
    }

    fn writer(self) -> BoxMakeWriter {
        match self {
            Self::Quiet => BoxMakeWriter::new(std::io::sink),
            _ => BoxMakeWriter::new(std::io::stderr),
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over the
/// flags. Returns false when a subscriber was already installed.
pub fn init(verbosity: Verbosity) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directives()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(verbosity.shows_source())
        .with_line_number(verbosity.shows_source())
        .with_writer(verbosity.writer())
        .compact();

    let installed = if verbosity > Verbosity::Normal {
        builder.try_init()
    } else {
        builder.without_time().try_init()
    };
    installed.is_ok()
}
