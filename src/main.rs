use anyhow::{Context as AnyhowContext, Result};
use clap::Parser;
use crypto_detector_core::cli::{self, Args};
use crypto_detector_core::discovery::{self, DiscoveryOptions};
use crypto_detector_core::logging::{self, Verbosity};
use crypto_detector_core::output::OutputFormatter;
use crypto_detector_core::scanner::Scanner;
use crypto_detector_core::RuleCatalog;
use tracing::{info, warn};

fn load_catalog(args: &Args) -> Result<RuleCatalog> {
    let mut catalog = if args.no_bundled {
        RuleCatalog::new()
    } else {
        RuleCatalog::bundled().context("Failed to load bundled rules")?
    };
    for path in &args.rules {
        let extra = RuleCatalog::load(path)
            .with_context(|| format!("Failed to load rules from {}", path.display()))?;
        catalog
            .merge(extra)
            .with_context(|| format!("Cannot merge rules from {}", path.display()))?;
    }
    Ok(catalog)
}

fn main() -> Result<()> {
    let args = cli::Args::parse();
    logging::init(Verbosity::from_flags(args.verbose, args.quiet));
    args.validate().context("Invalid arguments")?;

    let catalog = load_catalog(&args)?;
    let rules = catalog.entry_rules_in(&args.bundle);
    if rules.is_empty() {
        warn!(bundles = ?args.bundle, "no rules selected, nothing will be detected");
    }

    let options = DiscoveryOptions {
        include_hidden: args.include_hidden,
        ..DiscoveryOptions::default()
    };
    let files = discovery::discover_files(&args.path, &options)
        .with_context(|| format!("Failed to discover files in {}", args.path.display()))?;
    info!(
        files = files.len(),
        rules = rules.len(),
        format = %args.format,
        "starting scan"
    );

    let scanner = Scanner::new(rules).with_max_depth(args.max_depth);
    let results = scanner.scan_files(&files);
    let rendered = OutputFormatter::format(&results, args.format)?;

    match &args.output_file {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write output to {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => println!("{rendered}"),
    }

    Ok(())
}
