// src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use layerscan::config::DEFAULT_MAX_FILE_SIZE;
use layerscan::layer::LayerSource;
use layerscan::{DebVersion, DetectorRegistry, ImageReport, ScanConfig, Scanner, diagnostics};
use std::cmp::Ordering;
use tracing::info;

#[derive(Parser)]
#[command(name = "layerscan")]
#[command(author, version, about = "Detect installed packages in container image layers", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan layers (tarballs or directories, base layer first)
    Scan {
        /// Layer paths
        #[arg(required = true)]
        layers: Vec<String>,
        /// Only run the named detector (repeatable)
        #[arg(short, long = "detector")]
        detectors: Vec<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// Largest file to read from a layer, in bytes
        #[arg(long, default_value_t = DEFAULT_MAX_FILE_SIZE)]
        max_file_size: u64,
        /// Scan layers one at a time
        #[arg(long)]
        sequential: bool,
    },
    /// List registered detectors and the files they read
    Detectors,
    /// Compare two Debian versions
    Compare {
        /// First version
        a: String,
        /// Second version
        b: String,
    },
}

fn print_report(report: &ImageReport) {
    for (i, layer) in report.layers.iter().enumerate() {
        print!("Layer {}: {}", i, layer.source.path().display());
        if let Some(digest) = &layer.digest {
            print!(" ({})", digest);
        }
        println!();

        if layer.inherited {
            println!("  No package database; inherits parent packages");
        }
        for pkg in &layer.diff.installed {
            println!("  + {} {}", pkg.name, pkg.version);
        }
        for pkg in &layer.diff.removed {
            println!("  - {} {}", pkg.name, pkg.version);
        }
    }

    let packages = report.packages();
    if packages.is_empty() {
        println!("\nNo packages found.");
    } else {
        println!("\nInstalled packages:");
        for pkg in packages {
            println!("  {} {}", pkg.name, pkg.version);
        }
        println!("\nTotal: {} package(s)", packages.len());
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so reports on stdout stay parseable
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let registry = DetectorRegistry::with_defaults(diagnostics::default_sink());

    match cli.command {
        Some(Commands::Scan {
            layers,
            detectors,
            json,
            max_file_size,
            sequential,
        }) => {
            let config = ScanConfig {
                detectors,
                max_file_size,
                parallel: !sequential,
            };
            let scanner = Scanner::new(&registry, config)?;

            let sources = layers
                .iter()
                .map(LayerSource::open)
                .collect::<layerscan::Result<Vec<_>>>()?;
            info!("Scanning {} layer(s)", sources.len());

            let report = scanner.scan_layers(&sources)?;
            if json {
                println!("{}", report.to_json()?);
            } else {
                print_report(&report);
            }
            Ok(())
        }
        Some(Commands::Detectors) => {
            for name in registry.names() {
                if let Some(detector) = registry.get(name) {
                    println!("{}: {}", name, detector.required_files().join(", "));
                }
            }
            Ok(())
        }
        Some(Commands::Compare { a, b }) => {
            let va = DebVersion::parse(&a)?;
            let vb = DebVersion::parse(&b)?;
            let symbol = match va.cmp(&vb) {
                Ordering::Less => "<",
                Ordering::Equal => "=",
                Ordering::Greater => ">",
            };
            println!("{} {} {}", va, symbol, vb);
            Ok(())
        }
        None => {
            // No command provided, show help
            println!("Layerscan v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'layerscan --help' for usage information");
            Ok(())
        }
    }
}
