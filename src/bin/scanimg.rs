use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use rayon::prelude::*;
use rust_barcode::{Config, Image, ImageScanner, Result, ScanResult, SymbolType, parse_config};
use tracing::{debug, error};

/// Scan and decode bar codes from one or more image files
#[derive(Parser)]
#[command(name = "scanimg", version, about = "Scan and decode bar codes from image files")]
struct Cli {
    /// Config setting, `[symbology.]option[=value]` (repeatable), e.g. `ean13.disable`
    #[arg(short = 'S', long = "set", value_name = "SETTING")]
    settings: Vec<String>,

    /// Print only the decoded data, without the symbology prefix
    #[arg(long)]
    raw: bool,

    /// Minimal output: no scan summary
    #[arg(short, long)]
    quiet: bool,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,

    /// Image files to scan
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn scan_file(path: &Path, settings: &[(SymbolType, Config, i32)]) -> Result<Vec<ScanResult>> {
    let image = Image::open(path)?;
    let mut scanner = ImageScanner::new();
    for &(sym, config, value) in settings {
        scanner.set_config(sym, config, value)?;
    }
    let start = Instant::now();
    scanner.scan_image(&image);
    debug!(
        file = %path.display(),
        width = image.width(),
        height = image.height(),
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "scanned"
    );
    Ok(scanner.results().iter().map(|s| ScanResult::from(s.as_ref())).collect())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let parsed: Result<Vec<(SymbolType, Config, i32)>> = cli.settings.iter().map(|s| parse_config(s)).collect();
    let settings = match parsed {
        Ok(settings) => settings,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(2);
        }
    };

    let start = Instant::now();
    let outcomes: Vec<Result<Vec<ScanResult>>> = cli.files.par_iter().map(|f| scan_file(f, &settings)).collect();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut failed = 0usize;
    let mut found = 0usize;
    for (path, outcome) in cli.files.iter().zip(outcomes) {
        let symbols = match outcome {
            Ok(symbols) => symbols,
            Err(e) => {
                error!(file = %path.display(), "{e}");
                failed += 1;
                continue;
            }
        };
        for sym in &symbols {
            let written = if cli.raw {
                out.write_all(&sym.data).and_then(|_| out.write_all(b"\n"))
            } else {
                writeln!(out, "{}:{}", sym.symbol_type, sym.text())
            };
            if written.is_err() {
                return ExitCode::FAILURE;
            }
        }
        found += symbols.len();
    }

    if !cli.quiet {
        eprintln!(
            "scanned {} barcode symbols from {} images in {:.2} seconds",
            found,
            cli.files.len() - failed,
            start.elapsed().as_secs_f64()
        );
        if found == 0 {
            eprintln!("WARNING: barcode data was not detected in some image(s)");
        }
    }
    if failed > 0 {
        ExitCode::from(2)
    } else if found == 0 {
        ExitCode::from(4)
    } else {
        ExitCode::SUCCESS
    }
}
