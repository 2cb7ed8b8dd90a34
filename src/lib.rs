//! rust_barcode - bar code and QR code reader
//!
//! Locates and decodes 1-D bar codes (EAN/UPC, Code 39, Code 93, Code 128,
//! Interleaved 2 of 5, Codabar, GS1 DataBar) and QR codes in 8-bit grayscale
//! images.
//!
//! ```no_run
//! use rust_barcode::{Image, ImageScanner};
//!
//! let image = Image::open("label.png")?;
//! let mut scanner = ImageScanner::new();
//! scanner.parse_config("*.enable")?;
//! scanner.scan_image(&image);
//! for sym in scanner.results().iter() {
//!     println!("{}:{}", sym.symbol_type(), sym.text());
//! }
//! # Ok::<(), rust_barcode::ScanError>(())
//! ```

#![warn(missing_docs)]
#![allow(clippy::missing_docs_in_private_items)]

mod config;
/// Width-stream decoder and the per-symbology decoders
pub mod decoder;
/// Error type
pub mod error;
/// Whole-image scanning, filtering and the result cache
pub mod image_scanner;
/// Core data structures (symbols, configuration, points, bit matrices)
pub mod models;
/// QR finder clustering, geometry, sampling and data decoding
pub mod qr;
/// Edge detector turning samples into element widths
pub mod scanner;

pub use decoder::Decoder;
pub use error::{Result, ScanError};
pub use image_scanner::{Image, ImageScanner, ScanResult, scan_batch};
pub use models::{Config, Modifier, Orientation, Symbol, SymbolSet, SymbolType, parse_config};
pub use scanner::Scanner;

/// Scan a grayscale buffer with the default configuration and return the
/// decoded symbols.
pub fn scan_luma(gray: &[u8], width: usize, height: usize) -> Result<Vec<ScanResult>> {
    let mut scanner = ImageScanner::new();
    scanner.scan_luma(gray, width, height)?;
    Ok(scanner.results().iter().map(|s| ScanResult::from(s.as_ref())).collect())
}

/// Scan packed RGB with the default configuration.
pub fn scan_rgb(rgb: &[u8], width: usize, height: usize) -> Result<Vec<ScanResult>> {
    let image = Image::from_rgb(rgb, width, height)?;
    scan_luma(image.data(), width, height)
}
