//! Error type shared by the public API.

use thiserror::Error;

use crate::models::{Config, SymbolType};

/// Errors surfaced to callers.
///
/// Decode failures (rejected QR candidates, uncorrectable Reed-Solomon blocks,
/// exhausted search budgets) are never reported here: they just produce fewer
/// symbols.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Image dimensions do not match the supplied pixel buffer.
    #[error("invalid image: {width}x{height} needs {expected} bytes, got {actual}")]
    InvalidImage {
        /// Image width in pixels
        width: usize,
        /// Image height in pixels
        height: usize,
        /// Bytes required by the dimensions
        expected: usize,
        /// Bytes supplied
        actual: usize,
    },

    /// The (symbology, option) pair is not supported.
    #[error("unsupported config {config:?} for {symbology:?}")]
    UnsupportedConfig {
        /// Symbology the option was applied to
        symbology: SymbolType,
        /// Requested option
        config: Config,
    },

    /// The option value is out of range.
    #[error("invalid value {value} for {config:?}")]
    InvalidValue {
        /// Requested option
        config: Config,
        /// Rejected value
        value: i32,
    },

    /// A textual config setting could not be parsed.
    #[error("cannot parse config setting {0:?}")]
    ParseConfig(String),

    /// Image file could not be opened or decoded.
    #[error("failed to load image: {0}")]
    Image(#[from] image::ImageError),
}

/// Result alias for fallible public operations.
pub type Result<T> = std::result::Result<T, ScanError>;
