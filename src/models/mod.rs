/// Decoder options and their textual form
pub mod config;
/// Bit matrices
pub mod matrix;
/// Sub-pixel and integer points
pub mod point;
/// QR error correction levels and mask patterns
pub mod qr;
/// Symbol types and decoded symbols
pub mod symbol;

pub use config::{Config, SymbologyConfig, parse_config};
pub use matrix::BitMatrix;
pub use point::{Point, PointI};
pub use qr::{ECLevel, MaskPattern};
pub use symbol::{Modifier, Orientation, Symbol, SymbolSet, SymbolType};
