use std::fmt;
use std::rc::Rc;

use super::PointI;

/// Decoded symbol type. Values follow the established reader numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(i32)]
pub enum SymbolType {
    /// No symbol decoded
    #[default]
    None = 0,
    /// Intermediate status
    Partial = 1,
    /// GS1 2-digit add-on
    Ean2 = 2,
    /// GS1 5-digit add-on
    Ean5 = 5,
    /// EAN-8
    Ean8 = 8,
    /// UPC-E
    Upce = 9,
    /// ISBN-10 (from EAN-13)
    Isbn10 = 10,
    /// UPC-A
    Upca = 12,
    /// EAN-13
    Ean13 = 13,
    /// ISBN-13 (from EAN-13)
    Isbn13 = 14,
    /// EAN/UPC with add-on
    Composite = 15,
    /// Interleaved 2 of 5
    I25 = 25,
    /// GS1 DataBar
    DataBar = 34,
    /// GS1 DataBar Expanded
    DataBarExp = 35,
    /// Codabar
    Codabar = 38,
    /// Code 39
    Code39 = 39,
    /// PDF417
    Pdf417 = 57,
    /// QR Code
    QrCode = 64,
    /// Code 93
    Code93 = 93,
    /// Code 128
    Code128 = 128,
}

impl SymbolType {
    /// Every concrete symbology, in configuration order.
    pub const ALL: [SymbolType; 18] = [
        SymbolType::Ean2,
        SymbolType::Ean5,
        SymbolType::Ean8,
        SymbolType::Upce,
        SymbolType::Isbn10,
        SymbolType::Upca,
        SymbolType::Ean13,
        SymbolType::Isbn13,
        SymbolType::I25,
        SymbolType::DataBar,
        SymbolType::DataBarExp,
        SymbolType::Codabar,
        SymbolType::Code39,
        SymbolType::Pdf417,
        SymbolType::QrCode,
        SymbolType::Code93,
        SymbolType::Code128,
        SymbolType::Composite,
    ];

    /// Numeric code of the symbology.
    pub fn value(self) -> i32 {
        self as i32
    }

    /// Human readable name, e.g. `"EAN-13"`.
    pub fn name(self) -> &'static str {
        match self {
            SymbolType::Ean2 => "EAN-2",
            SymbolType::Ean5 => "EAN-5",
            SymbolType::Ean8 => "EAN-8",
            SymbolType::Upce => "UPC-E",
            SymbolType::Isbn10 => "ISBN-10",
            SymbolType::Upca => "UPC-A",
            SymbolType::Ean13 => "EAN-13",
            SymbolType::Isbn13 => "ISBN-13",
            SymbolType::Composite => "COMPOSITE",
            SymbolType::I25 => "I2/5",
            SymbolType::DataBar => "DataBar",
            SymbolType::DataBarExp => "DataBar-Exp",
            SymbolType::Codabar => "Codabar",
            SymbolType::Code39 => "CODE-39",
            SymbolType::Code93 => "CODE-93",
            SymbolType::Code128 => "CODE-128",
            SymbolType::Pdf417 => "PDF417",
            SymbolType::QrCode => "QR-Code",
            SymbolType::None | SymbolType::Partial => "UNKNOWN",
        }
    }

    /// Parse a symbology keyword as used in config strings (`ean13`, `qrcode`, ...).
    pub fn from_keyword(name: &str) -> Option<Self> {
        let key: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Some(match key.as_str() {
            "ean2" => SymbolType::Ean2,
            "ean5" => SymbolType::Ean5,
            "ean8" => SymbolType::Ean8,
            "upce" => SymbolType::Upce,
            "isbn10" => SymbolType::Isbn10,
            "upca" => SymbolType::Upca,
            "ean13" => SymbolType::Ean13,
            "isbn13" => SymbolType::Isbn13,
            "composite" => SymbolType::Composite,
            "i25" | "i2of5" => SymbolType::I25,
            "databar" | "rss" => SymbolType::DataBar,
            "databarexp" | "rssexp" => SymbolType::DataBarExp,
            "codabar" => SymbolType::Codabar,
            "code39" => SymbolType::Code39,
            "code93" => SymbolType::Code93,
            "code128" => SymbolType::Code128,
            "pdf417" => SymbolType::Pdf417,
            "qrcode" | "qr" => SymbolType::QrCode,
            _ => return None,
        })
    }

    /// EAN/UPC family member (add-ons included).
    pub fn is_ean_family(self) -> bool {
        self > SymbolType::Partial && self < SymbolType::Composite
    }

    /// GS1 add-on (EAN-2 or EAN-5).
    pub fn is_addon(self) -> bool {
        matches!(self, SymbolType::Ean2 | SymbolType::Ean5)
    }
}

impl fmt::Display for SymbolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Coarse symbol orientation relative to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    /// Not known
    #[default]
    Unknown,
    /// Upright, read left to right
    Up,
    /// Rotated 90 degrees clockwise, read top to bottom
    Right,
    /// Upside down, read right to left
    Down,
    /// Rotated 90 degrees counter-clockwise, read bottom to top
    Left,
}

impl Orientation {
    /// Map the scanner's `0..=3` code, anything else is unknown.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Orientation::Up,
            1 => Orientation::Right,
            2 => Orientation::Down,
            3 => Orientation::Left,
            _ => Orientation::Unknown,
        }
    }
}

/// Symbology modifier flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// Data is GS1 formatted (FNC1 in first position)
    Gs1 = 0,
    /// Data uses an AIM application indicator (FNC1 in second position)
    Aim = 1,
}

impl Modifier {
    /// Bit of this modifier in a modifier mask.
    pub fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

/// A decoded symbol.
#[derive(Debug, Clone, Default)]
pub struct Symbol {
    pub(crate) symbol_type: SymbolType,
    pub(crate) data: Vec<u8>,
    pub(crate) quality: i32,
    pub(crate) points: Vec<PointI>,
    pub(crate) orientation: Orientation,
    pub(crate) modifiers: u32,
    pub(crate) configs: u32,
    pub(crate) cache_count: i32,
    pub(crate) components: Option<SymbolSet>,
}

impl Symbol {
    pub(crate) fn new(symbol_type: SymbolType, data: Vec<u8>) -> Self {
        Self {
            symbol_type,
            data,
            quality: 1,
            ..Default::default()
        }
    }

    /// Symbology of the symbol.
    pub fn symbol_type(&self) -> SymbolType {
        self.symbol_type
    }

    /// Decoded bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Decoded data as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// Number of times the symbol was seen in the image.
    pub fn quality(&self) -> i32 {
        self.quality
    }

    /// Location points, in image pixel coordinates.
    pub fn points(&self) -> &[PointI] {
        &self.points
    }

    /// Orientation of the symbol when known.
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Modifier bit mask, see [`Modifier`].
    pub fn modifiers(&self) -> u32 {
        self.modifiers
    }

    /// Whether a modifier is set.
    pub fn has_modifier(&self, modifier: Modifier) -> bool {
        self.modifiers & modifier.bit() != 0
    }

    /// Boolean config bits the symbol was decoded with.
    pub fn configs(&self) -> u32 {
        self.configs
    }

    /// Consecutive-frame confidence from the inter-image cache.
    ///
    /// Zero the first time the symbol is reported, positive for repeats.
    pub fn cache_count(&self) -> i32 {
        self.cache_count
    }

    /// Components of a composite symbol.
    pub fn components(&self) -> Option<&SymbolSet> {
        self.components.as_ref()
    }

    pub(crate) fn add_point(&mut self, x: i32, y: i32) {
        self.points.push(PointI::new(x, y));
    }
}

/// Results of one scanned image.
///
/// Symbols are reference counted so composites can share their parts.
#[derive(Debug, Clone, Default)]
pub struct SymbolSet {
    symbols: Vec<Rc<Symbol>>,
}

impl SymbolSet {
    pub(crate) fn from_symbols(symbols: Vec<Rc<Symbol>>) -> Self {
        Self { symbols }
    }

    /// Number of symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// True when nothing was decoded.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Iterate over the symbols.
    pub fn iter(&self) -> impl Iterator<Item = &Rc<Symbol>> {
        self.symbols.iter()
    }

    /// Symbols as a slice.
    pub fn symbols(&self) -> &[Rc<Symbol>] {
        &self.symbols
    }
}

impl<'a> IntoIterator for &'a SymbolSet {
    type Item = &'a Rc<Symbol>;
    type IntoIter = std::slice::Iter<'a, Rc<Symbol>>;

    fn into_iter(self) -> Self::IntoIter {
        self.symbols.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_type_values() {
        assert_eq!(SymbolType::Ean13.value(), 13);
        assert_eq!(SymbolType::QrCode.value(), 64);
        assert_eq!(SymbolType::Code128.value(), 128);
        assert_eq!(SymbolType::I25.name(), "I2/5");
    }

    #[test]
    fn test_keyword_parsing() {
        assert_eq!(SymbolType::from_keyword("EAN-13"), Some(SymbolType::Ean13));
        assert_eq!(SymbolType::from_keyword("qrcode"), Some(SymbolType::QrCode));
        assert_eq!(SymbolType::from_keyword("nope"), None);
    }

    #[test]
    fn test_ean_family() {
        assert!(SymbolType::Ean2.is_ean_family());
        assert!(SymbolType::Isbn13.is_ean_family());
        assert!(!SymbolType::Composite.is_ean_family());
        assert!(!SymbolType::Code39.is_ean_family());
    }

    #[test]
    fn test_modifier_bits() {
        let mut sym = Symbol::new(SymbolType::Code128, b"0101234".to_vec());
        sym.modifiers = Modifier::Gs1.bit();
        assert!(sym.has_modifier(Modifier::Gs1));
        assert!(!sym.has_modifier(Modifier::Aim));
        assert_eq!(sym.text(), "0101234");
    }
}
