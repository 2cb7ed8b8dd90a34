//! QR finder-line detector: spots 1:1:3:1:1 dark/light runs in the width
//! stream and records where they are for the 2-D pipeline.

use super::{DecodeBuffer, Symbology, WidthHistory, decode_e};
use crate::models::{Config, SymbolType, SymbologyConfig};
use crate::scanner::Color;

/// A finder-pattern crossing on one scan line.
///
/// While inside the decoder the offsets are fixed-point distances back from
/// the newest edge. The image scanner rewrites them into image coordinates:
/// `pos` is the start of the 3-module center bar, `len` its length, `boffs`
/// and `eoffs` the distances out to the middle of the outer dark modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FinderLine {
    /// Start of the center run (x, y)
    pub pos: [i32; 2],
    /// Length of the center run
    pub len: i32,
    /// Distance from the start of the center run back to the leading ring
    pub boffs: i32,
    /// Distance from the end of the center run on to the trailing ring
    pub eoffs: i32,
}

#[derive(Debug, Clone)]
pub(crate) struct QrFinder {
    s5: u32,
    pub(crate) line: FinderLine,
    pub(crate) config: SymbologyConfig,
}

impl Default for QrFinder {
    fn default() -> Self {
        Self {
            s5: 0,
            line: FinderLine::default(),
            config: SymbologyConfig::with_flags(Config::Enable.bit()),
        }
    }
}

impl Symbology for QrFinder {
    fn decode(&mut self, hist: &WidthHistory, _buf: &mut DecodeBuffer) -> SymbolType {
        self.s5 = self
            .s5
            .wrapping_sub(hist.width(6))
            .wrapping_add(hist.width(1));
        let s = self.s5;

        if hist.color() != Color::Space || s < 7 {
            return SymbolType::None;
        }

        // 1:1:3:1:1 as pair widths 2, 4, 4, 2 units out of 7
        let expected = [0u32, 2, 2, 0];
        for (i, &e) in expected.iter().enumerate() {
            if decode_e(hist.pair_width(i as u8 + 1), s, 7) != Some(e) {
                return SymbolType::None;
            }
        }

        let qz = hist.width(0);
        let w1 = hist.width(1);
        let eoffs = qz + w1.div_ceil(2);
        let len = qz + w1 + hist.width(2);
        let pos = len + hist.width(3);
        let boffs = pos + hist.width(4) + hist.width(5).div_ceil(2);
        self.line = FinderLine {
            pos: [pos as i32, pos as i32],
            len: len as i32,
            boffs: boffs as i32,
            eoffs: eoffs as i32,
        };
        SymbolType::QrCode
    }

    fn reset(&mut self) {
        self.s5 = 0;
    }
}
