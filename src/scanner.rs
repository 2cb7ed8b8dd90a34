//! Linear intensity scanner.
//!
//! Turns a stream of intensity samples along one scan line into bar/space
//! element widths, using an adaptive threshold on the first differential of a
//! smoothed signal. Positions and widths are fixed point with
//! [`FIXED_BITS`] fractional bits.

use crate::decoder::Decoder;
use crate::models::SymbolType;

/// Fractional bits of edge positions and widths.
pub const FIXED_BITS: u32 = 5;
const ROUND: u32 = 1 << (FIXED_BITS - 1);

/// Default minimum slope threshold.
pub const THRESH_MIN: u32 = 4;
/// Threshold decay distance, in element widths.
const THRESH_FADE: u64 = 8;
/// EWMA weight 0.78 in 5-bit fixed point.
const EWMA_WEIGHT: i32 = 25;
/// Initial threshold 0.44 of the extremum, in 5-bit fixed point.
const THRESH_INIT: u32 = 14;

/// Element color at the scanner position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    /// Light element
    Space = 0,
    /// Dark element
    Bar = 1,
}

/// Edge detector for one scan line, optionally feeding a width decoder.
///
/// Each detected edge finalizes the previous element; its width is passed to
/// the attached [`Decoder`] and the decoder's result is returned.
#[derive(Debug)]
pub struct Scanner {
    decoder: Option<Decoder>,
    min_thresh: u32,

    x: u32,
    y0: [i32; 4],
    y1_sign: i32,
    y1_thresh: u32,
    cur_edge: u32,
    last_edge: u32,
    width: u32,
}

impl Scanner {
    /// Scanner feeding the given decoder.
    pub fn new(decoder: Decoder) -> Self {
        Self::build(Some(decoder))
    }

    /// Scanner without a decoder; edges are reported as `Partial`.
    pub fn detached() -> Self {
        Self::build(None)
    }

    fn build(decoder: Option<Decoder>) -> Self {
        let mut scn = Self {
            decoder,
            min_thresh: THRESH_MIN,
            x: 0,
            y0: [0; 4],
            y1_sign: 0,
            y1_thresh: THRESH_MIN,
            cur_edge: 0,
            last_edge: 0,
            width: 0,
        };
        scn.reset();
        scn
    }

    /// Attached decoder.
    pub fn decoder(&self) -> Option<&Decoder> {
        self.decoder.as_ref()
    }

    /// Attached decoder, mutably.
    pub fn decoder_mut(&mut self) -> Option<&mut Decoder> {
        self.decoder.as_mut()
    }

    /// Change the minimum slope threshold.
    pub fn set_min_threshold(&mut self, thresh: u32) {
        self.min_thresh = thresh.max(1);
        self.y1_thresh = self.y1_thresh.max(self.min_thresh);
    }

    fn clear_state(&mut self) {
        self.x = 0;
        self.y0 = [0; 4];
        self.y1_sign = 0;
        self.cur_edge = 0;
        self.last_edge = 0;
        self.width = 0;
        self.y1_thresh = self.min_thresh;
    }

    /// Clear all scanner state and hard-reset the decoder.
    pub fn reset(&mut self) -> SymbolType {
        self.clear_state();
        if let Some(dcode) = self.decoder.as_mut() {
            dcode.reset();
        }
        SymbolType::None
    }

    /// Start a new scan line: drain pending edges, then reset scanner state
    /// and soft-reset the decoder.
    pub fn new_scan(&mut self) -> SymbolType {
        let mut edge = SymbolType::None;
        while self.y1_sign != 0 {
            let tmp = self.flush();
            if tmp > edge {
                edge = tmp;
            }
        }
        self.clear_state();
        if let Some(dcode) = self.decoder.as_mut() {
            dcode.new_scan();
        }
        edge
    }

    /// Flush the edge pipeline. Two calls drain it completely.
    pub fn flush(&mut self) -> SymbolType {
        if self.y1_sign == 0 {
            return SymbolType::None;
        }

        let x = (self.x << FIXED_BITS) + ROUND;
        if self.cur_edge != x || self.y1_sign > 0 {
            let edge = self.process_edge();
            self.cur_edge = x;
            self.y1_sign = -self.y1_sign;
            return edge;
        }

        self.y1_sign = 0;
        self.width = 0;
        match self.decoder.as_mut() {
            Some(dcode) => dcode.decode_width(0),
            None => SymbolType::Partial,
        }
    }

    /// Two flushes followed by a new scan, as required between scan lines.
    pub fn quiet_border(&mut self) -> SymbolType {
        let mut edge = self.flush();
        let tmp = self.flush();
        if tmp > edge {
            edge = tmp;
        }
        let tmp = self.new_scan();
        if tmp > edge {
            edge = tmp;
        }
        edge
    }

    fn calc_thresh(&mut self) -> u32 {
        let thresh = self.y1_thresh;
        if thresh <= self.min_thresh || self.width == 0 {
            return self.min_thresh;
        }
        // slowly return the threshold to the minimum
        let dx = (self.x << FIXED_BITS).wrapping_sub(self.last_edge) as u64;
        let t = thresh as u64 * dx / self.width as u64 / THRESH_FADE;
        if (thresh as u64) > t {
            let thresh = thresh - t as u32;
            if thresh > self.min_thresh {
                return thresh;
            }
        }
        self.y1_thresh = self.min_thresh;
        self.min_thresh
    }

    fn process_edge(&mut self) -> SymbolType {
        if self.y1_sign == 0 {
            self.cur_edge = (1 << FIXED_BITS) + ROUND;
            self.last_edge = self.cur_edge;
        } else if self.last_edge == 0 {
            self.last_edge = self.cur_edge;
        }

        self.width = self.cur_edge.wrapping_sub(self.last_edge);
        self.last_edge = self.cur_edge;

        match self.decoder.as_mut() {
            Some(dcode) => dcode.decode_width(self.width),
            None => SymbolType::Partial,
        }
    }

    /// Process the next intensity sample.
    pub fn scan_y(&mut self, y: i32) -> SymbolType {
        let x = self.x;
        let mut y0_1 = self.y0[(x.wrapping_sub(1) & 3) as usize];
        let y0_0;
        if x != 0 {
            y0_0 = y0_1 + (((y - y0_1) * EWMA_WEIGHT) >> FIXED_BITS);
            self.y0[(x & 3) as usize] = y0_0;
        } else {
            self.y0 = [y; 4];
            y0_0 = y;
            y0_1 = y;
        }
        let y0_2 = self.y0[(x.wrapping_sub(2) & 3) as usize];
        let y0_3 = self.y0[(x.wrapping_sub(3) & 3) as usize];

        // 1st differential at x-1
        let mut y1_1 = y0_1 - y0_2;
        let y1_2 = y0_2 - y0_3;
        if y1_1.abs() < y1_2.abs() && (y1_1 >= 0) == (y1_2 >= 0) {
            y1_1 = y1_2;
        }

        // 2nd differentials at x-1 and x-2
        let y2_1 = y0_0 - y0_1 * 2 + y0_2;
        let y2_2 = y0_1 - y0_2 * 2 + y0_3;

        let mut edge = SymbolType::None;
        // 2nd zero crossing is the 1st local extremum: candidate edge
        let crossing = y2_1 == 0 || if y2_1 > 0 { y2_2 < 0 } else { y2_2 > 0 };
        if crossing && self.calc_thresh() <= y1_1.unsigned_abs() {
            let y1_rev = if self.y1_sign > 0 { y1_1 < 0 } else { y1_1 > 0 };
            if y1_rev {
                // intensity reversal finalizes the previous edge
                edge = self.process_edge();
            }

            if y1_rev || self.y1_sign.abs() < y1_1.abs() {
                self.y1_sign = y1_1;

                self.y1_thresh = ((y1_1.unsigned_abs() * THRESH_INIT) + ROUND) >> FIXED_BITS;
                if self.y1_thresh < self.min_thresh {
                    self.y1_thresh = self.min_thresh;
                }

                // interpolate the zero crossing
                let d = y2_1 - y2_2;
                let mut cur: i32 = 1 << FIXED_BITS;
                if d == 0 {
                    cur >>= 1;
                } else if y2_1 != 0 {
                    cur -= ((y2_1 << FIXED_BITS) + 1) / d;
                }
                self.cur_edge = (cur + ((x as i32) << FIXED_BITS)) as u32;
            }
        }
        self.x = x + 1;
        edge
    }

    /// Position of an edge `offset` fixed-point units before the last one,
    /// converted to `prec` fractional bits.
    pub fn get_edge(&self, offset: u32, prec: i32) -> u32 {
        let edge = self
            .last_edge
            .wrapping_sub(offset)
            .wrapping_sub(1 << FIXED_BITS)
            .wrapping_sub(ROUND);
        let shift = FIXED_BITS as i32 - prec;
        if shift > 0 {
            edge >> shift
        } else if shift == 0 {
            edge
        } else {
            edge << -shift
        }
    }

    /// Width of the last finalized element.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Color of the element currently being measured.
    pub fn color(&self) -> Color {
        if self.y1_sign <= 0 {
            Color::Space
        } else {
            Color::Bar
        }
    }
}
