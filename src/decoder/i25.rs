//! Interleaved 2 of 5: digit pairs of ten elements, bars carrying the
//! first digit and spaces the second, between a narrow start and a
//! wide-narrow-narrow stop.

use super::{DecodeBuffer, Symbology, WidthHistory};
use crate::decoder::BUFFER_MAX;
use crate::models::{Config, SymbolType, SymbologyConfig};
use crate::scanner::Color;

/// Wide elements per digit, first element in the high bit.
const DIGITS: [u8; 10] = [
    0b00110, 0b10001, 0b01001, 0b11000, 0b00101, 0b10100, 0b01100, 0b00011, 0b10010, 0b01010,
];

/// Classify five widths as a digit: exactly two wide elements.
fn read_digit(w: [u32; 5]) -> Option<u8> {
    let mut sorted = w;
    sorted.sort_unstable();
    let (max_n, min_w) = (sorted[2], sorted[3]);
    if sorted[0] == 0 || min_w * 2 < max_n * 3 || sorted[4] > sorted[0] * 5 {
        return None;
    }
    let pattern = w.iter().fold(0u8, |acc, &x| (acc << 1) | (x >= min_w) as u8);
    DIGITS.iter().position(|&d| d == pattern).map(|d| d as u8)
}

/// Wide element followed by two narrow ones, as seen by the caller.
fn is_wide_narrow_narrow(wide: u32, n1: u32, n2: u32) -> bool {
    let max_n = n1.max(n2);
    n1 > 0 && n2 > 0 && wide * 2 >= max_n * 3 && n1 * 2 >= n2 && n2 * 2 >= n1
}

#[derive(Debug, Clone, Copy)]
struct Run {
    dir: i32,
    element: u8,
    /// width of the previous pair, or of the start pattern
    s10: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct I25Decoder {
    run: Option<Run>,
    digits: Vec<u8>,
    pub(crate) config: SymbologyConfig,
}

impl Default for I25Decoder {
    fn default() -> Self {
        Self {
            run: None,
            digits: Vec::new(),
            config: SymbologyConfig::with_flags(Config::Enable.bit()).lengths(6, 0),
        }
    }
}

impl I25Decoder {
    fn start(&mut self, hist: &WidthHistory) -> SymbolType {
        let (dir, s, quiet) = if hist.color() == Color::Space {
            // forward: four narrow elements after the quiet zone
            let w = [hist.width(3), hist.width(2), hist.width(1), hist.width(0)];
            let s: u32 = w.iter().sum();
            let (min, max) = (w.iter().min().copied(), w.iter().max().copied());
            match (min, max) {
                (Some(min), Some(max)) if min > 0 && max * 2 <= min * 3 => {}
                _ => return SymbolType::None,
            }
            (1, s, hist.width(4))
        } else {
            // reverse: the stop pattern read backwards
            if !is_wide_narrow_narrow(hist.width(0), hist.width(1), hist.width(2)) {
                return SymbolType::None;
            }
            (-1, hist.calc_s(0, 3), hist.width(3))
        };
        if quiet != 0 && quiet < s {
            return SymbolType::None;
        }
        self.digits.clear();
        self.run = Some(Run {
            dir,
            element: 0,
            s10: 0,
        });
        SymbolType::Partial
    }

    fn abort(&mut self, buf: &mut DecodeBuffer) -> SymbolType {
        buf.release_if_owner(SymbolType::I25);
        self.run = None;
        self.digits.clear();
        SymbolType::None
    }

    /// The trailing pattern after the last pair, ending at the newest width.
    fn at_end(&self, hist: &WidthHistory, run: &Run) -> bool {
        let quiet = hist.width(0);
        let quiet_ok = quiet == 0 || quiet * 4 >= run.s10;
        if !quiet_ok || hist.color() != Color::Space {
            return false;
        }
        if run.dir > 0 {
            run.element == 4 && is_wide_narrow_narrow(hist.width(3), hist.width(2), hist.width(1))
        } else {
            if run.element != 5 {
                return false;
            }
            let w = [hist.width(4), hist.width(3), hist.width(2), hist.width(1)];
            let (min, max) = (w.iter().min().copied().unwrap_or(0), w.iter().max().copied().unwrap_or(0));
            min > 0 && max * 2 <= min * 3
        }
    }

    fn finish(&mut self, dir: i32, buf: &mut DecodeBuffer) -> SymbolType {
        let mut digits = std::mem::take(&mut self.digits);
        self.run = None;
        if dir < 0 {
            digits.reverse();
        }
        if self.config.is_set(Config::AddCheck) {
            let Some((&check, body)) = digits.split_last() else {
                return self.abort(buf);
            };
            let sum: u32 = body
                .iter()
                .rev()
                .enumerate()
                .map(|(i, &d)| (d - b'0') as u32 * if i % 2 == 0 { 3 } else { 1 })
                .sum();
            if (10 - sum % 10) % 10 != (check - b'0') as u32 {
                return self.abort(buf);
            }
            if !self.config.is_set(Config::EmitCheck) {
                digits.pop();
            }
        }
        if !self.config.accepts_len(digits.len()) || !buf.acquire(SymbolType::I25) {
            return self.abort(buf);
        }
        if !buf.set_data(&digits) {
            return self.abort(buf);
        }
        buf.modifiers = 0;
        buf.direction = dir;
        SymbolType::I25
    }
}

impl Symbology for I25Decoder {
    fn decode(&mut self, hist: &WidthHistory, buf: &mut DecodeBuffer) -> SymbolType {
        let Some(mut run) = self.run else {
            return self.start(hist);
        };
        run.element += 1;
        self.run = Some(run);

        if !self.digits.is_empty() && self.at_end(hist, &run) {
            return self.finish(run.dir, buf);
        }
        if run.element < 10 {
            return SymbolType::Partial;
        }

        let mut w = [0u32; 10];
        for (i, slot) in w.iter_mut().enumerate() {
            *slot = hist.width(9 - i as u8);
        }
        if run.dir < 0 {
            w.reverse();
        }
        let s: u32 = w.iter().sum();
        if run.s10 != 0 && (s * 4 < run.s10 * 3 || s * 3 > run.s10 * 4) {
            return self.abort(buf);
        }
        let (Some(d1), Some(d2)) = (
            read_digit([w[0], w[2], w[4], w[6], w[8]]),
            read_digit([w[1], w[3], w[5], w[7], w[9]]),
        ) else {
            return self.abort(buf);
        };
        if self.digits.is_empty() && !buf.acquire(SymbolType::I25) {
            self.run = None;
            return SymbolType::None;
        }
        if self.digits.len() + 2 > BUFFER_MAX {
            return self.abort(buf);
        }
        // stored in read order; reversed as a whole at the end
        if run.dir > 0 {
            self.digits.extend([b'0' + d1, b'0' + d2]);
        } else {
            self.digits.extend([b'0' + d2, b'0' + d1]);
        }
        run.element = 0;
        run.s10 = s;
        self.run = Some(run);
        SymbolType::Partial
    }

    fn reset(&mut self) {
        self.run = None;
        self.digits.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;
    use crate::decoder::test_util::feed;

    fn modules(digits: &str) -> Vec<u32> {
        let d: Vec<u8> = digits.bytes().map(|b| b - b'0').collect();
        assert_eq!(d.len() % 2, 0);
        let mut m = vec![1, 1, 1, 1];
        for pair in d.chunks(2) {
            let (bars, spaces) = (DIGITS[pair[0] as usize], DIGITS[pair[1] as usize]);
            for bit in (0..5).rev() {
                m.push(if (bars >> bit) & 1 == 1 { 3 } else { 1 });
                m.push(if (spaces >> bit) & 1 == 1 { 3 } else { 1 });
            }
        }
        m.extend([3, 1, 1]);
        m
    }

    #[test]
    fn test_digit_patterns_have_two_wide() {
        for d in DIGITS {
            assert_eq!(d.count_ones(), 2);
        }
        assert_eq!(read_digit([10, 10, 30, 30, 10]), Some(0));
        assert_eq!(read_digit([10, 10, 10, 10, 10]), None);
    }

    #[test]
    fn test_decode_forward_and_reverse() {
        let m = modules("12345670");
        let mut dcode = Decoder::new();
        assert_eq!(
            feed(&mut dcode, &m, 2),
            vec![(SymbolType::I25, b"12345670".to_vec())]
        );

        let rev: Vec<u32> = m.iter().rev().copied().collect();
        let mut dcode = Decoder::new();
        assert_eq!(
            feed(&mut dcode, &rev, 3),
            vec![(SymbolType::I25, b"12345670".to_vec())]
        );
        assert_eq!(dcode.direction(), -1);
    }

    #[test]
    fn test_minimum_length() {
        let m = modules("1234");
        let mut dcode = Decoder::new();
        assert!(feed(&mut dcode, &m, 2).is_empty());
        dcode.set_config(SymbolType::I25, Config::MinLen, 4).unwrap();
        assert_eq!(
            feed(&mut dcode, &m, 2),
            vec![(SymbolType::I25, b"1234".to_vec())]
        );
    }

    #[test]
    fn test_check_digit() {
        // 1234567: 3*7 + 6 + 3*5 + 4 + 3*3 + 2 + 3*1 = 60 -> check 0
        let m = modules("12345670");
        let mut dcode = Decoder::new();
        dcode.set_config(SymbolType::I25, Config::AddCheck, 1).unwrap();
        assert_eq!(
            feed(&mut dcode, &m, 2),
            vec![(SymbolType::I25, b"1234567".to_vec())]
        );
        assert!(feed(&mut dcode, &modules("12345678"), 2).is_empty());
    }
}
