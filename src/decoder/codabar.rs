//! Codabar: seven elements per character with two or three wide, separated
//! by a narrow gap, framed by one of the `A`-`D` start/stop characters.

use super::{DecodeBuffer, Symbology, WidthHistory};
use crate::decoder::BUFFER_MAX;
use crate::models::{Config, SymbolType, SymbologyConfig};
use crate::scanner::Color;

const ALPHABET: &[u8; 20] = b"0123456789-$:/.+ABCD";

/// Wide-element patterns, bar first in the high bit, in [`ALPHABET`] order.
const PATTERNS: [u8; 20] = [
    0b0000011, 0b0000110, 0b0001001, 0b1100000, 0b0010010, 0b1000010, 0b0100001, 0b0100100,
    0b0110000, 0b1001000, 0b0001100, 0b0011000, 0b1000101, 0b1010001, 0b1010100, 0b0010101,
    0b0011010, 0b0101001, 0b0001011, 0b0001110,
];

/// Index of the first start/stop character.
const START_A: u8 = 16;

fn reverse7(p: u8) -> u8 {
    (0..7).fold(0, |acc, i| (acc << 1) | ((p >> i) & 1))
}

/// Read the seven widths ending at the newest bar.
fn read_char(hist: &WidthHistory) -> Option<(u8, u32)> {
    let mut w = [0u32; 7];
    for (i, slot) in w.iter_mut().enumerate() {
        *slot = hist.width(6 - i as u8);
    }
    let s: u32 = w.iter().sum();
    let mut sorted = w;
    sorted.sort_unstable();
    // four narrow and two wide for sure; the middle one decides
    let (max_n, min_w) = (sorted[3], sorted[5]);
    if sorted[0] == 0 || min_w * 2 < max_n * 3 || sorted[6] > sorted[0] * 5 {
        return None;
    }
    let threshold = (max_n + min_w) / 2;
    let pattern = w.iter().fold(0u8, |acc, &x| (acc << 1) | (x > threshold) as u8);
    Some((pattern, s))
}

fn lookup(pattern: u8) -> Option<u8> {
    PATTERNS.iter().position(|&p| p == pattern).map(|i| i as u8)
}

#[derive(Debug, Clone, Copy)]
struct Run {
    dir: i32,
    element: u8,
    s7: u32,
    ended: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct CodabarDecoder {
    run: Option<Run>,
    chars: Vec<u8>,
    pub(crate) config: SymbologyConfig,
}

impl Default for CodabarDecoder {
    fn default() -> Self {
        Self {
            run: None,
            chars: Vec::new(),
            config: SymbologyConfig::with_flags(Config::Enable.bit()).lengths(4, 0),
        }
    }
}

impl CodabarDecoder {
    fn start(&mut self, hist: &WidthHistory) -> SymbolType {
        if hist.color() != Color::Bar {
            return SymbolType::None;
        }
        let Some((pattern, s)) = read_char(hist) else {
            return SymbolType::None;
        };
        let (dir, value) = if let Some(v) = lookup(pattern).filter(|&v| v >= START_A) {
            (1, v)
        } else if let Some(v) = lookup(reverse7(pattern)).filter(|&v| v >= START_A) {
            (-1, v)
        } else {
            return SymbolType::None;
        };
        let quiet = hist.width(7);
        if quiet != 0 && quiet * 2 < s {
            return SymbolType::None;
        }
        self.chars.clear();
        self.chars.push(value);
        self.run = Some(Run {
            dir,
            element: 0,
            s7: s,
            ended: false,
        });
        SymbolType::Partial
    }

    fn abort(&mut self, buf: &mut DecodeBuffer) -> SymbolType {
        buf.release_if_owner(SymbolType::Codabar);
        self.run = None;
        self.chars.clear();
        SymbolType::None
    }

    fn finish(&mut self, dir: i32, buf: &mut DecodeBuffer) -> SymbolType {
        let mut values = std::mem::take(&mut self.chars);
        self.run = None;
        if dir < 0 {
            values.reverse();
        }
        // start + stop + at least one data character
        if values.len() < 3 {
            return self.abort(buf);
        }
        if self.config.is_set(Config::AddCheck) {
            let sum: u32 = values.iter().map(|&v| v as u32).sum();
            if sum % 16 != 0 || values.len() < 4 {
                return self.abort(buf);
            }
            if !self.config.is_set(Config::EmitCheck) {
                values.remove(values.len() - 2);
            }
        }
        // length limits apply to the characters between start and stop
        if !self.config.accepts_len(values.len() - 2) || !buf.acquire(SymbolType::Codabar) {
            return self.abort(buf);
        }
        let data: Vec<u8> = values.iter().map(|&v| ALPHABET[v as usize]).collect();
        if !buf.set_data(&data) {
            return self.abort(buf);
        }
        buf.modifiers = 0;
        buf.direction = dir;
        SymbolType::Codabar
    }
}

impl Symbology for CodabarDecoder {
    fn decode(&mut self, hist: &WidthHistory, buf: &mut DecodeBuffer) -> SymbolType {
        let Some(mut run) = self.run else {
            return self.start(hist);
        };
        run.element += 1;
        self.run = Some(run);

        if run.element == 1 {
            let w = hist.width(0);
            let quiet = w == 0 || w * 2 >= run.s7;
            return match (quiet, run.ended) {
                (true, true) => self.finish(run.dir, buf),
                (false, false) => SymbolType::Partial,
                _ => self.abort(buf),
            };
        }
        if run.element < 8 {
            return SymbolType::Partial;
        }

        let Some((pattern, s)) = read_char(hist) else {
            return self.abort(buf);
        };
        if s * 4 < run.s7 * 3 || s * 3 > run.s7 * 4 {
            return self.abort(buf);
        }
        let pattern = if run.dir < 0 { reverse7(pattern) } else { pattern };
        let Some(value) = lookup(pattern) else {
            return self.abort(buf);
        };
        run.element = 0;
        run.s7 = s;
        if self.chars.len() == 1 && !buf.acquire(SymbolType::Codabar) {
            self.run = None;
            return SymbolType::None;
        }
        if self.chars.len() >= BUFFER_MAX {
            return self.abort(buf);
        }
        self.chars.push(value);
        run.ended = value >= START_A;
        self.run = Some(run);
        SymbolType::Partial
    }

    fn reset(&mut self) {
        self.run = None;
        self.chars.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;
    use crate::decoder::test_util::feed;

    fn modules(text: &str) -> Vec<u32> {
        let mut m = Vec::new();
        for (n, b) in text.bytes().enumerate() {
            if n > 0 {
                m.push(1);
            }
            let p = PATTERNS[ALPHABET.iter().position(|&a| a == b).unwrap()];
            for bit in (0..7).rev() {
                m.push(if (p >> bit) & 1 == 1 { 3 } else { 1 });
            }
        }
        m
    }

    #[test]
    fn test_patterns_are_distinct_both_ways() {
        for (i, &p) in PATTERNS.iter().enumerate() {
            assert!((2..=3).contains(&p.count_ones()));
            for &q in &PATTERNS[i + 1..] {
                assert_ne!(p, q);
            }
        }
        // a reversed start/stop never reads as a forward one
        for &p in &PATTERNS[START_A as usize..] {
            assert!(lookup(reverse7(p)).is_none_or(|v| v < START_A));
        }
    }

    #[test]
    fn test_decode_forward_and_reverse() {
        let m = modules("A40156B");
        let mut dcode = Decoder::new();
        assert_eq!(
            feed(&mut dcode, &m, 2),
            vec![(SymbolType::Codabar, b"A40156B".to_vec())]
        );

        let rev: Vec<u32> = m.iter().rev().copied().collect();
        let mut dcode = Decoder::new();
        assert_eq!(
            feed(&mut dcode, &rev, 3),
            vec![(SymbolType::Codabar, b"A40156B".to_vec())]
        );
        assert_eq!(dcode.direction(), -1);
    }

    #[test]
    fn test_short_symbol_rejected() {
        let mut dcode = Decoder::new();
        assert!(feed(&mut dcode, &modules("A12B"), 2).is_empty());
    }

    #[test]
    fn test_check_character() {
        // A(16) 1 2 3 4 B(17) = 43; check 5 brings the sum to 48
        let m = modules("A12345B");
        let mut dcode = Decoder::new();
        dcode.set_config(SymbolType::Codabar, Config::AddCheck, 1).unwrap();
        assert_eq!(
            feed(&mut dcode, &m, 2),
            vec![(SymbolType::Codabar, b"A1234B".to_vec())]
        );
        assert!(feed(&mut dcode, &modules("A12346B"), 2).is_empty());
    }
}
