//! Code 39: nine elements per character, three of them wide, with a narrow
//! inter-character gap and `*` start/stop characters.

use super::{DecodeBuffer, Symbology, WidthHistory};
use crate::decoder::BUFFER_MAX;
use crate::models::{Config, SymbolType, SymbologyConfig};
use crate::scanner::Color;

const ALPHABET: &[u8; 43] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-. $/+%";

/// Wide-element patterns (first element in the high bit), in
/// [`ALPHABET`] order.
const PATTERNS: [u16; 43] = [
    0x034, 0x121, 0x061, 0x160, 0x031, 0x130, 0x070, 0x025, 0x124, 0x064, // 0-9
    0x109, 0x049, 0x148, 0x019, 0x118, 0x058, 0x00d, 0x10c, 0x04c, 0x01c, // A-J
    0x103, 0x043, 0x142, 0x013, 0x112, 0x052, 0x007, 0x106, 0x046, 0x016, // K-T
    0x181, 0x0c1, 0x1c0, 0x091, 0x190, 0x0d0, // U-Z
    0x085, 0x184, 0x0c4, 0x0a8, 0x0a2, 0x08a, 0x02a,
];

const STAR: u16 = 0x094;

fn reverse9(p: u16) -> u16 {
    (0..9).fold(0, |acc, i| (acc << 1) | ((p >> i) & 1))
}

/// Read the nine widths ending at the newest bar as a wide/narrow pattern.
pub(crate) fn read_char(hist: &WidthHistory) -> Option<(u16, u32)> {
    let mut w = [0u32; 9];
    for (i, slot) in w.iter_mut().enumerate() {
        *slot = hist.width(8 - i as u8);
    }
    let s: u32 = w.iter().sum();
    let mut sorted = w;
    sorted.sort_unstable();
    let (min_n, max_n, min_w, max_w) = (sorted[0], sorted[5], sorted[6], sorted[8]);
    if min_n == 0 || min_w * 2 < max_n * 3 || max_w > min_n * 5 {
        return None;
    }
    let pattern = w
        .iter()
        .fold(0u16, |acc, &x| (acc << 1) | (x >= min_w) as u16);
    (pattern.count_ones() == 3).then_some((pattern, s))
}

fn lookup(pattern: u16) -> Option<u8> {
    PATTERNS.iter().position(|&p| p == pattern).map(|i| i as u8)
}

/// Full-ASCII value of shift character `shift` (`$`, `%`, `/` or `+`)
/// followed by `n`. Shared with Code 93.
pub(crate) fn ascii_shift(shift: u8, n: u8) -> Option<u8> {
    Some(match (shift, n) {
        (b'$', b'A'..=b'Z') => n - b'A' + 0x01,
        (b'%', b'A'..=b'E') => n - b'A' + 0x1b,
        (b'%', b'F'..=b'J') => n - b'F' + b';',
        (b'%', b'K'..=b'O') => n - b'K' + b'[',
        (b'%', b'P'..=b'T') => n - b'P' + b'{',
        (b'%', b'U') => 0x00,
        (b'%', b'V') => b'@',
        (b'%', b'W') => b'`',
        (b'%', b'X'..=b'Z') => 0x7f,
        (b'/', b'A'..=b'O') => n - b'A' + b'!',
        (b'/', b'Z') => b':',
        (b'+', b'A'..=b'Z') => n - b'A' + b'a',
        _ => return None,
    })
}

/// Expand full-ASCII shift pairs (`$A` etc.).
fn full_ascii(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    let mut it = data.iter().copied();
    while let Some(c) = it.next() {
        if matches!(c, b'$' | b'%' | b'/' | b'+') {
            out.push(ascii_shift(c, it.next()?)?);
        } else {
            out.push(c);
        }
    }
    Some(out)
}

#[derive(Debug, Clone, Copy)]
struct Run {
    dir: i32,
    element: u8,
    s9: u32,
    ended: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct Code39Decoder {
    run: Option<Run>,
    chars: Vec<u8>,
    pub(crate) config: SymbologyConfig,
}

impl Default for Code39Decoder {
    fn default() -> Self {
        Self {
            run: None,
            chars: Vec::new(),
            config: SymbologyConfig::with_flags(Config::Enable.bit()).lengths(1, 0),
        }
    }
}

impl Code39Decoder {
    fn start(&mut self, hist: &WidthHistory) -> SymbolType {
        if hist.color() != Color::Bar {
            return SymbolType::None;
        }
        let Some((pattern, s)) = read_char(hist) else {
            return SymbolType::None;
        };
        let dir = if pattern == STAR {
            1
        } else if pattern == reverse9(STAR) {
            -1
        } else {
            return SymbolType::None;
        };
        let quiet = hist.width(9);
        if quiet != 0 && quiet * 2 < s {
            return SymbolType::None;
        }
        self.chars.clear();
        self.run = Some(Run {
            dir,
            element: 0,
            s9: s,
            ended: false,
        });
        SymbolType::Partial
    }

    fn abort(&mut self, buf: &mut DecodeBuffer) -> SymbolType {
        buf.release_if_owner(SymbolType::Code39);
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
        if self.config.is_set(Config::AddCheck) {
            let Some((&check, body)) = values.split_last() else {
                return self.abort(buf);
            };
            let sum: u32 = body.iter().map(|&v| v as u32).sum();
            if sum % 43 != check as u32 {
                return self.abort(buf);
            }
            if !self.config.is_set(Config::EmitCheck) {
                values.pop();
            }
        }
        let mut data: Vec<u8> = values.iter().map(|&v| ALPHABET[v as usize]).collect();
        if self.config.is_set(Config::Ascii) {
            match full_ascii(&data) {
                Some(expanded) => data = expanded,
                None => return self.abort(buf),
            }
        }
        if !self.config.accepts_len(data.len()) || !buf.acquire(SymbolType::Code39) {
            return self.abort(buf);
        }
        if !buf.set_data(&data) {
            return self.abort(buf);
        }
        buf.modifiers = 0;
        buf.direction = dir;
        SymbolType::Code39
    }
}

impl Symbology for Code39Decoder {
    fn decode(&mut self, hist: &WidthHistory, buf: &mut DecodeBuffer) -> SymbolType {
        let Some(mut run) = self.run else {
            return self.start(hist);
        };
        run.element += 1;
        self.run = Some(run);

        if run.element == 1 {
            // inter-character gap, or the trailing quiet zone
            let w = hist.width(0);
            let quiet = w == 0 || w * 2 >= run.s9;
            return match (quiet, run.ended) {
                (true, true) => self.finish(run.dir, buf),
                (false, false) => SymbolType::Partial,
                _ => self.abort(buf),
            };
        }
        if run.element < 10 {
            return SymbolType::Partial;
        }

        let Some((pattern, s)) = read_char(hist) else {
            return self.abort(buf);
        };
        // character widths must stay within 25%
        if s * 4 < run.s9 * 3 || s * 3 > run.s9 * 4 {
            return self.abort(buf);
        }
        let pattern = if run.dir < 0 {
            reverse9(pattern)
        } else {
            pattern
        };
        run.element = 0;
        run.s9 = s;
        if pattern == STAR {
            run.ended = true;
            self.run = Some(run);
            return SymbolType::Partial;
        }
        let Some(value) = lookup(pattern) else {
            return self.abort(buf);
        };
        if self.chars.is_empty() && !buf.acquire(SymbolType::Code39) {
            self.run = None;
            return SymbolType::None;
        }
        if self.chars.len() >= BUFFER_MAX {
            return self.abort(buf);
        }
        self.chars.push(value);
        self.run = Some(run);
        SymbolType::Partial
    }

    fn reset(&mut self) {
        self.run = None;
        self.chars.clear();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::decoder::Decoder;
    use crate::decoder::test_util::feed;

    /// Module widths for `*text*` with 3:1 wide elements.
    pub(crate) fn code39_modules(text: &str) -> Vec<u32> {
        let mut m = Vec::new();
        let chars = std::iter::once(STAR)
            .chain(text.bytes().map(|b| {
                let i = ALPHABET.iter().position(|&a| a == b).unwrap();
                PATTERNS[i]
            }))
            .chain(std::iter::once(STAR));
        for (n, p) in chars.enumerate() {
            if n > 0 {
                m.push(1);
            }
            for bit in (0..9).rev() {
                m.push(if (p >> bit) & 1 == 1 { 3 } else { 1 });
            }
        }
        m
    }

    #[test]
    fn test_patterns_have_three_wide() {
        for p in PATTERNS.iter().chain(std::iter::once(&STAR)) {
            assert_eq!(p.count_ones(), 3, "{:03x}", p);
        }
    }

    #[test]
    fn test_decode_forward_and_reverse() {
        let modules = code39_modules("CODE-39");
        let mut dcode = Decoder::new();
        assert_eq!(
            feed(&mut dcode, &modules, 2),
            vec![(SymbolType::Code39, b"CODE-39".to_vec())]
        );
        assert_eq!(dcode.direction(), 1);

        let rev: Vec<u32> = modules.iter().rev().copied().collect();
        let mut dcode = Decoder::new();
        assert_eq!(
            feed(&mut dcode, &rev, 2),
            vec![(SymbolType::Code39, b"CODE-39".to_vec())]
        );
        assert_eq!(dcode.direction(), -1);
    }

    #[test]
    fn test_uniform_widths_rejected() {
        let mut dcode = Decoder::new();
        dcode.new_scan();
        for _ in 0..9 {
            assert!(dcode.decode_width(10 * 32) <= SymbolType::Partial);
        }
    }

    #[test]
    fn test_check_character() {
        // "AB" values 10 + 11 = 21 -> 'L'
        let modules = code39_modules("ABL");
        let mut dcode = Decoder::new();
        dcode
            .set_config(SymbolType::Code39, Config::AddCheck, 1)
            .unwrap();
        assert_eq!(
            feed(&mut dcode, &modules, 2),
            vec![(SymbolType::Code39, b"AB".to_vec())]
        );
        let bad = code39_modules("ABM");
        assert!(feed(&mut dcode, &bad, 2).is_empty());
    }

    #[test]
    fn test_full_ascii() {
        assert_eq!(full_ascii(b"+H+I/A").unwrap(), b"hi!");
        assert!(full_ascii(b"$").is_none());
        let modules = code39_modules("+A%U");
        let mut dcode = Decoder::new();
        dcode.set_config(SymbolType::Code39, Config::Ascii, 1).unwrap();
        assert_eq!(
            feed(&mut dcode, &modules, 2),
            vec![(SymbolType::Code39, b"a\0".to_vec())]
        );
    }
}
