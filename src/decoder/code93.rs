//! Code 93: six elements over nine modules per character, two mandatory
//! mod-47 check characters and a termination bar after the stop character.

use std::sync::OnceLock;

use super::{DecodeBuffer, Symbology, WidthHistory, decode_e};
use crate::decoder::BUFFER_MAX;
use crate::decoder::code39::ascii_shift;
use crate::models::{Config, SymbolType, SymbologyConfig};
use crate::scanner::Color;

const ALPHABET: &[u8; 43] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-. $/+%";

/// Module patterns, bar first, MSB first. 43..=46 are the `($)`, `(%)`,
/// `(/)` and `(+)` shifts, 47 is start/stop.
const PATTERNS: [u16; 48] = [
    0b100010100, 0b101001000, 0b101000100, 0b101000010, 0b100101000, 0b100100100, 0b100100010,
    0b101010000, 0b100010010, 0b100001010, 0b110101000, 0b110100100, 0b110100010, 0b110010100,
    0b110010010, 0b110001010, 0b101101000, 0b101100100, 0b101100010, 0b100110100, 0b100011010,
    0b101011000, 0b101001100, 0b101000110, 0b100101100, 0b100010110, 0b110110100, 0b110110010,
    0b110101100, 0b110100110, 0b110010110, 0b110011010, 0b101101100, 0b101100110, 0b100110110,
    0b100111010, 0b100101110, 0b111010100, 0b111010010, 0b111001010, 0b101101110, 0b101110110,
    0b110101110, 0b100100110, 0b111011010, 0b111010110, 0b100110010, 0b101011110,
];

const START_STOP: u8 = 47;
const SHIFTS: [u8; 4] = [b'$', b'%', b'/', b'+'];

/// Element widths in modules for each pattern.
pub(crate) fn elements(pattern: u16) -> [u8; 6] {
    let mut out = [0u8; 6];
    let mut n = 0;
    let mut prev = 1;
    for bit in (0..9).rev() {
        let b = (pattern >> bit) & 1;
        if b != prev {
            n += 1;
            prev = b;
        }
        if n < 6 {
            out[n] += 1;
        }
    }
    out
}

struct Signatures {
    pairs: [[u32; 4]; 48],
    elements: [[u8; 6]; 48],
}

fn signatures() -> &'static Signatures {
    static TABLE: OnceLock<Signatures> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut pairs = [[0; 4]; 48];
        let mut elems = [[0; 6]; 48];
        for (i, &p) in PATTERNS.iter().enumerate() {
            let e = elements(p);
            for j in 0..4 {
                pairs[i][j] = (e[j] + e[j + 1]) as u32 - 2;
            }
            elems[i] = e;
        }
        Signatures {
            pairs,
            elements: elems,
        }
    })
}

/// Decode the six widths ending at the newest element.
fn read_char(hist: &WidthHistory, reverse: bool) -> Option<(u8, u32)> {
    let mut w = [0u32; 6];
    for (i, slot) in w.iter_mut().enumerate() {
        *slot = hist.width(5 - i as u8);
    }
    if reverse {
        w.reverse();
    }
    let s: u32 = w.iter().sum();
    if s < 9 {
        return None;
    }
    let mut key = [0u32; 4];
    for j in 0..4 {
        key[j] = decode_e(w[j] + w[j + 1], s, 9)?;
    }
    let table = signatures();
    // edge measures first, element widths to break ties
    (0..48)
        .filter(|&i| table.pairs[i] == key)
        .min_by_key(|&i| {
            w.iter()
                .zip(table.elements[i])
                .map(|(&x, m)| (x as i64 * 9 - m as i64 * s as i64).unsigned_abs())
                .sum::<u64>()
        })
        .map(|i| (i as u8, s))
}

fn check_value(values: &[u8], max_weight: usize) -> u8 {
    let n = values.len();
    let sum: usize = values
        .iter()
        .enumerate()
        .map(|(i, &v)| ((n - 1 - i) % max_weight + 1) * v as usize)
        .sum();
    (sum % 47) as u8
}

#[derive(Debug, Clone, Copy)]
struct Run {
    dir: i32,
    element: u8,
    s6: u32,
    /// widths left to check after the stop character
    tail: u8,
}

#[derive(Debug, Clone)]
pub(crate) struct Code93Decoder {
    run: Option<Run>,
    values: Vec<u8>,
    pub(crate) config: SymbologyConfig,
}

impl Default for Code93Decoder {
    fn default() -> Self {
        Self {
            run: None,
            values: Vec::new(),
            config: SymbologyConfig::with_flags(Config::Enable.bit()),
        }
    }
}

impl Code93Decoder {
    fn start(&mut self, hist: &WidthHistory) -> SymbolType {
        let (dir, quiet, term) = if hist.color() == Color::Space {
            (1, hist.width(6), None)
        } else {
            (-1, hist.width(7), Some(hist.width(6)))
        };
        let Some((value, s)) = read_char(hist, dir < 0) else {
            return SymbolType::None;
        };
        if value != START_STOP || (quiet != 0 && quiet * 9 < s * 4) {
            return SymbolType::None;
        }
        if let Some(t) = term
            && (t * 9 * 2 < s || t * 9 > s * 2)
        {
            return SymbolType::None;
        }
        self.values.clear();
        self.run = Some(Run {
            dir,
            element: 0,
            s6: s,
            tail: 0,
        });
        SymbolType::Partial
    }

    fn abort(&mut self, buf: &mut DecodeBuffer) -> SymbolType {
        buf.release_if_owner(SymbolType::Code93);
        self.run = None;
        self.values.clear();
        SymbolType::None
    }

    fn finish(&mut self, dir: i32, buf: &mut DecodeBuffer) -> SymbolType {
        let mut values = std::mem::take(&mut self.values);
        self.run = None;
        if dir < 0 {
            values.reverse();
        }
        if values.len() < 2 {
            return self.abort(buf);
        }
        let n = values.len();
        if check_value(&values[..n - 2], 20) != values[n - 2]
            || check_value(&values[..n - 1], 15) != values[n - 1]
        {
            return self.abort(buf);
        }
        let body = if self.config.is_set(Config::EmitCheck) {
            &values[..]
        } else {
            &values[..n - 2]
        };

        let mut data = Vec::with_capacity(body.len());
        let mut it = body.iter().copied();
        while let Some(v) = it.next() {
            if (43..47).contains(&v) {
                let Some(next) = it.next().filter(|&n| n < 43) else {
                    return self.abort(buf);
                };
                match ascii_shift(SHIFTS[(v - 43) as usize], ALPHABET[next as usize]) {
                    Some(c) => data.push(c),
                    None => return self.abort(buf),
                }
            } else if v < 43 {
                data.push(ALPHABET[v as usize]);
            } else {
                return self.abort(buf);
            }
        }

        if !self.config.accepts_len(data.len()) || !buf.acquire(SymbolType::Code93) {
            return self.abort(buf);
        }
        if !buf.set_data(&data) {
            return self.abort(buf);
        }
        buf.modifiers = 0;
        buf.direction = dir;
        SymbolType::Code93
    }
}

impl Symbology for Code93Decoder {
    fn decode(&mut self, hist: &WidthHistory, buf: &mut DecodeBuffer) -> SymbolType {
        let Some(mut run) = self.run else {
            return self.start(hist);
        };

        if run.tail > 0 {
            // forward: termination bar then quiet; reverse: quiet only
            run.tail -= 1;
            self.run = Some(run);
            let w = hist.width(0);
            if hist.color() == Color::Bar {
                return if w * 9 * 2 >= run.s6 && w * 9 <= run.s6 * 2 {
                    SymbolType::Partial
                } else {
                    self.abort(buf)
                };
            }
            return if w == 0 || w * 9 >= run.s6 * 4 {
                self.finish(run.dir, buf)
            } else {
                self.abort(buf)
            };
        }

        run.element += 1;
        if run.element < 6 {
            self.run = Some(run);
            return SymbolType::Partial;
        }
        run.element = 0;

        let Some((value, s)) = read_char(hist, run.dir < 0) else {
            return self.abort(buf);
        };
        if s * 4 < run.s6 * 3 || s * 3 > run.s6 * 4 {
            return self.abort(buf);
        }
        run.s6 = s;
        if value == START_STOP {
            run.tail = if run.dir > 0 { 2 } else { 1 };
            self.run = Some(run);
            return SymbolType::Partial;
        }
        if self.values.is_empty() && !buf.acquire(SymbolType::Code93) {
            self.run = None;
            return SymbolType::None;
        }
        if self.values.len() >= BUFFER_MAX {
            return self.abort(buf);
        }
        self.values.push(value);
        self.run = Some(run);
        SymbolType::Partial
    }

    fn reset(&mut self) {
        self.run = None;
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;
    use crate::decoder::test_util::{feed, feed_all};

    fn modules(values: &[u8]) -> Vec<u32> {
        let mut all = vec![START_STOP];
        all.extend_from_slice(values);
        let c = check_value(values, 20);
        all.push(c);
        let mut with_c = values.to_vec();
        with_c.push(c);
        all.push(check_value(&with_c, 15));
        all.push(START_STOP);
        let mut m: Vec<u32> = all
            .iter()
            .flat_map(|&v| elements(PATTERNS[v as usize]))
            .map(u32::from)
            .collect();
        m.push(1);
        m
    }

    fn values_of(text: &str) -> Vec<u8> {
        text.bytes()
            .map(|b| ALPHABET.iter().position(|&a| a == b).unwrap() as u8)
            .collect()
    }

    #[test]
    fn test_patterns_are_nine_modules() {
        for &p in &PATTERNS {
            let e = elements(p);
            assert_eq!(e.iter().map(|&x| x as u32).sum::<u32>(), 9, "{:09b}", p);
            assert!(e.iter().all(|&x| (1..=4).contains(&x)));
        }
    }

    #[test]
    fn test_edge_signatures_unique() {
        let table = signatures();
        for i in 0..48 {
            for j in i + 1..48 {
                assert_ne!(table.pairs[i], table.pairs[j], "{} {}", i, j);
            }
        }
    }

    #[test]
    fn test_decode_forward_and_reverse() {
        let m = modules(&values_of("TEST93"));
        let mut dcode = Decoder::new();
        assert_eq!(
            feed(&mut dcode, &m, 2),
            vec![(SymbolType::Code93, b"TEST93".to_vec())]
        );

        let rev: Vec<u32> = m.iter().rev().copied().collect();
        let mut dcode = Decoder::new();
        assert_eq!(
            feed(&mut dcode, &rev, 3),
            vec![(SymbolType::Code93, b"TEST93".to_vec())]
        );
        assert_eq!(dcode.direction(), -1);
    }

    #[test]
    fn test_stop_outranks_finder_line() {
        // the stop character and termination bar also read as 1:1:3:1:1
        let m = modules(&values_of("TEST93"));
        let mut dcode = Decoder::new();
        let all = feed_all(&mut dcode, &m, 2);
        let linear: Vec<_> = all.iter().filter(|(s, _)| *s != SymbolType::QrCode).collect();
        assert_eq!(linear, vec![&(SymbolType::Code93, b"TEST93".to_vec())]);
        assert!(all.iter().all(|(s, data)| *s != SymbolType::QrCode || data.is_empty()));

        let mut dcode = Decoder::new();
        dcode.set_config(SymbolType::QrCode, Config::Enable, 0).unwrap();
        assert_eq!(feed_all(&mut dcode, &m, 2), vec![(SymbolType::Code93, b"TEST93".to_vec())]);
    }

    #[test]
    fn test_bad_check_rejected() {
        let mut m = modules(&values_of("AB"));
        // swap the K check for another character
        let k_start = m.len() - 1 - 6 - 6;
        let other = elements(PATTERNS[5]).map(u32::from);
        m[k_start..k_start + 6].copy_from_slice(&other);
        let mut dcode = Decoder::new();
        assert!(feed(&mut dcode, &m, 2).is_empty());
    }

    #[test]
    fn test_shifted_lowercase() {
        // (+)A -> 'a'
        let m = modules(&[46, 10, 1]);
        let mut dcode = Decoder::new();
        assert_eq!(
            feed(&mut dcode, &m, 2),
            vec![(SymbolType::Code93, b"a1".to_vec())]
        );
    }
}
