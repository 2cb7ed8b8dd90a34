//! Code 128: six elements over eleven modules per character, three code
//! sets, a mod-103 check character and a two-module termination bar.

use super::{DecodeBuffer, Symbology, WidthHistory, decode_e};
use crate::decoder::BUFFER_MAX;
use crate::models::{Config, Modifier, SymbolType, SymbologyConfig};
use crate::scanner::Color;

/// Element widths per value, bar first. 103..=105 are the starts, 106 is the
/// stop without its termination bar.
const WIDTHS: [&[u8; 6]; 107] = [
    b"212222", b"222122", b"222221", b"121223", b"121322", b"131222", b"122213", b"122312",
    b"132212", b"221213", b"221312", b"231212", b"112232", b"122132", b"122231", b"113222",
    b"123122", b"123221", b"223211", b"221132", b"221231", b"213212", b"223112", b"312131",
    b"311222", b"321122", b"321221", b"312212", b"322112", b"322211", b"212123", b"212321",
    b"232121", b"111323", b"131123", b"131321", b"112313", b"132113", b"132311", b"211313",
    b"231113", b"231311", b"112133", b"112331", b"132131", b"113123", b"113321", b"133121",
    b"313121", b"211331", b"231131", b"213113", b"213311", b"213131", b"311123", b"311321",
    b"331121", b"312113", b"312311", b"332111", b"314111", b"221411", b"431111", b"111224",
    b"111422", b"121124", b"121421", b"141122", b"141221", b"112214", b"112412", b"122114",
    b"122411", b"142112", b"142211", b"241211", b"221114", b"413111", b"241112", b"134111",
    b"111242", b"121142", b"121241", b"114212", b"124112", b"124211", b"411212", b"421112",
    b"421211", b"212141", b"214121", b"412121", b"111143", b"111341", b"131141", b"114113",
    b"114311", b"411113", b"411311", b"113141", b"114131", b"311141", b"411131", b"211412",
    b"211214", b"211232", b"233111",];

const START_A: u8 = 103;
const START_C: u8 = 105;
const STOP: u8 = 106;

const FNC1: u8 = 102;
const SHIFT: u8 = 98;
const CODE_C: u8 = 99;

/// ASCII group separator emitted for a non-leading FNC1.
const GS: u8 = 0x1d;

fn read_char(hist: &WidthHistory, reverse: bool) -> Option<(u8, u32)> {
    let mut w = [0u32; 6];
    for (i, slot) in w.iter_mut().enumerate() {
        *slot = hist.width(5 - i as u8);
    }
    if reverse {
        w.reverse();
    }
    let s: u32 = w.iter().sum();
    if s < 11 {
        return None;
    }
    let mut key = [0u8; 4];
    for j in 0..4 {
        key[j] = decode_e(w[j] + w[j + 1], s, 11)? as u8 + 2;
    }
    WIDTHS
        .iter()
        .position(|p| {
            let e = p.map(|c| c - b'0');
            (0..4).all(|j| e[j] + e[j + 1] == key[j])
        })
        .map(|v| (v as u8, s))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodeSet {
    A,
    B,
    C,
}

/// Translate symbol values (start first, check excluded) into data bytes
/// and modifier bits.
fn expand(values: &[u8]) -> Option<(Vec<u8>, u32)> {
    let (&start, body) = values.split_first()?;
    let mut set = match start {
        START_A => CodeSet::A,
        104 => CodeSet::B,
        START_C => CodeSet::C,
        _ => return None,
    };
    let mut data = Vec::with_capacity(body.len() * 2);
    let mut modifiers = 0;
    let mut shift = false;
    let mut fnc4_latch = false;
    let mut fnc4_once = false;

    for (pos, &v) in body.iter().enumerate() {
        let cur = match (shift, set) {
            (true, CodeSet::A) => CodeSet::B,
            (true, CodeSet::B) => CodeSet::A,
            _ => set,
        };
        shift = false;

        if v == FNC1 {
            match pos {
                0 => modifiers |= Modifier::Gs1.bit(),
                1 => modifiers |= Modifier::Aim.bit(),
                _ => data.push(GS),
            }
            continue;
        }
        match cur {
            CodeSet::C => match v {
                0..=99 => {
                    data.push(b'0' + v / 10);
                    data.push(b'0' + v % 10);
                }
                100 => set = CodeSet::B,
                101 => set = CodeSet::A,
                _ => return None,
            },
            CodeSet::A | CodeSet::B => match v {
                0..=95 => {
                    let mut c = match cur {
                        CodeSet::A if v >= 64 => v - 64,
                        _ => v + 32,
                    };
                    if fnc4_latch != fnc4_once {
                        c |= 0x80;
                    }
                    fnc4_once = false;
                    data.push(c);
                }
                // FNC3, FNC2
                96 | 97 => {}
                SHIFT => shift = true,
                CODE_C => set = CodeSet::C,
                100 if cur == CodeSet::A => set = CodeSet::B,
                101 if cur == CodeSet::B => set = CodeSet::A,
                // FNC4; doubled it toggles the latch
                100 | 101 => {
                    if fnc4_once {
                        fnc4_latch = !fnc4_latch;
                        fnc4_once = false;
                    } else {
                        fnc4_once = true;
                    }
                }
                _ => return None,
            },
        }
    }
    Some((data, modifiers))
}

#[derive(Debug, Clone, Copy)]
struct Run {
    dir: i32,
    element: u8,
    s6: u32,
    tail: u8,
}

#[derive(Debug, Clone)]
pub(crate) struct Code128Decoder {
    run: Option<Run>,
    values: Vec<u8>,
    pub(crate) config: SymbologyConfig,
}

impl Default for Code128Decoder {
    fn default() -> Self {
        Self {
            run: None,
            values: Vec::new(),
            config: SymbologyConfig::with_flags(Config::Enable.bit()),
        }
    }
}

impl Code128Decoder {
    fn start(&mut self, hist: &WidthHistory) -> SymbolType {
        let reverse = hist.color() == Color::Bar;
        let Some((value, s)) = read_char(hist, reverse) else {
            return SymbolType::None;
        };
        let quiet = if reverse {
            // termination bar, then the quiet zone
            let term = hist.width(6);
            if value != STOP || term * 11 < s || term * 11 > s * 3 {
                return SymbolType::None;
            }
            hist.width(7)
        } else {
            if !(START_A..=START_C).contains(&value) {
                return SymbolType::None;
            }
            hist.width(6)
        };
        if quiet != 0 && quiet * 11 < s * 5 {
            return SymbolType::None;
        }
        self.values.clear();
        if !reverse {
            self.values.push(value);
        }
        self.run = Some(Run {
            dir: if reverse { -1 } else { 1 },
            element: 0,
            s6: s,
            tail: 0,
        });
        SymbolType::Partial
    }

    fn abort(&mut self, buf: &mut DecodeBuffer) -> SymbolType {
        buf.release_if_owner(SymbolType::Code128);
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
        // start, at least one data value, check
        if values.len() < 3 {
            return self.abort(buf);
        }
        let Some((&check, rest)) = values.split_last() else {
            return self.abort(buf);
        };
        let sum = rest
            .iter()
            .enumerate()
            .map(|(i, &v)| i.max(1) as u32 * v as u32)
            .sum::<u32>();
        if sum % 103 != check as u32 {
            return self.abort(buf);
        }
        let Some((data, modifiers)) = expand(rest) else {
            return self.abort(buf);
        };
        if !self.config.accepts_len(data.len()) || !buf.acquire(SymbolType::Code128) {
            return self.abort(buf);
        }
        if !buf.set_data(&data) {
            return self.abort(buf);
        }
        buf.modifiers = modifiers;
        buf.direction = dir;
        SymbolType::Code128
    }
}

impl Symbology for Code128Decoder {
    fn decode(&mut self, hist: &WidthHistory, buf: &mut DecodeBuffer) -> SymbolType {
        let Some(mut run) = self.run else {
            return self.start(hist);
        };

        if run.tail > 0 {
            run.tail -= 1;
            self.run = Some(run);
            let w = hist.width(0);
            if hist.color() == Color::Bar {
                // two-module termination bar
                return if w * 11 >= run.s6 && w * 11 <= run.s6 * 3 {
                    SymbolType::Partial
                } else {
                    self.abort(buf)
                };
            }
            return if w == 0 || w * 11 >= run.s6 * 5 {
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
        let end = if run.dir > 0 {
            value == STOP
        } else {
            (START_A..=START_C).contains(&value)
        };
        if !end && value >= START_A {
            return self.abort(buf);
        }
        let first_data = if run.dir > 0 {
            self.values.len() == 1
        } else {
            self.values.is_empty()
        };
        if first_data && !buf.acquire(SymbolType::Code128) {
            self.run = None;
            self.values.clear();
            return SymbolType::None;
        }
        if end {
            if run.dir < 0 {
                self.values.push(value);
            }
            run.tail = if run.dir > 0 { 2 } else { 1 };
            self.run = Some(run);
            return SymbolType::Partial;
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
pub(crate) mod tests {
    use super::*;
    use crate::decoder::Decoder;
    use crate::decoder::test_util::feed;

    /// Module widths for a value sequence starting with a start character;
    /// appends the check, stop and termination bar.
    pub(crate) fn code128_modules(values: &[u8]) -> Vec<u32> {
        let sum: u32 = values
            .iter()
            .enumerate()
            .map(|(i, &v)| i.max(1) as u32 * v as u32)
            .sum();
        let mut all = values.to_vec();
        all.push((sum % 103) as u8);
        all.push(STOP);
        let mut m: Vec<u32> = all
            .iter()
            .flat_map(|&v| WIDTHS[v as usize].map(|c| (c - b'0') as u32))
            .collect();
        m.push(2);
        m
    }

    fn set_b(text: &str) -> Vec<u8> {
        std::iter::once(104)
            .chain(text.bytes().map(|b| b - 32))
            .collect()
    }

    #[test]
    fn test_code_set_b_forward_and_reverse() {
        let m = code128_modules(&set_b("Hello-128"));
        let mut dcode = Decoder::new();
        assert_eq!(
            feed(&mut dcode, &m, 2),
            vec![(SymbolType::Code128, b"Hello-128".to_vec())]
        );
        let rev: Vec<u32> = m.iter().rev().copied().collect();
        let mut dcode = Decoder::new();
        assert_eq!(
            feed(&mut dcode, &rev, 2),
            vec![(SymbolType::Code128, b"Hello-128".to_vec())]
        );
        assert_eq!(dcode.direction(), -1);
    }

    #[test]
    fn test_code_set_c_with_gs1() {
        // FNC1 then "0112" in set C, then an embedded FNC1
        let m = code128_modules(&[START_C, FNC1, 1, 12, FNC1, 34]);
        let mut dcode = Decoder::new();
        assert_eq!(
            feed(&mut dcode, &m, 2),
            vec![(SymbolType::Code128, b"0112\x1d34".to_vec())]
        );
        assert_ne!(dcode.modifiers() & Modifier::Gs1.bit(), 0);
    }

    #[test]
    fn test_shift_and_code_switch() {
        // set A "A", shift to B "b", switch to C "99"
        let values = [START_A, 33, SHIFT, 66, CODE_C, 99];
        assert_eq!(expand(&values).unwrap().0, b"Ab99");
    }

    #[test]
    fn test_fnc4_extends_one_char() {
        let values = [104, 100, 33, 33];
        assert_eq!(expand(&values).unwrap().0, vec![b'A' | 0x80, b'A']);
    }

    #[test]
    fn test_bad_check_rejected() {
        let mut m = code128_modules(&set_b("AB"));
        // replace the check character with value 0
        let check = m.len() - 1 - 6 - 6;
        let zero = WIDTHS[0].map(|c| (c - b'0') as u32);
        m[check..check + 6].copy_from_slice(&zero);
        let mut dcode = Decoder::new();
        assert!(feed(&mut dcode, &m, 2).is_empty());
    }
}
