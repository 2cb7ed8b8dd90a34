//! EAN/UPC family: EAN-13, EAN-8, UPC-A, UPC-E, ISBN-10/13 and the EAN-2 and
//! EAN-5 add-ons.
//!
//! Several passes run in parallel, each started at a guard pattern and fed
//! one character (4 elements) at a time. Symbol halves are remembered across
//! scan lines so a left half read on one line can complete with a right half
//! read on another.

use super::{DecodeBuffer, Symbology, WidthHistory, decode_e};
use crate::models::{Config, SymbolType, SymbologyConfig};

/// Live passes kept at once; the oldest is dropped on overflow.
const MAX_PASSES: usize = 12;

/// `[t1 - 2][t2 - 2]` similar-edge lookup: digit for L codes, digit + 10 for
/// G codes. Pairs 1/7 and 2/8 share an entry and are split by bar widths.
const EDGE_TABLE: [[u8; 4]; 4] = [
    [6, 10, 4, 13],
    [19, 2, 11, 5],
    [9, 12, 1, 15],
    [16, 0, 14, 3],
];

/// Left-half parity (1 = G) selecting the leading EAN-13 digit.
const EAN13_PARITY: [u8; 10] = [
    0b000000, 0b001011, 0b001101, 0b001110, 0b010011, 0b011001, 0b011100, 0b010101, 0b010110,
    0b011010,
];

/// UPC-E parity (1 = G) for number system 0, indexed by check digit.
const UPCE_PARITY: [u8; 10] = [
    0b111000, 0b110100, 0b110010, 0b110001, 0b101100, 0b100110, 0b100011, 0b101010, 0b101001,
    0b100101,
];

/// EAN-5 parity (1 = G) indexed by the add-on checksum.
const EAN5_PARITY: [u8; 10] = [
    0b11000, 0b10100, 0b10010, 0b10001, 0b01100, 0b00110, 0b00011, 0b01010, 0b01001, 0b00101,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Digit {
    value: u8,
    g: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Started at an outer guard, reads both halves
    Outer,
    /// Started at a center guard, reads one half
    Center,
    /// Started at a reversed UPC-E guard
    UpceReverse,
    /// Started at an add-on guard
    Addon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    First,
    Center,
    Second,
    End,
    UpceEnd,
    AddonSep,
    AddonEnd,
}

#[derive(Debug, Clone)]
struct Pass {
    origin: Origin,
    stage: Stage,
    need: u8,
    first: Vec<Digit>,
    second: Vec<Digit>,
    half_len: usize,
    /// width of the last character, for consistency checks
    s: u32,
}

impl Pass {
    fn new(origin: Origin, stage: Stage, guard_s: u32, guard_n: u32) -> Self {
        Self {
            origin,
            stage,
            need: 4,
            first: Vec::with_capacity(6),
            second: Vec::new(),
            half_len: 0,
            s: guard_s * 7 / guard_n,
        }
    }
}

/// One decoded half: left halves keep their parity pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Half {
    digits: Vec<u8>,
    parity: u8,
}

#[derive(Debug, Clone)]
pub(crate) struct EanDecoder {
    passes: Vec<Pass>,
    left: Option<Half>,
    right: Option<Half>,
    enable: bool,
    pub(crate) ean13_config: SymbologyConfig,
    pub(crate) ean8_config: SymbologyConfig,
    pub(crate) upca_config: SymbologyConfig,
    pub(crate) upce_config: SymbologyConfig,
    pub(crate) isbn10_config: SymbologyConfig,
    pub(crate) isbn13_config: SymbologyConfig,
    pub(crate) ean2_config: SymbologyConfig,
    pub(crate) ean5_config: SymbologyConfig,
}

impl Default for EanDecoder {
    fn default() -> Self {
        let on = SymbologyConfig::with_flags(Config::Enable.bit() | Config::EmitCheck.bit());
        let off = SymbologyConfig::with_flags(Config::EmitCheck.bit());
        let mut ean = Self {
            passes: Vec::with_capacity(MAX_PASSES),
            left: None,
            right: None,
            enable: true,
            ean13_config: on,
            ean8_config: on,
            upca_config: off,
            upce_config: off,
            isbn10_config: off,
            isbn13_config: off,
            ean2_config: SymbologyConfig::default(),
            ean5_config: SymbologyConfig::default(),
        };
        ean.update_enable();
        ean
    }
}

/// Quantize `w` to whole units where `s` spans `n` units.
#[inline]
fn units(w: u32, s: u32, n: u32) -> u32 {
    if s == 0 {
        return 0;
    }
    (w as u64 * n as u64 * 2 / s as u64).div_ceil(2) as u32
}

/// Character widths must agree to within 1/8.
#[inline]
fn check_width(w0: u32, w1: u32) -> bool {
    let dw0 = w0;
    let (w0, w1) = (w0 * 8, w1 * 8);
    w0 - dw0 <= w1 && w1 <= w0 + dw0
}

/// Guard of `n` single-module elements ending at offset `offset`.
fn is_guard(hist: &WidthHistory, offset: u8, n: u8) -> Option<u32> {
    let s = hist.calc_s(offset, n);
    if s < n as u32 {
        return None;
    }
    (offset..offset + n)
        .all(|i| units(hist.width(i), s, n as u32) == 1)
        .then_some(s)
}

/// A quiet zone is a line boundary or at least four modules of space.
#[inline]
fn is_quiet(w: u32, module_s: u32, module_n: u32) -> bool {
    w == 0 || w as u64 * module_n as u64 >= 4 * module_s as u64
}

fn decode_char(hist: &WidthHistory) -> Option<(Digit, u32)> {
    let s = hist.calc_s(0, 4);
    if s < 7 {
        return None;
    }
    let (a, b, c, d) = (hist.width(3), hist.width(2), hist.width(1), hist.width(0));
    let t1 = decode_e(a + b, s, 7)?;
    let t2 = decode_e(b + c, s, 7)?;
    let code = EDGE_TABLE[t1 as usize][t2 as usize];
    let g = code >= 10;
    let mut value = code % 10;
    if value == 1 || value == 2 {
        // 1/7 and 2/8 share edge measures, split on the 2nd + 4th widths
        let bd = (b + d) as u64 * 14;
        let wide = if g {
            bd <= 6 * s as u64
        } else {
            bd >= 8 * s as u64
        };
        if wide {
            value += 6;
        }
    }
    Some((Digit { value, g }, s))
}

fn parity_bits(digits: &[Digit]) -> u8 {
    digits.iter().fold(0u8, |acc, d| (acc << 1) | d.g as u8)
}

fn to_half(digits: &[Digit], reverse: bool) -> Half {
    if reverse {
        let flipped: Vec<Digit> = digits
            .iter()
            .rev()
            .map(|d| Digit {
                value: d.value,
                g: !d.g,
            })
            .collect();
        Half {
            digits: flipped.iter().map(|d| d.value).collect(),
            parity: parity_bits(&flipped),
        }
    } else {
        Half {
            digits: digits.iter().map(|d| d.value).collect(),
            parity: parity_bits(digits),
        }
    }
}

fn ean_checksum_ok(digits: &[u8]) -> bool {
    // weights alternate 3,1 ending with 1 on the check digit
    let n = digits.len();
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, &d)| if (n - 1 - i) % 2 == 1 { 3 * d as u32 } else { d as u32 })
        .sum();
    sum % 10 == 0
}

fn upce_expand(ns: u8, d: &[u8], check: u8) -> Vec<u8> {
    let mut a = vec![ns];
    match d[5] {
        0..=2 => a.extend_from_slice(&[d[0], d[1], d[5], 0, 0, 0, 0, d[2], d[3], d[4]]),
        3 => a.extend_from_slice(&[d[0], d[1], d[2], 0, 0, 0, 0, 0, d[3], d[4]]),
        4 => a.extend_from_slice(&[d[0], d[1], d[2], d[3], 0, 0, 0, 0, 0, d[4]]),
        _ => a.extend_from_slice(&[d[0], d[1], d[2], d[3], d[4], 0, 0, 0, 0, d[5]]),
    }
    a.push(check);
    a
}

fn ascii(digits: &[u8]) -> Vec<u8> {
    digits.iter().map(|d| b'0' + d).collect()
}

/// Outcome of a pass reaching its final guard.
enum Completed {
    Full {
        left: Half,
        right: Half,
        dir: i32,
    },
    /// A single half; `pair` tries to complete it with the stored other half
    Half {
        half: Half,
        left: bool,
        pair: bool,
    },
    Upce {
        digits: Vec<u8>,
        parity: u8,
        dir: i32,
    },
    Addon(Vec<Digit>),
}

enum Step {
    Continue,
    Done(Completed),
    Dead,
}

impl EanDecoder {
    pub(crate) fn enabled(&self) -> bool {
        self.enable
    }

    pub(crate) fn update_enable(&mut self) {
        self.enable = [
            &self.ean13_config,
            &self.ean8_config,
            &self.upca_config,
            &self.upce_config,
            &self.isbn10_config,
            &self.isbn13_config,
            &self.ean2_config,
            &self.ean5_config,
        ]
        .iter()
        .any(|c| c.enabled());
    }

    pub(crate) fn config(&self, sym: SymbolType) -> Option<&SymbologyConfig> {
        Some(match sym {
            SymbolType::Ean13 => &self.ean13_config,
            SymbolType::Ean8 => &self.ean8_config,
            SymbolType::Upca => &self.upca_config,
            SymbolType::Upce => &self.upce_config,
            SymbolType::Isbn10 => &self.isbn10_config,
            SymbolType::Isbn13 => &self.isbn13_config,
            SymbolType::Ean2 => &self.ean2_config,
            SymbolType::Ean5 => &self.ean5_config,
            _ => return None,
        })
    }

    pub(crate) fn config_mut(&mut self, sym: SymbolType) -> Option<&mut SymbologyConfig> {
        Some(match sym {
            SymbolType::Ean13 => &mut self.ean13_config,
            SymbolType::Ean8 => &mut self.ean8_config,
            SymbolType::Upca => &mut self.upca_config,
            SymbolType::Upce => &mut self.upce_config,
            SymbolType::Isbn10 => &mut self.isbn10_config,
            SymbolType::Isbn13 => &mut self.isbn13_config,
            SymbolType::Ean2 => &mut self.ean2_config,
            SymbolType::Ean5 => &mut self.ean5_config,
            _ => return None,
        })
    }

    fn start(&mut self, pass: Pass) {
        if self.passes.len() >= MAX_PASSES {
            self.passes.remove(0);
        }
        self.passes.push(pass);
    }

    fn start_passes(&mut self, hist: &WidthHistory) {
        let bar = hist.color() == crate::scanner::Color::Bar;
        if bar {
            // quiet zone, then bar space bar
            if let Some(s) = is_guard(hist, 0, 3)
                && is_quiet(hist.width(3), s, 3)
            {
                self.start(Pass::new(Origin::Outer, Stage::First, s, 3));
            }
            // add-on guard: quiet, 1 1 2
            let s = hist.calc_s(0, 3);
            if s >= 4
                && units(hist.width(2), s, 4) == 1
                && units(hist.width(1), s, 4) == 1
                && units(hist.width(0), s, 4) == 2
                && is_quiet(hist.width(3), s, 4)
            {
                let mut pass = Pass::new(Origin::Addon, Stage::First, s, 4);
                pass.half_len = 5;
                self.start(pass);
            }
        } else {
            // center guard: space bar space bar space
            if let Some(s) = is_guard(hist, 0, 5) {
                let mut pass = Pass::new(Origin::Center, Stage::Second, s, 5);
                pass.half_len = 0;
                self.start(pass);
            }
            // reversed UPC-E: quiet, then six single modules
            if let Some(s) = is_guard(hist, 0, 6)
                && is_quiet(hist.width(6), s, 6)
            {
                self.start(Pass::new(Origin::UpceReverse, Stage::First, s, 6));
            }
        }
    }

    /// Advance one pass; returns forks to start and an optional completion.
    fn step(pass: &mut Pass, hist: &WidthHistory, forks: &mut Vec<Pass>) -> Step {
        pass.need -= 1;
        if pass.need > 0 {
            return Step::Continue;
        }
        match pass.stage {
            Stage::First | Stage::Second => {
                let Some((digit, s)) = decode_char(hist) else {
                    return Step::Dead;
                };
                let first_char = pass.first.is_empty() && pass.second.is_empty();
                let consistent = if first_char {
                    s * 2 >= pass.s && s <= pass.s * 2
                } else {
                    check_width(pass.s, s)
                };
                if !consistent {
                    return Step::Dead;
                }
                pass.s = s;
                pass.need = 4;
                if pass.stage == Stage::First {
                    pass.first.push(digit);
                    let n = pass.first.len();
                    match pass.origin {
                        Origin::Outer => {
                            if n == 4 {
                                let mut fork = pass.clone();
                                fork.stage = Stage::Center;
                                fork.need = 5;
                                fork.half_len = 4;
                                forks.push(fork);
                            } else if n == 6 {
                                let mut fork = pass.clone();
                                fork.stage = Stage::UpceEnd;
                                fork.need = 7;
                                fork.half_len = 6;
                                forks.push(fork);
                                pass.stage = Stage::Center;
                                pass.need = 5;
                                pass.half_len = 6;
                            }
                        }
                        Origin::UpceReverse => {
                            if n == 6 {
                                pass.stage = Stage::End;
                                pass.half_len = 6;
                            }
                        }
                        Origin::Addon => {
                            if n == 2 {
                                let mut fork = pass.clone();
                                fork.stage = Stage::AddonEnd;
                                fork.need = 1;
                                fork.half_len = 2;
                                forks.push(fork);
                            }
                            if n == pass.half_len {
                                pass.stage = Stage::AddonEnd;
                                pass.need = 1;
                            } else {
                                pass.stage = Stage::AddonSep;
                                pass.need = 2;
                            }
                        }
                        Origin::Center => return Step::Dead,
                    }
                } else {
                    pass.second.push(digit);
                    let n = pass.second.len();
                    if pass.origin == Origin::Center && pass.half_len == 0 {
                        if n == 4 {
                            let mut fork = pass.clone();
                            fork.stage = Stage::End;
                            fork.half_len = 4;
                            forks.push(fork);
                        } else if n == 6 {
                            pass.stage = Stage::End;
                            pass.half_len = 6;
                        }
                    } else if n == pass.half_len {
                        pass.stage = Stage::End;
                    }
                }
                Step::Continue
            }
            Stage::Center => {
                let Some(s) = is_guard(hist, 0, 5) else {
                    return Step::Dead;
                };
                if !(s * 7 * 2 >= pass.s * 5 && s * 7 <= pass.s * 5 * 2) {
                    return Step::Dead;
                }
                pass.stage = Stage::Second;
                pass.need = 4;
                // an all-G first half is a right half read backwards
                let all_g = pass.first.iter().all(|d| d.g);
                Step::Done(Completed::Half {
                    half: to_half(&pass.first, all_g),
                    left: !all_g,
                    pair: false,
                })
            }
            Stage::End => {
                let Some(s) = is_guard(hist, 1, 3) else {
                    return Step::Dead;
                };
                if !is_quiet(hist.width(0), s, 3) {
                    return Step::Dead;
                }
                let done = match pass.origin {
                    Origin::Outer => {
                        let reverse = pass.first.iter().all(|d| d.g);
                        let (left, right) = if reverse {
                            (to_half(&pass.second, true), to_half(&pass.first, true))
                        } else {
                            (to_half(&pass.first, false), to_half(&pass.second, false))
                        };
                        Completed::Full {
                            left,
                            right,
                            dir: if reverse { -1 } else { 1 },
                        }
                    }
                    Origin::Center => {
                        let forward = pass.second.iter().all(|d| !d.g);
                        Completed::Half {
                            half: to_half(&pass.second, !forward),
                            left: !forward,
                            pair: true,
                        }
                    }
                    Origin::UpceReverse => {
                        let half = to_half(&pass.first, true);
                        Completed::Upce {
                            digits: half.digits,
                            parity: half.parity,
                            dir: -1,
                        }
                    }
                    Origin::Addon => return Step::Dead,
                };
                pass.need = 0;
                Step::Done(done)
            }
            Stage::UpceEnd => {
                let Some(s) = is_guard(hist, 1, 6) else {
                    return Step::Dead;
                };
                if !is_quiet(hist.width(0), s, 6) {
                    return Step::Dead;
                }
                let half = to_half(&pass.first, false);
                pass.need = 0;
                Step::Done(Completed::Upce {
                    digits: half.digits,
                    parity: half.parity,
                    dir: 1,
                })
            }
            Stage::AddonSep => {
                let s = hist.calc_s(0, 2);
                if s == 0
                    || units(hist.width(1), s, 2) != 1
                    || units(hist.width(0), s, 2) != 1
                    || !(s * 7 * 2 >= pass.s * 2 && s * 7 <= pass.s * 2 * 2)
                {
                    return Step::Dead;
                }
                pass.stage = Stage::First;
                pass.need = 4;
                Step::Continue
            }
            Stage::AddonEnd => {
                if !is_quiet(hist.width(0), pass.s, 7) || pass.first.len() != pass.half_len {
                    return Step::Dead;
                }
                pass.need = 0;
                Step::Done(Completed::Addon(pass.first.clone()))
            }
        }
    }

    fn emit(
        &self,
        sym: SymbolType,
        digits: Vec<u8>,
        dir: i32,
        buf: &mut DecodeBuffer,
    ) -> SymbolType {
        let Some(cfg) = self.config(sym) else {
            return SymbolType::None;
        };
        if !cfg.enabled() {
            return SymbolType::None;
        }
        let mut data = ascii(&digits);
        if sym == SymbolType::Isbn10 {
            let sum: u32 = digits
                .iter()
                .take(9)
                .enumerate()
                .map(|(i, &d)| (10 - i as u32) * d as u32)
                .sum();
            let check = (11 - sum % 11) % 11;
            data.truncate(9);
            data.push(if check == 10 { b'X' } else { b'0' + check as u8 });
        }
        if !cfg.is_set(Config::EmitCheck) && !sym.is_addon() {
            data.pop();
        }
        if !buf.acquire(sym) {
            return SymbolType::Partial;
        }
        if !buf.set_data(&data) {
            buf.release(sym);
            return SymbolType::None;
        }
        buf.modifiers = 0;
        buf.direction = dir;
        sym
    }

    fn finish_full(&self, left: &Half, right: &Half, dir: i32, buf: &mut DecodeBuffer) -> SymbolType {
        if left.digits.len() != right.digits.len() || right.parity != 0 {
            return SymbolType::None;
        }
        match left.digits.len() {
            4 => {
                if left.parity != 0 {
                    return SymbolType::None;
                }
                let digits: Vec<u8> = left.digits.iter().chain(&right.digits).copied().collect();
                if !ean_checksum_ok(&digits) {
                    return SymbolType::None;
                }
                self.emit(SymbolType::Ean8, digits, dir, buf)
            }
            6 => {
                let Some(first) = EAN13_PARITY.iter().position(|&p| p == left.parity) else {
                    return SymbolType::None;
                };
                let mut digits = vec![first as u8];
                digits.extend(left.digits.iter().chain(&right.digits));
                if !ean_checksum_ok(&digits) {
                    return SymbolType::None;
                }
                self.finish_ean13(digits, dir, buf)
            }
            _ => SymbolType::None,
        }
    }

    fn finish_ean13(&self, digits: Vec<u8>, dir: i32, buf: &mut DecodeBuffer) -> SymbolType {
        if digits[0] == 0 && self.upca_config.enabled() {
            return self.emit(SymbolType::Upca, digits[1..].to_vec(), dir, buf);
        }
        if digits[0] == 9 && digits[1] == 7 {
            if digits[2] == 8 && self.isbn10_config.enabled() {
                return self.emit(SymbolType::Isbn10, digits[3..].to_vec(), dir, buf);
            }
            if (digits[2] == 8 || digits[2] == 9) && self.isbn13_config.enabled() {
                return self.emit(SymbolType::Isbn13, digits, dir, buf);
            }
        }
        self.emit(SymbolType::Ean13, digits, dir, buf)
    }

    fn finish_upce(&self, digits: &[u8], parity: u8, dir: i32, buf: &mut DecodeBuffer) -> SymbolType {
        let (ns, check) = if let Some(c) = UPCE_PARITY.iter().position(|&p| p == parity) {
            (0u8, c as u8)
        } else if let Some(c) = UPCE_PARITY.iter().position(|&p| p == !parity & 0x3f) {
            (1u8, c as u8)
        } else {
            return SymbolType::None;
        };
        let upca = upce_expand(ns, digits, check);
        if !ean_checksum_ok(&upca) {
            return SymbolType::None;
        }
        if self.upce_config.enabled() {
            let mut short = vec![ns];
            short.extend_from_slice(digits);
            short.push(check);
            return self.emit(SymbolType::Upce, short, dir, buf);
        }
        if self.upca_config.enabled() {
            return self.emit(SymbolType::Upca, upca, dir, buf);
        }
        let mut ean13 = vec![0u8];
        ean13.extend(upca);
        self.emit(SymbolType::Ean13, ean13, dir, buf)
    }

    fn finish_addon(&self, digits: &[Digit], buf: &mut DecodeBuffer) -> SymbolType {
        let values: Vec<u8> = digits.iter().map(|d| d.value).collect();
        let parity = parity_bits(digits);
        match values.len() {
            2 => {
                let v = values[0] as u32 * 10 + values[1] as u32;
                if (v % 4) as u8 != parity {
                    return SymbolType::None;
                }
                self.emit(SymbolType::Ean2, values, 1, buf)
            }
            5 => {
                let sum = 3 * (values[0] + values[2] + values[4]) as u32
                    + 9 * (values[1] + values[3]) as u32;
                if EAN5_PARITY[(sum % 10) as usize] != parity {
                    return SymbolType::None;
                }
                self.emit(SymbolType::Ean5, values, 1, buf)
            }
            _ => SymbolType::None,
        }
    }

    /// Act on a finished pass. Only the first completion of a width may
    /// write the buffer; later ones just record their halves.
    fn handle(&mut self, done: Completed, emit: bool, buf: &mut DecodeBuffer) -> SymbolType {
        match done {
            Completed::Full { left, right, dir } => {
                if !emit {
                    return SymbolType::None;
                }
                let sym = self.finish_full(&left, &right, dir, buf);
                if sym > SymbolType::Partial {
                    self.left = Some(left);
                    self.right = Some(right);
                }
                sym
            }
            Completed::Half { half, left, pair } => {
                if left {
                    self.left = Some(half);
                } else {
                    self.right = Some(half);
                }
                if !pair || !emit {
                    return SymbolType::None;
                }
                match (&self.left, &self.right) {
                    (Some(l), Some(r)) => {
                        let (l, r) = (l.clone(), r.clone());
                        self.finish_full(&l, &r, 0, buf)
                    }
                    _ => SymbolType::None,
                }
            }
            Completed::Upce { .. } | Completed::Addon(_) if !emit => SymbolType::None,
            Completed::Upce {
                digits,
                parity,
                dir,
            } => self.finish_upce(&digits, parity, dir, buf),
            Completed::Addon(digits) => self.finish_addon(&digits, buf),
        }
    }
}

impl Symbology for EanDecoder {
    fn decode(&mut self, hist: &WidthHistory, buf: &mut DecodeBuffer) -> SymbolType {
        let mut result = SymbolType::None;
        let mut forks = Vec::new();
        let mut done = Vec::new();

        self.passes.retain_mut(|pass| match Self::step(pass, hist, &mut forks) {
            Step::Done(c) => {
                done.push(c);
                pass.need > 0
            }
            Step::Continue => true,
            Step::Dead => false,
        });
        for fork in forks {
            self.start(fork);
        }
        for c in done {
            let sym = self.handle(c, result <= SymbolType::Partial, buf);
            if sym > result {
                result = sym;
            }
        }
        if result > SymbolType::Partial {
            self.passes.clear();
            return result;
        }

        self.start_passes(hist);
        if self.passes.is_empty() {
            result
        } else {
            result.max(SymbolType::Partial)
        }
    }

    fn reset(&mut self) {
        self.passes.clear();
        self.left = None;
        self.right = None;
    }

    fn new_scan(&mut self) {
        // halves survive so they can pair with the next line
        self.passes.clear();
    }
}
