//! GS1 DataBar (omnidirectional) and DataBar Expanded.
//!
//! Both variants are built from 15-module finder patterns flanked by
//! 8-element data characters. The decoder keeps its own log of the widths
//! seen on the current scan line, matches finders as widths arrive and
//! reads the characters around each one. DataBar halves survive across
//! scan lines until the matching half shows up; an Expanded symbol must be
//! crossed by a single line.

mod gs1;

use tracing::{debug, trace};

use super::{DecodeBuffer, Symbology, WidthHistory};
use crate::models::{Config, Modifier, SymbolType, SymbologyConfig};
use crate::scanner::Color;

/// Widths logged per scan line; the oldest half is dropped past this.
const LOG_MAX: usize = 1024;
/// DataBar halves kept while waiting for a partner.
const SEGMENTS_MAX: usize = 16;

/// Finder patterns in normal form, first three elements. The last two
/// elements are always one module.
const FINDERS_OMNI: [[u8; 3]; 9] = [
    [3, 8, 2],
    [3, 5, 5],
    [3, 3, 7],
    [3, 1, 9],
    [2, 7, 4],
    [2, 5, 6],
    [2, 3, 8],
    [1, 5, 7],
    [1, 3, 9],
];
const FINDERS_EXP: [[u8; 3]; 6] = [[1, 8, 4], [3, 6, 4], [3, 4, 6], [3, 2, 8], [2, 6, 5], [2, 2, 9]];

/// Expanded finder sequences by finder count, starting at two finders.
/// Entries are `2 * kind + 1` for the normal form and `2 * kind + 2` for
/// the reversed form.
const SEQUENCES: [&[u8]; 10] = [
    &[1, 2],
    &[1, 4, 3],
    &[1, 6, 3, 8],
    &[1, 10, 3, 8, 5],
    &[1, 10, 3, 8, 7, 12],
    &[1, 10, 3, 8, 9, 12, 11],
    &[1, 2, 3, 4, 5, 6, 7, 8],
    &[1, 2, 3, 4, 5, 6, 7, 10, 9],
    &[1, 2, 3, 4, 5, 6, 7, 10, 11, 12],
    &[1, 2, 3, 4, 5, 8, 7, 10, 9, 12, 11],
];

/// Value range of one character group.
#[derive(Debug)]
struct Group {
    odd_modules: u8,
    widest_odd: u8,
    widest_even: u8,
    t_odd: u32,
    t_even: u32,
    g_sum: u32,
}

const fn group(
    odd_modules: u8,
    widest_odd: u8,
    widest_even: u8,
    t_odd: u32,
    t_even: u32,
    g_sum: u32,
) -> Group {
    Group {
        odd_modules,
        widest_odd,
        widest_even,
        t_odd,
        t_even,
        g_sum,
    }
}

const OUTER_GROUPS: [Group; 5] = [
    group(12, 8, 1, 161, 1, 0),
    group(10, 6, 3, 80, 10, 161),
    group(8, 4, 5, 31, 34, 961),
    group(6, 3, 6, 10, 70, 2015),
    group(4, 1, 8, 1, 126, 2715),
];
const INNER_GROUPS: [Group; 4] = [
    group(5, 2, 7, 4, 84, 0),
    group(7, 4, 5, 20, 35, 336),
    group(9, 6, 3, 48, 10, 1036),
    group(11, 8, 1, 81, 1, 1516),
];
const EXP_GROUPS: [Group; 5] = [
    group(12, 7, 2, 87, 4, 0),
    group(10, 5, 4, 52, 20, 348),
    group(8, 4, 5, 30, 52, 1388),
    group(6, 3, 6, 10, 104, 2948),
    group(4, 1, 8, 1, 204, 3988),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharKind {
    /// Outer DataBar character, 16 modules
    Outer,
    /// Inner DataBar character, 15 modules
    Inner,
    /// Expanded character, 17 modules
    Expanded,
}

impl CharKind {
    fn modules(self) -> u32 {
        match self {
            CharKind::Outer => 16,
            CharKind::Inner => 15,
            CharKind::Expanded => 17,
        }
    }

    fn groups(self) -> &'static [Group] {
        match self {
            CharKind::Outer => &OUTER_GROUPS,
            CharKind::Inner => &INNER_GROUPS,
            CharKind::Expanded => &EXP_GROUPS,
        }
    }

    /// Whether the odd elements are the high-order part of the value, and
    /// whether they may go without a single narrow element.
    fn odd_major(self) -> bool {
        self != CharKind::Inner
    }

    fn odd_no_narrow(self) -> bool {
        self == CharKind::Outer
    }
}

fn combins(n: i32, r: i32) -> i32 {
    if n < 0 || r < 0 || r > n {
        return 0;
    }
    let r = r.min(n - r);
    let mut v: i64 = 1;
    for i in 0..r {
        v = v * (n - i) as i64 / (i + 1) as i64;
    }
    v as i32
}

/// Number of width combinations skipped by widening element `bar` of a
/// four-element set from `elm_width` to `elm_width + 1`.
fn skipped(n: i32, bar: i32, elm_width: i32, narrow_mask: u32, max_width: i32, no_narrow: bool) -> i32 {
    const ELEMENTS: i32 = 4;
    let mut sub = combins(n - elm_width - 1, ELEMENTS - bar - 2);
    if !no_narrow
        && narrow_mask == 0
        && n - elm_width - (ELEMENTS - bar - 1) >= ELEMENTS - bar - 1
    {
        sub -= combins(n - elm_width - (ELEMENTS - bar), ELEMENTS - bar - 2);
    }
    if ELEMENTS - bar - 1 > 1 {
        let mut less = 0;
        let mut mx = n - elm_width - (ELEMENTS - bar - 2);
        while mx > max_width {
            less += combins(n - elm_width - mx - 1, ELEMENTS - bar - 3);
            mx -= 1;
        }
        sub -= less * (ELEMENTS - 1 - bar);
    } else if n - elm_width > max_width {
        sub -= 1;
    }
    sub
}

/// Combinatorial value of four element widths.
fn rss_value(widths: &[u8; 4], max_width: u8, no_narrow: bool) -> u32 {
    let mut n: i32 = widths.iter().map(|&w| w as i32).sum();
    let mut val = 0;
    let mut narrow_mask = 0u32;
    for bar in 0..3 {
        let mut elm_width = 1;
        narrow_mask |= 1 << bar;
        while elm_width < widths[bar as usize] as i32 {
            val += skipped(n, bar, elm_width, narrow_mask, max_width as i32, no_narrow);
            elm_width += 1;
            narrow_mask &= !(1 << bar);
        }
        n -= elm_width;
    }
    val.max(0) as u32
}

/// Inverse of [`rss_value`]: the four widths over `n` modules for `val`.
fn rss_widths(mut val: i32, mut n: i32, max_width: u8, no_narrow: bool) -> [u8; 4] {
    let mut out = [0u8; 4];
    let mut narrow_mask = 0u32;
    for bar in 0..3 {
        let mut elm_width = 1;
        narrow_mask |= 1 << bar;
        loop {
            let sub = skipped(n, bar, elm_width, narrow_mask, max_width as i32, no_narrow);
            val -= sub;
            if val < 0 {
                val += sub;
                break;
            }
            elm_width += 1;
            narrow_mask &= !(1 << bar);
        }
        n -= elm_width;
        out[bar as usize] = elm_width as u8;
    }
    out[3] = n.max(0) as u8;
    out
}

/// Element widths (in read order, odd element first) of a character value.
fn char_widths(value: u32, kind: CharKind) -> Option<[u8; 8]> {
    let g = kind
        .groups()
        .iter()
        .find(|g| value >= g.g_sum && value < g.g_sum + g.t_odd * g.t_even)?;
    let v = value - g.g_sum;
    let (v_odd, v_even) = if kind.odd_major() {
        (v / g.t_even, v % g.t_even)
    } else {
        (v % g.t_odd, v / g.t_odd)
    };
    let odd_n = g.odd_modules as i32;
    let even_n = kind.modules() as i32 - odd_n;
    let odd = rss_widths(v_odd as i32, odd_n, g.widest_odd, kind.odd_no_narrow());
    let even = rss_widths(v_even as i32, even_n, g.widest_even, !kind.odd_no_narrow());
    let mut out = [0u8; 8];
    for i in 0..4 {
        out[2 * i] = odd[i];
        out[2 * i + 1] = even[i];
    }
    Some(out)
}

/// Round widths to `modules` total modules, nudging at most two elements.
fn quantize<const N: usize>(w: &[u32; N], modules: u32) -> Option<[u8; N]> {
    let s: u64 = w.iter().map(|&x| x as u64).sum();
    if s == 0 {
        return None;
    }
    let mut m = [0u8; N];
    // positive: element wider than its module count
    let mut err = [0i64; N];
    let mut total = 0u32;
    for i in 0..N {
        let scaled = w[i] as u64 * modules as u64;
        let q = ((scaled * 2 + s) / (2 * s)).clamp(1, modules as u64);
        m[i] = q as u8;
        err[i] = scaled as i64 - (q * s) as i64;
        total += q as u32;
    }
    for _ in 0..2 {
        if total == modules {
            break;
        }
        if total < modules {
            let i = (0..N).max_by_key(|&i| err[i])?;
            m[i] += 1;
            err[i] -= s as i64;
            total += 1;
        } else {
            let i = (0..N).filter(|&i| m[i] > 1).min_by_key(|&i| err[i])?;
            m[i] -= 1;
            err[i] += s as i64;
            total -= 1;
        }
    }
    (total == modules).then_some(m)
}

/// Decode one character from its widths in read order. Returns the value
/// and the module widths that feed the checksum.
fn decode_char(w: &[u32; 8], kind: CharKind, finder_width: u32) -> Option<(u32, [u8; 8])> {
    let s: u32 = w.iter().sum();
    let expect = finder_width * kind.modules();
    if s.abs_diff(expect / 15) * 4 > expect / 15 {
        return None;
    }
    let m = quantize(w, kind.modules())?;
    let odd = [m[0], m[2], m[4], m[6]];
    let even = [m[1], m[3], m[5], m[7]];
    let odd_sum: u8 = odd.iter().sum();
    let g = kind.groups().iter().find(|g| g.odd_modules == odd_sum)?;
    if odd.iter().any(|&x| x > g.widest_odd) || even.iter().any(|&x| x > g.widest_even) {
        return None;
    }
    let v_odd = rss_value(&odd, g.widest_odd, kind.odd_no_narrow());
    let v_even = rss_value(&even, g.widest_even, !kind.odd_no_narrow());
    if v_odd >= g.t_odd || v_even >= g.t_even {
        return None;
    }
    let value = g.g_sum
        + if kind.odd_major() {
            v_odd * g.t_even + v_even
        } else {
            v_even * g.t_odd + v_odd
        };
    // widths outside the encodable set can alias a valid value
    (char_widths(value, kind)? == m).then_some((value, m))
}

fn pow_mod(base: u32, exp: u32, modulus: u32) -> u32 {
    (0..exp).fold(1, |acc, _| acc * base % modulus)
}

/// Checksum contribution of a character at weight row `row`.
fn weighted(m: &[u8; 8], row: u32, modulus: u32) -> u32 {
    m.iter()
        .enumerate()
        .map(|(j, &x)| x as u32 * pow_mod(3, 8 * row + j as u32, modulus))
        .sum::<u32>()
        % modulus
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FinderSet {
    Omni,
    Expanded,
}

/// Finder pattern matched in the width log.
#[derive(Debug, Clone, Copy)]
struct Finder {
    /// log index of the first element
    pos: usize,
    set: FinderSet,
    value: u8,
    forward: bool,
    /// left half finder (DataBar) or even finder (Expanded)
    first: bool,
    width: u32,
}

fn match_finder(log: &[u32], pos: usize, omni: bool, exp: bool) -> Option<Finder> {
    let w: [u32; 5] = log.get(pos..pos + 5)?.try_into().ok()?;
    if w.contains(&0) {
        return None;
    }
    let m = quantize(&w, 15)?;
    let (normal, key) = if m[3] == 1 && m[4] == 1 {
        (true, [m[0], m[1], m[2]])
    } else if m[0] == 1 && m[1] == 1 {
        (false, [m[4], m[3], m[2]])
    } else {
        return None;
    };
    let (set, value) = if let Some(v) = FINDERS_OMNI.iter().position(|f| *f == key).filter(|_| omni) {
        (FinderSet::Omni, v)
    } else if let Some(v) = FINDERS_EXP.iter().position(|f| *f == key).filter(|_| exp) {
        (FinderSet::Expanded, v)
    } else {
        return None;
    };
    // the first element of a line is a space
    let space_first = pos % 2 == 0;
    Some(Finder {
        pos,
        set,
        value: value as u8,
        forward: normal == space_first,
        first: space_first,
        width: w.iter().sum(),
    })
}

/// One DataBar half, waiting for its partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    left: bool,
    finder: u8,
    outer: u32,
    inner: u32,
    checksum: u32,
    direction: i32,
}

impl Segment {
    fn pairs_with(&self, other: &Segment) -> bool {
        let (l, r) = if self.left { (self, other) } else { (other, self) };
        if l.left == r.left {
            return false;
        }
        let mut cs = (l.checksum + r.checksum) % 79;
        if cs >= 8 {
            cs += 1;
        }
        if cs >= 72 {
            cs += 1;
        }
        cs / 9 == l.finder as u32 && cs % 9 == r.finder as u32
    }

    fn register(&self) -> u64 {
        self.outer as u64 * 1597 + self.inner as u64
    }
}

/// Decode an Expanded symbol laid out in symbol order, quiet zones at both
/// ends, with `n` finders.
fn decode_expanded(sym: &[u32], n: usize, has_last: bool) -> Option<Vec<u8>> {
    if !(2..=11).contains(&n) {
        return None;
    }
    let total = if has_last { 2 * n } else { 2 * n - 1 };
    if total < 4 {
        return None;
    }
    let seq = SEQUENCES[n - 2];

    let mut finders = Vec::with_capacity(n);
    for k in 0..n {
        let mut w: [u32; 5] = sym.get(21 * k + 10..21 * k + 15)?.try_into().ok()?;
        if k % 2 == 1 {
            w.reverse();
        }
        let m = quantize(&w, 15)?;
        if m[3] != 1 || m[4] != 1 {
            return None;
        }
        let kind = FINDERS_EXP.iter().position(|f| *f == [m[0], m[1], m[2]])?;
        let canonical = 2 * kind + k % 2;
        if seq[k] as usize != canonical + 1 {
            return None;
        }
        finders.push((canonical as u32, w.iter().sum::<u32>()));
    }

    let block = |start: usize, reversed: bool| -> Option<[u32; 8]> {
        let mut w: [u32; 8] = sym.get(start..start + 8)?.try_into().ok()?;
        if reversed {
            w.reverse();
        }
        Some(w)
    };

    let (check, _) = decode_char(&block(2, false)?, CharKind::Expanded, finders[0].1)?;
    let mut values = Vec::with_capacity(total - 1);
    let mut sum = 0;
    for i in 0..total - 1 {
        let (k, start, reversed) = if i % 2 == 0 {
            (i / 2, 21 * (i / 2) + 15, true)
        } else {
            ((i + 1) / 2, 21 * ((i + 1) / 2) + 2, false)
        };
        let (t, fw) = finders[k];
        let (value, m) = decode_char(&block(start, reversed)?, CharKind::Expanded, fw)?;
        if value >= 4096 {
            return None;
        }
        let row = if i % 2 == 0 { 2 * t } else { 2 * t - 1 };
        sum = (sum + weighted(&m, row, 211)) % 211;
        values.push(value);
    }
    if check != 211 * (total as u32 - 4) + sum {
        trace!(check, sum, "expanded checksum mismatch");
        return None;
    }

    let bits: Vec<bool> = values
        .iter()
        .flat_map(|&v| (0..12).rev().map(move |b| (v >> b) & 1 == 1))
        .collect();
    gs1::decode_field(&bits)
}

#[derive(Debug, Clone)]
pub(crate) struct DataBarDecoder {
    log: Vec<u32>,
    finders: Vec<Finder>,
    segments: Vec<Segment>,
    pub(crate) config: SymbologyConfig,
    pub(crate) config_exp: SymbologyConfig,
}

impl Default for DataBarDecoder {
    fn default() -> Self {
        Self {
            log: Vec::with_capacity(64),
            finders: Vec::new(),
            segments: Vec::new(),
            config: SymbologyConfig::with_flags(Config::Enable.bit() | Config::EmitCheck.bit()),
            config_exp: SymbologyConfig::with_flags(Config::Enable.bit()),
        }
    }
}

impl DataBarDecoder {
    /// True when either variant is enabled.
    pub(crate) fn enabled(&self) -> bool {
        self.config.enabled() || self.config_exp.enabled()
    }

    fn finder_at(&self, pos: usize) -> Option<&Finder> {
        self.finders
            .binary_search_by_key(&pos, |f| f.pos)
            .ok()
            .map(|i| &self.finders[i])
    }

    fn block(&self, start: usize, reversed: bool) -> Option<[u32; 8]> {
        let mut w: [u32; 8] = self.log.get(start..start + 8)?.try_into().ok()?;
        if reversed {
            w.reverse();
        }
        Some(w)
    }

    fn is_quiet(w: u32, finder_width: u32) -> bool {
        w == 0 || w * 15 >= finder_width * 4
    }

    fn is_narrow(w: u32, finder_width: u32) -> bool {
        w > 0 && w * 15 <= finder_width * 2
    }

    /// Read the two characters around a DataBar finder.
    fn segment(&self, f: &Finder) -> Option<Segment> {
        let start = f.pos.checked_sub(8)?;
        let (before, after) = if f.forward {
            (self.block(start, false)?, self.block(f.pos + 5, true)?)
        } else {
            (self.block(f.pos + 5, true)?, self.block(start, false)?)
        };
        let (outer_w, inner_w, rows) = if f.first {
            (before, after, (0, 1))
        } else {
            (after, before, (2, 3))
        };
        let (outer, om) = decode_char(&outer_w, CharKind::Outer, f.width)?;
        let (inner, im) = decode_char(&inner_w, CharKind::Inner, f.width)?;
        Some(Segment {
            left: f.first,
            finder: f.value,
            outer,
            inner,
            checksum: (weighted(&om, rows.0, 79) + weighted(&im, rows.1, 79)) % 79,
            direction: if f.forward { 1 } else { -1 },
        })
    }

    /// Pair a new half with a stored one, or store it.
    fn pair(&mut self, seg: Segment, buf: &mut DecodeBuffer) -> SymbolType {
        let Some(i) = self.segments.iter().position(|s| s.pairs_with(&seg)) else {
            if !self.segments.contains(&seg) {
                if self.segments.len() >= SEGMENTS_MAX {
                    self.segments.remove(0);
                }
                self.segments.push(seg);
            }
            return SymbolType::Partial;
        };
        let other = self.segments[i];
        let (l, r) = if seg.left { (seg, other) } else { (other, seg) };
        let accum = l.register() * 4537077 + r.register();
        if accum >= 10_000_000_000_000 {
            return SymbolType::Partial;
        }
        let mut data = b"01".to_vec();
        data.extend_from_slice(format!("{:013}", accum).as_bytes());
        let check = gs1::gtin_check(&data[2..]);
        if self.config.is_set(Config::EmitCheck) {
            data.push(check);
        }
        if !self.config.accepts_len(data.len()) || !buf.acquire(SymbolType::DataBar) {
            return SymbolType::Partial;
        }
        if !buf.set_data(&data) {
            buf.release_if_owner(SymbolType::DataBar);
            return SymbolType::Partial;
        }
        self.segments.remove(i);
        buf.modifiers = Modifier::Gs1.bit();
        buf.direction = seg.direction;
        debug!(direction = seg.direction, "databar halves paired");
        SymbolType::DataBar
    }

    /// Try an Expanded symbol ending at the quiet zone at log index `q`.
    fn expanded(&self, q: usize) -> Option<(Vec<u8>, i32)> {
        // forward: the last finder sits a fixed tail before the quiet zone
        for has_last in [true, false] {
            for x2 in [false, true] {
                let tail = 6 + 8 * has_last as usize + x2 as usize;
                let Some(p) = q.checked_sub(tail) else {
                    continue;
                };
                let Some(last) = self.finder_at(p) else {
                    continue;
                };
                if last.set != FinderSet::Expanded || !last.forward || last.first == x2 {
                    continue;
                }
                if !Self::is_quiet(self.log[q], last.width)
                    || !Self::is_narrow(self.log[q - 1], last.width)
                {
                    continue;
                }
                let mut n = 1;
                while let Some(f) = p.checked_sub(21 * n).and_then(|pos| self.finder_at(pos)) {
                    if f.set != FinderSet::Expanded || !f.forward {
                        break;
                    }
                    n += 1;
                }
                let Some(start) = p.checked_sub(21 * (n - 1) + 10) else {
                    continue;
                };
                if !Self::is_quiet(self.log[start], last.width) {
                    continue;
                }
                if let Some(data) = decode_expanded(&self.log[start..=q], n, has_last) {
                    return Some((data, 1));
                }
            }
        }

        // reverse: finder 0 sits 14 elements before the quiet zone
        let p0 = q.checked_sub(14)?;
        let first = self.finder_at(p0)?;
        if first.set != FinderSet::Expanded || first.forward || !first.first {
            return None;
        }
        if !Self::is_quiet(self.log[q], first.width) {
            return None;
        }
        let mut n = 1;
        while let Some(f) = p0.checked_sub(21 * n).and_then(|pos| self.finder_at(pos)) {
            if f.set != FinderSet::Expanded || f.forward {
                break;
            }
            n += 1;
        }
        for has_last in [true, false] {
            let len = 21 * (n - 1) + 17 + 8 * has_last as usize + (n - 1) % 2;
            if len > q + 1 || !Self::is_quiet(self.log[q + 1 - len], first.width) {
                continue;
            }
            let sym: Vec<u32> = self.log[q + 1 - len..=q].iter().rev().copied().collect();
            if let Some(data) = decode_expanded(&sym, n, has_last) {
                return Some((data, -1));
            }
        }
        None
    }

    fn emit_expanded(&mut self, data: Vec<u8>, dir: i32, buf: &mut DecodeBuffer) -> SymbolType {
        if !self.config_exp.accepts_len(data.len()) || !buf.acquire(SymbolType::DataBarExp) {
            return SymbolType::None;
        }
        if !buf.set_data(&data) {
            buf.release_if_owner(SymbolType::DataBarExp);
            return SymbolType::None;
        }
        buf.modifiers = Modifier::Gs1.bit();
        buf.direction = dir;
        debug!(len = data.len(), direction = dir, "databar expanded decoded");
        SymbolType::DataBarExp
    }

    fn trim_log(&mut self) {
        if self.log.len() < LOG_MAX {
            return;
        }
        // drop an even count so element colors keep their parity
        let drop = LOG_MAX / 2;
        self.log.drain(..drop);
        self.finders.retain(|f| f.pos >= drop);
        for f in &mut self.finders {
            f.pos -= drop;
        }
    }
}

impl Symbology for DataBarDecoder {
    fn decode(&mut self, hist: &WidthHistory, buf: &mut DecodeBuffer) -> SymbolType {
        self.trim_log();
        self.log.push(hist.width(0));
        let n = self.log.len();
        let omni = self.config.enabled();
        let exp = self.config_exp.enabled();

        let mut result = SymbolType::None;
        if n >= 5
            && let Some(f) = match_finder(&self.log, n - 5, omni, exp)
        {
            trace!(pos = f.pos, value = f.value, set = ?f.set, forward = f.forward, "databar finder");
            self.finders.push(f);
            result = SymbolType::Partial;
        }

        // a DataBar half is complete eight elements past its finder
        if omni
            && n >= 13
            && let Some(f) = self.finder_at(n - 13).copied()
            && f.set == FinderSet::Omni
            && let Some(seg) = self.segment(&f)
        {
            trace!(left = seg.left, outer = seg.outer, inner = seg.inner, "databar half");
            let sym = self.pair(seg, buf);
            if sym > SymbolType::Partial {
                return sym;
            }
            result = SymbolType::Partial;
        }

        if exp
            && hist.color() == Color::Space
            && let Some((data, dir)) = self.expanded(n - 1)
        {
            let sym = self.emit_expanded(data, dir, buf);
            if sym > SymbolType::Partial {
                return sym;
            }
        }
        result
    }

    fn reset(&mut self) {
        self.log.clear();
        self.finders.clear();
        self.segments.clear();
    }

    fn new_scan(&mut self) {
        // halves carry over to the next line
        self.log.clear();
        self.finders.clear();
    }
}
