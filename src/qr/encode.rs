//! QR code synthesis: segments to a module matrix, and modules to pixels.
//!
//! Shares the layout tables with the reader, so a rendered symbol exercises
//! exactly the positions the reader samples.

use thiserror::Error;

use super::bch::{format_encode, version_encode};
use super::data::{
    ALPHANUMERIC_CHARS, MODE_ALPHANUMERIC, MODE_BYTE, MODE_ECI, MODE_FNC1_FIRST, MODE_FNC1_SECOND, MODE_NUMERIC,
    MODE_STRUCTURED_APPEND, char_count_bits,
};
use super::grid::{FunctionMask, data_module_order, format_position, version_position};
use super::rs::{Gf256, QR_PPOLY, rs_compute_genpoly, rs_encode};
use super::tables::{alignment_positions, dimension, ec_block_info, total_codewords};
use crate::models::{BitMatrix, ECLevel, MaskPattern};

/// Why a symbol could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Version outside 1 to 40.
    #[error("invalid version {0}")]
    InvalidVersion(u8),
    /// Character not representable in the chosen mode.
    #[error("character {0:?} not allowed in this mode")]
    InvalidCharacter(char),
    /// Segments exceed the data capacity of the version and level.
    #[error("data needs {needed} bits, capacity is {capacity}")]
    DataTooLong {
        /// Bits required
        needed: usize,
        /// Bits available
        capacity: usize,
    },
}

/// A piece of data to encode, in the mode it is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Decimal digits
    Numeric(&'a str),
    /// Upper case letters, digits and ` $%*+-./:`
    Alphanumeric(&'a str),
    /// Raw bytes
    Bytes(&'a [u8]),
    /// Extended channel interpretation designator
    Eci(u32),
    /// Marks GS1 data
    Fnc1First,
    /// Marks data under an AIM application indicator
    Fnc1Second(u8),
    /// Part `index` of a `size` part sequence with a shared parity byte
    StructuredAppend {
        /// Zero-based position in the sequence
        index: u8,
        /// Number of parts, 1 to 16
        size: u8,
        /// Parity shared by every part
        parity: u8,
    },
}

#[derive(Default)]
struct BitBuffer {
    bits: Vec<bool>,
}

impl BitBuffer {
    fn push(&mut self, value: u32, n: usize) {
        for i in (0..n).rev() {
            self.bits.push((value >> i) & 1 != 0);
        }
    }

    fn push_count(&mut self, mode: u32, count: usize, version: u8) -> Result<(), EncodeError> {
        let n = char_count_bits(mode, version);
        if count >= 1 << n {
            return Err(EncodeError::DataTooLong {
                needed: count,
                capacity: (1 << n) - 1,
            });
        }
        self.push(mode, 4);
        self.push(count as u32, n);
        Ok(())
    }
}

fn segment_bits(segments: &[Segment], version: u8) -> Result<BitBuffer, EncodeError> {
    let mut buf = BitBuffer::default();
    for seg in segments {
        match *seg {
            Segment::Numeric(s) => {
                if let Some(c) = s.chars().find(|c| !c.is_ascii_digit()) {
                    return Err(EncodeError::InvalidCharacter(c));
                }
                buf.push_count(MODE_NUMERIC, s.len(), version)?;
                for chunk in s.as_bytes().chunks(3) {
                    let value = chunk.iter().fold(0, |acc, &d| acc * 10 + (d - b'0') as u32);
                    buf.push(value, chunk.len() * 3 + 1);
                }
            }
            Segment::Alphanumeric(s) => {
                let mut values = Vec::with_capacity(s.len());
                for c in s.chars() {
                    let v = ALPHANUMERIC_CHARS
                        .iter()
                        .position(|&a| a as char == c)
                        .ok_or(EncodeError::InvalidCharacter(c))?;
                    values.push(v as u32);
                }
                buf.push_count(MODE_ALPHANUMERIC, values.len(), version)?;
                for pair in values.chunks(2) {
                    match *pair {
                        [a, b] => buf.push(a * 45 + b, 11),
                        [a] => buf.push(a, 6),
                        _ => {}
                    }
                }
            }
            Segment::Bytes(bytes) => {
                buf.push_count(MODE_BYTE, bytes.len(), version)?;
                for &b in bytes {
                    buf.push(b as u32, 8);
                }
            }
            Segment::Eci(value) => {
                buf.push(MODE_ECI, 4);
                match value {
                    0..=0x7F => buf.push(value, 8),
                    0x80..=0x3FFF => buf.push(0x8000 | value, 16),
                    _ => buf.push(0xC0_0000 | (value & 0x1F_FFFF), 24),
                }
            }
            Segment::Fnc1First => buf.push(MODE_FNC1_FIRST, 4),
            Segment::Fnc1Second(ai) => {
                buf.push(MODE_FNC1_SECOND, 4);
                buf.push(ai as u32, 8);
            }
            Segment::StructuredAppend { index, size, parity } => {
                buf.push(MODE_STRUCTURED_APPEND, 4);
                buf.push(index as u32 & 0xF, 4);
                buf.push(size.saturating_sub(1) as u32 & 0xF, 4);
                buf.push(parity as u32, 8);
            }
        }
    }
    Ok(buf)
}

/// Data and parity codewords in transmission order.
fn build_codewords(segments: &[Segment], version: u8, level: ECLevel) -> Result<Vec<u8>, EncodeError> {
    let info = ec_block_info(version, level).ok_or(EncodeError::InvalidVersion(version))?;
    let total = total_codewords(version);
    let data_len = total - info.num_blocks * info.ecc_per_block;
    let capacity = data_len * 8;

    let mut buf = segment_bits(segments, version)?;
    if buf.bits.len() > capacity {
        return Err(EncodeError::DataTooLong {
            needed: buf.bits.len(),
            capacity,
        });
    }
    let terminator = (capacity - buf.bits.len()).min(4);
    buf.push(0, terminator);
    let pad = (8 - buf.bits.len() % 8) % 8;
    buf.push(0, pad);
    let mut data: Vec<u8> = buf
        .bits
        .chunks(8)
        .map(|c| c.iter().fold(0u8, |acc, &b| (acc << 1) | b as u8))
        .collect();
    for pad in [0xEC, 0x11].into_iter().cycle() {
        if data.len() >= data_len {
            break;
        }
        data.push(pad);
    }

    let gf = Gf256::new(QR_PPOLY);
    let genpoly = rs_compute_genpoly(&gf, 0, info.ecc_per_block);
    let num_short = info.num_blocks - data_len % info.num_blocks;
    let short_len = data_len / info.num_blocks;
    let mut blocks = Vec::with_capacity(info.num_blocks);
    let mut offset = 0;
    for b in 0..info.num_blocks {
        let len = if b < num_short { short_len } else { short_len + 1 };
        let mut block = data[offset..offset + len].to_vec();
        block.resize(len + info.ecc_per_block, 0);
        rs_encode(&gf, &mut block, &genpoly);
        blocks.push((len, block));
        offset += len;
    }

    let mut out = Vec::with_capacity(total);
    for i in 0..=short_len {
        for (len, block) in &blocks {
            if i < *len {
                out.push(block[i]);
            }
        }
    }
    for i in 0..info.ecc_per_block {
        for (len, block) in &blocks {
            out.push(block[len + i]);
        }
    }
    Ok(out)
}

fn draw_function_patterns(m: &mut BitMatrix, version: u8) {
    let size = m.width();
    for (ox, oy) in [(0, 0), (size - 7, 0), (0, size - 7)] {
        for dy in 0..7 {
            for dx in 0..7 {
                let ring = dx == 0 || dx == 6 || dy == 0 || dy == 6;
                let core = (2..=4).contains(&dx) && (2..=4).contains(&dy);
                m.set(ox + dx, oy + dy, ring || core);
            }
        }
    }
    for i in 8..size - 8 {
        m.set(i, 6, i % 2 == 0);
        m.set(6, i, i % 2 == 0);
    }
    let align = alignment_positions(version);
    for &cx in &align {
        for &cy in &align {
            if (cx <= 8 && cy <= 8) || (cx >= size - 9 && cy <= 8) || (cx <= 8 && cy >= size - 9) {
                continue;
            }
            for y in cy - 2..=cy + 2 {
                for x in cx - 2..=cx + 2 {
                    let d = x.abs_diff(cx).max(y.abs_diff(cy));
                    m.set(x, y, d != 1);
                }
            }
        }
    }
    m.set(8, size - 8, true);
    if version >= 7 {
        let bits = version_encode(version);
        for copy in 0..2 {
            for bit in 0..18 {
                let (x, y) = version_position(bit, copy, size);
                m.set(x, y, (bits >> bit) & 1 != 0);
            }
        }
    }
}

fn draw_format(m: &mut BitMatrix, level: ECLevel, mask: MaskPattern) {
    let size = m.width();
    let bits = format_encode((level.format_bits() << 3) | mask as u8);
    for copy in 0..2 {
        for bit in 0..15 {
            let (x, y) = format_position(bit, copy, size);
            m.set(x, y, (bits >> bit) & 1 != 0);
        }
    }
}

fn draw_data(m: &mut BitMatrix, version: u8, codewords: &[u8], mask: MaskPattern) {
    let func = FunctionMask::new(version);
    for (k, (x, y)) in data_module_order(&func).into_iter().enumerate() {
        let bit = codewords.get(k >> 3).is_some_and(|&c| c & (0x80 >> (k & 7)) != 0);
        m.set(x, y, bit ^ mask.is_masked(y, x));
    }
}

/// Usual readability penalty: long runs, 2x2 blocks, finder look-alikes
/// and dark/light imbalance.
fn penalty(m: &BitMatrix) -> u32 {
    let size = m.width();
    let mut score = 0;
    let finder_like = [true, false, true, true, true, false, true];
    for transpose in [false, true] {
        let get = |a: usize, b: usize| if transpose { m.get(b, a) } else { m.get(a, b) };
        for line in 0..size {
            let mut run = 1;
            for i in 1..size {
                if get(i, line) == get(i - 1, line) {
                    run += 1;
                    if run == 5 {
                        score += 3;
                    } else if run > 5 {
                        score += 1;
                    }
                } else {
                    run = 1;
                }
            }
            for start in 0..size.saturating_sub(10) {
                let core = (0..7).all(|k| get(start + k, line) == finder_like[k]);
                let light_after = (7..11).all(|k| !get(start + k, line));
                let core_late = (0..7).all(|k| get(start + 4 + k, line) == finder_like[k]);
                let light_before = (0..4).all(|k| !get(start + k, line));
                if core && light_after {
                    score += 40;
                }
                if core_late && light_before {
                    score += 40;
                }
            }
        }
    }
    for y in 0..size - 1 {
        for x in 0..size - 1 {
            let c = m.get(x, y);
            if c == m.get(x + 1, y) && c == m.get(x, y + 1) && c == m.get(x + 1, y + 1) {
                score += 3;
            }
        }
    }
    let total = size * size;
    let dark = m.count_ones();
    let k = (dark * 20).abs_diff(total * 10).div_ceil(total).saturating_sub(1);
    score + 10 * k as u32
}

/// Build the module matrix (true = dark) of a symbol holding `segments`.
/// Without an explicit `mask` the one with the lowest penalty is used.
pub fn encode_segments(
    segments: &[Segment],
    version: u8,
    level: ECLevel,
    mask: Option<MaskPattern>,
) -> Result<BitMatrix, EncodeError> {
    if !(1..=40).contains(&version) {
        return Err(EncodeError::InvalidVersion(version));
    }
    let codewords = build_codewords(segments, version, level)?;
    let size = dimension(version);
    let build = |mask: MaskPattern| {
        let mut m = BitMatrix::new(size, size);
        draw_function_patterns(&mut m, version);
        draw_data(&mut m, version, &codewords, mask);
        draw_format(&mut m, level, mask);
        m
    };
    Ok(match mask {
        Some(mask) => build(mask),
        None => (0..8)
            .map(|b| build(MaskPattern::from_bits(b)))
            .min_by_key(penalty)
            .unwrap_or_else(|| build(MaskPattern::Pattern0)),
    })
}

/// Encode bytes in the smallest version that holds them at `level`.
pub fn encode(data: &[u8], level: ECLevel) -> Result<BitMatrix, EncodeError> {
    let segments = [Segment::Bytes(data)];
    let mut last = EncodeError::InvalidVersion(0);
    for version in 1..=40 {
        match encode_segments(&segments, version, level, None) {
            Ok(m) => return Ok(m),
            Err(e @ EncodeError::DataTooLong { .. }) => last = e,
            Err(e) => return Err(e),
        }
    }
    Err(last)
}

/// Render modules as 8-bit gray pixels, `scale` pixels per module, with a
/// light border of `quiet` modules. Returns the pixels, width and height.
pub fn render(modules: &BitMatrix, scale: usize, quiet: usize) -> (Vec<u8>, usize, usize) {
    let scale = scale.max(1);
    let width = (modules.width() + 2 * quiet) * scale;
    let height = (modules.height() + 2 * quiet) * scale;
    let mut pixels = vec![255u8; width * height];
    for y in 0..modules.height() {
        for x in 0..modules.width() {
            if !modules.get(x, y) {
                continue;
            }
            for py in (y + quiet) * scale..(y + quiet + 1) * scale {
                let row = py * width;
                pixels[row + (x + quiet) * scale..row + (x + quiet + 1) * scale].fill(0);
            }
        }
    }
    (pixels, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qr::data::{correct_blocks, parse_entries, Entry};
    use crate::qr::grid::read_codewords;

    fn decode_modules(m: &BitMatrix, version: u8) -> Vec<Entry> {
        let size = m.width();
        let mut format = 0u32;
        for bit in 0..15 {
            let (x, y) = format_position(bit, 0, size);
            if m.get(x, y) {
                format |= 1 << bit;
            }
        }
        let (data, _) = crate::qr::bch::format_correct(format).unwrap();
        let level = ECLevel::from_format_bits(data >> 3);
        let codewords = read_codewords(m, version, MaskPattern::from_bits(data & 7));
        let gf = Gf256::new(QR_PPOLY);
        let (bytes, _) = correct_blocks(&gf, &codewords, version, level).unwrap();
        parse_entries(&bytes, version).unwrap()
    }

    #[test]
    fn test_module_round_trip() {
        let segments = [
            Segment::Alphanumeric("HELLO WORLD"),
            Segment::Numeric("0123456789"),
            Segment::Bytes(b"bytes"),
        ];
        let m = encode_segments(&segments, 2, ECLevel::M, Some(MaskPattern::Pattern3)).unwrap();
        assert_eq!(m.width(), 25);
        assert_eq!(
            decode_modules(&m, 2),
            vec![
                Entry::Alphanumeric(b"HELLO WORLD".to_vec()),
                Entry::Numeric(b"0123456789".to_vec()),
                Entry::Bytes(b"bytes".to_vec()),
            ]
        );
    }

    #[test]
    fn test_large_version_with_version_field() {
        let text = vec![b'x'; 300];
        let m = encode_segments(&[Segment::Bytes(&text)], 12, ECLevel::L, None).unwrap();
        let size = m.width();
        let mut bits = 0u32;
        for bit in 0..18 {
            let (x, y) = version_position(bit, 1, size);
            if m.get(x, y) {
                bits |= 1 << bit;
            }
        }
        assert_eq!(crate::qr::bch::version_correct(bits), Some((12, 0)));
        assert_eq!(decode_modules(&m, 12), vec![Entry::Bytes(text)]);
    }

    #[test]
    fn test_finder_and_timing_layout() {
        let m = encode(b"layout", ECLevel::L).unwrap();
        assert_eq!(m.width(), 21);
        // finder ring, separator and timing
        assert!(m.get(0, 0) && m.get(6, 0) && m.get(3, 3));
        assert!(!m.get(1, 1) && !m.get(7, 0) && !m.get(7, 7));
        assert!(m.get(8, 6) && !m.get(9, 6) && m.get(10, 6));
        assert!(m.get(8, 13));
    }

    #[test]
    fn test_capacity_errors() {
        assert_eq!(
            encode_segments(&[Segment::Bytes(&[0; 20])], 1, ECLevel::L, None),
            Err(EncodeError::DataTooLong {
                needed: 4 + 8 + 160,
                capacity: 152
            })
        );
        assert_eq!(
            encode_segments(&[Segment::Numeric("12a")], 1, ECLevel::L, None),
            Err(EncodeError::InvalidCharacter('a'))
        );
        assert_eq!(
            encode_segments(&[], 41, ECLevel::L, None),
            Err(EncodeError::InvalidVersion(41))
        );
        assert!(encode(&[0u8; 3000], ECLevel::H).is_err());
    }

    #[test]
    fn test_render_quiet_zone() {
        let m = encode(b"px", ECLevel::L).unwrap();
        let (pixels, w, h) = render(&m, 2, 4);
        assert_eq!((w, h), (58, 58));
        assert_eq!(pixels[0], 255);
        // top-left finder corner starts after the border
        assert_eq!(pixels[8 * w + 8], 0);
        assert_eq!(pixels[7 * w + 7], 255);
    }
}
