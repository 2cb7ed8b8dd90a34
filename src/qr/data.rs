//! Codeword blocks to data segments.

use tracing::debug;

use super::rs::{rs_correct, Gf256};
use super::tables::ec_block_info;
use crate::models::ECLevel;

/// Mode indicators.
pub(crate) const MODE_TERMINATOR: u32 = 0;
pub(crate) const MODE_NUMERIC: u32 = 1;
pub(crate) const MODE_ALPHANUMERIC: u32 = 2;
pub(crate) const MODE_STRUCTURED_APPEND: u32 = 3;
pub(crate) const MODE_BYTE: u32 = 4;
pub(crate) const MODE_FNC1_FIRST: u32 = 5;
pub(crate) const MODE_ECI: u32 = 7;
pub(crate) const MODE_KANJI: u32 = 8;
pub(crate) const MODE_FNC1_SECOND: u32 = 9;

pub(crate) const ALPHANUMERIC_CHARS: &[u8; 45] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ $%*+-./:";

/// One decoded segment of a QR symbol's data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// ASCII digits
    Numeric(Vec<u8>),
    /// ASCII characters from the 45-character alphanumeric set
    Alphanumeric(Vec<u8>),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Shift JIS byte pairs
    Kanji(Vec<u8>),
    /// Extended channel interpretation designator
    Eci(u32),
    /// GS1 data follows
    Fnc1First,
    /// Data follows an AIM application indicator
    Fnc1Second(u8),
    /// Part of a structured append sequence
    StructuredAppend { index: u8, size: u8, parity: u8 },
}

/// Length of the character count field.
pub(crate) fn char_count_bits(mode: u32, version: u8) -> usize {
    let band = match version {
        0..=9 => 0,
        10..=26 => 1,
        _ => 2,
    };
    match mode {
        MODE_NUMERIC => [10, 12, 14][band],
        MODE_ALPHANUMERIC => [9, 11, 13][band],
        MODE_BYTE => [8, 16, 16][band],
        MODE_KANJI => [8, 10, 12][band],
        _ => 0,
    }
}

/// Split interleaved codewords into blocks, correct each one and return the
/// concatenated data with the total number of corrected codewords.
pub(crate) fn correct_blocks(
    gf: &Gf256,
    codewords: &[u8],
    version: u8,
    ec_level: ECLevel,
) -> Option<(Vec<u8>, usize)> {
    let info = ec_block_info(version, ec_level)?;
    let total = codewords.len();
    let ecc_total = info.num_blocks * info.ecc_per_block;
    if total <= ecc_total {
        return None;
    }
    let data_total = total - ecc_total;
    let num_long_blocks = data_total % info.num_blocks;
    let num_short_blocks = info.num_blocks - num_long_blocks;
    let short_len = data_total / info.num_blocks;
    let block_len = |b: usize| if b < num_short_blocks { short_len } else { short_len + 1 };

    let mut blocks: Vec<Vec<u8>> = (0..info.num_blocks)
        .map(|b| Vec::with_capacity(block_len(b) + info.ecc_per_block))
        .collect();
    let mut next = codewords.iter().copied();
    for i in 0..=short_len {
        for (b, block) in blocks.iter_mut().enumerate() {
            if i < block_len(b) {
                block.push(next.next()?);
            }
        }
    }
    for _ in 0..info.ecc_per_block {
        for block in blocks.iter_mut() {
            block.push(next.next()?);
        }
    }

    let mut data = Vec::with_capacity(data_total);
    let mut corrected = 0;
    for (b, block) in blocks.iter_mut().enumerate() {
        match rs_correct(gf, 0, block, info.ecc_per_block, &[]) {
            Ok(n) => corrected += n,
            Err(err) => {
                debug!(block = b, %err, "qr block uncorrectable");
                return None;
            }
        }
        data.extend_from_slice(&block[..block_len(b)]);
    }
    Some((data, corrected))
}

/// MSB-first reader over data codewords.
pub(crate) struct BitReader<'a> {
    bytes: &'a [u8],
    idx: usize,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, idx: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        (self.bytes.len() << 3).saturating_sub(self.idx)
    }

    pub(crate) fn read_bits(&mut self, n: usize) -> Option<u32> {
        if n > self.remaining() {
            return None;
        }
        let mut val = 0u32;
        for _ in 0..n {
            let bit = (self.bytes[self.idx >> 3] >> (7 - (self.idx & 7))) & 1;
            val = (val << 1) | bit as u32;
            self.idx += 1;
        }
        Some(val)
    }
}

fn read_numeric(reader: &mut BitReader, count: usize) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(count);
    let mut left = count;
    while left > 0 {
        let (digits, bits, limit) = match left {
            1 => (1, 4, 10),
            2 => (2, 7, 100),
            _ => (3, 10, 1000),
        };
        let value = reader.read_bits(bits)?;
        if value >= limit {
            return None;
        }
        let s = format!("{:0width$}", value, width = digits);
        out.extend_from_slice(s.as_bytes());
        left -= digits;
    }
    Some(out)
}

fn read_alphanumeric(reader: &mut BitReader, count: usize) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(count);
    let mut left = count;
    while left >= 2 {
        let value = reader.read_bits(11)? as usize;
        if value >= 45 * 45 {
            return None;
        }
        out.push(ALPHANUMERIC_CHARS[value / 45]);
        out.push(ALPHANUMERIC_CHARS[value % 45]);
        left -= 2;
    }
    if left == 1 {
        let value = reader.read_bits(6)? as usize;
        out.push(*ALPHANUMERIC_CHARS.get(value)?);
    }
    Some(out)
}

fn read_kanji(reader: &mut BitReader, count: usize) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(count * 2);
    for _ in 0..count {
        let val = reader.read_bits(13)?;
        let mut sjis = ((val / 0xC0) << 8) | (val % 0xC0);
        sjis += if sjis < 0x1F00 { 0x8140 } else { 0xC140 };
        if sjis > 0xFFFF {
            return None;
        }
        out.push((sjis >> 8) as u8);
        out.push(sjis as u8);
    }
    Some(out)
}

fn read_eci(reader: &mut BitReader) -> Option<u32> {
    let first = reader.read_bits(8)?;
    if first & 0x80 == 0 {
        Some(first)
    } else if first & 0xC0 == 0x80 {
        Some(((first & 0x3F) << 8) | reader.read_bits(8)?)
    } else if first & 0xE0 == 0xC0 {
        Some(((first & 0x1F) << 16) | reader.read_bits(16)?)
    } else {
        None
    }
}

/// Parse corrected data codewords into segments. Stops at the terminator
/// or when too few bits remain for another mode indicator; any malformed
/// or truncated segment fails the whole symbol.
pub(crate) fn parse_entries(data: &[u8], version: u8) -> Option<Vec<Entry>> {
    let mut reader = BitReader::new(data);
    let mut entries = Vec::new();
    while reader.remaining() >= 4 {
        let mode = reader.read_bits(4)?;
        let count = |reader: &mut BitReader| reader.read_bits(char_count_bits(mode, version)).map(|c| c as usize);
        let entry = match mode {
            MODE_TERMINATOR => break,
            MODE_NUMERIC => {
                let n = count(&mut reader)?;
                Entry::Numeric(read_numeric(&mut reader, n)?)
            }
            MODE_ALPHANUMERIC => {
                let n = count(&mut reader)?;
                Entry::Alphanumeric(read_alphanumeric(&mut reader, n)?)
            }
            MODE_BYTE => {
                let n = count(&mut reader)?;
                let mut bytes = Vec::with_capacity(n);
                for _ in 0..n {
                    bytes.push(reader.read_bits(8)? as u8);
                }
                Entry::Bytes(bytes)
            }
            MODE_KANJI => {
                let n = count(&mut reader)?;
                Entry::Kanji(read_kanji(&mut reader, n)?)
            }
            MODE_ECI => Entry::Eci(read_eci(&mut reader)?),
            MODE_FNC1_FIRST => Entry::Fnc1First,
            MODE_FNC1_SECOND => Entry::Fnc1Second(reader.read_bits(8)? as u8),
            MODE_STRUCTURED_APPEND => {
                let index = reader.read_bits(4)? as u8;
                let size = reader.read_bits(4)? as u8 + 1;
                let parity = reader.read_bits(8)? as u8;
                Entry::StructuredAppend { index, size, parity }
            }
            _ => return None,
        };
        entries.push(entry);
    }
    Some(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qr::rs::{rs_compute_genpoly, rs_encode, QR_PPOLY};

    /// Pack `(value, bits)` fields MSB first, zero padded to whole bytes.
    fn pack(fields: &[(u32, usize)]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut n = 0;
        for &(value, bits) in fields {
            for i in (0..bits).rev() {
                if n % 8 == 0 {
                    out.push(0);
                }
                if (value >> i) & 1 != 0 {
                    out[n / 8] |= 0x80 >> (n % 8);
                }
                n += 1;
            }
        }
        out
    }

    #[test]
    fn test_numeric_and_alphanumeric() {
        // "01234567" then "AC-42"
        let data = pack(&[
            (MODE_NUMERIC, 4),
            (8, 10),
            (12, 10),
            (345, 10),
            (67, 7),
            (MODE_ALPHANUMERIC, 4),
            (5, 9),
            (10 * 45 + 12, 11),
            (41 * 45 + 4, 11),
            (2, 6),
            (MODE_TERMINATOR, 4),
        ]);
        let entries = parse_entries(&data, 1).unwrap();
        assert_eq!(
            entries,
            vec![
                Entry::Numeric(b"01234567".to_vec()),
                Entry::Alphanumeric(b"AC-42".to_vec())
            ]
        );
    }

    #[test]
    fn test_bytes_kanji_and_eci() {
        // Shift JIS 0x935F is stored as 0x121F packed base 0xC0
        let kanji = 0x12 * 0xC0 + 0x1F;
        let data = pack(&[
            (MODE_ECI, 4),
            (0x80 | 0x03, 8),
            (0xE8, 8),
            (MODE_BYTE, 4),
            (2, 16),
            (0xC3, 8),
            (0xA9, 8),
            (MODE_KANJI, 4),
            (1, 10),
            (kanji, 13),
        ]);
        let entries = parse_entries(&data, 12).unwrap();
        assert_eq!(
            entries,
            vec![
                Entry::Eci(1000),
                Entry::Bytes(vec![0xC3, 0xA9]),
                Entry::Kanji(vec![0x93, 0x5F])
            ]
        );
    }

    #[test]
    fn test_fnc1_and_structured_append() {
        let data = pack(&[
            (MODE_STRUCTURED_APPEND, 4),
            (1, 4),
            (2, 4),
            (0x5A, 8),
            (MODE_FNC1_SECOND, 4),
            (b'a' as u32, 8),
            (MODE_FNC1_FIRST, 4),
        ]);
        let entries = parse_entries(&data, 3).unwrap();
        assert_eq!(
            entries,
            vec![
                Entry::StructuredAppend {
                    index: 1,
                    size: 3,
                    parity: 0x5A
                },
                Entry::Fnc1Second(b'a'),
                Entry::Fnc1First
            ]
        );
    }

    #[test]
    fn test_malformed_segments() {
        // numeric group out of range
        assert!(parse_entries(&pack(&[(MODE_NUMERIC, 4), (3, 10), (1000, 10)]), 1).is_none());
        // byte count longer than the data
        assert!(parse_entries(&pack(&[(MODE_BYTE, 4), (200, 8), (1, 8)]), 1).is_none());
        // reserved mode
        assert!(parse_entries(&pack(&[(0b1111, 4)]), 1).is_none());
        // empty data is fine
        assert_eq!(parse_entries(&[], 1), Some(vec![]));
    }

    #[test]
    fn test_count_bits_by_version() {
        assert_eq!(char_count_bits(MODE_NUMERIC, 9), 10);
        assert_eq!(char_count_bits(MODE_NUMERIC, 10), 12);
        assert_eq!(char_count_bits(MODE_BYTE, 27), 16);
        assert_eq!(char_count_bits(MODE_KANJI, 40), 12);
        assert_eq!(char_count_bits(MODE_ALPHANUMERIC, 26), 11);
    }

    #[test]
    fn test_correct_blocks_deinterleaves() {
        // version 5-Q: two blocks of 15 and two of 16 data codewords, 18 parity each
        let gf = Gf256::new(QR_PPOLY);
        let genpoly = rs_compute_genpoly(&gf, 0, 18);
        let lens = [15, 15, 16, 16];
        let mut blocks: Vec<Vec<u8>> = Vec::new();
        let mut next = 0u8;
        for &len in &lens {
            let mut block: Vec<u8> = (0..len)
                .map(|_| {
                    next = next.wrapping_add(7);
                    next
                })
                .collect();
            block.resize(len + 18, 0);
            rs_encode(&gf, &mut block, &genpoly);
            blocks.push(block);
        }
        let mut interleaved = Vec::new();
        for i in 0..16 {
            for (b, block) in blocks.iter().enumerate() {
                if i < lens[b] {
                    interleaved.push(block[i]);
                }
            }
        }
        for i in 0..18 {
            for (b, block) in blocks.iter().enumerate() {
                interleaved.push(block[lens[b] + i]);
            }
        }
        assert_eq!(interleaved.len(), 134);
        interleaved[3] ^= 0x55;
        interleaved[100] ^= 0x01;
        let (data, corrected) = correct_blocks(&gf, &interleaved, 5, ECLevel::Q).unwrap();
        let expected: Vec<u8> = blocks.iter().zip(lens).flat_map(|(b, len)| b[..len].to_vec()).collect();
        assert_eq!(data, expected);
        assert_eq!(corrected, 2);
    }
}
