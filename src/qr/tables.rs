//! Per-version constants: block structure, alignment pattern positions
//! and the raw codeword capacity.

use crate::models::ECLevel;

/// Error correction block layout of one version and level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcBlockInfo {
    /// Number of Reed-Solomon blocks
    pub num_blocks: usize,
    /// Parity codewords in each block
    pub ecc_per_block: usize,
}

// Index: [ec_level][version]
const ECC_CODEWORDS_PER_BLOCK: [[u8; 41]; 4] = [
    [
        0, 7, 10, 15, 20, 26, 18, 20, 24, 30, 18, 20, 24, 26, 30, 22, 24, 28, 30, 28, 28, 28, 28,
        30, 30, 26, 28, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ],
    [
        0, 10, 16, 26, 18, 24, 16, 18, 22, 22, 26, 30, 22, 22, 24, 24, 28, 28, 26, 26, 26, 26, 28,
        28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28,
    ],
    [
        0, 13, 22, 18, 26, 18, 24, 18, 22, 20, 24, 28, 26, 24, 20, 30, 24, 28, 28, 26, 30, 28, 30,
        30, 30, 30, 28, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ],
    [
        0, 17, 28, 22, 16, 22, 28, 26, 26, 24, 28, 24, 28, 22, 24, 24, 30, 28, 28, 26, 28, 30, 24,
        30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ],
];

const NUM_ERROR_CORRECTION_BLOCKS: [[u8; 41]; 4] = [
    [
        0, 1, 1, 1, 1, 1, 2, 2, 2, 2, 4, 4, 4, 4, 4, 6, 6, 6, 6, 7, 8, 8, 9, 9, 10, 12, 12, 12,
        13, 14, 15, 16, 17, 18, 19, 19, 20, 21, 22, 24, 25,
    ],
    [
        0, 1, 1, 1, 2, 2, 4, 4, 4, 5, 5, 5, 8, 9, 9, 10, 10, 11, 13, 14, 16, 17, 17, 18, 20, 21,
        23, 25, 26, 28, 29, 31, 33, 35, 37, 38, 40, 43, 45, 47, 49,
    ],
    [
        0, 1, 1, 2, 2, 4, 4, 6, 6, 8, 8, 8, 10, 12, 16, 12, 17, 16, 18, 21, 20, 23, 23, 25, 27,
        29, 34, 34, 35, 38, 40, 43, 45, 48, 51, 53, 56, 59, 62, 65, 68,
    ],
    [
        0, 1, 1, 2, 4, 4, 4, 5, 6, 8, 8, 11, 11, 16, 16, 18, 16, 19, 21, 25, 25, 25, 34, 30, 32,
        35, 37, 40, 42, 45, 48, 51, 54, 57, 60, 63, 66, 70, 74, 77, 81,
    ],
];

/// Block layout, or `None` for a version outside 1 to 40.
///
/// ```
/// use rust_barcode::models::ECLevel;
/// use rust_barcode::qr::tables::ec_block_info;
///
/// let info = ec_block_info(3, ECLevel::H).unwrap();
/// assert_eq!((info.num_blocks, info.ecc_per_block), (2, 22));
/// assert!(ec_block_info(41, ECLevel::L).is_none());
/// ```
pub fn ec_block_info(version: u8, ec_level: ECLevel) -> Option<EcBlockInfo> {
    if !(1..=40).contains(&version) {
        return None;
    }
    let idx = ec_level.index();
    Some(EcBlockInfo {
        num_blocks: NUM_ERROR_CORRECTION_BLOCKS[idx][version as usize] as usize,
        ecc_per_block: ECC_CODEWORDS_PER_BLOCK[idx][version as usize] as usize,
    })
}

/// Modules per side.
pub fn dimension(version: u8) -> usize {
    17 + 4 * version as usize
}

/// Modules left for data and parity once every function pattern is placed.
pub fn raw_data_modules(version: u8) -> usize {
    let v = version as usize;
    let mut n = (16 * v + 128) * v + 64;
    if v >= 2 {
        let align = v / 7 + 2;
        n -= (25 * align - 10) * align - 55;
        if v >= 7 {
            n -= 36;
        }
    }
    n
}

/// Total codewords, data plus parity.
pub fn total_codewords(version: u8) -> usize {
    raw_data_modules(version) / 8
}

/// Alignment pattern center coordinates, shared by rows and columns.
pub fn alignment_positions(version: u8) -> Vec<usize> {
    if version < 2 {
        return Vec::new();
    }
    let v = version as usize;
    let n = v / 7 + 2;
    let step = (v * 8 + n * 3 + 5) / (n * 4 - 4) * 2;
    let mut positions = vec![6; n];
    let mut pos = dimension(version) - 7;
    for slot in positions[1..].iter_mut().rev() {
        *slot = pos;
        pos -= step;
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_positions() {
        assert!(alignment_positions(1).is_empty());
        assert_eq!(alignment_positions(2), vec![6, 18]);
        assert_eq!(alignment_positions(7), vec![6, 22, 38]);
        assert_eq!(alignment_positions(15), vec![6, 26, 48, 70]);
        assert_eq!(alignment_positions(32), vec![6, 34, 60, 86, 112, 138]);
        assert_eq!(alignment_positions(36), vec![6, 24, 50, 76, 102, 128, 154]);
        assert_eq!(alignment_positions(40), vec![6, 30, 58, 86, 114, 142, 170]);
    }

    #[test]
    fn test_capacity() {
        assert_eq!(total_codewords(1), 26);
        assert_eq!(total_codewords(7), 196);
        assert_eq!(total_codewords(40), 3706);
        // every block layout covers the capacity exactly, with short blocks
        // never more than one codeword shorter than long ones
        for v in 1..=40 {
            for level in [ECLevel::L, ECLevel::M, ECLevel::Q, ECLevel::H] {
                let info = ec_block_info(v, level).unwrap();
                let total = total_codewords(v);
                assert!(info.num_blocks * info.ecc_per_block < total);
                let data = total - info.num_blocks * info.ecc_per_block;
                assert!(data / info.num_blocks > 0);
            }
        }
    }

    #[test]
    fn test_out_of_range_version() {
        assert!(ec_block_info(0, ECLevel::L).is_none());
        assert!(ec_block_info(41, ECLevel::H).is_none());
    }
}
