//! BCH codes protecting the format field (15,5) and the version field
//! (18,6). Both have minimum distance 7 or more, so up to three bit
//! errors are corrected by nearest-codeword search.

/// `x^10 + x^8 + x^5 + x^4 + x^2 + x + 1`
const FORMAT_GENERATOR: u32 = 0b101_0011_0111;
/// XOR applied to stored format fields so they are never all zero
pub const FORMAT_MASK: u32 = 0b101_0100_0001_0010;
/// `x^12 + x^11 + x^10 + x^9 + x^8 + x^5 + x^2 + 1`
const VERSION_GENERATOR: u32 = 0b1_1111_0010_0101;

/// Version fields for versions 7 through 40.
const VERSION_CODES: [u32; 34] = [
    0x07C94, 0x085BC, 0x09A99, 0x0A4D3, 0x0BBF6, 0x0C762, 0x0D847, 0x0E60D, 0x0F928, 0x10B78,
    0x1145D, 0x12A17, 0x13532, 0x149A6, 0x15683, 0x168C9, 0x177EC, 0x18EC4, 0x191E1, 0x1AFAB,
    0x1B08E, 0x1CC1A, 0x1D33F, 0x1ED75, 0x1F250, 0x209D5, 0x216F0, 0x228BA, 0x2379F, 0x24B0B,
    0x2542E, 0x26A64, 0x27541, 0x28C69,
];

fn remainder(mut value: u32, generator: u32) -> u32 {
    let degree = 31 - generator.leading_zeros();
    while value != 0 && 31 - value.leading_zeros() >= degree {
        value ^= generator << (31 - value.leading_zeros() - degree);
    }
    value
}

/// Masked 15-bit format field for five data bits (level bits, then mask).
pub fn format_encode(data: u8) -> u32 {
    let d = (data & 0x1F) as u32;
    ((d << 10) | remainder(d << 10, FORMAT_GENERATOR)) ^ FORMAT_MASK
}

/// Nearest format data to a masked field, with the number of bits that
/// differ, when no more than three do.
pub fn format_correct(bits: u32) -> Option<(u8, u32)> {
    (0u8..32)
        .map(|d| (d, (format_encode(d) ^ bits).count_ones()))
        .min_by_key(|&(_, dist)| dist)
        .filter(|&(_, dist)| dist <= 3)
}

/// 18-bit version field.
pub fn version_encode(version: u8) -> u32 {
    let v = version as u32;
    (v << 12) | remainder(v << 12, VERSION_GENERATOR)
}

/// Correct an 18-bit version field. Returns the version and the number of
/// bit errors.
pub fn version_correct(bits: u32) -> Option<(u8, u32)> {
    let bits = bits & 0x3FFFF;
    let guess = bits >> 12;
    if (7..=40).contains(&guess) {
        let dist = (VERSION_CODES[guess as usize - 7] ^ bits).count_ones();
        if dist < 4 {
            return Some((guess as u8, dist));
        }
    }
    VERSION_CODES
        .iter()
        .enumerate()
        .map(|(i, &code)| (i as u8 + 7, (code ^ bits).count_ones()))
        .find(|&(_, dist)| dist < 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_codes_match_generator() {
        for (i, &code) in VERSION_CODES.iter().enumerate() {
            assert_eq!(version_encode(i as u8 + 7), code);
        }
    }

    #[test]
    fn test_version_correction() {
        assert_eq!(version_correct(0x07C94), Some((7, 0)));
        // three errors, including in the data bits
        assert_eq!(version_correct(0x28C69 ^ 0b1000_0000_0001_0000_01), Some((40, 3)));
        // four errors are too many
        assert_eq!(version_correct(0x1145D ^ 0b1111), None);
    }

    #[test]
    fn test_format_encode() {
        // level M, mask 5: 00101 -> 100000011001110
        assert_eq!(format_encode(0b00101), 0b100_0000_1100_1110);
        // level L, mask 4
        assert_eq!(format_encode(0b01100), 0b110_0110_0010_1111);
    }

    #[test]
    fn test_format_correction() {
        for d in 0..32u8 {
            let code = format_encode(d);
            assert_eq!(format_correct(code), Some((d, 0)));
            assert_eq!(format_correct(code ^ 0b100_0100_0000_0001), Some((d, 3)));
        }
        // codewords are at least seven apart, so four flips never
        // land within three of the original
        let code = format_encode(0b10011);
        assert_ne!(
            format_correct(code ^ 0b1111).map(|(d, _)| d),
            Some(0b10011)
        );
    }
}
