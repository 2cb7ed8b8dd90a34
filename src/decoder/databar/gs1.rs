//! DataBar Expanded data field: encodation methods and the general purpose
//! numeric, alphanumeric and ISO 646 compaction.

/// FNC1 as transmitted in decoded data.
pub(crate) const GS: u8 = 0x1d;

/// Cursor over the bit field, MSB first.
struct Bits<'a> {
    bits: &'a [bool],
    pos: usize,
}

impl<'a> Bits<'a> {
    fn new(bits: &'a [bool]) -> Self {
        Self { bits, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bits.len() - self.pos
    }

    fn peek(&self, n: usize) -> Option<u32> {
        if n > self.remaining() {
            return None;
        }
        Some(
            self.bits[self.pos..self.pos + n]
                .iter()
                .fold(0, |acc, &b| (acc << 1) | b as u32),
        )
    }

    fn read(&mut self, n: usize) -> Option<u32> {
        let v = self.peek(n)?;
        self.pos += n;
        Some(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Numeric,
    Alpha,
    Iso646,
}

/// Decode the general purpose field from the cursor to the end.
fn general_purpose(bits: &mut Bits<'_>, out: &mut Vec<u8>) -> Option<()> {
    let mut mode = Mode::Numeric;
    loop {
        match mode {
            Mode::Numeric => {
                if bits.remaining() < 4 {
                    return Some(());
                }
                if bits.peek(4)? == 0 {
                    bits.pos += 4;
                    mode = Mode::Alpha;
                    continue;
                }
                if bits.remaining() < 7 {
                    // trailing single digit
                    let v = bits.read(4)?;
                    if v > 10 {
                        return None;
                    }
                    if v > 0 {
                        out.push(b'0' + v as u8 - 1);
                    }
                    return Some(());
                }
                let v = bits.read(7)?;
                if v < 8 {
                    return None;
                }
                for d in [(v - 8) / 11, (v - 8) % 11] {
                    out.push(if d == 10 { GS } else { b'0' + d as u8 });
                }
            }
            Mode::Alpha | Mode::Iso646 => {
                if bits.remaining() < 5 {
                    return Some(());
                }
                if bits.peek(3)? == 0 {
                    bits.pos += 3;
                    mode = Mode::Numeric;
                    continue;
                }
                let v5 = bits.peek(5)?;
                if v5 == 0b00100 {
                    bits.pos += 5;
                    mode = if mode == Mode::Alpha {
                        Mode::Iso646
                    } else {
                        Mode::Alpha
                    };
                    continue;
                }
                if (5..=15).contains(&v5) {
                    bits.pos += 5;
                    if v5 == 15 {
                        out.push(GS);
                        mode = Mode::Numeric;
                    } else {
                        out.push(b'0' + v5 as u8 - 5);
                    }
                    continue;
                }
                let c = if mode == Mode::Alpha {
                    match bits.read(6)? {
                        v @ 32..=57 => b'A' + (v - 32) as u8,
                        v @ 58..=62 => b"*,-./"[(v - 58) as usize],
                        _ => return None,
                    }
                } else {
                    match bits.peek(7)? {
                        v @ 64..=89 => {
                            bits.pos += 7;
                            b'A' + (v - 64) as u8
                        }
                        v @ 90..=115 => {
                            bits.pos += 7;
                            b'a' + (v - 90) as u8
                        }
                        _ => match bits.read(8)? {
                            v @ 232..=252 => b"!\"%&'()*+,-./:;<=>?_ "[(v - 232) as usize],
                            _ => return None,
                        },
                    }
                };
                out.push(c);
            }
        }
    }
}

/// Twelve digits from four 10-bit groups.
fn compressed_digits(bits: &mut Bits<'_>, out: &mut Vec<u8>) -> Option<()> {
    for _ in 0..4 {
        let v = bits.read(10)?;
        if v > 999 {
            return None;
        }
        out.extend_from_slice(format!("{:03}", v).as_bytes());
    }
    Some(())
}

/// Mod-10 check digit of the GTIN digits following the `01` AI.
pub(crate) fn gtin_check(digits: &[u8]) -> u8 {
    let n = digits.len();
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, &d)| (d - b'0') as u32 * if (n - i) % 2 == 1 { 3 } else { 1 })
        .sum();
    b'0' + ((10 - sum % 10) % 10) as u8
}

/// `01` AI with the given indicator digit followed by a compressed GTIN.
fn gtin(bits: &mut Bits<'_>, indicator: u8, out: &mut Vec<u8>) -> Option<()> {
    out.extend_from_slice(b"01");
    let start = out.len();
    out.push(b'0' + indicator);
    compressed_digits(bits, out)?;
    let check = gtin_check(&out[start..]);
    out.push(check);
    Some(())
}

/// Decode a complete data field (linkage flag first) into GS1 element
/// string text, with FNC1 separators as [`GS`].
pub(crate) fn decode_field(field: &[bool]) -> Option<Vec<u8>> {
    let mut bits = Bits::new(field);
    let mut out = Vec::new();
    // linkage flag, only meaningful for composite symbols
    bits.read(1)?;

    if bits.read(1)? == 1 {
        // method 1: AI 01 with any indicator digit
        bits.read(2)?;
        let indicator = bits.read(4)?;
        if indicator > 9 {
            return None;
        }
        gtin(&mut bits, indicator as u8, &mut out)?;
        general_purpose(&mut bits, &mut out)?;
        return Some(out);
    }

    if bits.read(1)? == 0 {
        // method 00: general purpose data only
        bits.read(2)?;
        general_purpose(&mut bits, &mut out)?;
        return Some(out);
    }

    match bits.read(2)? {
        0b00 => {
            // 0100: AI 01 + AI 3103
            gtin(&mut bits, 9, &mut out)?;
            let weight = bits.read(15)?;
            out.extend_from_slice(format!("3103{:06}", weight).as_bytes());
        }
        0b01 => {
            // 0101: AI 01 + AI 3202/3203
            gtin(&mut bits, 9, &mut out)?;
            let weight = bits.read(15)?;
            if weight < 10000 {
                out.extend_from_slice(format!("3202{:06}", weight).as_bytes());
            } else {
                out.extend_from_slice(format!("3203{:06}", weight - 10000).as_bytes());
            }
        }
        0b10 => {
            // 01100 / 01101: AI 01 + AI 392x / 393x
            let currency = bits.read(1)? == 1;
            bits.read(2)?;
            gtin(&mut bits, 9, &mut out)?;
            let decimals = bits.read(2)?;
            if currency {
                let iso = bits.read(10)?;
                if iso > 999 {
                    return None;
                }
                out.extend_from_slice(format!("393{}{:03}", decimals, iso).as_bytes());
            } else {
                out.extend_from_slice(format!("392{}", decimals).as_bytes());
            }
            general_purpose(&mut bits, &mut out)?;
        }
        _ => {
            // 0111xxx: AI 01 + AI 310x/320x + optional date
            let variant = bits.read(3)?;
            gtin(&mut bits, 9, &mut out)?;
            let weight = bits.read(20)?;
            let ai = if variant & 1 == 0 { "310" } else { "320" };
            out.extend_from_slice(
                format!("{}{}{:06}", ai, weight / 100000, weight % 100000).as_bytes(),
            );
            let date = bits.read(16)?;
            if date != 38400 {
                let date_ai = [11, 13, 15, 17][(variant >> 1) as usize];
                let (yy, rest) = (date / 384, date % 384);
                let (mm, dd) = (rest / 32 + 1, rest % 32);
                if yy > 99 || mm > 12 {
                    return None;
                }
                out.extend_from_slice(format!("{}{:02}{:02}{:02}", date_ai, yy, mm, dd).as_bytes());
            }
        }
    }
    Some(out)
}
