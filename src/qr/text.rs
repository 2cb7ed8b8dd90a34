//! Decoded QR data to symbols: text assembly, FNC1 handling and merging of
//! structured append sequences.

use std::collections::BTreeMap;
use std::rc::Rc;

use super::data::Entry;
use super::QrCodeData;
use crate::models::{Modifier, Orientation, Point, Symbol, SymbolSet, SymbolType};

/// Group separator standing in for FNC1 inside GS1 data.
const GS: u8 = 0x1D;

fn push_alphanumeric(out: &mut Vec<u8>, chars: &[u8], fnc1: bool) {
    if !fnc1 {
        out.extend_from_slice(chars);
        return;
    }
    // '%' encodes FNC1, "%%" a literal percent
    let mut it = chars.iter().copied().peekable();
    while let Some(c) = it.next() {
        if c != b'%' {
            out.push(c);
        } else if it.peek() == Some(&b'%') {
            it.next();
            out.push(b'%');
        } else {
            out.push(GS);
        }
    }
}

/// Text and modifier bits of one symbol's data.
fn entries_text(entries: &[Entry]) -> (Vec<u8>, u32) {
    let fnc1 = entries
        .iter()
        .any(|e| matches!(e, Entry::Fnc1First | Entry::Fnc1Second(_)));
    let mut out = Vec::new();
    let mut modifiers = 0;
    for entry in entries {
        match entry {
            Entry::Numeric(d) | Entry::Bytes(d) | Entry::Kanji(d) => out.extend_from_slice(d),
            Entry::Alphanumeric(d) => push_alphanumeric(&mut out, d, fnc1),
            Entry::Fnc1First => modifiers |= Modifier::Gs1.bit(),
            Entry::Fnc1Second(ai) => {
                modifiers |= Modifier::Aim.bit();
                // two digits, or a letter stored as its ASCII value plus 100
                if *ai < 100 {
                    out.extend_from_slice(format!("{:02}", ai).as_bytes());
                } else {
                    out.push(ai - 100);
                }
            }
            Entry::Eci(_) | Entry::StructuredAppend { .. } => {}
        }
    }
    (out, modifiers)
}

fn orientation(ul: Point, ur: Point) -> Orientation {
    let d = ur - ul;
    if d.x.abs() >= d.y.abs() {
        if d.x > 0.0 {
            Orientation::Up
        } else {
            Orientation::Down
        }
    } else if d.y > 0.0 {
        Orientation::Right
    } else {
        Orientation::Left
    }
}

fn code_symbol(code: &QrCodeData) -> Symbol {
    let (data, modifiers) = entries_text(&code.entries);
    let mut sym = Symbol::new(SymbolType::QrCode, data);
    sym.modifiers = modifiers;
    let [ul, ur, dl, dr] = code.bbox;
    for p in [ul, dl, dr, ur] {
        sym.add_point(p.x.round() as i32, p.y.round() as i32);
    }
    sym.orientation = orientation(ul, ur);
    sym
}

/// Build one symbol per decoded code. Parts of a structured append
/// sequence, matched by size and parity, are joined in index order into a
/// single symbol whose components are the parts.
pub(crate) fn extract_symbols(codes: &[QrCodeData]) -> Vec<Symbol> {
    let mut out = Vec::new();
    let mut sequences: BTreeMap<(u8, u8), Vec<&QrCodeData>> = BTreeMap::new();
    for code in codes {
        match code.structured_append {
            Some((_, size, parity)) if size > 1 => sequences.entry((size, parity)).or_default().push(code),
            _ => out.push(code_symbol(code)),
        }
    }
    for (_, mut parts) in sequences {
        parts.sort_by_key(|c| c.structured_append.map(|(index, _, _)| index));
        parts.dedup_by_key(|c| c.structured_append.map(|(index, _, _)| index));
        let pieces: Vec<Symbol> = parts.iter().map(|c| code_symbol(c)).collect();
        let mut data = Vec::new();
        let mut modifiers = 0;
        for p in &pieces {
            data.extend_from_slice(&p.data);
            modifiers |= p.modifiers;
        }
        let mut sym = Symbol::new(SymbolType::QrCode, data);
        sym.modifiers = modifiers;
        sym.points = pieces[0].points.clone();
        sym.orientation = pieces[0].orientation;
        sym.components = Some(SymbolSet::from_symbols(pieces.into_iter().map(Rc::new).collect()));
        out.push(sym);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ECLevel;

    fn code(entries: Vec<Entry>) -> QrCodeData {
        let structured_append = entries.iter().find_map(|e| match e {
            Entry::StructuredAppend { index, size, parity } => Some((*index, *size, *parity)),
            _ => None,
        });
        QrCodeData {
            entries,
            version: 1,
            ec_level: ECLevel::M,
            corrected: 0,
            structured_append,
            bbox: [
                Point::new(10.0, 10.0),
                Point::new(50.0, 10.0),
                Point::new(10.0, 50.0),
                Point::new(50.0, 50.0),
            ],
        }
    }

    #[test]
    fn test_plain_text_and_points() {
        let syms = extract_symbols(&[code(vec![
            Entry::Bytes(b"hello ".to_vec()),
            Entry::Numeric(b"42".to_vec()),
        ])]);
        assert_eq!(syms.len(), 1);
        assert_eq!(syms[0].data(), b"hello 42");
        assert_eq!(syms[0].orientation(), Orientation::Up);
        let pts: Vec<(i32, i32)> = syms[0].points().iter().map(|p| (p.x, p.y)).collect();
        assert_eq!(pts, vec![(10, 10), (10, 50), (50, 50), (50, 10)]);
    }

    #[test]
    fn test_gs1_percent_handling() {
        let syms = extract_symbols(&[code(vec![
            Entry::Fnc1First,
            Entry::Alphanumeric(b"01%10%%A".to_vec()),
        ])]);
        assert_eq!(syms[0].data(), b"01\x1d10%A");
        assert!(syms[0].has_modifier(Modifier::Gs1));
        assert!(!syms[0].has_modifier(Modifier::Aim));
    }

    #[test]
    fn test_aim_indicator_prefix() {
        let syms = extract_symbols(&[code(vec![Entry::Fnc1Second(b'a' + 100), Entry::Bytes(b"xyz".to_vec())])]);
        assert_eq!(syms[0].data(), b"axyz");
        assert!(syms[0].has_modifier(Modifier::Aim));
        let syms = extract_symbols(&[code(vec![Entry::Fnc1Second(7), Entry::Alphanumeric(b"%".to_vec())])]);
        assert_eq!(syms[0].data(), b"07\x1d");
    }

    #[test]
    fn test_structured_append_merge() {
        let part = |index: u8, text: &[u8]| {
            code(vec![
                Entry::StructuredAppend {
                    index,
                    size: 3,
                    parity: 0x21,
                },
                Entry::Bytes(text.to_vec()),
            ])
        };
        let other = code(vec![Entry::Bytes(b"solo".to_vec())]);
        let syms = extract_symbols(&[part(2, b"baz"), other, part(0, b"foo"), part(1, b"bar")]);
        assert_eq!(syms.len(), 2);
        assert_eq!(syms[0].data(), b"solo");
        assert_eq!(syms[1].data(), b"foobarbaz");
        let parts = syms[1].components().unwrap();
        assert_eq!(parts.len(), 3);
    }

    #[test]
    fn test_orientation_from_top_edge() {
        let o = Point::new(0.0, 0.0);
        assert_eq!(orientation(o, Point::new(10.0, 2.0)), Orientation::Up);
        assert_eq!(orientation(o, Point::new(1.0, 10.0)), Orientation::Right);
        assert_eq!(orientation(o, Point::new(-10.0, 0.0)), Orientation::Down);
        assert_eq!(orientation(o, Point::new(0.0, -10.0)), Orientation::Left);
    }
}
