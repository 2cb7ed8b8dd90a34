//! PDF417 row reader.
//!
//! Recognizes the start and stop patterns, classifies each 17-module
//! codeword into its cluster and keeps the element signature. Rows are
//! never assembled into a symbol from the width stream, so this decoder
//! only reports `Partial`.

use tracing::{debug, trace};

use super::{DecodeBuffer, Symbology, WidthHistory};
use crate::models::{Config, SymbolType, SymbologyConfig};
use crate::scanner::Color;

/// Start pattern, bar first.
const START: [u8; 8] = [8, 1, 1, 1, 1, 1, 1, 3];
/// Stop pattern, bar first, including the trailing one-module bar.
const STOP: [u8; 9] = [7, 1, 1, 3, 1, 1, 1, 2, 1];
/// Codewords kept per row.
const CODEWORDS_MAX: usize = 64;

/// One codeword as read from a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Codeword {
    /// 0, 3 or 6
    pub(crate) cluster: u8,
    /// module widths packed four bits each, first element highest
    pub(crate) signature: u32,
}

/// Round `N` widths to `modules` modules; `None` unless every element
/// lands between one and `max` modules and the total matches.
fn modules_of<const N: usize>(w: &[u32; N], modules: u32, max: u8) -> Option<[u8; N]> {
    let s: u32 = w.iter().sum();
    if s == 0 {
        return None;
    }
    let mut m = [0u8; N];
    for (slot, &x) in m.iter_mut().zip(w) {
        let q = (x * modules * 2 + s) / (s * 2);
        if q == 0 || q > max as u32 {
            return None;
        }
        *slot = q as u8;
    }
    (m.iter().map(|&x| x as u32).sum::<u32>() == modules).then_some(m)
}

fn widths<const N: usize>(hist: &WidthHistory) -> [u32; N] {
    let mut w = [0u32; N];
    for (i, slot) in w.iter_mut().enumerate() {
        *slot = hist.width((N - 1 - i) as u8);
    }
    w
}

fn codeword(m: &[u8; 8]) -> Option<Codeword> {
    let k = (m[0] as i32 - m[2] as i32 + m[4] as i32 - m[6] as i32 + 9).rem_euclid(9) as u8;
    if k % 3 != 0 {
        return None;
    }
    let signature = m.iter().fold(0u32, |acc, &x| (acc << 4) | x as u32);
    Some(Codeword {
        cluster: k,
        signature,
    })
}

#[derive(Debug, Clone, Copy)]
struct Run {
    dir: i32,
    element: u8,
    /// the stop pattern's first eight elements were seen
    stopping: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct Pdf417Decoder {
    run: Option<Run>,
    pub(crate) codewords: Vec<Codeword>,
    pub(crate) config: SymbologyConfig,
}

impl Default for Pdf417Decoder {
    fn default() -> Self {
        Self {
            run: None,
            codewords: Vec::new(),
            config: SymbologyConfig::with_flags(0),
        }
    }
}

impl Pdf417Decoder {
    fn start(&mut self, hist: &WidthHistory) -> SymbolType {
        let dir = if hist.color() == Color::Space {
            match modules_of(&widths::<8>(hist), 17, 8) {
                Some(m) if m == START => 1,
                _ => return SymbolType::None,
            }
        } else {
            let mut stop = STOP;
            stop.reverse();
            match modules_of(&widths::<9>(hist), 18, 8) {
                Some(m) if m == stop => -1,
                _ => return SymbolType::None,
            }
        };
        self.codewords.clear();
        self.run = Some(Run {
            dir,
            element: 0,
            stopping: false,
        });
        SymbolType::Partial
    }

    #[cfg(test)]
    fn in_row(&self) -> bool {
        self.run.is_some()
    }

    fn end_row(&mut self) -> SymbolType {
        if let Some(run) = self.run.take() {
            let clusters: Vec<u8> = self.codewords.iter().map(|c| c.cluster).collect();
            debug!(?clusters, direction = run.dir, "pdf417 row");
            trace!(
                signatures = ?self.codewords.iter().map(|c| c.signature).collect::<Vec<_>>(),
                "pdf417 codewords"
            );
        }
        SymbolType::Partial
    }
}

impl Symbology for Pdf417Decoder {
    fn decode(&mut self, hist: &WidthHistory, _buf: &mut DecodeBuffer) -> SymbolType {
        let Some(mut run) = self.run else {
            return self.start(hist);
        };
        run.element += 1;
        if run.stopping {
            // trailing one-module bar of the stop pattern
            let ok = hist.color() == Color::Bar
                && hist.width(0) * 17 * 2 <= hist.calc_s(1, 8) * 3;
            if ok {
                return self.end_row();
            }
            self.run = None;
            return SymbolType::None;
        }
        if run.element < 8 {
            self.run = Some(run);
            return SymbolType::Partial;
        }
        run.element = 0;

        let mut w = widths::<8>(hist);
        if run.dir < 0 {
            w.reverse();
        }
        let m = modules_of(&w, 17, 8);
        if run.dir > 0 && m.is_some_and(|m| m[..] == STOP[..8]) {
            run.stopping = true;
            self.run = Some(run);
            return SymbolType::Partial;
        }
        if run.dir < 0 && m == Some(START) {
            return self.end_row();
        }
        let Some(cw) = m
            .filter(|m| m.iter().all(|&x| x <= 6))
            .and_then(|m| codeword(&m))
        else {
            self.run = None;
            return SymbolType::None;
        };
        if self.codewords.len() < CODEWORDS_MAX {
            self.codewords.push(cw);
        }
        self.run = Some(run);
        SymbolType::Partial
    }

    fn reset(&mut self) {
        self.run = None;
        self.codewords.clear();
    }
}
