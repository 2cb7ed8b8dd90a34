//! Width-stream decoder.
//!
//! Consumes element widths from the [`Scanner`](crate::scanner::Scanner),
//! keeps a short history window and runs every enabled symbology over it in
//! a fixed priority order. The symbologies share one output buffer guarded by
//! an explicit ownership lock.

pub mod codabar;
pub mod code128;
pub mod code39;
pub mod code93;
pub mod databar;
pub mod ean;
pub mod i25;
pub mod pdf417;
pub mod qr_finder;

use std::fmt;

use tracing::warn;

use crate::error::{Result, ScanError};
use crate::models::{Config, SymbolType, SymbologyConfig};
use crate::scanner::Color;

pub use qr_finder::FinderLine;

/// Size of the width history; must be a power of two.
pub const DECODE_WINDOW: usize = 16;
/// Initial output buffer allocation.
const BUFFER_MIN: usize = 0x20;
/// Output buffer growth limit; longer symbols are dropped.
pub(crate) const BUFFER_MAX: usize = 0x100;
/// Growth step of the output buffer.
const BUFFER_INCR: usize = 0x10;

/// Circular history of recent element widths.
#[derive(Debug, Clone, Default)]
pub struct WidthHistory {
    w: [u32; DECODE_WINDOW],
    idx: u8,
    s6: u32,
}

impl WidthHistory {
    /// Width `offset` elements back; 0 is the newest.
    #[inline]
    pub fn width(&self, offset: u8) -> u32 {
        self.w[(self.idx.wrapping_sub(offset) as usize) & (DECODE_WINDOW - 1)]
    }

    /// Bar+space pair width starting at `offset`.
    #[inline]
    pub fn pair_width(&self, offset: u8) -> u32 {
        self.width(offset) + self.width(offset + 1)
    }

    /// Sum of `n` widths starting at `offset`.
    #[inline]
    pub fn calc_s(&self, offset: u8, n: u8) -> u32 {
        (offset..offset + n).map(|i| self.width(i)).sum()
    }

    /// Color of the newest element.
    #[inline]
    pub fn color(&self) -> Color {
        if self.idx & 1 == 0 {
            Color::Space
        } else {
            Color::Bar
        }
    }

    /// Rolling sum of the six widths preceding the newest one.
    #[inline]
    pub fn s6(&self) -> u32 {
        self.s6
    }

    fn push(&mut self, w: u32) {
        self.w[(self.idx as usize) & (DECODE_WINDOW - 1)] = w;
        self.s6 = self.s6.wrapping_sub(self.width(7)).wrapping_add(self.width(1));
    }

    fn advance(&mut self) {
        self.idx = self.idx.wrapping_add(1);
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Fixed character width decode assist.
///
/// Quantizes the bar+space pair width `e` against the character width `s`
/// of a symbology whose characters span `n` units. Returns the number of
/// units minus two, or `None` when out of range.
#[inline]
pub fn decode_e(e: u32, s: u32, n: u32) -> Option<u32> {
    if s == 0 {
        return None;
    }
    let v = (e as u64 * n as u64 * 2 + 1) / s as u64;
    if v < 3 {
        return None;
    }
    let e = ((v - 3) / 2) as u32;
    if e >= n - 3 { None } else { Some(e) }
}

/// Ownership of the shared output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lock {
    /// No symbology is writing
    #[default]
    Idle,
    /// The named symbology owns the buffer until it completes or resets
    Locked(SymbolType),
}

/// Output buffer shared by all symbologies plus per-result metadata.
#[derive(Debug, Clone)]
pub struct DecodeBuffer {
    pub(crate) data: Vec<u8>,
    lock: Lock,
    pub(crate) modifiers: u32,
    pub(crate) direction: i32,
}

impl Default for DecodeBuffer {
    fn default() -> Self {
        Self {
            data: Vec::with_capacity(BUFFER_MIN),
            lock: Lock::Idle,
            modifiers: 0,
            direction: 0,
        }
    }
}

impl DecodeBuffer {
    /// Current lock state.
    pub fn lock(&self) -> Lock {
        self.lock
    }

    /// Take the buffer for `req`. Fails if another symbology holds it.
    pub fn acquire(&mut self, req: SymbolType) -> bool {
        match self.lock {
            Lock::Idle => {
                self.lock = Lock::Locked(req);
                true
            }
            Lock::Locked(owner) => owner == req,
        }
    }

    /// Release the buffer held by `req`.
    ///
    /// # Panics
    /// If the buffer is not locked by `req`; that is a decoder logic bug.
    pub fn release(&mut self, req: SymbolType) {
        assert_eq!(
            self.lock,
            Lock::Locked(req),
            "decode buffer released by {:?} while held by {:?}",
            req,
            self.lock
        );
        self.lock = Lock::Idle;
    }

    /// Release only when `req` holds the lock; used by symbology resets.
    pub(crate) fn release_if_owner(&mut self, req: SymbolType) {
        if self.lock == Lock::Locked(req) {
            self.lock = Lock::Idle;
        }
    }

    /// True when `req` currently owns the buffer.
    pub fn is_owner(&self, req: SymbolType) -> bool {
        self.lock == Lock::Locked(req)
    }

    /// Make room for `len` bytes. Returns false when the request exceeds the
    /// buffer limit; the caller must abandon its decode.
    pub(crate) fn size_buf(&mut self, len: usize) -> bool {
        if len <= self.data.capacity() {
            return true;
        }
        if len > BUFFER_MAX {
            warn!(len, max = BUFFER_MAX, "decode buffer limit exceeded, dropping symbol");
            return false;
        }
        let target = (self.data.capacity() + BUFFER_INCR).max(len).min(BUFFER_MAX);
        self.data.reserve_exact(target - self.data.len());
        true
    }

    /// Replace the buffer contents.
    pub(crate) fn set_data(&mut self, bytes: &[u8]) -> bool {
        if !self.size_buf(bytes.len()) {
            return false;
        }
        self.data.clear();
        self.data.extend_from_slice(bytes);
        true
    }

    fn clear(&mut self) {
        self.data.clear();
        self.lock = Lock::Idle;
        self.modifiers = 0;
        self.direction = 0;
    }
}

/// One symbology state machine fed from the shared width history.
pub(crate) trait Symbology {
    /// Process the newest width.
    fn decode(&mut self, hist: &WidthHistory, buf: &mut DecodeBuffer) -> SymbolType;

    /// Clear all state.
    fn reset(&mut self);

    /// Start of a new scan line; by default a full reset.
    fn new_scan(&mut self) {
        self.reset();
    }
}

/// Callback invoked on every decoded result.
pub type DecodeHandler = Box<dyn FnMut(&Decoder)>;

/// Bar width stream decoder.
pub struct Decoder {
    hist: WidthHistory,
    buf: DecodeBuffer,
    symbol_type: SymbolType,
    handler: Option<DecodeHandler>,

    qrf: qr_finder::QrFinder,
    ean: ean::EanDecoder,
    code39: code39::Code39Decoder,
    code93: code93::Code93Decoder,
    code128: code128::Code128Decoder,
    databar: databar::DataBarDecoder,
    codabar: codabar::CodabarDecoder,
    i25: i25::I25Decoder,
    pdf417: pdf417::Pdf417Decoder,
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("idx", &self.hist.idx)
            .field("symbol_type", &self.symbol_type)
            .field("lock", &self.buf.lock)
            .field("data", &self.buf.data)
            .finish_non_exhaustive()
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// Decoder with the default symbology configuration.
    pub fn new() -> Self {
        Self {
            hist: WidthHistory::default(),
            buf: DecodeBuffer::default(),
            symbol_type: SymbolType::None,
            handler: None,
            qrf: qr_finder::QrFinder::default(),
            ean: ean::EanDecoder::default(),
            code39: code39::Code39Decoder::default(),
            code93: code93::Code93Decoder::default(),
            code128: code128::Code128Decoder::default(),
            databar: databar::DataBarDecoder::default(),
            codabar: codabar::CodabarDecoder::default(),
            i25: i25::I25Decoder::default(),
            pdf417: pdf417::Pdf417Decoder::default(),
        }
    }

    /// Install the result callback.
    pub fn set_handler(&mut self, handler: impl FnMut(&Decoder) + 'static) {
        self.handler = Some(Box::new(handler));
    }

    /// Remove the result callback.
    pub fn clear_handler(&mut self) -> Option<DecodeHandler> {
        self.handler.take()
    }

    fn symbologies(&mut self) -> [&mut dyn Symbology; 9] {
        [
            &mut self.qrf,
            &mut self.ean,
            &mut self.code39,
            &mut self.code93,
            &mut self.code128,
            &mut self.databar,
            &mut self.codabar,
            &mut self.i25,
            &mut self.pdf417,
        ]
    }

    /// Hard reset: all symbology state and the output buffer.
    pub fn reset(&mut self) {
        self.hist.clear();
        self.buf.clear();
        self.symbol_type = SymbolType::None;
        for sym in self.symbologies() {
            sym.reset();
        }
    }

    /// Soft reset at the start of a scan line.
    ///
    /// Clears the width history and the buffer lock; EAN and DataBar keep
    /// partial results so halves found on different lines can combine.
    pub fn new_scan(&mut self) {
        self.hist.clear();
        self.buf.lock = Lock::Idle;
        for sym in self.symbologies() {
            sym.new_scan();
        }
    }

    /// Process the next element width.
    pub fn decode_width(&mut self, w: u32) -> SymbolType {
        self.hist.push(w);

        let mut sym = SymbolType::None;
        {
            let Decoder {
                hist,
                buf,
                qrf,
                ean,
                code39,
                code93,
                code128,
                databar,
                codabar,
                i25,
                pdf417,
                ..
            } = self;
            let order: [(bool, &mut dyn Symbology); 9] = [
                (qrf.config.enabled(), qrf),
                (ean.enabled(), ean),
                (code39.config.enabled(), code39),
                (code93.config.enabled(), code93),
                (code128.config.enabled(), code128),
                (databar.enabled(), databar),
                (codabar.config.enabled(), codabar),
                (i25.config.enabled(), i25),
                (pdf417.config.enabled(), pdf417),
            ];
            for (enabled, decoder) in order {
                if !enabled {
                    continue;
                }
                let tmp = decoder.decode(hist, buf);
                if tmp > SymbolType::Partial {
                    // a finished 1-D symbol outranks a finder line on the same width
                    if sym <= SymbolType::Partial || sym == SymbolType::QrCode {
                        sym = tmp;
                    } else {
                        // lost on priority; drop its claim on the buffer
                        buf.release_if_owner(tmp);
                    }
                } else if tmp == SymbolType::Partial && sym == SymbolType::None {
                    sym = tmp;
                }
            }
        }

        self.hist.advance();
        self.symbol_type = sym;
        if sym != SymbolType::None {
            if sym > SymbolType::Partial && sym != SymbolType::QrCode && self.buf.lock != Lock::Idle
            {
                self.buf.release(sym);
            }
            if let Some(mut handler) = self.handler.take() {
                handler(self);
                self.handler = Some(handler);
            }
        }
        sym
    }

    /// Type of the last result.
    pub fn symbol_type(&self) -> SymbolType {
        self.symbol_type
    }

    /// Decoded data of the last result. Empty for a QR finder line, whose
    /// output is [`Decoder::qr_finder_line`].
    pub fn data(&self) -> &[u8] {
        if self.symbol_type == SymbolType::QrCode {
            return &[];
        }
        &self.buf.data
    }

    /// Modifier bits of the last result.
    pub fn modifiers(&self) -> u32 {
        if self.symbol_type == SymbolType::QrCode {
            return 0;
        }
        self.buf.modifiers
    }

    /// Direction of the last result: 1 forward, -1 reverse, 0 unknown.
    pub fn direction(&self) -> i32 {
        if self.symbol_type == SymbolType::QrCode {
            return 0;
        }
        self.buf.direction
    }

    /// Color of the newest element.
    pub fn color(&self) -> Color {
        self.hist.color()
    }

    /// Current lock state of the output buffer.
    pub fn lock(&self) -> Lock {
        self.buf.lock
    }

    /// Last QR finder line, in decoder-relative offsets.
    pub fn qr_finder_line(&self) -> &FinderLine {
        &self.qrf.line
    }

    fn config_ref(&self, sym: SymbolType) -> Option<&SymbologyConfig> {
        Some(match sym {
            SymbolType::Ean2
            | SymbolType::Ean5
            | SymbolType::Ean8
            | SymbolType::Upce
            | SymbolType::Isbn10
            | SymbolType::Upca
            | SymbolType::Ean13
            | SymbolType::Isbn13 => self.ean.config(sym)?,
            SymbolType::I25 => &self.i25.config,
            SymbolType::DataBar => &self.databar.config,
            SymbolType::DataBarExp => &self.databar.config_exp,
            SymbolType::Codabar => &self.codabar.config,
            SymbolType::Code39 => &self.code39.config,
            SymbolType::Code93 => &self.code93.config,
            SymbolType::Code128 => &self.code128.config,
            SymbolType::Pdf417 => &self.pdf417.config,
            SymbolType::QrCode => &self.qrf.config,
            SymbolType::None | SymbolType::Partial | SymbolType::Composite => return None,
        })
    }

    fn config_mut(&mut self, sym: SymbolType) -> Option<&mut SymbologyConfig> {
        Some(match sym {
            SymbolType::Ean2
            | SymbolType::Ean5
            | SymbolType::Ean8
            | SymbolType::Upce
            | SymbolType::Isbn10
            | SymbolType::Upca
            | SymbolType::Ean13
            | SymbolType::Isbn13 => self.ean.config_mut(sym)?,
            SymbolType::I25 => &mut self.i25.config,
            SymbolType::DataBar => &mut self.databar.config,
            SymbolType::DataBarExp => &mut self.databar.config_exp,
            SymbolType::Codabar => &mut self.codabar.config,
            SymbolType::Code39 => &mut self.code39.config,
            SymbolType::Code93 => &mut self.code93.config,
            SymbolType::Code128 => &mut self.code128.config,
            SymbolType::Pdf417 => &mut self.pdf417.config,
            SymbolType::QrCode => &mut self.qrf.config,
            SymbolType::None | SymbolType::Partial | SymbolType::Composite => return None,
        })
    }

    /// Set a decoder option. `SymbolType::None` applies it to every
    /// symbology that supports it.
    pub fn set_config(&mut self, sym: SymbolType, config: Config, value: i32) -> Result<()> {
        if config.value() >= Config::Uncertainty.value() {
            return Err(ScanError::UnsupportedConfig {
                symbology: sym,
                config,
            });
        }
        if sym == SymbolType::None {
            for s in SymbolType::ALL {
                if let Some(cfg) = self.config_mut(s) {
                    cfg.set(config, value)?;
                }
            }
        } else {
            self.config_mut(sym)
                .ok_or(ScanError::UnsupportedConfig {
                    symbology: sym,
                    config,
                })?
                .set(config, value)?;
        }
        self.ean.update_enable();
        Ok(())
    }

    /// Read a decoder option.
    pub fn get_config(&self, sym: SymbolType, config: Config) -> Result<i32> {
        self.config_ref(sym)
            .and_then(|cfg| cfg.get(config))
            .ok_or(ScanError::UnsupportedConfig {
                symbology: sym,
                config,
            })
    }

    /// Boolean config bits of a symbology (0 when unknown).
    pub fn configs(&self, sym: SymbolType) -> u32 {
        self.config_ref(sym).map(|c| c.flags()).unwrap_or(0)
    }
}

/// Sort indices of `n` widths starting at `offset` by ascending width,
/// packed as 4-bit fields with the narrowest in the low nibble.
pub(crate) fn decode_sortn(hist: &WidthHistory, n: u8, offset: u8) -> u32 {
    let mut idx: Vec<u8> = (0..n).collect();
    idx.sort_by_key(|&i| (hist.width(offset + i), i));
    idx.iter()
        .enumerate()
        .fold(0u32, |acc, (pos, &i)| acc | ((i as u32) << (pos * 4)))
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    /// Feed module widths and return the 1-D results, leaving out QR finder
    /// lines.
    pub fn feed(dcode: &mut Decoder, modules: &[u32], unit: u32) -> Vec<(SymbolType, Vec<u8>)> {
        feed_all(dcode, modules, unit)
            .into_iter()
            .filter(|(sym, _)| *sym != SymbolType::QrCode)
            .collect()
    }

    /// Feed module widths (in samples) as fixed-point element widths, starting
    /// with a leading quiet zone, and return every result above `Partial`.
    pub fn feed_all(dcode: &mut Decoder, modules: &[u32], unit: u32) -> Vec<(SymbolType, Vec<u8>)> {
        let mut out = Vec::new();
        dcode.new_scan();
        let mut push = |dcode: &mut Decoder, w: u32| {
            let sym = dcode.decode_width(w);
            if sym > SymbolType::Partial {
                out.push((sym, dcode.data().to_vec()));
            }
        };
        // leading space of the quiet zone
        push(dcode, 20 * unit * 32);
        for &m in modules {
            push(dcode, m * unit * 32);
        }
        push(dcode, 20 * unit * 32);
        push(dcode, 0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_e_quantization() {
        // pair of 2 units in a 7 unit character of width 70
        assert_eq!(decode_e(20, 70, 7), Some(0));
        assert_eq!(decode_e(40, 70, 7), Some(2));
        assert_eq!(decode_e(70, 70, 7), None);
        assert_eq!(decode_e(5, 70, 7), None);
        assert_eq!(decode_e(10, 0, 7), None);
    }

    #[test]
    fn test_history_wraps() {
        let mut h = WidthHistory::default();
        for i in 0..20u32 {
            h.push(i + 1);
            h.advance();
        }
        // newest pushed width is one behind idx after advance
        assert_eq!(h.width(1), 20);
        assert_eq!(h.width(16), 5);
        assert_eq!(h.calc_s(1, 3), 20 + 19 + 18);
    }

    #[test]
    fn test_lock_discipline() {
        let mut buf = DecodeBuffer::default();
        assert!(buf.acquire(SymbolType::Code39));
        assert!(!buf.acquire(SymbolType::Code128));
        assert!(buf.is_owner(SymbolType::Code39));
        buf.release(SymbolType::Code39);
        assert_eq!(buf.lock(), Lock::Idle);
    }

    #[test]
    #[should_panic(expected = "decode buffer released")]
    fn test_release_by_wrong_owner_panics() {
        let mut buf = DecodeBuffer::default();
        assert!(buf.acquire(SymbolType::Code39));
        buf.release(SymbolType::Code93);
    }

    #[test]
    fn test_size_buf_limit() {
        let mut buf = DecodeBuffer::default();
        assert!(buf.size_buf(BUFFER_MAX));
        assert!(!buf.size_buf(BUFFER_MAX + 1));
        assert!(buf.set_data(b"abc"));
        assert_eq!(buf.data, b"abc");
    }

    #[test]
    fn test_config_roundtrip() {
        let mut dcode = Decoder::new();
        assert_eq!(dcode.get_config(SymbolType::Code39, Config::Enable).unwrap(), 1);
        dcode.set_config(SymbolType::Code39, Config::Enable, 0).unwrap();
        assert_eq!(dcode.get_config(SymbolType::Code39, Config::Enable).unwrap(), 0);
        dcode.set_config(SymbolType::None, Config::Enable, 1).unwrap();
        assert_eq!(dcode.get_config(SymbolType::Pdf417, Config::Enable).unwrap(), 1);
        assert!(dcode.set_config(SymbolType::Composite, Config::Enable, 1).is_err());
        assert!(dcode.set_config(SymbolType::Code39, Config::XDensity, 1).is_err());
    }

    #[test]
    fn test_sortn() {
        let mut h = WidthHistory::default();
        for w in [5u32, 1, 3] {
            h.push(w);
            h.advance();
        }
        // offsets: 1 -> 3, 2 -> 1, 3 -> 5
        let sorted = decode_sortn(&h, 3, 1);
        assert_eq!(sorted & 0xf, 1);
        assert_eq!((sorted >> 4) & 0xf, 0);
        assert_eq!((sorted >> 8) & 0xf, 2);
    }

    #[test]
    fn test_handler_fires() {
        use std::cell::RefCell;
        use std::rc::Rc;
        let hits = Rc::new(RefCell::new(Vec::new()));
        let sink = hits.clone();
        let mut dcode = Decoder::new();
        dcode.set_handler(move |d| sink.borrow_mut().push(d.symbol_type()));
        // 1:1:3:1:1 finder run followed by a space
        let run = [4u32, 4, 4, 12, 4, 4, 4];
        dcode.new_scan();
        for w in run {
            dcode.decode_width(w * 32);
        }
        assert!(hits.borrow().contains(&SymbolType::QrCode));
    }
}
