//! Image scanner.
//!
//! Drives the edge scanner and width decoder over the rows and columns of a
//! grayscale image, collects what they decode into [`Symbol`]s, hands the
//! QR finder lines to the QR reader and filters the result. An optional
//! cache suppresses symbols until they have been seen in enough
//! consecutive images.

mod cache;
mod raster;

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, trace};

use crate::config;
use crate::decoder::{Decoder, FinderLine};
use crate::error::{Result, ScanError};
use crate::models::{Config, Orientation, PointI, Symbol, SymbolSet, SymbolType, parse_config};
use crate::qr::{self, FINDER_SUBPREC, QrReader};
use crate::scanner::Scanner;
use cache::SymbolCache;

pub use raster::Image;

/// Low quality 1-D results are dropped below this many sightings.
const MIN_QUALITY: i32 = 4;

/// Scan pass state: direction along the line and its fixed coordinate.
#[derive(Debug, Clone, Copy, Default)]
struct Pass {
    dx: i32,
    dy: i32,
    du: i32,
    umin: i32,
    v: i32,
}

/// Scans whole images for every enabled symbology.
#[derive(Debug)]
pub struct ImageScanner {
    scanner: Scanner,
    qr: QrReader,
    cache: Option<SymbolCache>,
    epoch: Instant,
    uncertainty: HashMap<SymbolType, i32>,
    x_density: i32,
    y_density: i32,
    position: bool,
    ean_composite: bool,

    pass: Pass,
    now: u64,
    syms: Vec<Symbol>,
    results: SymbolSet,
}

impl Default for ImageScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageScanner {
    /// Scanner with the default decoder configuration: densities 1, positions
    /// recorded, no cache.
    pub fn new() -> Self {
        let mut uncertainty: HashMap<SymbolType, i32> = SymbolType::ALL
            .iter()
            .filter(|&&s| s > SymbolType::Partial)
            .map(|&s| (s, 2))
            .collect();
        for sym in [
            SymbolType::QrCode,
            SymbolType::Code128,
            SymbolType::Code93,
            SymbolType::Code39,
            SymbolType::Composite,
        ] {
            uncertainty.insert(sym, 0);
        }
        uncertainty.insert(SymbolType::Codabar, 1);
        Self {
            scanner: Scanner::new(Decoder::new()),
            qr: QrReader::new(),
            cache: None,
            epoch: Instant::now(),
            uncertainty,
            x_density: 1,
            y_density: 1,
            position: true,
            ean_composite: false,
            pass: Pass::default(),
            now: 0,
            syms: Vec::new(),
            results: SymbolSet::default(),
        }
    }

    /// Set a (symbology, option) pair. `SymbolType::None` applies the option
    /// to every symbology; densities and `Position` only take `None`.
    pub fn set_config(&mut self, sym: SymbolType, config: Config, value: i32) -> Result<()> {
        if matches!(sym, SymbolType::None | SymbolType::Composite) && config == Config::Enable {
            self.ean_composite = value != 0;
            if sym == SymbolType::Composite {
                return Ok(());
            }
        }
        if config.value() < Config::Uncertainty.value() {
            return match self.scanner.decoder_mut() {
                Some(dcode) => dcode.set_config(sym, config, value),
                None => Err(ScanError::UnsupportedConfig { symbology: sym, config }),
            };
        }
        if config == Config::Uncertainty {
            if value < 0 {
                return Err(ScanError::InvalidValue { config, value });
            }
            if sym > SymbolType::Partial {
                self.uncertainty.insert(sym, value);
            } else {
                for u in self.uncertainty.values_mut() {
                    *u = value;
                }
            }
            return Ok(());
        }
        if sym > SymbolType::Partial {
            return Err(ScanError::UnsupportedConfig { symbology: sym, config });
        }
        match config {
            Config::XDensity => self.x_density = value,
            Config::YDensity => self.y_density = value,
            Config::Position => match value {
                0 | 1 => self.position = value == 1,
                _ => return Err(ScanError::InvalidValue { config, value }),
            },
            _ => return Err(ScanError::UnsupportedConfig { symbology: sym, config }),
        }
        Ok(())
    }

    /// Apply a textual setting such as `ean13.disable` or `*.y-density=2`.
    pub fn parse_config(&mut self, setting: &str) -> Result<()> {
        let (sym, config, value) = parse_config(setting)?;
        self.set_config(sym, config, value)
    }

    /// Current value of a (symbology, option) pair.
    pub fn get_config(&self, sym: SymbolType, config: Config) -> Result<i32> {
        if config.value() < Config::Uncertainty.value() {
            return match self.scanner.decoder() {
                Some(dcode) => dcode.get_config(sym, config),
                None => Err(ScanError::UnsupportedConfig { symbology: sym, config }),
            };
        }
        match config {
            Config::Uncertainty => self
                .uncertainty
                .get(&sym)
                .copied()
                .ok_or(ScanError::UnsupportedConfig { symbology: sym, config }),
            Config::XDensity if sym <= SymbolType::Partial => Ok(self.x_density),
            Config::YDensity if sym <= SymbolType::Partial => Ok(self.y_density),
            Config::Position if sym <= SymbolType::Partial => Ok(self.position as i32),
            _ => Err(ScanError::UnsupportedConfig { symbology: sym, config }),
        }
    }

    /// Turn the inter-image cache on or off. Either way it starts empty.
    pub fn enable_cache(&mut self, enable: bool) {
        self.cache = enable.then(|| SymbolCache::new(config::cache_timeout_ms()));
    }

    /// Symbols reported by the last scan.
    pub fn results(&self) -> &SymbolSet {
        &self.results
    }

    /// Scan an image, timestamped with the scanner's monotonic clock.
    /// Returns the number of symbols reported.
    pub fn scan_image(&mut self, image: &Image) -> usize {
        let now = self.epoch.elapsed().as_millis() as u64;
        self.scan_image_at(image, now)
    }

    /// Scan an image taken at `now` milliseconds. Only the cache looks at
    /// the time.
    pub fn scan_image_at(&mut self, image: &Image, now: u64) -> usize {
        self.scan_gray(image.data(), image.width(), image.height(), now)
    }

    /// Scan a grayscale buffer without copying it into an [`Image`].
    pub fn scan_luma(&mut self, gray: &[u8], width: usize, height: usize) -> Result<usize> {
        let expected = width.saturating_mul(height);
        if gray.len() < expected {
            return Err(ScanError::InvalidImage {
                width,
                height,
                expected,
                actual: gray.len(),
            });
        }
        let now = self.epoch.elapsed().as_millis() as u64;
        Ok(self.scan_gray(&gray[..expected], width, height, now))
    }

    /// Convert packed RGB to grayscale and scan it.
    pub fn scan_rgb(&mut self, rgb: &[u8], width: usize, height: usize) -> Result<usize> {
        let image = Image::from_rgb(rgb, width, height)?;
        Ok(self.scan_image(&image))
    }

    fn scan_gray(&mut self, gray: &[u8], width: usize, height: usize, now: u64) -> usize {
        self.now = now;
        self.syms.clear();
        self.qr.reset();
        let sym = self.scanner.new_scan();
        self.handle(sym);

        let (w, h) = (width as i32, height as i32);
        if self.y_density > 0 {
            self.scan_rows(gray, width, w, h);
        }
        if self.x_density > 0 {
            self.scan_columns(gray, width, w, h);
        }
        self.pass = Pass::default();
        let (hlines, vlines) = self.qr.line_counts();
        trace!(hlines, vlines, "finder lines collected");

        for sym in qr::decode_symbols(&mut self.qr, gray, width, height) {
            self.add_symbol(sym);
        }
        self.filter();

        let reported: Vec<Rc<Symbol>> = std::mem::take(&mut self.syms)
            .into_iter()
            .filter(|s| s.cache_count >= 0)
            .map(Rc::new)
            .collect();
        debug!(symbols = reported.len(), width, height, "image scanned");
        self.results = SymbolSet::from_symbols(reported);
        self.results.len()
    }

    fn scan_rows(&mut self, gray: &[u8], width: usize, w: i32, h: i32) {
        let density = self.y_density;
        let mut y = (((h - 1) % density + 1) / 2).min(h / 2);
        while y < h {
            let row = &gray[y as usize * width..][..width];
            self.pass = Pass { dx: 1, dy: 0, du: 1, umin: 0, v: y };
            for &p in row {
                self.sample(p);
            }
            self.end_line();

            y += density;
            if y >= h {
                break;
            }
            let row = &gray[y as usize * width..][..width];
            self.pass = Pass { dx: -1, dy: 0, du: -1, umin: w, v: y };
            for &p in row.iter().rev() {
                self.sample(p);
            }
            self.end_line();
            y += density;
        }
    }

    fn scan_columns(&mut self, gray: &[u8], width: usize, w: i32, h: i32) {
        let density = self.x_density;
        let mut x = (((w - 1) % density + 1) / 2).min(w / 2);
        while x < w {
            let column = gray.iter().skip(x as usize).step_by(width);
            self.pass = Pass { dx: 0, dy: 1, du: 1, umin: 0, v: x };
            for &p in column {
                self.sample(p);
            }
            self.end_line();

            x += density;
            if x >= w {
                break;
            }
            let column = gray.iter().skip(x as usize).step_by(width);
            self.pass = Pass { dx: 0, dy: -1, du: -1, umin: h, v: x };
            for &p in column.rev() {
                self.sample(p);
            }
            self.end_line();
            x += density;
        }
    }

    #[inline]
    fn sample(&mut self, p: u8) {
        let sym = self.scanner.scan_y(p as i32);
        if sym != SymbolType::None {
            self.handle(sym);
        }
    }

    /// Drain the line. Each step may finish a symbol, so each is handled
    /// while the edge positions still describe it.
    fn end_line(&mut self) {
        for _ in 0..2 {
            let sym = self.scanner.flush();
            self.handle(sym);
        }
        let sym = self.scanner.new_scan();
        self.handle(sym);
    }

    fn handle(&mut self, sym: SymbolType) {
        if sym <= SymbolType::Partial {
            return;
        }
        let Some(dcode) = self.scanner.decoder() else {
            return;
        };
        if sym == SymbolType::QrCode {
            let line = *dcode.qr_finder_line();
            self.found_finder_line(line);
            return;
        }
        let pass = self.pass;
        let point = self.position.then(|| {
            let u = pass.umin + pass.du * self.scanner.get_edge(self.scanner.width(), 0) as i32;
            if pass.dx != 0 { (u, pass.v) } else { (pass.v, u) }
        });

        let data = dcode.data();
        if let Some(dup) = self
            .syms
            .iter_mut()
            .find(|s| s.symbol_type == sym && s.data == data)
        {
            dup.quality += 1;
            if let Some((x, y)) = point {
                dup.add_point(x, y);
            }
            return;
        }

        let mut symbol = Symbol::new(sym, data.to_vec());
        symbol.configs = dcode.configs(sym);
        symbol.modifiers = dcode.modifiers();
        if let Some((x, y)) = point {
            symbol.add_point(x, y);
        }
        let dir = dcode.direction();
        if dir != 0 {
            symbol.orientation = Orientation::from_code(i32::from(pass.dy != 0) + ((pass.du ^ dir) & 2));
        }
        trace!(symbol = %sym, "decoded");
        self.add_symbol(symbol);
    }

    /// Convert a finder line from scan offsets to image quarter pixels.
    fn found_finder_line(&mut self, mut line: FinderLine) {
        let pass = self.pass;
        let edge = |offset: i32| self.scanner.get_edge(offset as u32, FINDER_SUBPREC) as i32;
        let mut u = edge(line.pos[0]);
        line.boffs = u - edge(line.boffs);
        line.len = edge(line.len);
        line.eoffs = edge(line.eoffs) - line.len;
        line.len -= u;

        u = (pass.umin << FINDER_SUBPREC) + pass.du * u;
        if pass.du < 0 {
            std::mem::swap(&mut line.boffs, &mut line.eoffs);
            u -= line.len;
        }
        let vertical = pass.dx == 0;
        line.pos[usize::from(vertical)] = u;
        line.pos[usize::from(!vertical)] = (pass.v << FINDER_SUBPREC) + (1 << (FINDER_SUBPREC - 1));
        self.qr.found_line(vertical, line);
    }

    fn add_symbol(&mut self, mut sym: Symbol) {
        if let Some(cache) = self.cache.as_mut() {
            let uncertainty = self.uncertainty.get(&sym.symbol_type).copied().unwrap_or(0);
            sym.cache_count = cache.sighting(sym.symbol_type, &sym.data, self.now, uncertainty);
        }
        self.syms.push(sym);
    }

    /// Drop weak 1-D reads and join an EAN with its add-on.
    fn filter(&mut self) {
        let strict = self.cache.is_none() && (self.x_density == 1 || self.y_density == 1);
        let mut kept = Vec::with_capacity(self.syms.len());
        for sym in std::mem::take(&mut self.syms) {
            let t = sym.symbol_type;
            let weak_kind = t.is_ean_family()
                || matches!(t, SymbolType::DataBar | SymbolType::DataBarExp | SymbolType::Codabar);
            if sym.cache_count <= 0
                && weak_kind
                && (t == SymbolType::Codabar || strict)
                && sym.quality < MIN_QUALITY
            {
                debug!(symbol = %t, quality = sym.quality, "dropped low quality read");
                if let Some(cache) = self.cache.as_mut() {
                    cache.revert(t, &sym.data);
                }
                continue;
            }
            kept.push(sym);
        }
        self.syms = kept;

        if self.ean_composite {
            self.merge_addon();
        }
    }

    fn merge_addon(&mut self) {
        let counted = |s: &Symbol| s.symbol_type.is_ean_family() && s.symbol_type != SymbolType::Isbn10;
        let eans: Vec<usize> = (0..self.syms.len())
            .filter(|&i| counted(&self.syms[i]) && self.syms[i].symbol_type > SymbolType::Ean5)
            .collect();
        let addons: Vec<usize> = (0..self.syms.len())
            .filter(|&i| counted(&self.syms[i]) && self.syms[i].symbol_type <= SymbolType::Ean5)
            .collect();
        let (&[ean_idx], &[addon_idx]) = (eans.as_slice(), addons.as_slice()) else {
            return;
        };
        // remove the later index first so the earlier one stays valid
        let (first, second) = (ean_idx.min(addon_idx), ean_idx.max(addon_idx));
        let b = self.syms.remove(second);
        let a = self.syms.remove(first);
        let (ean, addon) = if ean_idx < addon_idx { (a, b) } else { (b, a) };

        let mut data = ean.data.clone();
        data.extend_from_slice(&addon.data);
        let mut composite = Symbol::new(SymbolType::Composite, data);
        composite.orientation = ean.orientation;
        composite.components = Some(SymbolSet::from_symbols(vec![Rc::new(ean), Rc::new(addon)]));
        debug!("merged EAN with add-on");
        self.add_symbol(composite);
    }
}

/// Owned copy of a decoded symbol, for results that cross threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// Symbology
    pub symbol_type: SymbolType,
    /// Decoded bytes
    pub data: Vec<u8>,
    /// Number of scan lines that read the symbol
    pub quality: i32,
    /// Positions the symbol was read at
    pub points: Vec<PointI>,
    /// Coarse orientation
    pub orientation: Orientation,
    /// Modifier bits
    pub modifiers: u32,
    /// Inter-image sighting count
    pub cache_count: i32,
    /// Components of a composite or merged structured append symbol.
    pub components: Vec<ScanResult>,
}

impl ScanResult {
    /// Data as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

impl From<&Symbol> for ScanResult {
    fn from(sym: &Symbol) -> Self {
        Self {
            symbol_type: sym.symbol_type,
            data: sym.data.clone(),
            quality: sym.quality,
            points: sym.points.clone(),
            orientation: sym.orientation,
            modifiers: sym.modifiers,
            cache_count: sym.cache_count,
            components: sym
                .components
                .as_ref()
                .map(|set| set.iter().map(|s| ScanResult::from(s.as_ref())).collect())
                .unwrap_or_default(),
        }
    }
}

/// Scan independent images in parallel, one scanner per image, each
/// configured with `settings` in order.
pub fn scan_batch(images: &[Image], settings: &[(SymbolType, Config, i32)]) -> Result<Vec<Vec<ScanResult>>> {
    images
        .par_iter()
        .map(|image| {
            let mut scanner = ImageScanner::new();
            for &(sym, config, value) in settings {
                scanner.set_config(sym, config, value)?;
            }
            scanner.scan_image(image);
            Ok(scanner.results().iter().map(|s| ScanResult::from(s.as_ref())).collect())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::code128::tests::code128_modules;
    use crate::decoder::ean::tests::ean13_modules;

    /// Rows of bars: `modules` starts with a bar, each module `unit` pixels
    /// wide, with a white quiet zone on both sides.
    fn barcode_image(modules: &[u32], unit: usize, height: usize) -> Image {
        let quiet = 12 * unit;
        let mut row = vec![255u8; quiet];
        for (i, &m) in modules.iter().enumerate() {
            let v = if i % 2 == 0 { 0 } else { 255 };
            row.extend(std::iter::repeat_n(v, m as usize * unit));
        }
        row.extend(std::iter::repeat_n(255, quiet));
        let width = row.len();
        let data: Vec<u8> = (0..height).flat_map(|_| row.iter().copied()).collect();
        Image::new(data, width, height).unwrap()
    }

    fn transpose(img: &Image) -> Image {
        let (w, h) = (img.width(), img.height());
        let data = (0..w)
            .flat_map(|x| (0..h).map(move |y| (x, y)))
            .map(|(x, y)| img.data()[y * w + x])
            .collect();
        Image::new(data, h, w).unwrap()
    }

    fn ean_image(height: usize) -> Image {
        barcode_image(&ean13_modules("5901234123457"), 2, height)
    }

    #[test]
    fn test_ean13_rows_accumulate_quality() {
        let mut scanner = ImageScanner::new();
        assert_eq!(scanner.scan_image(&ean_image(10)), 1);
        let sym = &scanner.results().symbols()[0];
        assert_eq!(sym.symbol_type(), SymbolType::Ean13);
        assert_eq!(sym.data(), b"5901234123457");
        assert_eq!(sym.quality(), 10);
        assert_eq!(sym.points().len(), 10);
        assert_eq!(sym.orientation(), Orientation::Up);
        assert_eq!(sym.cache_count(), 0);
        // points sit on the scanned rows
        let mut ys: Vec<i32> = sym.points().iter().map(|p| p.y).collect();
        ys.sort_unstable();
        assert_eq!(ys, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_vertical_symbol_orientation() {
        let mut scanner = ImageScanner::new();
        assert_eq!(scanner.scan_image(&transpose(&ean_image(8))), 1);
        let sym = &scanner.results().symbols()[0];
        assert_eq!(sym.orientation(), Orientation::Right);
        assert!(sym.points().iter().all(|p| (0..8).contains(&p.x)));
    }

    #[test]
    fn test_low_quality_ean_filtered() {
        let mut scanner = ImageScanner::new();
        assert_eq!(scanner.scan_image(&ean_image(3)), 0);
        // coarser densities turn the filter off
        scanner.set_config(SymbolType::None, Config::XDensity, 2).unwrap();
        scanner.set_config(SymbolType::None, Config::YDensity, 2).unwrap();
        assert_eq!(scanner.scan_image(&ean_image(3)), 1);
        assert_eq!(scanner.results().symbols()[0].quality(), 2);
    }

    #[test]
    fn test_code128_not_filtered() {
        let values: Vec<u8> = std::iter::once(104).chain(b"Scan-42".iter().map(|b| b - 32)).collect();
        let img = barcode_image(&code128_modules(&values), 2, 2);
        let mut scanner = ImageScanner::new();
        assert_eq!(scanner.scan_image(&img), 1);
        assert_eq!(scanner.results().symbols()[0].text(), "Scan-42");
    }

    #[test]
    fn test_position_disabled_and_disabled_symbology() {
        let mut scanner = ImageScanner::new();
        scanner.parse_config("position=0").unwrap();
        scanner.scan_image(&ean_image(6));
        assert!(scanner.results().symbols()[0].points().is_empty());
        scanner.parse_config("ean13.disable").unwrap();
        assert_eq!(scanner.scan_image(&ean_image(6)), 0);
    }

    #[test]
    fn test_config_routing() {
        let mut scanner = ImageScanner::new();
        assert_eq!(scanner.get_config(SymbolType::QrCode, Config::Uncertainty).unwrap(), 0);
        assert_eq!(scanner.get_config(SymbolType::Codabar, Config::Uncertainty).unwrap(), 1);
        assert_eq!(scanner.get_config(SymbolType::Ean13, Config::Uncertainty).unwrap(), 2);
        scanner.set_config(SymbolType::None, Config::Uncertainty, 3).unwrap();
        assert_eq!(scanner.get_config(SymbolType::QrCode, Config::Uncertainty).unwrap(), 3);
        assert!(scanner.set_config(SymbolType::Ean13, Config::XDensity, 2).is_err());
        assert!(scanner.set_config(SymbolType::None, Config::Position, 2).is_err());
        assert!(scanner.set_config(SymbolType::None, Config::Uncertainty, -1).is_err());
        scanner.set_config(SymbolType::Composite, Config::Enable, 1).unwrap();
        assert!(scanner.ean_composite);
        assert_eq!(scanner.get_config(SymbolType::None, Config::YDensity).unwrap(), 1);
        assert!(scanner.parse_config("bogus").is_err());
    }

    #[test]
    fn test_cache_confirms_after_uncertainty() {
        let mut scanner = ImageScanner::new();
        scanner.enable_cache(true);
        let img = ean_image(6);
        assert_eq!(scanner.scan_image_at(&img, 0), 0);
        assert_eq!(scanner.scan_image_at(&img, 100), 0);
        assert_eq!(scanner.scan_image_at(&img, 200), 1);
        assert_eq!(scanner.results().symbols()[0].cache_count(), 0);
        assert_eq!(scanner.scan_image_at(&img, 300), 1);
        assert_eq!(scanner.results().symbols()[0].cache_count(), 1);
        // past the timeout the symbol starts over
        assert_eq!(scanner.scan_image_at(&img, 10_000), 0);
    }

    #[test]
    fn test_composite_merge() {
        let mut scanner = ImageScanner::new();
        scanner.set_config(SymbolType::None, Config::XDensity, 2).unwrap();
        scanner.set_config(SymbolType::None, Config::YDensity, 2).unwrap();
        scanner.set_config(SymbolType::Composite, Config::Enable, 1).unwrap();
        let mut ean = Symbol::new(SymbolType::Ean13, b"9780306406157".to_vec());
        ean.orientation = Orientation::Down;
        scanner.syms.push(Symbol::new(SymbolType::Ean5, b"52495".to_vec()));
        scanner.syms.push(ean);
        scanner.syms.push(Symbol::new(SymbolType::Code39, b"X".to_vec()));
        scanner.filter();
        assert_eq!(scanner.syms.len(), 2);
        let composite = &scanner.syms[1];
        assert_eq!(composite.symbol_type, SymbolType::Composite);
        assert_eq!(composite.data, b"978030640615752495");
        assert_eq!(composite.orientation, Orientation::Down);
        let parts: Vec<SymbolType> = composite
            .components
            .as_ref()
            .unwrap()
            .iter()
            .map(|s| s.symbol_type())
            .collect();
        assert_eq!(parts, vec![SymbolType::Ean13, SymbolType::Ean5]);
    }

    #[test]
    fn test_batch_matches_serial() {
        let images = vec![ean_image(8), ean_image(2), transpose(&ean_image(5))];
        let out = scan_batch(&images, &[]).unwrap();
        let counts: Vec<usize> = out.iter().map(Vec::len).collect();
        assert_eq!(counts, vec![1, 0, 1]);
        assert_eq!(out[0][0].text(), "5901234123457");
        assert_eq!(out[2][0].orientation, Orientation::Right);
        let bad = scan_batch(&images, &[(SymbolType::Ean13, Config::XDensity, 1)]);
        assert!(bad.is_err());
    }

    #[test]
    fn test_scan_luma_and_rgb() {
        let img = ean_image(6);
        let mut scanner = ImageScanner::new();
        assert_eq!(scanner.scan_luma(img.data(), img.width(), img.height()).unwrap(), 1);
        assert!(scanner.scan_luma(img.data(), img.width() + 1, img.height()).is_err());
        let rgb: Vec<u8> = img.data().iter().flat_map(|&p| [p, p, p]).collect();
        assert_eq!(scanner.scan_rgb(&rgb, img.width(), img.height()).unwrap(), 1);
    }

    #[test]
    fn test_empty_image() {
        let mut scanner = ImageScanner::new();
        let img = Image::new(Vec::new(), 0, 0).unwrap();
        assert_eq!(scanner.scan_image(&img), 0);
        let blank = Image::new(vec![255; 64], 8, 8).unwrap();
        assert_eq!(scanner.scan_image(&blank), 0);
    }
}
