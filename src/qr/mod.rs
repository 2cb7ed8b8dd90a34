//! QR code reader.
//!
//! The image scanner feeds finder lines found by the 1-D decoder. Once an
//! image is done they are clustered into finder centers; triples of centers
//! are tried as upper-left, upper-right and lower-left corners of a symbol.
//! For each triple an affine frame gives rough module sizes, RANSAC line fits
//! along the finder edges and a walk down the last column and row give the
//! perspective, and a grid refined by the alignment patterns is sampled.
//! Codewords are Reed-Solomon corrected and parsed into data segments.

pub mod bch;
/// Adaptive thresholding of gray images
pub mod binarize;
pub mod data;
pub mod encode;
mod finder;
mod geometry;
mod grid;
mod lines;
mod ransac;
pub mod rs;
pub mod tables;
mod text;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, trace};

use crate::config;
use crate::decoder::FinderLine;
use crate::models::{BitMatrix, ECLevel, MaskPattern, Point, Symbol};
use finder::{
    Corner, Finder, LARGE_VERSION_SLACK, SMALL_VERSION_SLACK, fit_homography, read_format, read_version,
};
use geometry::{Affine, Homography};
use grid::{SamplingGrid, read_codewords};
use lines::{FinderCenter, locate_centers};
use rs::{Gf256, QR_PPOLY};
use tables::dimension;

pub use data::Entry;
pub use encode::{EncodeError, Segment, encode, encode_segments, render};

pub(crate) use lines::SUBPREC as FINDER_SUBPREC;
pub(crate) use text::extract_symbols;

/// One decoded QR symbol, before text assembly.
#[derive(Debug, Clone)]
pub struct QrCodeData {
    /// Data segments in stream order
    pub entries: Vec<Entry>,
    /// Symbol version, 1 to 40
    pub version: u8,
    /// Error correction level from the format field
    pub ec_level: ECLevel,
    /// Codewords fixed by error correction
    pub corrected: usize,
    /// `(index, size, parity)` of a structured append part
    pub structured_append: Option<(u8, u8, u8)>,
    /// Outer corners in pixels: upper-left, upper-right, lower-left,
    /// lower-right
    pub bbox: [Point; 4],
}

/// Collects finder lines for one image and decodes the symbols they reveal.
#[derive(Debug)]
pub struct QrReader {
    lines: [Vec<FinderLine>; 2],
    gf: Gf256,
    rng: StdRng,
}

impl Default for QrReader {
    fn default() -> Self {
        Self::new()
    }
}

impl QrReader {
    /// Reader with no collected lines.
    pub fn new() -> Self {
        Self {
            lines: [Vec::new(), Vec::new()],
            gf: Gf256::new(QR_PPOLY),
            rng: StdRng::seed_from_u64(config::ransac_seed()),
        }
    }

    /// Drop the lines collected so far.
    pub fn reset(&mut self) {
        self.lines[0].clear();
        self.lines[1].clear();
    }

    /// Record a finder line, in quarter pixels, from a horizontal
    /// (`vertical == false`) or vertical pass.
    pub fn found_line(&mut self, vertical: bool, line: FinderLine) {
        self.lines[usize::from(vertical)].push(line);
    }

    /// Number of collected lines per direction.
    pub fn line_counts(&self) -> (usize, usize) {
        (self.lines[0].len(), self.lines[1].len())
    }

    /// Locate and decode every symbol supported by the collected lines.
    /// `gray` is the image the lines came from; it is only binarized when
    /// enough finder centers turn up. The collected lines are consumed.
    pub fn decode(&mut self, gray: &[u8], width: usize, height: usize) -> Vec<QrCodeData> {
        let centers = self.take_centers();
        if centers.len() < 3 {
            return Vec::new();
        }
        let bits = binarize::binarize(gray, width, height);
        self.search(&bits, &centers)
    }

    /// Like [`QrReader::decode`], sampling a raster the caller binarized
    /// (true = dark).
    pub fn decode_binary(&mut self, bits: &BitMatrix) -> Vec<QrCodeData> {
        let centers = self.take_centers();
        if centers.len() < 3 {
            return Vec::new();
        }
        self.search(bits, &centers)
    }

    fn take_centers(&mut self) -> Vec<FinderCenter> {
        let [mut hlines, mut vlines] = std::mem::take(&mut self.lines);
        let centers = locate_centers(&mut hlines, &mut vlines);
        // keep the allocations for the next image
        hlines.clear();
        vlines.clear();
        self.lines = [hlines, vlines];
        debug!(centers = centers.len(), "qr finder centers");
        centers
    }

    fn search(&mut self, bits: &BitMatrix, centers: &[FinderCenter]) -> Vec<QrCodeData> {
        self.rng = StdRng::seed_from_u64(config::ransac_seed());
        let mut out = Vec::new();
        self.match_centers(bits, centers, &mut out);
        out
    }

    /// Try triples of centers, most supported first. Centers inside a
    /// decoded symbol are not reused, except to look for symbols nested in
    /// it.
    fn match_centers(&mut self, bits: &BitMatrix, centers: &[FinderCenter], out: &mut Vec<QrCodeData>) {
        let n = centers.len();
        let max_failures = config::qr_max_failures().max((bits.width() * bits.height()) >> 9);
        let mut mark = vec![false; n];
        let mut failures = 0;
        'search: for i in 0..n {
            for j in i + 1..n {
                if mark[i] {
                    break;
                }
                for k in j + 1..n {
                    if mark[j] {
                        break;
                    }
                    if mark[k] {
                        continue;
                    }
                    match self.try_configuration(bits, [&centers[i], &centers[j], &centers[k]]) {
                        Some(code) => {
                            mark[i] = true;
                            mark[j] = true;
                            mark[k] = true;
                            let inside: Vec<usize> = (0..n)
                                .filter(|&l| !mark[l] && in_quad(&code.bbox, centers[l].pos))
                                .collect();
                            for &l in &inside {
                                mark[l] = true;
                            }
                            out.push(code);
                            if inside.len() >= 3 {
                                let nested: Vec<FinderCenter> = inside.iter().map(|&l| centers[l].clone()).collect();
                                self.match_centers(bits, &nested, out);
                            }
                            failures = 0;
                        }
                        None => {
                            failures += 1;
                            if failures > max_failures {
                                debug!(failures, "qr search budget exhausted");
                                break 'search;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Decode a triple of centers in any role assignment. The two centers
    /// farthest apart are taken as the upper-right and lower-left corners.
    fn try_configuration(&mut self, bits: &BitMatrix, c: [&FinderCenter; 3]) -> Option<QrCodeData> {
        let ccw = c[0].pos.ccw(&c[1].pos, &c[2].pos);
        if nearly_colinear(c[0].pos, c[1].pos, c[2].pos) {
            trace!(a = ?c[0].pos, b = ?c[1].pos, c = ?c[2].pos, "colinear finder centers");
            return None;
        }
        // order the triple clockwise on screen
        let ci = if ccw > 0.0 { [0, 1, 2, 0, 1, 2] } else { [0, 2, 1, 0, 2, 1] };
        let mut i0 = 0;
        let mut maxd = c[ci[1]].pos.distance_squared(&c[ci[2]].pos);
        for i in 1..3 {
            let d = c[ci[i + 1]].pos.distance_squared(&c[ci[i + 2]].pos);
            if d > maxd {
                i0 = i;
                maxd = d;
            }
        }
        for i in i0..i0 + 3 {
            let i = i % 3;
            if let Some(code) = self.try_corners(bits, c[ci[i]], c[ci[i + 1]], c[ci[i + 2]]) {
                return Some(code);
            }
        }
        None
    }

    fn try_corners(
        &mut self,
        bits: &BitMatrix,
        ul: &FinderCenter,
        ur: &FinderCenter,
        dl: &FinderCenter,
    ) -> Option<QrCodeData> {
        let aff = Affine::new(ul.pos, ur.pos, dl.pos)?;
        let (mut ul, mut ur, mut dl) = (Finder::new(ul), Finder::new(ur), Finder::new(dl));
        let affine = |p: Point| aff.unproject(p);
        ur.classify(affine);
        if !ur.estimate(1.0, 1.0) {
            return None;
        }
        dl.classify(affine);
        if !dl.estimate(1.0, 1.0) || (ur.eversion[1] - dl.eversion[0]).abs() > LARGE_VERSION_SLACK {
            return None;
        }
        ul.classify(affine);
        if !ul.estimate(1.0, 1.0)
            || (ul.eversion[1] - ur.eversion[1]).abs() > LARGE_VERSION_SLACK
            || (ul.eversion[0] - dl.eversion[0]).abs() > LARGE_VERSION_SLACK
        {
            return None;
        }
        trace!(ul = ?ul.c.pos, ur = ?ur.c.pos, dl = ?dl.c.pos, "qr corner candidate");

        let hom = fit_homography(&mut ul, &mut ur, &mut dl, &aff, bits, &mut self.rng)?;
        let version = self.locate_in_domain(bits, &hom, &mut ul, &mut ur, &mut dl, None)?;
        if let Some(code) = self.decode_oriented(bits, &hom, &ul, &ur, &dl, version) {
            return Some(code);
        }
        // the same corners read as a mirror image
        let hom = hom.transposed();
        let (mut ul, mut ur, mut dl) = (Finder::new(ul.c), Finder::new(dl.c), Finder::new(ur.c));
        let version = self.locate_in_domain(bits, &hom, &mut ul, &mut ur, &mut dl, Some(version))?;
        let code = self.decode_oriented(bits, &hom, &ul, &ur, &dl, version);
        if code.is_some() {
            debug!("decoded mirrored qr symbol");
        }
        code
    }

    /// Re-estimate the finders in the homography's domain and settle the
    /// version, reading the version fields when the estimate is large.
    /// `known` skips the reading.
    fn locate_in_domain(
        &self,
        bits: &BitMatrix,
        hom: &Homography,
        ul: &mut Finder,
        ur: &mut Finder,
        dl: &mut Finder,
        known: Option<u8>,
    ) -> Option<u8> {
        let unproject = |p: Point| hom.unproject(p);
        ul.classify(unproject);
        ur.classify(unproject);
        dl.classify(unproject);
        let across = ur.o.x - ul.o.x;
        let down = dl.o.y - ul.o.y;
        if !ur.estimate(across, across) || !dl.estimate(down, down) {
            return None;
        }
        let version = match known {
            Some(v) => v as i32,
            None if ur.eversion[1] == dl.eversion[0] && ur.eversion[1] < 7 => ur.eversion[1],
            None => {
                if (ur.eversion[1] - dl.eversion[0]).abs() > LARGE_VERSION_SLACK {
                    return None;
                }
                let ur_version = read_checked_version(ur, Corner::UpperRight, ur.eversion[1], hom, bits);
                let dl_version = read_checked_version(dl, Corner::LowerLeft, dl.eversion[0], hom, bits);
                match (ur_version, dl_version) {
                    (Some(a), Some(b)) if a != b => return None,
                    (Some(a), _) | (None, Some(a)) => a,
                    (None, None) => return None,
                }
            }
        };
        if !ul.estimate(ur.o.x - dl.o.x, dl.o.y - ul.o.y)
            || (ul.eversion[1] - dl.eversion[0]).abs() > SMALL_VERSION_SLACK
            || (ul.eversion[0] - ur.eversion[1]).abs() > SMALL_VERSION_SLACK
        {
            return None;
        }
        u8::try_from(version).ok().filter(|v| (1..=40).contains(v))
    }

    /// Read the format, sample the grid and decode the data.
    fn decode_oriented(
        &self,
        bits: &BitMatrix,
        hom: &Homography,
        ul: &Finder,
        ur: &Finder,
        dl: &Finder,
        version: u8,
    ) -> Option<QrCodeData> {
        let size = dimension(version);
        let format = read_format(ul, ur, dl, hom, bits, size)?;
        let ec_level = ECLevel::from_format_bits(format >> 3);
        let mask = MaskPattern::from_bits(format & 7);

        // the edge lines pass through the middle of the outermost modules
        let dim = size as f64;
        let corner = |u: f64, v: f64| hom.project(Point::new(u, v));
        let pairs = [
            (Point::new(3.5, 3.5), ul.c.pos),
            (Point::new(dim - 3.5, 3.5), ur.c.pos),
            (Point::new(3.5, dim - 3.5), dl.c.pos),
            (Point::new(0.5, 0.5), corner(0.0, 0.0)),
            (Point::new(dim - 0.5, 0.5), corner(1.0, 0.0)),
            (Point::new(0.5, dim - 0.5), corner(0.0, 1.0)),
            (Point::new(dim - 0.5, dim - 0.5), corner(1.0, 1.0)),
        ];
        let global = Homography::fit(&pairs)?;
        let grid = SamplingGrid::new(bits, version, global);
        let modules = grid.sample(bits, size);
        let codewords = read_codewords(&modules, version, mask);
        let (data, corrected) = data::correct_blocks(&self.gf, &codewords, version, ec_level)?;
        let entries = data::parse_entries(&data, version)?;
        debug!(version, ?ec_level, corrected, "qr symbol decoded");
        let structured_append = entries.iter().find_map(|e| match e {
            Entry::StructuredAppend { index, size, parity } => Some((*index, *size, *parity)),
            _ => None,
        });
        let bbox = [
            grid.project(Point::new(0.0, 0.0)),
            grid.project(Point::new(dim, 0.0)),
            grid.project(Point::new(0.0, dim)),
            grid.project(Point::new(dim, dim)),
        ];
        Some(QrCodeData {
            entries,
            version,
            ec_level,
            corrected,
            structured_append,
            bbox,
        })
    }
}

/// Version field next to `f`, kept only when close to the estimate.
fn read_checked_version(f: &Finder, corner: Corner, estimate: i32, hom: &Homography, bits: &BitMatrix) -> Option<i32> {
    if estimate < 7 - LARGE_VERSION_SLACK {
        return None;
    }
    read_version(f, corner, hom, bits)
        .map(i32::from)
        .filter(|v| (v - estimate).abs() <= LARGE_VERSION_SLACK)
}

/// Twice the triangle area over the squared longest side: the distance of
/// the third point from the longest side, relative to that side.
const COLINEAR_TOLERANCE: f64 = 0.05;

fn nearly_colinear(a: Point, b: Point, c: Point) -> bool {
    let longest = a
        .distance_squared(&b)
        .max(b.distance_squared(&c))
        .max(a.distance_squared(&c));
    a.ccw(&b, &c).abs() <= COLINEAR_TOLERANCE * longest
}

/// Whether `p` lies inside the quad with corners upper-left, upper-right,
/// lower-left and lower-right, in either winding.
fn in_quad(bbox: &[Point; 4], p: Point) -> bool {
    let ring = [bbox[0], bbox[1], bbox[3], bbox[2]];
    let turns: Vec<f64> = (0..4).map(|i| ring[i].ccw(&ring[(i + 1) % 4], &p)).collect();
    turns.iter().all(|&t| t >= 0.0) || turns.iter().all(|&t| t <= 0.0)
}

/// Decode symbols from collected finder lines into [`Symbol`]s.
pub(crate) fn decode_symbols(reader: &mut QrReader, gray: &[u8], width: usize, height: usize) -> Vec<Symbol> {
    let codes = reader.decode(gray, width, height);
    extract_symbols(&codes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qr::lines::tests::finder_lines;

    #[test]
    fn test_colinear_centers_rejected() {
        let mut reader = QrReader::new();
        let bits = BitMatrix::new(200, 200);
        let mk = |x: f64| FinderCenter {
            pos: Point::new(x, 50.0),
            edge_pts: Vec::new(),
        };
        let (a, b, c) = (mk(10.0), mk(60.0), mk(110.0));
        assert!(reader.try_configuration(&bits, [&a, &b, &c]).is_none());
    }

    #[test]
    fn test_nearly_colinear_tolerance() {
        let p = Point::new;
        assert!(nearly_colinear(p(10.0, 50.0), p(60.0, 50.0), p(110.0, 50.0)));
        // a hair off the line
        assert!(nearly_colinear(p(10.0, 50.0), p(60.0, 50.0001), p(110.0, 50.0)));
        assert!(nearly_colinear(p(10.0, 50.0), p(60.0, 53.0), p(110.0, 50.0)));
        assert!(!nearly_colinear(p(10.0, 10.0), p(110.0, 10.0), p(10.0, 110.0)));
        // strong perspective still passes
        assert!(!nearly_colinear(p(10.0, 10.0), p(110.0, 30.0), p(30.0, 60.0)));
    }

    #[test]
    fn test_decode_without_lines() {
        let mut reader = QrReader::new();
        assert!(reader.decode(&[255; 100], 10, 10).is_empty());
        let (h, v) = finder_lines(0, 0, 3);
        for l in h {
            reader.found_line(false, l);
        }
        for l in v {
            reader.found_line(true, l);
        }
        assert_eq!(reader.line_counts(), (9, 9));
        // one finder alone decodes nothing, and the lines are consumed
        assert!(reader.decode_binary(&BitMatrix::new(40, 40)).is_empty());
        assert_eq!(reader.line_counts(), (0, 0));
    }

    /// Transmission index of codeword `i` of `block`, following the block
    /// interleaving of the encoder.
    fn interleaved_index(version: u8, level: ECLevel, block: usize, i: usize) -> usize {
        let info = tables::ec_block_info(version, level).unwrap();
        let data_total = tables::total_codewords(version) - info.num_blocks * info.ecc_per_block;
        let num_short = info.num_blocks - data_total % info.num_blocks;
        let short_len = data_total / info.num_blocks;
        let len = |b: usize| if b < num_short { short_len } else { short_len + 1 };
        let mut k = 0;
        for j in 0..=short_len {
            for b in 0..info.num_blocks {
                if j < len(b) {
                    if (b, j) == (block, i) {
                        return k;
                    }
                    k += 1;
                }
            }
        }
        for j in 0..info.ecc_per_block {
            for b in 0..info.num_blocks {
                if (b, len(b) + j) == (block, i) {
                    return k;
                }
                k += 1;
            }
        }
        unreachable!("codeword {i} outside block {block}")
    }

    /// Invert all eight modules of each picked `(block, codeword)`.
    fn damage(m: &mut BitMatrix, version: u8, level: ECLevel, picks: &[(usize, usize)]) {
        let order = grid::data_module_order(&grid::FunctionMask::new(version));
        for &(block, i) in picks {
            let k = interleaved_index(version, level, block, i);
            for &(x, y) in &order[k * 8..k * 8 + 8] {
                m.toggle(x, y);
            }
        }
    }

    fn scan_qr_texts(m: &BitMatrix) -> Vec<String> {
        let (pixels, width, height) = render(m, 4, 4);
        let mut scanner = crate::ImageScanner::new();
        scanner.scan_luma(&pixels, width, height).unwrap();
        scanner
            .results()
            .iter()
            .filter(|s| s.symbol_type() == crate::SymbolType::QrCode)
            .map(|s| s.text())
            .collect()
    }

    #[test]
    fn test_damage_up_to_block_capacity() {
        // version 3-H: two blocks of 13 data and 22 parity codewords, 11 correctable each
        let text = "capacity 3-H payload";
        let clean = encode_segments(&[Segment::Bytes(text.as_bytes())], 3, ECLevel::H, Some(MaskPattern::Pattern2))
            .unwrap();
        let spread = [0, 3, 6, 9, 12, 15, 19, 23, 27, 31, 34];

        let mut m = clean.clone();
        let picks: Vec<(usize, usize)> = spread.iter().flat_map(|&i| [(0, i), (1, i)]).collect();
        damage(&mut m, 3, ECLevel::H, &picks);
        assert_eq!(scan_qr_texts(&m), vec![text.to_string()]);

        // one codeword past the capacity of block 0
        let mut m = clean.clone();
        let mut picks: Vec<(usize, usize)> = spread.iter().map(|&i| (0, i)).collect();
        picks.push((0, 1));
        damage(&mut m, 3, ECLevel::H, &picks);
        assert!(scan_qr_texts(&m).is_empty());
    }

    #[test]
    fn test_in_quad_either_winding() {
        let bbox = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
            Point::new(10.0, 10.0),
        ];
        assert!(in_quad(&bbox, Point::new(5.0, 5.0)));
        assert!(!in_quad(&bbox, Point::new(15.0, 5.0)));
        let mirrored = [bbox[0], bbox[2], bbox[1], bbox[3]];
        assert!(in_quad(&mirrored, Point::new(5.0, 5.0)));
        assert!(!in_quad(&mirrored, Point::new(5.0, -1.0)));
    }
}
