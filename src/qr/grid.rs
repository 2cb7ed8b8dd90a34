//! Module layout of a QR symbol and the sampling grid that maps modules
//! onto the binarized image.

use tracing::trace;

use super::geometry::Homography;
use super::tables::{alignment_positions, dimension, total_codewords};
use crate::models::{BitMatrix, MaskPattern, Point};

/// Function module mask for a specific QR version.
/// true = function module (not data), false = data module.
pub(crate) struct FunctionMask {
    mask: BitMatrix,
}

impl FunctionMask {
    pub(crate) fn new(version: u8) -> Self {
        let size = dimension(version);
        let mut mask = BitMatrix::new(size, size);

        // finders with their separators, clipped to the symbol
        Self::mark_finder_area(&mut mask, 0, 0);
        Self::mark_finder_area(&mut mask, size - 7, 0);
        Self::mark_finder_area(&mut mask, 0, size - 7);

        for i in 0..size {
            mask.set(6, i, true);
            mask.set(i, 6, true);
        }

        let align = alignment_positions(version);
        for &cx in &align {
            for &cy in &align {
                if is_finder_corner(cx, cy, size) {
                    continue;
                }
                for y in cy - 2..=cy + 2 {
                    for x in cx - 2..=cx + 2 {
                        mask.set(x, y, true);
                    }
                }
            }
        }

        for copy in 0..2 {
            for bit in 0..15 {
                let (x, y) = format_position(bit, copy, size);
                mask.set(x, y, true);
            }
        }
        // always dark
        mask.set(8, size - 8, true);

        if version >= 7 {
            for copy in 0..2 {
                for bit in 0..18 {
                    let (x, y) = version_position(bit, copy, size);
                    mask.set(x, y, true);
                }
            }
        }

        Self { mask }
    }

    pub(crate) fn size(&self) -> usize {
        self.mask.width()
    }

    pub(crate) fn is_function(&self, x: usize, y: usize) -> bool {
        self.mask.get(x, y)
    }

    fn mark_finder_area(mask: &mut BitMatrix, x: usize, y: usize) {
        let size = mask.width();
        for yy in y.saturating_sub(1)..(y + 8).min(size) {
            for xx in x.saturating_sub(1)..(x + 8).min(size) {
                mask.set(xx, yy, true);
            }
        }
    }
}

/// Whether an alignment grid node falls on a finder pattern.
fn is_finder_corner(cx: usize, cy: usize, size: usize) -> bool {
    (cx <= 8 && cy <= 8) || (cx >= size - 9 && cy <= 8) || (cx <= 8 && cy >= size - 9)
}

/// Module `(x, y)` holding format bit `bit` (0 = least significant).
/// Copy 0 wraps the upper-left finder; copy 1 is split between the
/// lower-left and upper-right finders.
pub(crate) fn format_position(bit: usize, copy: usize, size: usize) -> (usize, usize) {
    if copy == 0 {
        match bit {
            0..=5 => (8, bit),
            6 => (8, 7),
            7 => (8, 8),
            8 => (7, 8),
            _ => (14 - bit, 8),
        }
    } else if bit < 8 {
        (size - 1 - bit, 8)
    } else {
        (8, size - 15 + bit)
    }
}

/// Module `(x, y)` holding version bit `bit`. Copy 0 sits left of the
/// upper-right finder, copy 1 above the lower-left one.
pub(crate) fn version_position(bit: usize, copy: usize, size: usize) -> (usize, usize) {
    let (a, b) = (size - 11 + bit % 3, bit / 3);
    if copy == 0 {
        (a, b)
    } else {
        (b, a)
    }
}

/// Data modules in codeword bit order: two-column strips from the right,
/// alternating upward and downward, skipping the vertical timing column.
pub(crate) fn data_module_order(func: &FunctionMask) -> Vec<(usize, usize)> {
    let size = func.size();
    let mut order = Vec::with_capacity(size * size);
    let mut upward = true;
    let mut col = size as i32 - 1;
    while col > 0 {
        if col == 6 {
            col -= 1;
            continue;
        }
        for k in 0..size {
            let row = if upward { size - 1 - k } else { k };
            for x in [col as usize, col as usize - 1] {
                if !func.is_function(x, row) {
                    order.push((x, row));
                }
            }
        }
        upward = !upward;
        col -= 2;
    }
    order
}

/// Unmask the data modules and pack them into codewords.
pub(crate) fn read_codewords(modules: &BitMatrix, version: u8, mask: MaskPattern) -> Vec<u8> {
    let func = FunctionMask::new(version);
    let mut bytes = vec![0u8; total_codewords(version)];
    let nbits = bytes.len() << 3;
    for (k, &(x, y)) in data_module_order(&func).iter().take(nbits).enumerate() {
        if modules.get(x, y) ^ mask.is_masked(y, x) {
            bytes[k >> 3] |= 0x80 >> (k & 7);
        }
    }
    bytes
}

/// Half-module rings searched around a predicted alignment center.
const ALIGNMENT_SEARCH_RADIUS: i32 = 6;
/// Template mismatches tolerated in an alignment pattern.
const ALIGNMENT_MAX_MISMATCH: u32 = 3;

fn sample(bits: &BitMatrix, p: Point) -> bool {
    p.x.is_finite() && p.y.is_finite() && bits.get_i(p.x.floor() as i64, p.y.floor() as i64)
}

fn alignment_mismatch(bits: &BitMatrix, c: Point, du: Point, dv: Point) -> u32 {
    let mut d = 0;
    for j in 0..5 {
        for i in 0..5 {
            let dark = i == 0 || i == 4 || j == 0 || j == 4 || (i == 2 && j == 2);
            let p = c + du * (i as f64 - 2.0) + dv * (j as f64 - 2.0);
            if sample(bits, p) != dark {
                d += 1;
            }
        }
    }
    d
}

/// Offset, in modules along `d`, that centers the dark middle module of an
/// alignment pattern.
fn center_offset(bits: &BitMatrix, c: Point, d: Point) -> f64 {
    if !sample(bits, c) {
        return 0.0;
    }
    let walk = |sign: f64| (1..=12).map(|k| k as f64 / 8.0).find(|&t| !sample(bits, c + d * (t * sign)));
    match (walk(1.0), walk(-1.0)) {
        (Some(fwd), Some(back)) => (fwd - back) / 2.0,
        _ => 0.0,
    }
}

/// Search square rings of half-module steps around `predicted` for the
/// best matching alignment pattern, then center it.
fn find_alignment(bits: &BitMatrix, predicted: Point, du: Point, dv: Point) -> Option<Point> {
    let mut best = (u32::MAX, predicted);
    'rings: for r in 0..=ALIGNMENT_SEARCH_RADIUS {
        for b in -r..=r {
            for a in -r..=r {
                if a.abs().max(b.abs()) != r {
                    continue;
                }
                let c = predicted + du * (a as f64 * 0.5) + dv * (b as f64 * 0.5);
                let d = alignment_mismatch(bits, c, du, dv);
                if d < best.0 {
                    best = (d, c);
                    if d == 0 {
                        break 'rings;
                    }
                }
            }
        }
        if best.0 <= 1 {
            break;
        }
    }
    if best.0 > ALIGNMENT_MAX_MISMATCH {
        return None;
    }
    let mut c = best.1;
    c = c + du * center_offset(bits, c, du);
    c = c + dv * center_offset(bits, c, dv);
    Some(c)
}

/// Piecewise projective map from module coordinates to the image, one
/// cell per square of alignment pattern centers.
pub(crate) struct SamplingGrid {
    /// cell boundaries in module coordinates, shared by both axes
    bounds: Vec<f64>,
    /// row-major cells, `bounds.len() - 1` per side
    cells: Vec<Homography>,
    global: Homography,
}

impl SamplingGrid {
    /// Locate the alignment patterns of `version` starting from the global
    /// module-to-image map and build one cell per square of them.
    pub(crate) fn new(bits: &BitMatrix, version: u8, global: Homography) -> Self {
        let size = dimension(version);
        let align = alignment_positions(version);
        if align.is_empty() {
            return Self {
                bounds: Vec::new(),
                cells: Vec::new(),
                global,
            };
        }
        let n = align.len();
        let bounds: Vec<f64> = align.iter().map(|&a| a as f64 + 0.5).collect();
        let module = |i: usize, j: usize| Point::new(bounds[i], bounds[j]);

        let mut nodes = vec![Point::default(); n * n];
        let mut found = vec![false; n * n];
        for j in 0..n {
            for i in 0..n {
                let m = module(i, j);
                let base = global.project(m);
                if is_finder_corner(align[i], align[j], size) {
                    nodes[j * n + i] = base;
                    continue;
                }
                // carry over the drift of neighbors already located
                let mut drift = Point::default();
                let mut k = 0;
                let neighbors = [(i.checked_sub(1), Some(j)), (Some(i), j.checked_sub(1)), (i.checked_sub(1), j.checked_sub(1))];
                for (ni, nj) in neighbors {
                    if let (Some(ni), Some(nj)) = (ni, nj) {
                        if found[nj * n + ni] {
                            drift = drift + (nodes[nj * n + ni] - global.project(module(ni, nj)));
                            k += 1;
                        }
                    }
                }
                let predicted = if k > 0 { base + drift * (1.0 / k as f64) } else { base };
                let du = global.project(m + Point::new(1.0, 0.0)) - base;
                let dv = global.project(m + Point::new(0.0, 1.0)) - base;
                match find_alignment(bits, predicted, du, dv) {
                    Some(p) => {
                        nodes[j * n + i] = p;
                        found[j * n + i] = true;
                    }
                    None => {
                        trace!(i, j, "alignment pattern not found");
                        nodes[j * n + i] = predicted;
                    }
                }
            }
        }

        let mut cells = Vec::with_capacity((n - 1) * (n - 1));
        for j in 0..n - 1 {
            for i in 0..n - 1 {
                let src = [module(i, j), module(i + 1, j), module(i + 1, j + 1), module(i, j + 1)];
                let dst = [
                    nodes[j * n + i],
                    nodes[j * n + i + 1],
                    nodes[(j + 1) * n + i + 1],
                    nodes[(j + 1) * n + i],
                ];
                cells.push(Homography::from_quad(&src, &dst).unwrap_or(global));
            }
        }
        Self { bounds, cells, global }
    }

    fn cell_index(&self, v: f64) -> usize {
        let last = self.bounds.len() - 2;
        self.bounds[1..=last].iter().take_while(|&&b| v >= b).count()
    }

    /// Image position of a point given in module coordinates. Points past
    /// the outer alignment patterns use the nearest cell.
    pub(crate) fn project(&self, m: Point) -> Point {
        if self.cells.is_empty() {
            return self.global.project(m);
        }
        let side = self.bounds.len() - 1;
        let (i, j) = (self.cell_index(m.x), self.cell_index(m.y));
        self.cells[j * side + i].project(m)
    }

    /// Sample every module center.
    pub(crate) fn sample(&self, bits: &BitMatrix, size: usize) -> BitMatrix {
        let mut out = BitMatrix::new(size, size);
        for y in 0..size {
            for x in 0..size {
                let p = self.project(Point::new(x as f64 + 0.5, y as f64 + 0.5));
                if sample(bits, p) {
                    out.set(x, y, true);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qr::tables::raw_data_modules;

    #[test]
    fn test_function_mask_leaves_raw_data_modules() {
        for v in 1..=40u8 {
            let func = FunctionMask::new(v);
            let size = func.size();
            let data = (0..size * size)
                .filter(|&i| !func.is_function(i % size, i / size))
                .count();
            assert_eq!(data, raw_data_modules(v), "version {}", v);
            assert_eq!(data_module_order(&func).len(), data);
        }
    }

    #[test]
    fn test_zigzag_starts_bottom_right() {
        let func = FunctionMask::new(1);
        let order = data_module_order(&func);
        assert_eq!(&order[..4], &[(20, 20), (19, 20), (20, 19), (19, 19)]);
        // the first strip turns around below the format area
        assert!(order.iter().all(|&(x, _)| x != 6));
    }

    #[test]
    fn test_format_positions_distinct() {
        let size = dimension(3);
        let mut seen = std::collections::HashSet::new();
        for copy in 0..2 {
            for bit in 0..15 {
                assert!(seen.insert(format_position(bit, copy, size)));
            }
        }
        assert_eq!(format_position(14, 0, size), (0, 8));
        assert_eq!(format_position(0, 1, size), (size - 1, 8));
        assert_eq!(format_position(14, 1, size), (8, size - 1));
    }

    #[test]
    fn test_read_codewords_unmasks() {
        // an all-light symbol reads as the mask pattern itself
        let modules = BitMatrix::new(21, 21);
        let bytes = read_codewords(&modules, 1, MaskPattern::Pattern1);
        assert_eq!(bytes.len(), 26);
        let func = FunctionMask::new(1);
        let order = data_module_order(&func);
        for (k, &(x, y)) in order.iter().take(26 * 8).enumerate() {
            let bit = bytes[k >> 3] & (0x80 >> (k & 7)) != 0;
            assert_eq!(bit, y % 2 == 0, "module ({}, {})", x, y);
        }
    }

    #[test]
    fn test_alignment_search_recovers_offset() {
        // 5x5 pattern with 4 pixel modules centered at (41, 39)
        let mut bits = BitMatrix::new(80, 80);
        for j in 0..5i32 {
            for i in 0..5i32 {
                let dark = i == 0 || i == 4 || j == 0 || j == 4 || (i == 2 && j == 2);
                for y in 0..4 {
                    for x in 0..4 {
                        bits.set((31 + i * 4 + x) as usize, (29 + j * 4 + y) as usize, dark);
                    }
                }
            }
        }
        let du = Point::new(4.0, 0.0);
        let dv = Point::new(0.0, 4.0);
        let c = find_alignment(&bits, Point::new(37.5, 43.0), du, dv).unwrap();
        assert!((c.x - 41.0).abs() < 1.0, "{:?}", c);
        assert!((c.y - 39.0).abs() < 1.0, "{:?}", c);
        // nothing to find on a blank image
        assert!(find_alignment(&BitMatrix::new(80, 80), Point::new(40.0, 40.0), du, dv).is_none());
    }

    #[test]
    fn test_grid_follows_global_map_without_alignment() {
        let src = [
            Point::new(0.0, 0.0),
            Point::new(21.0, 0.0),
            Point::new(21.0, 21.0),
            Point::new(0.0, 21.0),
        ];
        let dst = src.map(|p| p * 3.0 + Point::new(10.0, 5.0));
        let global = Homography::from_quad(&src, &dst).unwrap();
        let grid = SamplingGrid::new(&BitMatrix::new(100, 100), 1, global);
        let p = grid.project(Point::new(10.5, 3.5));
        assert!((p.x - 41.5).abs() < 1e-6 && (p.y - 15.5).abs() < 1e-6, "{:?}", p);
    }
}
