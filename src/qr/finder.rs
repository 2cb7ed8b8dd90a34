//! Per-finder geometry: edge classification, module size and version
//! estimates, the outer edge lines of the symbol and the reads of the
//! version and format fields.

use rand::rngs::StdRng;
use tracing::trace;

use super::bch;
use super::geometry::{Affine, Homography, Line};
use super::grid::{format_position, version_position};
use super::lines::{EdgePoint, FinderCenter};
use super::ransac::ransac_line;
use crate::models::{BitMatrix, Point};

/// Version disagreement tolerated between the rough affine estimates.
pub(crate) const LARGE_VERSION_SLACK: i32 = 3;
/// Version disagreement tolerated once the perspective is known.
pub(crate) const SMALL_VERSION_SLACK: i32 = 1;

fn coord(p: Point, axis: usize) -> f64 {
    if axis == 0 {
        p.x
    } else {
        p.y
    }
}

fn with_coord(mut p: Point, axis: usize, v: f64) -> Point {
    if axis == 0 {
        p.x = v;
    } else {
        p.y = v;
    }
    p
}

fn unit(axis: usize) -> Point {
    if axis == 0 {
        Point::new(1.0, 0.0)
    } else {
        Point::new(0.0, 1.0)
    }
}

/// Which corner of the symbol a finder sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Corner {
    UpperLeft,
    UpperRight,
    LowerLeft,
}

impl Corner {
    /// Center module of the finder.
    fn center_module(self, size: usize) -> (f64, f64) {
        match self {
            Corner::UpperLeft => (3.0, 3.0),
            Corner::UpperRight => (size as f64 - 4.0, 3.0),
            Corner::LowerLeft => (3.0, size as f64 - 4.0),
        }
    }
}

/// A finder center seen through the current domain: its edge points
/// split into left, right, top and bottom and its module size.
#[derive(Debug, Clone)]
pub(crate) struct Finder<'a> {
    pub c: &'a FinderCenter,
    /// center in the domain
    pub o: Point,
    /// module size along each domain axis
    pub size: [f64; 2],
    /// version estimated along each axis
    pub eversion: [i32; 2],
    /// edge points by side, inliers first after `ransac`
    pub edges: [Vec<EdgePoint>; 4],
    pub ninliers: [usize; 4],
}

impl<'a> Finder<'a> {
    pub(crate) fn new(c: &'a FinderCenter) -> Self {
        Self {
            c,
            o: c.pos,
            size: [0.0; 2],
            eversion: [0; 2],
            edges: Default::default(),
            ninliers: [0; 4],
        }
    }

    /// Move the center and edge points into a domain and sort each edge
    /// point onto the side it lies on.
    pub(crate) fn classify(&mut self, unproject: impl Fn(Point) -> Point) {
        self.o = unproject(self.c.pos);
        for e in self.edges.iter_mut() {
            e.clear();
        }
        self.ninliers = [0; 4];
        for pt in &self.c.edge_pts {
            let q = unproject(pt.pos) - self.o;
            let d = usize::from(q.y.abs() > q.x.abs());
            let extent = coord(q, d);
            let edge = (d << 1) + usize::from(extent >= 0.0);
            self.edges[edge].push(EdgePoint { edge, extent, ..*pt });
        }
        for e in self.edges.iter_mut() {
            e.sort_by(|a, b| a.extent.total_cmp(&b.extent));
        }
    }

    /// Estimate the module size and version along each axis, given the
    /// domain distance to the finder across the symbol in that direction.
    /// Also re-centers the finder between its edges. Fails when an axis has
    /// no edge points or implies an impossible version.
    pub(crate) fn estimate(&mut self, width: f64, height: f64) -> bool {
        let mut offs = [0.0f64; 2];
        let mut sizes = [0.0f64; 2];
        for axis in 0..2 {
            let mut sums = [0.0f64; 2];
            let mut counts = [0usize; 2];
            for side in 0..2 {
                let pts = &self.edges[(axis << 1) + side];
                let n = pts.len();
                // trimmed mean, dropping a quarter at each end
                let trim = n >> 2;
                let kept = &pts[trim..n - trim];
                sums[side] = kept.iter().map(|p| p.extent).sum();
                counts[side] = kept.len();
            }
            let total = counts[0] + counts[1];
            if total == 0 {
                return false;
            }
            let mean = |side: usize| sums[side] / counts[side] as f64;
            if counts[0] > 0 && counts[1] > 0 {
                offs[axis] = (mean(0) + mean(1)) / 2.0;
                // ring middles sit three modules from the center on both sides
                sizes[axis] = (mean(1) - mean(0)) / 6.0;
            } else if counts[1] > 0 {
                sizes[axis] = mean(1) / 3.0;
            } else {
                sizes[axis] = -mean(0) / 3.0;
            }
        }
        self.o = self.o + Point::new(offs[0], offs[1]);
        for e in self.edges.iter_mut() {
            for (axis, off) in offs.iter().enumerate() {
                for p in e.iter_mut().filter(|p| p.edge >> 1 == axis) {
                    p.extent -= off;
                }
            }
        }
        for (axis, extent) in [width, height].into_iter().enumerate() {
            let s = sizes[axis];
            if s.is_nan() || s <= 0.0 {
                return false;
            }
            let v = ((extent - 8.0 * s) / (4.0 * s)).floor();
            if !(1.0..=43.0).contains(&v) {
                return false;
            }
            self.eversion[axis] = v as i32;
        }
        self.size = sizes;
        true
    }

    /// Keep the largest colinear subset of one side's edge points, as
    /// judged in the affine domain.
    pub(crate) fn ransac(&mut self, e: usize, aff: &Affine, rng: &mut StdRng) {
        let pts: Vec<Point> = self.edges[e].iter().map(|p| p.pos).collect();
        let axis = e >> 1;
        let mask = ransac_line(&pts, rng, |p0, p1| {
            let d = aff.unproject(p1) - aff.unproject(p0);
            // the line must run across the side's axis
            coord(d, axis).abs() <= coord(d, 1 - axis).abs()
        });
        let (inliers, outliers): (Vec<_>, Vec<_>) = self.edges[e].iter().zip(&mask).partition(|&(_, &m)| m);
        self.ninliers[e] = inliers.len();
        self.edges[e] = inliers.into_iter().chain(outliers).map(|(p, _)| *p).collect();
    }

    fn inliers(&self, e: usize) -> impl Iterator<Item = Point> + '_ {
        self.edges[e][..self.ninliers[e]].iter().map(|p| p.pos)
    }

    /// Image position of the point `(du, dv)` modules from this finder's
    /// center.
    pub(crate) fn module_point(&self, hom: &Homography, du: f64, dv: f64) -> Point {
        hom.project(self.o + Point::new(du * self.size[0], dv * self.size[1]))
    }

    fn sample(&self, hom: &Homography, bits: &BitMatrix, du: f64, dv: f64) -> bool {
        let p = self.module_point(hom, du, dv);
        p.x.is_finite() && p.y.is_finite() && bits.get_i(p.x.floor() as i64, p.y.floor() as i64)
    }

    /// Sample the module at `(x, y)` of a `size` symbol relative to this
    /// finder in `corner`.
    fn sample_module(&self, hom: &Homography, bits: &BitMatrix, corner: Corner, size: usize, (x, y): (usize, usize)) -> bool {
        let (cx, cy) = corner.center_module(size);
        self.sample(hom, bits, x as f64 - cx, y as f64 - cy)
    }
}

/// Edge line through the inliers of two finders sharing a side. A finder
/// without inliers contributes a point three modules out from its center.
fn fit_shared_edge(a: &Finder, b: &Finder, e: usize, aff: &Affine) -> Option<Line> {
    let axis = e >> 1;
    let sign = if e & 1 == 0 { -1.0 } else { 1.0 };
    let mut pts = Vec::new();
    for f in [a, b] {
        if f.ninliers[e] > 0 {
            pts.extend(f.inliers(e));
        } else {
            pts.push(aff.project(f.o + unit(axis) * (sign * 3.0 * f.size[axis])));
        }
    }
    let mut line = Line::fit(&pts)?;
    line.orient(a.c.pos);
    Some(line)
}

/// Walk the last column (`e == 1`) or row (`e == 3`) of the symbol from
/// `f` toward `other`, collecting points on the outer edge of the dark
/// modules found there, then fit a line through them and `f`'s own edge.
/// Each step is predicted from the line through the points found so far,
/// so the walk follows edges bent away from the affine frame.
fn fit_walked_edge(f: &Finder, other: &Finder, e: usize, aff: &Affine, bits: &BitMatrix, rng: &mut StdRng) -> Option<Line> {
    let axis = e >> 1;
    let along = 1 - axis;
    let sample = |q: Point| {
        let p = aff.project(q);
        p.x.is_finite() && p.y.is_finite() && bits.get_i(p.x.floor() as i64, p.y.floor() as i64)
    };
    let mut pts: Vec<Point> = f.inliers(e).collect();
    // the same points in the domain, to extrapolate the edge from
    let mut domain: Vec<Point> = pts.iter().map(|&p| aff.unproject(p)).collect();
    let step = unit(axis) * f.size[axis];
    let mut edge = coord(f.o, axis) + 3.0 * f.size[axis];
    let mut t = coord(f.o, along) + 4.0 * f.size[along];
    let end = coord(other.o, along) + 3.0 * other.size[along];
    let mut walked = 0;
    while t <= end {
        let row = with_coord(Point::default(), along, t);
        if let Some(p) = Line::fit(&domain).and_then(|l| l.intersect(&Line::through(row, row + unit(axis))?)) {
            edge = coord(p, axis);
        }
        let q = with_coord(row, axis, edge);
        // scan inward from two modules out for the first dark sample
        let hit = (0..=24).map(|k| 2.0 - k as f64 / 8.0).find(|&s| sample(q + step * s));
        if let Some(s) = hit {
            let delta = s + 1.0 / 16.0 - 0.5;
            if (-0.5..=0.5).contains(&delta) {
                edge += delta * f.size[axis];
                pts.push(aff.project(q + step * delta));
                domain.push(q + step * delta);
                walked += 1;
            }
        }
        t += f.size[along];
    }
    trace!(edge = e, walked, "edge walk");
    let mask = ransac_line(&pts, rng, |p0, p1| {
        let d = aff.unproject(p1) - aff.unproject(p0);
        coord(d, axis).abs() <= coord(d, along).abs()
    });
    let inliers: Vec<Point> = pts.iter().zip(&mask).filter(|&(_, &m)| m).map(|(p, _)| *p).collect();
    let mut line = Line::fit(&inliers)?;
    line.orient(f.c.pos);
    Some(line)
}

/// Fit the four outer edges of the symbol and map the unit square onto
/// the quadrilateral they bound.
pub(crate) fn fit_homography<'a>(
    ul: &mut Finder<'a>,
    ur: &mut Finder<'a>,
    dl: &mut Finder<'a>,
    aff: &Affine,
    bits: &BitMatrix,
    rng: &mut StdRng,
) -> Option<Homography> {
    for (f, sides) in [(&mut *ul, [0, 2]), (&mut *ur, [1, 2]), (&mut *dl, [0, 3])] {
        for e in sides {
            f.ransac(e, aff, rng);
        }
    }
    let left = fit_shared_edge(ul, dl, 0, aff)?;
    let top = fit_shared_edge(ul, ur, 2, aff)?;
    let right = fit_walked_edge(ur, dl, 1, aff, bits, rng)?;
    let bottom = fit_walked_edge(dl, ur, 3, aff, bits, rng)?;

    let p00 = top.intersect(&left)?;
    let p10 = top.intersect(&right)?;
    let p01 = bottom.intersect(&left)?;
    let p11 = bottom.intersect(&right)?;
    let turns = [
        p00.ccw(&p10, &p11),
        p10.ccw(&p11, &p01),
        p11.ccw(&p01, &p00),
        p01.ccw(&p00, &p10),
    ];
    if !(turns.iter().all(|&t| t > 0.0) || turns.iter().all(|&t| t < 0.0)) {
        trace!("edge lines do not bound a convex quad");
        return None;
    }
    let unit_square = [
        Point::new(0.0, 0.0),
        Point::new(1.0, 0.0),
        Point::new(1.0, 1.0),
        Point::new(0.0, 1.0),
    ];
    Homography::from_quad(&unit_square, &[p00, p10, p11, p01])
}

/// Read and correct the version field next to the upper-right
/// (`corner == UpperRight`) or lower-left finder.
pub(crate) fn read_version(f: &Finder, corner: Corner, hom: &Homography, bits: &BitMatrix) -> Option<u8> {
    let copy = usize::from(corner == Corner::LowerLeft);
    // field offsets from the finder do not depend on the symbol size
    let size = 45;
    let mut v = 0u32;
    for bit in 0..18 {
        if f.sample_module(hom, bits, corner, size, version_position(bit, copy, size)) {
            v |= 1 << bit;
        }
    }
    bch::version_correct(v).map(|(version, _)| version)
}

/// Read both copies of the format field and keep the better one. Returns
/// the five data bits: level in the top two, mask in the low three.
pub(crate) fn read_format(ul: &Finder, ur: &Finder, dl: &Finder, hom: &Homography, bits: &BitMatrix, size: usize) -> Option<u8> {
    let mut copies = [0u32; 2];
    for bit in 0..15 {
        let pos = format_position(bit, 0, size);
        if ul.sample_module(hom, bits, Corner::UpperLeft, size, pos) {
            copies[0] |= 1 << bit;
        }
        let pos = format_position(bit, 1, size);
        let hit = if bit < 8 {
            ur.sample_module(hom, bits, Corner::UpperRight, size, pos)
        } else {
            dl.sample_module(hom, bits, Corner::LowerLeft, size, pos)
        };
        if hit {
            copies[1] |= 1 << bit;
        }
    }
    copies
        .iter()
        .filter_map(|&c| bch::format_correct(c))
        .min_by_key(|&(_, dist)| dist)
        .map(|(data, _)| data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qr::lines::tests::finder_lines;
    use crate::qr::lines::locate_centers;

    fn center(x0: i32, y0: i32, module: i32) -> FinderCenter {
        let (mut h, mut v) = finder_lines(x0, y0, module);
        locate_centers(&mut h, &mut v).remove(0)
    }

    #[test]
    fn test_classify_sides() {
        let c = center(10, 20, 4);
        let mut f = Finder::new(&c);
        f.classify(|p| p);
        for e in 0..4 {
            assert_eq!(f.edges[e].len(), 12, "edge {}", e);
            assert!(f.edges[e].iter().all(|p| p.edge == e));
            assert!(f.edges[e].windows(2).all(|w| w[0].extent <= w[1].extent));
        }
        assert!(f.edges[0].iter().all(|p| p.extent < 0.0));
        assert!(f.edges[3].iter().all(|p| p.extent > 0.0));
    }

    #[test]
    fn test_estimate_module_size_and_version() {
        let c = center(10, 20, 4);
        let mut f = Finder::new(&c);
        f.classify(|p| p);
        // version 2 is 25 modules, so the next finder is 18 modules away
        assert!(f.estimate(18.0 * 4.0, 18.0 * 4.0));
        assert!((f.size[0] - 4.0).abs() < 0.3, "{:?}", f.size);
        assert!((f.size[1] - 4.0).abs() < 0.3, "{:?}", f.size);
        assert_eq!(f.eversion, [2, 2]);
        // too close for any version
        let mut g = Finder::new(&c);
        g.classify(|p| p);
        assert!(!g.estimate(8.0, 8.0));
    }

    #[test]
    fn test_estimate_without_edges() {
        let c = FinderCenter {
            pos: Point::new(5.0, 5.0),
            edge_pts: Vec::new(),
        };
        let mut f = Finder::new(&c);
        f.classify(|p| p);
        assert!(!f.estimate(100.0, 100.0));
    }

    #[test]
    fn test_format_field_offsets() {
        // second copy bits sit five modules below the upper-right finder
        // center and five right of the lower-left one
        let size = 29;
        let (cx, cy) = Corner::UpperRight.center_module(size);
        let (x, y) = format_position(0, 1, size);
        assert_eq!((x as f64 - cx, y as f64 - cy), (3.0, 5.0));
        let (cx, cy) = Corner::LowerLeft.center_module(size);
        let (x, y) = format_position(14, 1, size);
        assert_eq!((x as f64 - cx, y as f64 - cy), (5.0, 3.0));
    }
}
