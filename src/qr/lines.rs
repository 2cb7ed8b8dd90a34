//! Finder lines to finder centers: nearby parallel lines are clustered,
//! horizontal and vertical clusters that cross become centers, and every
//! line end contributes an edge point for the geometry fit.

use tracing::trace;

use crate::decoder::FinderLine;
use crate::models::Point;

/// Fractional bits carried by finder line coordinates.
pub(crate) const SUBPREC: i32 = 2;

/// Middle of an outer dark module of a finder, in pixels.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EdgePoint {
    pub pos: Point,
    /// 0 left, 1 right, 2 top, 3 bottom, once classified
    pub edge: usize,
    /// signed distance from the finder center along the edge's axis
    pub extent: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct FinderCenter {
    pub pos: Point,
    pub edge_pts: Vec<EdgePoint>,
}

fn to_pixels(v: i32) -> f64 {
    v as f64 / (1 << SUBPREC) as f64
}

/// Group lines (sorted across `v`, then along it) whose ends line up.
/// `v` is the axis the lines run along: 0 horizontal, 1 vertical.
fn cluster_lines(lines: &[FinderLine], v: usize) -> Vec<Vec<usize>> {
    let mut mark = vec![false; lines.len()];
    let mut clusters = Vec::new();
    for i in 0..lines.len().saturating_sub(1) {
        if mark[i] {
            continue;
        }
        let mut members = vec![i];
        let mut len = lines[i].len;
        for j in i + 1..lines.len() {
            if mark[j] {
                continue;
            }
            let a = &lines[members[members.len() - 1]];
            let b = &lines[j];
            // tolerance grows with the line, since noise breaks big patterns more
            let thresh = (a.len + 7) >> 2;
            if (a.pos[1 - v] - b.pos[1 - v]).abs() > thresh {
                break;
            }
            if (a.pos[v] - b.pos[v]).abs() > thresh
                || (a.pos[v] + a.len - b.pos[v] - b.len).abs() > thresh
            {
                continue;
            }
            if a.boffs > 0
                && b.boffs > 0
                && (a.pos[v] - a.boffs - b.pos[v] + b.boffs).abs() > thresh
            {
                continue;
            }
            if a.eoffs > 0
                && b.eoffs > 0
                && (a.pos[v] + a.len + a.eoffs - b.pos[v] - b.len - b.eoffs).abs() > thresh
            {
                continue;
            }
            members.push(j);
            len += b.len;
        }
        // three lines at least; and about as many lines as the center bar
        // is long, within a factor of five
        let n = members.len() as i32;
        if n < 3 {
            continue;
        }
        let avg = ((len << 1) + n) / (n << 1);
        if n * (5 << SUBPREC) >= avg && n * 5 >= avg >> SUBPREC {
            for &m in &members {
                mark[m] = true;
            }
            clusters.push(members);
        }
    }
    clusters
}

fn lines_cross(h: &FinderLine, v: &FinderLine) -> bool {
    h.pos[0] <= v.pos[0]
        && v.pos[0] < h.pos[0] + h.len
        && v.pos[1] <= h.pos[1]
        && h.pos[1] < v.pos[1] + v.len
}

/// Twice the midpoint of the pattern a line crosses, corrected by the
/// ring offsets when both are known.
fn doubled_center(l: &FinderLine, v: usize) -> i32 {
    let mut c = (l.pos[v] << 1) + l.len;
    if l.boffs > 0 && l.eoffs > 0 {
        c += l.eoffs - l.boffs;
    }
    c
}

fn push_edge_pts(out: &mut Vec<EdgePoint>, lines: &[FinderLine], members: &[usize], v: usize) {
    for &m in members {
        let l = &lines[m];
        let mut ends = Vec::with_capacity(2);
        if l.boffs > 0 {
            ends.push(l.pos[v] - l.boffs);
        }
        if l.eoffs > 0 {
            ends.push(l.pos[v] + l.len + l.eoffs);
        }
        for e in ends {
            let mut p = l.pos;
            p[v] = e;
            out.push(EdgePoint {
                pos: Point::new(to_pixels(p[0]), to_pixels(p[1])),
                edge: 0,
                extent: 0.0,
            });
        }
    }
}

/// Sort, cluster and cross the collected lines. Centers come back with
/// the best supported first.
pub(crate) fn locate_centers(hlines: &mut [FinderLine], vlines: &mut [FinderLine]) -> Vec<FinderCenter> {
    hlines.sort_by_key(|l| (l.pos[1], l.pos[0]));
    vlines.sort_by_key(|l| (l.pos[0], l.pos[1]));
    let hclusters = cluster_lines(hlines, 0);
    let vclusters = cluster_lines(vlines, 1);
    trace!(
        hlines = hlines.len(),
        vlines = vlines.len(),
        hclusters = hclusters.len(),
        vclusters = vclusters.len(),
        "finder clusters"
    );

    let mid = |lines: &[FinderLine], c: &[usize]| lines[c[c.len() >> 1]];
    let mut hmark = vec![false; hclusters.len()];
    let mut vmark = vec![false; vclusters.len()];
    let mut centers = Vec::new();
    for i in 0..hclusters.len() {
        if hmark[i] {
            continue;
        }
        let a = mid(hlines, &hclusters[i]);
        let mut vneighbors = Vec::new();
        let mut y = 0;
        for (j, vc) in vclusters.iter().enumerate() {
            if vmark[j] {
                continue;
            }
            let b = mid(vlines, vc);
            if lines_cross(&a, &b) {
                vmark[j] = true;
                y += doubled_center(&b, 1);
                vneighbors.push(j);
            }
        }
        if vneighbors.is_empty() {
            continue;
        }
        let b = mid(vlines, &vclusters[vneighbors[vneighbors.len() >> 1]]);
        let mut hneighbors = vec![i];
        let mut x = doubled_center(&a, 0);
        for j in i + 1..hclusters.len() {
            if hmark[j] {
                continue;
            }
            let a = mid(hlines, &hclusters[j]);
            if lines_cross(&a, &b) {
                hmark[j] = true;
                x += doubled_center(&a, 0);
                hneighbors.push(j);
            }
        }
        let (nh, nv) = (hneighbors.len() as i32, vneighbors.len() as i32);
        let pos = Point::new(
            to_pixels((x + nh) / (nh << 1)),
            to_pixels((y + nv) / (nv << 1)),
        );
        let mut edge_pts = Vec::new();
        for &h in &hneighbors {
            push_edge_pts(&mut edge_pts, hlines, &hclusters[h], 0);
        }
        for &v in &vneighbors {
            push_edge_pts(&mut edge_pts, vlines, &vclusters[v], 1);
        }
        centers.push(FinderCenter { pos, edge_pts });
    }
    centers.sort_by(|a, b| b.edge_pts.len().cmp(&a.edge_pts.len()));
    centers
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Lines from an ideal finder pattern with `module` pixels per module
    /// whose top-left corner sits at `(x0, y0)`, scanned every pixel.
    pub(crate) fn finder_lines(x0: i32, y0: i32, module: i32) -> (Vec<FinderLine>, Vec<FinderLine>) {
        let s = 1 << SUBPREC;
        let ring = (module + module / 2) * s;
        let mut h = Vec::new();
        let mut v = Vec::new();
        for k in 0..3 * module {
            h.push(FinderLine {
                pos: [(x0 + 2 * module) * s, (y0 + 2 * module + k) * s + s / 2],
                len: 3 * module * s,
                boffs: ring,
                eoffs: ring,
            });
            v.push(FinderLine {
                pos: [(x0 + 2 * module + k) * s + s / 2, (y0 + 2 * module) * s],
                len: 3 * module * s,
                boffs: ring,
                eoffs: ring,
            });
        }
        (h, v)
    }

    #[test]
    fn test_single_finder_center() {
        let (mut h, mut v) = finder_lines(10, 20, 4);
        let centers = locate_centers(&mut h, &mut v);
        assert_eq!(centers.len(), 1);
        let c = &centers[0];
        // 7x7 pattern at (10, 20) with 4 pixel modules: center (24, 34)
        assert!((c.pos.x - 24.0).abs() < 0.5, "{:?}", c.pos);
        assert!((c.pos.y - 34.0).abs() < 0.5, "{:?}", c.pos);
        // two edge points per line
        assert_eq!(c.edge_pts.len(), 4 * 3 * 4);
        // outer ring middles are three modules from the center
        for e in &c.edge_pts {
            let d = (e.pos.x - c.pos.x).abs().max((e.pos.y - c.pos.y).abs());
            assert!((d - 12.0).abs() < 1.0, "{:?}", e.pos);
        }
    }

    #[test]
    fn test_three_finders() {
        let mut h = Vec::new();
        let mut v = Vec::new();
        for (x, y) in [(0, 0), (100, 0), (0, 100)] {
            let (a, b) = finder_lines(x, y, 3);
            h.extend(a);
            v.extend(b);
        }
        let centers = locate_centers(&mut h, &mut v);
        assert_eq!(centers.len(), 3);
    }

    #[test]
    fn test_too_few_lines() {
        let (h, v) = finder_lines(0, 0, 4);
        let mut h = h[..2].to_vec();
        let mut v = v[..2].to_vec();
        assert!(locate_centers(&mut h, &mut v).is_empty());
    }

    #[test]
    fn test_crossing() {
        let h = FinderLine {
            pos: [0, 10],
            len: 20,
            boffs: 0,
            eoffs: 0,
        };
        let v = FinderLine {
            pos: [5, 0],
            len: 20,
            boffs: 0,
            eoffs: 0,
        };
        assert!(lines_cross(&h, &v));
        let far = FinderLine { pos: [25, 0], ..v };
        assert!(!lines_cross(&h, &far));
    }
}
