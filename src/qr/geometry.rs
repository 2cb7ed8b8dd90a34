//! Affine and projective maps between the module grid and the image, and
//! straight lines fitted through edge samples.

use crate::models::Point;

/// Map from a unit domain onto three image points: `(0, 0)` to `origin`,
/// `(1, 0)` to `pu` and `(0, 1)` to `pv`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Affine {
    origin: Point,
    u: Point,
    v: Point,
    det: f64,
}

impl Affine {
    pub(crate) fn new(origin: Point, pu: Point, pv: Point) -> Option<Self> {
        let (u, v) = (pu - origin, pv - origin);
        let det = u.cross(&v);
        (det.abs() > 1e-9).then_some(Self { origin, u, v, det })
    }

    pub(crate) fn project(&self, q: Point) -> Point {
        self.origin + self.u * q.x + self.v * q.y
    }

    pub(crate) fn unproject(&self, p: Point) -> Point {
        let d = p - self.origin;
        Point::new(d.cross(&self.v) / self.det, self.u.cross(&d) / self.det)
    }
}

type Mat3 = [[f64; 3]; 3];

fn mat_mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, slot) in row.iter_mut().enumerate() {
            *slot = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

fn mat_inverse(m: &Mat3) -> Option<Mat3> {
    let cof = |r0: usize, r1: usize, c0: usize, c1: usize| m[r0][c0] * m[r1][c1] - m[r0][c1] * m[r1][c0];
    let adj = [
        [cof(1, 2, 1, 2), -cof(0, 2, 1, 2), cof(0, 1, 1, 2)],
        [-cof(1, 2, 0, 2), cof(0, 2, 0, 2), -cof(0, 1, 0, 2)],
        [cof(1, 2, 0, 1), -cof(0, 2, 0, 1), cof(0, 1, 0, 1)],
    ];
    let det = m[0][0] * adj[0][0] + m[0][1] * adj[1][0] + m[0][2] * adj[2][0];
    if det.abs() < 1e-12 {
        return None;
    }
    Some(adj.map(|row| row.map(|x| x / det)))
}

fn apply(m: &Mat3, p: Point) -> Option<Point> {
    let w = m[2][0] * p.x + m[2][1] * p.y + m[2][2];
    if w.abs() < 1e-12 {
        return None;
    }
    Some(Point::new(
        (m[0][0] * p.x + m[0][1] * p.y + m[0][2]) / w,
        (m[1][0] * p.x + m[1][1] * p.y + m[1][2]) / w,
    ))
}

/// Translate to the centroid and scale to unit mean distance.
fn normalizer(points: impl Iterator<Item = Point> + Clone) -> Mat3 {
    let n = points.clone().count().max(1) as f64;
    let c = points.clone().fold(Point::default(), |acc, p| acc + p) * (1.0 / n);
    let spread = points.map(|p| p.distance(&c)).sum::<f64>() / n;
    let s = if spread > 1e-12 { std::f64::consts::SQRT_2 / spread } else { 1.0 };
    [[s, 0.0, -s * c.x], [0.0, s, -s * c.y], [0.0, 0.0, 1.0]]
}

/// Projective map from a source plane (module grid) to the image.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Homography {
    fwd: Mat3,
    inv: Mat3,
}

impl Homography {
    /// Least-squares direct linear transform through `(src, dst)` pairs;
    /// exact when given four pairs in general position.
    pub(crate) fn fit(pairs: &[(Point, Point)]) -> Option<Self> {
        if pairs.len() < 4 {
            return None;
        }
        let ts = normalizer(pairs.iter().map(|p| p.0));
        let td = normalizer(pairs.iter().map(|p| p.1));
        // normal equations of the 2n x 8 system
        let mut ata = [[0.0f64; 8]; 8];
        let mut atb = [0.0f64; 8];
        for &(s, d) in pairs {
            let s = apply(&ts, s)?;
            let d = apply(&td, d)?;
            let rows = [
                ([s.x, s.y, 1.0, 0.0, 0.0, 0.0, -d.x * s.x, -d.x * s.y], d.x),
                ([0.0, 0.0, 0.0, s.x, s.y, 1.0, -d.y * s.x, -d.y * s.y], d.y),
            ];
            for (row, rhs) in rows {
                for i in 0..8 {
                    atb[i] += row[i] * rhs;
                    for j in 0..8 {
                        ata[i][j] += row[i] * row[j];
                    }
                }
            }
        }
        let h = solve_linear_system(&ata, &atb)?;
        let hn = [[h[0], h[1], h[2]], [h[3], h[4], h[5]], [h[6], h[7], 1.0]];
        let fwd = mat_mul(&mat_mul(&mat_inverse(&td)?, &hn), &ts);
        let inv = mat_inverse(&fwd)?;
        Some(Self { fwd, inv })
    }

    pub(crate) fn from_quad(src: &[Point; 4], dst: &[Point; 4]) -> Option<Self> {
        let pairs: Vec<(Point, Point)> = src.iter().copied().zip(dst.iter().copied()).collect();
        Self::fit(&pairs)
    }

    /// Source plane to image; points on the horizon land far away.
    pub(crate) fn project(&self, p: Point) -> Point {
        apply(&self.fwd, p).unwrap_or(Point::new(f64::MAX, f64::MAX))
    }

    /// Image to source plane.
    pub(crate) fn unproject(&self, p: Point) -> Point {
        apply(&self.inv, p).unwrap_or(Point::new(f64::MAX, f64::MAX))
    }

    /// Same map with the source axes swapped.
    pub(crate) fn transposed(&self) -> Self {
        let mut fwd = self.fwd;
        let mut inv = self.inv;
        for row in fwd.iter_mut() {
            row.swap(0, 1);
        }
        inv.swap(0, 1);
        Self { fwd, inv }
    }

    /// Precompose with a scale and offset of the source plane:
    /// `p -> project(p * scale + offset)`.
    pub(crate) fn rescaled(&self, scale: f64, offset: Point) -> Option<Self> {
        let m = [[scale, 0.0, offset.x], [0.0, scale, offset.y], [0.0, 0.0, 1.0]];
        let fwd = mat_mul(&self.fwd, &m);
        let inv = mat_inverse(&fwd)?;
        Some(Self { fwd, inv })
    }
}

/// Solve 8x8 linear system using Gaussian elimination
#[allow(clippy::needless_range_loop)]
fn solve_linear_system(a: &[[f64; 8]; 8], b: &[f64; 8]) -> Option<[f64; 8]> {
    let mut a = *a;
    let mut b = *b;
    let n = 8;

    for i in 0..n {
        let mut max_val = a[i][i].abs();
        let mut max_row = i;
        for k in (i + 1)..n {
            if a[k][i].abs() > max_val {
                max_val = a[k][i].abs();
                max_row = k;
            }
        }
        if max_val < 1e-12 {
            return None;
        }
        if max_row != i {
            a.swap(i, max_row);
            b.swap(i, max_row);
        }
        for k in (i + 1)..n {
            let factor = a[k][i] / a[i][i];
            b[k] -= factor * b[i];
            for j in i..n {
                a[k][j] -= factor * a[i][j];
            }
        }
    }

    let mut x = [0.0f64; 8];
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= a[i][j] * x[j];
        }
        x[i] = sum / a[i][i];
    }
    Some(x)
}

/// `a x + b y + c = 0` with `(a, b)` a unit normal.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Line {
    a: f64,
    b: f64,
    c: f64,
}

impl Line {
    /// Total least squares fit; `None` for fewer than two distinct points.
    pub(crate) fn fit(points: &[Point]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let n = points.len() as f64;
        let c = points.iter().fold(Point::default(), |acc, &p| acc + p) * (1.0 / n);
        let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
        for p in points {
            let d = *p - c;
            sxx += d.x * d.x;
            sxy += d.x * d.y;
            syy += d.y * d.y;
        }
        if sxx + syy < 1e-12 {
            return None;
        }
        // direction of greatest spread
        let theta = 0.5 * (2.0 * sxy).atan2(sxx - syy);
        let (a, b) = (-theta.sin(), theta.cos());
        Some(Self {
            a,
            b,
            c: -(a * c.x + b * c.y),
        })
    }

    pub(crate) fn through(p: Point, q: Point) -> Option<Self> {
        Self::fit(&[p, q])
    }

    /// Signed distance, positive on the side the line was oriented towards.
    pub(crate) fn distance(&self, p: Point) -> f64 {
        self.a * p.x + self.b * p.y + self.c
    }

    /// Flip the normal so that `p` lies on the positive side.
    pub(crate) fn orient(&mut self, p: Point) {
        if self.distance(p) < 0.0 {
            self.a = -self.a;
            self.b = -self.b;
            self.c = -self.c;
        }
    }

    /// Move the line along its normal.
    pub(crate) fn shifted(&self, d: f64) -> Self {
        Self {
            c: self.c - d,
            ..*self
        }
    }

    pub(crate) fn intersect(&self, other: &Line) -> Option<Point> {
        let det = self.a * other.b - self.b * other.a;
        if det.abs() < 1e-9 {
            return None;
        }
        Some(Point::new(
            (self.b * other.c - self.c * other.b) / det,
            (self.c * other.a - self.a * other.c) / det,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_affine_round_trip() {
        let aff = Affine::new(
            Point::new(10.0, 20.0),
            Point::new(110.0, 30.0),
            Point::new(5.0, 120.0),
        )
        .unwrap();
        let p = aff.project(Point::new(0.25, 0.5));
        let q = aff.unproject(p);
        assert_relative_eq!(q.x, 0.25, epsilon = 1e-9);
        assert_relative_eq!(q.y, 0.5, epsilon = 1e-9);
        assert!(Affine::new(Point::new(0.0, 0.0), Point::new(1.0, 1.0), Point::new(2.0, 2.0)).is_none());
    }

    #[test]
    fn test_homography_maps_quad() {
        let src = [
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 100.0),
            Point::new(0.0, 100.0),
        ];
        let dst = [
            Point::new(12.0, 8.0),
            Point::new(180.0, 20.0),
            Point::new(170.0, 160.0),
            Point::new(20.0, 150.0),
        ];
        let h = Homography::from_quad(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(&dst) {
            let p = h.project(*s);
            assert_relative_eq!(p.x, d.x, epsilon = 1e-6);
            assert_relative_eq!(p.y, d.y, epsilon = 1e-6);
            let q = h.unproject(*d);
            assert_relative_eq!(q.x, s.x, epsilon = 1e-6);
            assert_relative_eq!(q.y, s.y, epsilon = 1e-6);
        }
        let t = h.transposed();
        let p = t.project(Point::new(0.0, 100.0));
        assert_relative_eq!(p.x, 180.0, epsilon = 1e-6);
        let back = t.unproject(p);
        assert_relative_eq!(back.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(back.y, 100.0, epsilon = 1e-6);
    }

    #[test]
    fn test_homography_least_squares() {
        // points exactly on a known map fit back to it
        let truth = Homography::from_quad(
            &[
                Point::new(0.0, 0.0),
                Point::new(1.0, 0.0),
                Point::new(1.0, 1.0),
                Point::new(0.0, 1.0),
            ],
            &[
                Point::new(0.0, 0.0),
                Point::new(200.0, 10.0),
                Point::new(210.0, 190.0),
                Point::new(-5.0, 205.0),
            ],
        )
        .unwrap();
        let pairs: Vec<(Point, Point)> = (0..5)
            .flat_map(|i| (0..5).map(move |j| Point::new(i as f64 / 4.0, j as f64 / 4.0)))
            .map(|s| (s, truth.project(s)))
            .collect();
        let h = Homography::fit(&pairs).unwrap();
        let p = h.project(Point::new(0.3, 0.7));
        let q = truth.project(Point::new(0.3, 0.7));
        assert_relative_eq!(p.x, q.x, epsilon = 1e-6);
        assert_relative_eq!(p.y, q.y, epsilon = 1e-6);
    }

    #[test]
    fn test_line_fit_and_intersection() {
        let pts: Vec<Point> = (0..10).map(|i| Point::new(i as f64, 2.0 * i as f64 + 1.0)).collect();
        let mut l = Line::fit(&pts).unwrap();
        assert_relative_eq!(l.distance(Point::new(3.0, 7.0)), 0.0, epsilon = 1e-9);
        l.orient(Point::new(10.0, 0.0));
        assert!(l.distance(Point::new(10.0, 0.0)) > 0.0);
        let h = Line::through(Point::new(0.0, 5.0), Point::new(10.0, 5.0)).unwrap();
        let x = l.intersect(&h).unwrap();
        assert_relative_eq!(x.x, 2.0, epsilon = 1e-9);
        assert_relative_eq!(x.y, 5.0, epsilon = 1e-9);
        assert!(h.intersect(&h.shifted(1.0)).is_none());
    }
}
