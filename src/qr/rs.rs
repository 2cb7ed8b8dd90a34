//! Reed-Solomon codes over GF(2^8).
//!
//! Codewords are stored highest coefficient first: `data[0]` multiplies
//! `x^(n-1)`. The generator's roots start at `alpha^m0`; QR codes use
//! `m0 = 0` with the primitive polynomial `x^8 + x^4 + x^3 + x^2 + 1`.

use thiserror::Error;

/// `x^8 + x^4 + x^3 + x^2 + 1`
pub const QR_PPOLY: u32 = 0x11D;

/// Log/exp tables for GF(2^8) generated by `alpha = 2`.
#[derive(Clone)]
pub struct Gf256 {
    log: [u8; 256],
    /// doubled so that sums of two logs never need a reduction
    exp: [u8; 511],
    /// `quad[k]` is a root `y` of `y^2 + y = k`, or 0 when there is none
    quad: [u8; 256],
}

impl std::fmt::Debug for Gf256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gf256").finish_non_exhaustive()
    }
}

impl Gf256 {
    /// Build the tables for the field with primitive polynomial `ppoly`.
    pub fn new(ppoly: u32) -> Self {
        let mut gf = Self {
            log: [0; 256],
            exp: [0; 511],
            quad: [0; 256],
        };
        let mut p: u32 = 1;
        for i in 0..256 {
            gf.exp[i] = p as u8;
            if i + 255 < 511 {
                gf.exp[i + 255] = p as u8;
            }
            p = ((p << 1) ^ ((p >> 7).wrapping_neg() & ppoly)) & 0xFF;
        }
        for i in 0..255 {
            gf.log[gf.exp[i] as usize] = i as u8;
        }
        gf.log[0] = 0;
        // 0 and 1 both solve y^2 + y = 0, so every stored root is at least 2
        for y in 2..=255u8 {
            let k = gf.mul(y, y) ^ y;
            if gf.quad[k as usize] == 0 {
                gf.quad[k as usize] = y;
            }
        }
        gf
    }

    /// `alpha^i`
    pub fn exp(&self, i: usize) -> u8 {
        self.exp[i % 255]
    }

    /// Discrete logarithm; `log(0)` is meaningless and returns 0.
    pub fn log(&self, a: u8) -> usize {
        self.log[a as usize] as usize
    }

    /// `a * b`
    pub fn mul(&self, a: u8, b: u8) -> u8 {
        if a == 0 || b == 0 {
            0
        } else {
            self.exp[self.log(a) + self.log(b)]
        }
    }

    /// `a / b`; `b` must be nonzero.
    pub fn div(&self, a: u8, b: u8) -> u8 {
        if a == 0 {
            0
        } else {
            self.exp[self.log(a) + 255 - self.log(b)]
        }
    }

    /// `a * alpha^logb`
    fn hmul(&self, a: u8, logb: usize) -> u8 {
        if a == 0 {
            0
        } else {
            self.exp[self.log(a) + logb % 255]
        }
    }

    /// Evaluate a low-order-first polynomial at `x`.
    fn eval(&self, poly: &[u8], x: u8) -> u8 {
        poly.iter().rev().fold(0, |acc, &c| self.mul(acc, x) ^ c)
    }
}

/// Why a block could not be corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RsError {
    /// Errors plus half the erasures exceed the parity
    #[error("more errors than the parity can correct")]
    TooManyErrors,
    /// The locator polynomial does not factor over the codeword positions
    #[error("error locator has repeated or missing roots")]
    Degenerate,
    /// An error position or the block size is out of range
    #[error("error located outside the codeword")]
    OutOfRange,
}

/// Correct `data` in place against `npar` parity symbols.
///
/// `erasures` lists positions known to be unreliable. Returns the number
/// of symbols corrected, or an error when the block cannot be corrected;
/// `data` is untouched on error.
pub fn rs_correct(
    gf: &Gf256,
    m0: usize,
    data: &mut [u8],
    npar: usize,
    erasures: &[usize],
) -> Result<usize, RsError> {
    let ndata = data.len();
    if npar == 0 || npar > ndata || ndata > 255 {
        return Err(RsError::OutOfRange);
    }
    let syndromes: Vec<u8> = (0..npar)
        .map(|j| data.iter().fold(0, |s, &b| gf.hmul(s, m0 + j) ^ b))
        .collect();
    if syndromes.iter().all(|&s| s == 0) {
        return Ok(0);
    }

    let nerasures = erasures.len();
    if nerasures > npar {
        return Err(RsError::TooManyErrors);
    }
    // erasure locator, lowest order first
    let mut lambda = vec![0u8; npar + 1];
    lambda[0] = 1;
    for &pos in erasures {
        if pos >= ndata {
            return Err(RsError::OutOfRange);
        }
        let x = gf.exp(ndata - 1 - pos);
        for i in (1..=npar).rev() {
            lambda[i] ^= gf.mul(lambda[i - 1], x);
        }
    }

    // Berlekamp-Massey, seeded with the erasure locator
    let mut b = lambda.clone();
    let mut l = nerasures;
    let mut m = 1;
    let mut db: u8 = 1;
    for r in nerasures..npar {
        let mut delta = 0;
        for i in 0..=l.min(r) {
            delta ^= gf.mul(lambda[i], syndromes[r - i]);
        }
        if delta == 0 {
            m += 1;
            continue;
        }
        let scale = gf.div(delta, db);
        let prev = lambda.clone();
        for i in m..=npar {
            lambda[i] ^= gf.mul(scale, b[i - m]);
        }
        if 2 * l <= r + nerasures {
            l = r + 1 + nerasures - l;
            b = prev;
            db = delta;
            m = 1;
        } else {
            m += 1;
        }
    }
    if l == 0 || 2 * (l - nerasures.min(l)) > npar - nerasures {
        return Err(RsError::TooManyErrors);
    }
    if lambda[l + 1..].iter().any(|&c| c != 0) || lambda[l] == 0 {
        return Err(RsError::Degenerate);
    }

    let roots = locator_roots(gf, &lambda[..=l])?;
    if roots.iter().any(|&i| i >= ndata) {
        return Err(RsError::OutOfRange);
    }

    // Forney: omega = S * lambda mod x^npar
    let mut omega = vec![0u8; npar];
    for (i, slot) in omega.iter_mut().enumerate() {
        for j in 0..=i.min(l) {
            *slot ^= gf.mul(lambda[j], syndromes[i - j]);
        }
    }
    let derivative: Vec<u8> = (1..=l)
        .map(|i| if i % 2 == 1 { lambda[i] } else { 0 })
        .collect();
    let mut fixes = Vec::with_capacity(roots.len());
    for &i in &roots {
        let xinv = gf.exp(255 - i % 255);
        let den = gf.eval(&derivative, xinv);
        if den == 0 {
            return Err(RsError::Degenerate);
        }
        let num = gf.eval(&omega, xinv);
        // X^(1 - m0)
        let shift = ((i as i64) * (1 - m0 as i64)).rem_euclid(255) as usize;
        fixes.push((ndata - 1 - i, gf.hmul(gf.div(num, den), shift)));
    }
    for (pos, e) in fixes {
        data[pos] ^= e;
    }
    Ok(l)
}

/// Exponents `i` of the locator roots `X = alpha^i`, where the locator is
/// `prod(1 + X x)`, lowest order first.
fn locator_roots(gf: &Gf256, lambda: &[u8]) -> Result<Vec<usize>, RsError> {
    let degree = lambda.len() - 1;
    match degree {
        1 => Ok(vec![gf.log(lambda[1])]),
        2 => {
            // X^2 + l1 X + l2 = 0; X = l1 y turns it into y^2 + y = l2 / l1^2
            let (l1, l2) = (lambda[1], lambda[2]);
            if l1 == 0 {
                return Err(RsError::Degenerate);
            }
            let k = gf.div(l2, gf.mul(l1, l1));
            let y = gf.quad[k as usize];
            if y == 0 {
                return Err(RsError::Degenerate);
            }
            let x0 = gf.mul(l1, y);
            Ok(vec![gf.log(x0), gf.log(x0 ^ l1)])
        }
        _ => {
            // Chien search over every nonzero field element
            let roots: Vec<usize> = (0..255)
                .filter(|&i| gf.eval(lambda, gf.exp(255 - i)) == 0)
                .collect();
            if roots.len() != degree {
                return Err(RsError::Degenerate);
            }
            Ok(roots)
        }
    }
}

/// Generator polynomial `prod(x + alpha^(m0 + i))` for `i < npar`,
/// highest order first, leading 1 included.
pub fn rs_compute_genpoly(gf: &Gf256, m0: usize, npar: usize) -> Vec<u8> {
    let mut g = vec![1u8];
    for i in 0..npar {
        let root = gf.exp(m0 + i);
        let mut next = vec![0u8; g.len() + 1];
        for (j, &c) in g.iter().enumerate() {
            next[j] ^= c;
            next[j + 1] ^= gf.mul(c, root);
        }
        g = next;
    }
    g
}

/// Overwrite the last `genpoly.len() - 1` symbols of `data` with parity
/// computed over the rest.
pub fn rs_encode(gf: &Gf256, data: &mut [u8], genpoly: &[u8]) {
    let npar = genpoly.len() - 1;
    if npar == 0 || data.len() < npar {
        return;
    }
    let ndata = data.len() - npar;
    let mut rem = vec![0u8; npar];
    for k in 0..ndata {
        let f = data[k] ^ rem[0];
        rem.rotate_left(1);
        rem[npar - 1] = 0;
        for (slot, &g) in rem.iter_mut().zip(&genpoly[1..]) {
            *slot ^= gf.mul(f, g);
        }
    }
    data[ndata..].copy_from_slice(&rem);
}
