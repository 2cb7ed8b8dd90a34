/// Compact bit matrix: binarized images (true = dark) and sampled QR modules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitMatrix {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl BitMatrix {
    /// Create a new bit matrix with given dimensions, all bits clear
    pub fn new(width: usize, height: usize) -> Self {
        let bytes_needed = (width * height).div_ceil(8);
        Self {
            width,
            height,
            data: vec![0; bytes_needed],
        }
    }

    /// Build a matrix from one byte per pixel, nonzero meaning dark.
    ///
    /// Returns `None` when `pixels` is shorter than `width * height`.
    pub fn from_bytes(pixels: &[u8], width: usize, height: usize) -> Option<Self> {
        if pixels.len() < width * height {
            return None;
        }
        let mut matrix = Self::new(width, height);
        for (i, &p) in pixels[..width * height].iter().enumerate() {
            if p != 0 {
                matrix.data[i / 8] |= 1 << (i % 8);
            }
        }
        Some(matrix)
    }

    /// Get matrix width
    pub fn width(&self) -> usize {
        self.width
    }

    /// Get matrix height
    pub fn height(&self) -> usize {
        self.height
    }

    /// Get bit at (x, y); out of range reads as clear
    pub fn get(&self, x: usize, y: usize) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let index = y * self.width + x;
        (self.data[index / 8] >> (index % 8)) & 1 == 1
    }

    /// Signed-coordinate read used by samplers; outside reads as clear
    pub fn get_i(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 {
            return false;
        }
        self.get(x as usize, y as usize)
    }

    /// Set bit at (x, y)
    pub fn set(&mut self, x: usize, y: usize, value: bool) {
        if x >= self.width || y >= self.height {
            return;
        }
        let index = y * self.width + x;
        if value {
            self.data[index / 8] |= 1 << (index % 8);
        } else {
            self.data[index / 8] &= !(1 << (index % 8));
        }
    }

    /// Toggle bit at (x, y)
    pub fn toggle(&mut self, x: usize, y: usize) {
        if x >= self.width || y >= self.height {
            return;
        }
        let index = y * self.width + x;
        self.data[index / 8] ^= 1 << (index % 8);
    }

    /// Swap rows and columns
    pub fn transpose(&self) -> Self {
        let mut out = Self::new(self.height, self.width);
        for y in 0..self.height {
            for x in 0..self.width {
                if self.get(x, y) {
                    out.set(y, x, true);
                }
            }
        }
        out
    }

    /// Number of set bits
    pub fn count_ones(&self) -> usize {
        self.data.iter().map(|b| b.count_ones() as usize).sum()
    }
}

impl Default for BitMatrix {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_matrix() {
        let mut matrix = BitMatrix::new(8, 8);
        assert_eq!(matrix.width(), 8);
        assert_eq!(matrix.height(), 8);

        matrix.set(3, 4, true);
        assert!(matrix.get(3, 4));
        assert!(!matrix.get(3, 3));
        assert_eq!(matrix.count_ones(), 1);

        matrix.toggle(3, 4);
        assert!(!matrix.get(3, 4));
    }

    #[test]
    fn test_out_of_bounds() {
        let mut matrix = BitMatrix::new(8, 8);
        matrix.set(10, 10, true);
        assert!(!matrix.get(10, 10));
        assert!(!matrix.get_i(-1, 2));
    }

    #[test]
    fn test_from_bytes_and_transpose() {
        let m = BitMatrix::from_bytes(&[1, 0, 0, 0, 0, 1], 3, 2).unwrap();
        assert!(m.get(0, 0));
        assert!(m.get(2, 1));
        let t = m.transpose();
        assert_eq!((t.width(), t.height()), (2, 3));
        assert!(t.get(1, 2));
        assert!(BitMatrix::from_bytes(&[1, 0], 3, 2).is_none());
    }
}
