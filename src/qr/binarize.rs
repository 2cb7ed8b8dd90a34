/// Adaptive threshold for the QR sampler.
///
/// Each pixel is compared against the mean of a box window around it,
/// minus a small bias so flat regions read as light. The window is a power
/// of two between 16 and 256 pixels per side, about an eighth of the image.
/// Returns a BitMatrix where true = dark.
pub fn binarize(gray: &[u8], width: usize, height: usize) -> crate::models::BitMatrix {
    use crate::models::BitMatrix;

    let mut out = BitMatrix::new(width, height);
    if width == 0 || height == 0 || gray.len() < width * height {
        return out;
    }

    let log_window = |n: usize| {
        let mut l = 4;
        while l < 8 && (1usize << l) < ((n + 7) >> 3) {
            l += 1;
        }
        l
    };
    let logw = log_window(width);
    let logh = log_window(height);
    let (windw, windh) = (1usize << logw, 1usize << logh);

    // column sums over the vertical window, edge rows replicated
    let mut cols: Vec<u32> = gray[..width]
        .iter()
        .map(|&g| ((g as u32) << (logh - 1)) + g as u32)
        .collect();
    for y in 1..windh / 2 {
        let row = y.min(height - 1) * width;
        for (sum, &g) in cols.iter_mut().zip(&gray[row..row + width]) {
            *sum += g as u32;
        }
    }

    for y in 0..height {
        let mut m = (cols[0] << (logw - 1)) + cols[0];
        for x in 1..windw / 2 {
            m += cols[x.min(width - 1)];
        }
        for x in 0..width {
            let g = gray[y * width + x] as u32;
            if ((g + 3) << (logw + logh)) < m {
                out.set(x, y, true);
            }
            if x + 1 < width {
                m += cols[(x + windw / 2).min(width - 1)];
                m -= cols[x.saturating_sub(windw / 2)];
            }
        }
        if y + 1 < height {
            let old = y.saturating_sub(windh / 2) * width;
            let new = (y + windh / 2).min(height - 1) * width;
            for (x, sum) in cols.iter_mut().enumerate() {
                *sum += gray[new + x] as u32;
                *sum -= gray[old + x] as u32;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_is_light() {
        for level in [0u8, 128, 255] {
            let img = vec![level; 40 * 30];
            assert_eq!(binarize(&img, 40, 30).count_ones(), 0);
        }
    }

    #[test]
    fn test_dark_square_on_white() {
        let (w, h) = (64, 64);
        let mut img = vec![255u8; w * h];
        for y in 20..40 {
            for x in 24..44 {
                img[y * w + x] = 0;
            }
        }
        let bin = binarize(&img, w, h);
        assert!(bin.get(30, 30));
        assert!(bin.get(24, 20));
        assert!(!bin.get(5, 5));
        assert!(!bin.get(50, 30));
    }

    #[test]
    fn test_follows_illumination_gradient() {
        // stripes that are dark relative to their neighborhood, on a ramp
        // where a global threshold would fail
        let (w, h) = (128, 32);
        let mut img = vec![0u8; w * h];
        for y in 0..h {
            for x in 0..w {
                let base = 60 + x as u32 * 190 / w as u32;
                let v = if (x / 4) % 2 == 0 { base - 50 } else { base };
                img[y * w + x] = v as u8;
            }
        }
        let bin = binarize(&img, w, h);
        assert!(bin.get(1, 16));
        assert!(!bin.get(5, 16));
        assert!(bin.get(121, 16));
        assert!(!bin.get(125, 16));
    }

    #[test]
    fn test_short_buffer() {
        assert_eq!(binarize(&[0; 10], 4, 4).count_ones(), 0);
    }
}
