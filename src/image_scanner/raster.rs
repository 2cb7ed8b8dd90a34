//! Grayscale rasters handed to the image scanner.

use std::path::Path;

use rayon::prelude::*;

use crate::error::{Result, ScanError};

/// Luma coefficients: Y = (76*R + 150*G + 29*B) >> 8
const COEF_R: u32 = 76;
const COEF_G: u32 = 150;
const COEF_B: u32 = 29;

#[inline]
fn luma(px: &[u8]) -> u8 {
    let y = (COEF_R * px[0] as u32 + COEF_G * px[1] as u32 + COEF_B * px[2] as u32) >> 8;
    y.min(255) as u8
}

/// An 8-bit grayscale image, row major, one byte per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

fn required_len(width: usize, height: usize, channels: usize, actual: usize) -> Result<usize> {
    let expected = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(channels))
        .unwrap_or(usize::MAX);
    if actual < expected {
        return Err(ScanError::InvalidImage {
            width,
            height,
            expected,
            actual,
        });
    }
    Ok(expected)
}

impl Image {
    /// Wrap a grayscale buffer. Bytes past `width * height` are dropped.
    pub fn new(mut data: Vec<u8>, width: usize, height: usize) -> Result<Self> {
        let len = required_len(width, height, 1, data.len())?;
        data.truncate(len);
        Ok(Self { data, width, height })
    }

    /// Convert packed RGB, rows in parallel.
    pub fn from_rgb(rgb: &[u8], width: usize, height: usize) -> Result<Self> {
        Self::from_packed(rgb, width, height, 3)
    }

    /// Convert packed RGBA, ignoring alpha.
    pub fn from_rgba(rgba: &[u8], width: usize, height: usize) -> Result<Self> {
        Self::from_packed(rgba, width, height, 4)
    }

    fn from_packed(src: &[u8], width: usize, height: usize, channels: usize) -> Result<Self> {
        required_len(width, height, channels, src.len())?;
        let mut data = vec![0u8; width * height];
        if width > 0 {
            data.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
                let start = y * width * channels;
                let line = &src[start..start + width * channels];
                for (out, px) in row.iter_mut().zip(line.chunks_exact(channels)) {
                    *out = luma(px);
                }
            });
        }
        Ok(Self { data, width, height })
    }

    /// Load an image file in any format the `image` crate reads.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let img = image::open(path)?;
        Ok(Self::from_dynamic(&img))
    }

    /// Convert an already decoded image.
    pub fn from_dynamic(img: &image::DynamicImage) -> Self {
        let luma = img.to_luma8();
        let (width, height) = luma.dimensions();
        Self {
            data: luma.into_raw(),
            width: width as usize,
            height: height as usize,
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel bytes, `width * height` of them.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// One row of pixels.
    pub fn row(&self, y: usize) -> &[u8] {
        &self.data[y * self.width..(y + 1) * self.width]
    }
}
