//! Difference images and divergence scoring
//!
//! The comparison metric is absolute per-channel difference over RGB. The
//! per-pixel channel sum is clamped to 255 before normalization, bounding
//! the contribution of any single pixel to the score.

use image::{Rgb, RgbImage};

/// Errors raised by the comparison subsystem.
#[derive(Debug)]
pub enum CompareError {
    /// The two images being diffed have unequal dimensions.
    DimensionMismatch {
        left: (u32, u32),
        right: (u32, u32),
    },
    /// A frame's divergence from its reference exceeded the threshold.
    DivergenceExceeded {
        entry: String,
        divergence: f32,
        max_divergence: f32,
    },
}

impl std::error::Error for CompareError {}

impl std::fmt::Display for CompareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DimensionMismatch { left, right } => write!(
                f,
                "different dimensions: {}x{} vs {}x{}",
                left.0, left.1, right.0, right.1
            ),
            Self::DivergenceExceeded {
                entry,
                divergence,
                max_divergence,
            } => write!(
                f,
                "divergence {divergence} exceeds {max_divergence} against reference entry {entry}"
            ),
        }
    }
}

/// Computes the per-pixel, per-channel absolute difference of two images.
///
/// # Errors
///
/// Fails with [`CompareError::DimensionMismatch`] when the inputs differ in
/// width or height. Images are never resized or cropped to fit.
pub fn difference_image(left: &RgbImage, right: &RgbImage) -> Result<RgbImage, CompareError> {
    if left.dimensions() != right.dimensions() {
        return Err(CompareError::DimensionMismatch {
            left: left.dimensions(),
            right: right.dimensions(),
        });
    }

    let (width, height) = left.dimensions();
    let mut out = RgbImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let Rgb([r1, g1, b1]) = *left.get_pixel(x, y);
            let Rgb([r2, g2, b2]) = *right.get_pixel(x, y);
            out.put_pixel(
                x,
                y,
                Rgb([r1.abs_diff(r2), g1.abs_diff(g2), b1.abs_diff(b2)]),
            );
        }
    }

    Ok(out)
}

/// Scores a difference image as a scalar in `[0, 1]`.
///
/// Each pixel contributes `min(r + g + b, 255)`; the sum is normalized by
/// `255 * width * height`. Zero means the diff is all black, i.e. the two
/// source images are identical under this metric.
#[must_use]
#[expect(clippy::cast_precision_loss)]
pub fn divergence(diff: &RgbImage) -> f32 {
    let (width, height) = diff.dimensions();
    let all = 0xFF * u64::from(width) * u64::from(height);
    if all == 0 {
        return 0.0;
    }

    let sum: u64 = diff
        .pixels()
        .map(|Rgb([r, g, b])| {
            let channel_sum = u32::from(*r) + u32::from(*g) + u32::from(*b);
            u64::from(channel_sum.min(0xFF))
        })
        .sum();

    sum as f32 / all as f32
}
