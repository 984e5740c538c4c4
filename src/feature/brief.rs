//! Steered BRIEF descriptors with intensity-centroid orientation.
//!
//! The sampling pattern is 256 point pairs drawn once from a fixed-seed
//! generator with an approximately Gaussian spread inside the patch, so the
//! same binary always produces identical descriptors for identical pixels.

use crate::feature::{Descriptor, DESCRIPTOR_BITS, DESCRIPTOR_BYTES};
use crate::image::{ImageView, OwnedImage};
use crate::util::ImageResult;
use std::sync::OnceLock;

/// Radius of the circular patch used for orientation.
pub const ORIENTATION_RADIUS: isize = 15;

/// Largest absolute pattern coordinate before rotation.
const PATTERN_EXTENT: i8 = 13;

/// Margin that keeps every steered sample and the orientation patch inside
/// the image.
pub const PATCH_BORDER: usize = 20;

/// One binary test: compare `I(a)` against `I(b)`.
#[derive(Clone, Copy, Debug)]
struct TestPair {
    ax: i8,
    ay: i8,
    bx: i8,
    by: i8,
}

struct SplitMix64(u64);

impl SplitMix64 {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Sum of four uniforms in [-1, 1), rescaled; approximately Gaussian.
    fn coord(&mut self) -> i8 {
        let mut acc = 0i64;
        for _ in 0..4 {
            acc += (self.next() >> 53) as i64 - (1 << 10);
        }
        let scaled = acc as f64 / f64::from(1u32 << 10) / 4.0 * 2.0 * f64::from(PATTERN_EXTENT);
        (scaled.round() as i64).clamp(-i64::from(PATTERN_EXTENT), i64::from(PATTERN_EXTENT)) as i8
    }
}

fn pattern() -> &'static [TestPair; DESCRIPTOR_BITS] {
    static PATTERN: OnceLock<[TestPair; DESCRIPTOR_BITS]> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let mut rng = SplitMix64(0x6C61_6265_6C6D_6174);
        let mut pairs = [TestPair {
            ax: 0,
            ay: 0,
            bx: 0,
            by: 0,
        }; DESCRIPTOR_BITS];
        for pair in pairs.iter_mut() {
            loop {
                let candidate = TestPair {
                    ax: rng.coord(),
                    ay: rng.coord(),
                    bx: rng.coord(),
                    by: rng.coord(),
                };
                if (candidate.ax, candidate.ay) != (candidate.bx, candidate.by) {
                    *pair = candidate;
                    break;
                }
            }
        }
        pairs
    })
}

/// Smooths an image with a separable 5-tap binomial kernel (1 4 6 4 1).
///
/// BRIEF compares single pixels, so sampling a smoothed image makes the bits
/// far less sensitive to sensor noise.
pub fn smooth(view: ImageView<'_>) -> ImageResult<OwnedImage> {
    const TAPS: [u32; 5] = [1, 4, 6, 4, 1];
    let width = view.width();
    let height = view.height();

    let mut horizontal = vec![0u32; width * height];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0u32;
            for (k, &w) in TAPS.iter().enumerate() {
                let sx = x as isize + k as isize - 2;
                acc += w * u32::from(view.clamped(sx, y as isize));
            }
            horizontal[y * width + x] = acc;
        }
    }

    let mut out = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0u32;
            for (k, &w) in TAPS.iter().enumerate() {
                let sy = (y as isize + k as isize - 2).clamp(0, height as isize - 1) as usize;
                acc += w * horizontal[sy * width + x];
            }
            out[y * width + x] = ((acc + 128) / 256) as u8;
        }
    }
    OwnedImage::new(out, width, height)
}

/// Orientation of the patch around `(x, y)` from its intensity centroid.
pub fn orientation(image: ImageView<'_>, x: usize, y: usize) -> f32 {
    let r2 = ORIENTATION_RADIUS * ORIENTATION_RADIUS;
    let mut m01 = 0i64;
    let mut m10 = 0i64;
    for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
        for dx in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
            if dx * dx + dy * dy > r2 {
                continue;
            }
            let value = i64::from(image.clamped(x as isize + dx, y as isize + dy));
            m10 += dx as i64 * value;
            m01 += dy as i64 * value;
        }
    }
    (m01 as f32).atan2(m10 as f32)
}

/// Computes the steered BRIEF descriptor at `(x, y)` on a smoothed image.
pub fn describe(smoothed: ImageView<'_>, x: usize, y: usize, angle: f32) -> Descriptor {
    let (sin, cos) = angle.sin_cos();
    let cx = x as f32;
    let cy = y as f32;
    let sample = |px: i8, py: i8| {
        let fx = f32::from(px);
        let fy = f32::from(py);
        let rx = (cx + fx * cos - fy * sin).round() as isize;
        let ry = (cy + fx * sin + fy * cos).round() as isize;
        smoothed.clamped(rx, ry)
    };

    let mut bytes = [0u8; DESCRIPTOR_BYTES];
    for (bit, pair) in pattern().iter().enumerate() {
        if sample(pair.ax, pair.ay) < sample(pair.bx, pair.by) {
            bytes[bit / 8] |= 1 << (bit % 8);
        }
    }
    Descriptor(bytes)
}

#[cfg(test)]
mod tests {
    use super::{describe, orientation, pattern, smooth, PATTERN_EXTENT};
    use crate::image::ImageView;

    #[test]
    fn pattern_is_stable_and_bounded() {
        let first = pattern();
        let second = pattern();
        assert!(std::ptr::eq(first, second));
        for pair in first.iter() {
            for v in [pair.ax, pair.ay, pair.bx, pair.by] {
                assert!(v.abs() <= PATTERN_EXTENT);
            }
            assert!((pair.ax, pair.ay) != (pair.bx, pair.by));
        }
    }

    #[test]
    fn orientation_points_towards_bright_side() {
        let width = 41;
        let data: Vec<u8> = (0..width * width)
            .map(|i| if i % width > 20 { 200 } else { 10 })
            .collect();
        let view = ImageView::from_slice(&data, width, width).unwrap();
        let angle = orientation(view, 20, 20);
        assert!(angle.abs() < 0.05, "angle {angle}");
    }

    #[test]
    fn smoothing_keeps_constant_images() {
        let data = vec![77u8; 12 * 9];
        let view = ImageView::from_slice(&data, 12, 9).unwrap();
        let out = smooth(view).unwrap();
        assert!(out.data().iter().all(|&v| v == 77));
    }

    #[test]
    fn uniform_patch_yields_zero_descriptor() {
        let data = vec![50u8; 48 * 48];
        let view = ImageView::from_slice(&data, 48, 48).unwrap();
        let desc = describe(view, 24, 24, 0.7);
        assert_eq!(desc.as_bytes(), &[0u8; 32]);
    }
}
