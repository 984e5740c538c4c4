//! Image pyramid construction for grayscale `u8` images.
//!
//! Downsampling uses a 2x2 box filter with integer rounding:
//! `dst = ((a + b + c + d) + 2) / 4`. Keypoints are detected on every level so
//! labels photographed from further away still produce comparable descriptors.

use crate::image::{ImageView, OwnedImage};
use crate::util::{ImageError, ImageResult};

/// Owned image pyramid built from a base level.
pub struct ImagePyramid {
    levels: Vec<OwnedImage>,
}

impl ImagePyramid {
    /// Builds a pyramid from a base grayscale view.
    ///
    /// `max_levels` is clamped to at least 1 so the base level is always
    /// present. Construction stops early once a level would be narrower or
    /// shorter than `min_side` pixels.
    pub fn build_u8(base: ImageView<'_>, max_levels: usize, min_side: usize) -> ImageResult<Self> {
        let max_levels = max_levels.max(1);
        let mut levels = vec![OwnedImage::from_view(base)?];

        while levels.len() < max_levels {
            let src = match levels.last() {
                Some(level) => level.view(),
                None => break,
            };
            let dst_width = src.width() / 2;
            let dst_height = src.height() / 2;
            if dst_width < min_side.max(1) || dst_height < min_side.max(1) {
                break;
            }

            let mut dst = vec![0u8; dst_width * dst_height];
            for y in 0..dst_height {
                let (row0, row1) = match (src.row(y * 2), src.row(y * 2 + 1)) {
                    (Some(r0), Some(r1)) => (r0, r1),
                    _ => {
                        return Err(ImageError::BufferTooSmall {
                            needed: (y * 2 + 2) * src.stride(),
                            got: src.width() * src.height(),
                        })
                    }
                };
                let out = &mut dst[y * dst_width..(y + 1) * dst_width];
                for (x, px) in out.iter_mut().enumerate() {
                    let sum = u16::from(row0[2 * x])
                        + u16::from(row0[2 * x + 1])
                        + u16::from(row1[2 * x])
                        + u16::from(row1[2 * x + 1]);
                    *px = ((sum + 2) / 4) as u8;
                }
            }

            levels.push(OwnedImage::new(dst, dst_width, dst_height)?);
        }

        Ok(Self { levels })
    }

    /// Returns all pyramid levels (level 0 is the base resolution).
    pub fn levels(&self) -> &[OwnedImage] {
        &self.levels
    }

    /// Returns a view for a specific pyramid level.
    pub fn level(&self, index: usize) -> Option<ImageView<'_>> {
        self.levels.get(index).map(|level| level.view())
    }
}

#[cfg(test)]
mod tests {
    use super::ImagePyramid;
    use crate::image::ImageView;

    #[test]
    fn downsamples_by_two_with_rounding() {
        let data: Vec<u8> = (0u8..16).collect();
        let view = ImageView::from_slice(&data, 4, 4).unwrap();

        let pyramid = ImagePyramid::build_u8(view, 10, 1).unwrap();
        assert_eq!(pyramid.levels().len(), 3);

        let level1 = pyramid.level(1).unwrap();
        assert_eq!(level1.row(0).unwrap(), &[3u8, 5u8]);
        assert_eq!(level1.row(1).unwrap(), &[11u8, 13u8]);
    }

    #[test]
    fn stops_below_min_side() {
        let data = vec![7u8; 64 * 40];
        let view = ImageView::from_slice(&data, 64, 40).unwrap();
        let pyramid = ImagePyramid::build_u8(view, 5, 16).unwrap();
        // 64x40 -> 32x20 -> (16x10 rejected)
        assert_eq!(pyramid.levels().len(), 2);
    }
}
