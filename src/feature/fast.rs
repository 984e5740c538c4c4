//! FAST-9 segment-test corner detection with 3x3 non-maximum suppression.

use crate::image::ImageView;

/// Bresenham circle of radius 3 in clockwise order starting at the top.
const CIRCLE: [(isize, isize); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Minimum contiguous arc length for a corner.
const ARC_LEN: usize = 9;

/// Corner candidate on a single image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Corner {
    pub x: usize,
    pub y: usize,
    /// Sum of absolute contrast above threshold on the winning side.
    pub score: u32,
}

fn longest_run(flags: &[bool; 16]) -> usize {
    let mut best = 0usize;
    let mut run = 0usize;
    for i in 0..32 {
        if flags[i % 16] {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best.min(16)
}

/// Returns the corner score at `(x, y)`, or zero when it is not a corner.
///
/// The caller guarantees a 3 pixel margin on every side.
fn corner_score(image: ImageView<'_>, x: usize, y: usize, threshold: u8) -> u32 {
    let center = image.clamped(x as isize, y as isize);
    let bright = center.saturating_add(threshold);
    let dark = center.saturating_sub(threshold);

    let mut ring = [0u8; 16];
    for (slot, &(dx, dy)) in ring.iter_mut().zip(CIRCLE.iter()) {
        *slot = image.clamped(x as isize + dx, y as isize + dy);
    }

    // Pixels 0, 4, 8, 12: any 9-arc covers at least two of them.
    let quick_bright = [0, 4, 8, 12].iter().filter(|&&i| ring[i] > bright).count();
    let quick_dark = [0, 4, 8, 12].iter().filter(|&&i| ring[i] < dark).count();
    if quick_bright < 2 && quick_dark < 2 {
        return 0;
    }

    let mut is_bright = [false; 16];
    let mut is_dark = [false; 16];
    for (i, &p) in ring.iter().enumerate() {
        is_bright[i] = p > bright;
        is_dark[i] = p < dark;
    }

    let t = u32::from(threshold);
    let c = u32::from(center);
    if longest_run(&is_bright) >= ARC_LEN {
        return ring
            .iter()
            .filter(|&&p| p > bright)
            .map(|&p| u32::from(p) - c - t)
            .sum::<u32>()
            .max(1);
    }
    if longest_run(&is_dark) >= ARC_LEN {
        return ring
            .iter()
            .filter(|&&p| p < dark)
            .map(|&p| c - u32::from(p) - t)
            .sum::<u32>()
            .max(1);
    }
    0
}

/// Detects FAST-9 corners at least `border` pixels away from the image edges.
///
/// Returned corners are local maxima of the score in their 3x3 neighbourhood;
/// equal scores are resolved in favour of the earlier pixel in raster order,
/// so output is fully deterministic. Corners are listed in raster order.
pub fn detect(image: ImageView<'_>, threshold: u8, border: usize) -> Vec<Corner> {
    let width = image.width();
    let height = image.height();
    let border = border.max(3);
    if width <= 2 * border || height <= 2 * border {
        return Vec::new();
    }

    let mut scores = vec![0u32; width * height];
    for y in border..height - border {
        for x in border..width - border {
            scores[y * width + x] = corner_score(image, x, y, threshold);
        }
    }

    let mut corners = Vec::new();
    for y in border..height - border {
        for x in border..width - border {
            let idx = y * width + x;
            let score = scores[idx];
            if score == 0 {
                continue;
            }
            let mut is_max = true;
            'nbhd: for ny in y - 1..=y + 1 {
                for nx in x - 1..=x + 1 {
                    let nidx = ny * width + nx;
                    if nidx == idx {
                        continue;
                    }
                    let other = scores[nidx];
                    if other > score || (other == score && nidx < idx) {
                        is_max = false;
                        break 'nbhd;
                    }
                }
            }
            if is_max {
                corners.push(Corner { x, y, score });
            }
        }
    }
    corners
}

#[cfg(test)]
mod tests {
    use super::detect;
    use crate::image::ImageView;

    fn square_image(width: usize, height: usize) -> Vec<u8> {
        let mut data = vec![20u8; width * height];
        for y in 20..40 {
            for x in 20..40 {
                data[y * width + x] = 220;
            }
        }
        data
    }

    #[test]
    fn flat_image_has_no_corners() {
        let data = vec![128u8; 64 * 64];
        let view = ImageView::from_slice(&data, 64, 64).unwrap();
        assert!(detect(view, 20, 3).is_empty());
    }

    #[test]
    fn square_corners_are_detected() {
        let data = square_image(60, 60);
        let view = ImageView::from_slice(&data, 60, 60).unwrap();
        let corners = detect(view, 20, 3);
        assert!(!corners.is_empty());
        for &(cx, cy) in &[(20usize, 20usize), (39, 20), (20, 39), (39, 39)] {
            assert!(
                corners
                    .iter()
                    .any(|c| c.x.abs_diff(cx) <= 2 && c.y.abs_diff(cy) <= 2),
                "missing corner near ({cx}, {cy})"
            );
        }
    }

    #[test]
    fn border_is_respected() {
        let data = square_image(60, 60);
        let view = ImageView::from_slice(&data, 60, 60).unwrap();
        for corner in detect(view, 20, 25) {
            assert!(corner.x >= 25 && corner.x < 35);
            assert!(corner.y >= 25 && corner.y < 35);
        }
    }
}
