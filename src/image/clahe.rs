//! Contrast-limited adaptive histogram equalization.
//!
//! The image is split into a grid of tiles; each tile gets its own clipped
//! histogram equalization lookup table and every pixel blends the tables of
//! its four nearest tile centres bilinearly. Clipping redistributes the excess
//! uniformly, which bounds how much flat label regions get amplified.

use crate::image::{ImageView, OwnedImage};
use crate::util::ImageResult;

/// Parameters for [`equalize`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClaheConfig {
    /// Histogram clip limit as a multiple of the mean bin height.
    pub clip_limit: f32,
    /// Number of tiles along each axis.
    pub tiles: usize,
}

impl Default for ClaheConfig {
    fn default() -> Self {
        Self {
            clip_limit: 2.0,
            tiles: 8,
        }
    }
}

struct TileGrid {
    tile_w: usize,
    tile_h: usize,
    cols: usize,
    rows: usize,
}

impl TileGrid {
    fn new(width: usize, height: usize, tiles: usize) -> Self {
        let tiles = tiles.max(1);
        let tile_w = width.div_ceil(tiles.min(width));
        let tile_h = height.div_ceil(tiles.min(height));
        Self {
            tile_w,
            tile_h,
            cols: width.div_ceil(tile_w),
            rows: height.div_ceil(tile_h),
        }
    }
}

fn tile_lut(
    view: ImageView<'_>,
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
    clip_limit: f32,
) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        if let Some(row) = view.row(y) {
            for &px in &row[x0..x1] {
                hist[px as usize] += 1;
            }
        }
    }

    let area = ((x1 - x0) * (y1 - y0)) as u32;
    if clip_limit > 0.0 {
        let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in hist.iter_mut() {
            if *bin > clip {
                excess += *bin - clip;
                *bin = clip;
            }
        }
        let per_bin = excess / 256;
        let remainder = (excess % 256) as usize;
        for (idx, bin) in hist.iter_mut().enumerate() {
            *bin += per_bin + u32::from(idx < remainder);
        }
    }

    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (value, &count) in lut.iter_mut().zip(hist.iter()) {
        cdf += count;
        *value = ((u64::from(cdf) * 255 + u64::from(area) / 2) / u64::from(area)).min(255) as u8;
    }
    lut
}

/// Returns the lower tile index and blend weight for a pixel coordinate.
fn blend_axis(pos: usize, tile: usize, count: usize) -> (usize, usize, f32) {
    let centre = (pos as f32 + 0.5) / tile as f32 - 0.5;
    if centre <= 0.0 {
        return (0, 0, 0.0);
    }
    let lo = centre.floor() as usize;
    if lo + 1 >= count {
        return (count - 1, count - 1, 0.0);
    }
    (lo, lo + 1, centre - lo as f32)
}

/// Applies CLAHE to `view` and returns the equalized image.
pub fn equalize(view: ImageView<'_>, cfg: ClaheConfig) -> ImageResult<OwnedImage> {
    let width = view.width();
    let height = view.height();
    let grid = TileGrid::new(width, height, cfg.tiles);

    let mut luts = Vec::with_capacity(grid.cols * grid.rows);
    for ty in 0..grid.rows {
        for tx in 0..grid.cols {
            let x0 = tx * grid.tile_w;
            let y0 = ty * grid.tile_h;
            let x1 = (x0 + grid.tile_w).min(width);
            let y1 = (y0 + grid.tile_h).min(height);
            luts.push(tile_lut(view, x0, y0, x1, y1, cfg.clip_limit));
        }
    }

    let mut out = Vec::with_capacity(width * height);
    for y in 0..height {
        let (ty0, ty1, wy) = blend_axis(y, grid.tile_h, grid.rows);
        let row = view.row(y).unwrap_or(&[]);
        for (x, &px) in row.iter().enumerate() {
            let (tx0, tx1, wx) = blend_axis(x, grid.tile_w, grid.cols);
            let p = px as usize;
            let top_left = f32::from(luts[ty0 * grid.cols + tx0][p]);
            let top_right = f32::from(luts[ty0 * grid.cols + tx1][p]);
            let bottom_left = f32::from(luts[ty1 * grid.cols + tx0][p]);
            let bottom_right = f32::from(luts[ty1 * grid.cols + tx1][p]);
            let top = top_left + (top_right - top_left) * wx;
            let bottom = bottom_left + (bottom_right - bottom_left) * wx;
            out.push((top + (bottom - top) * wy).round().clamp(0.0, 255.0) as u8);
        }
    }

    OwnedImage::new(out, width, height)
}
