//! Shared synthetic data for integration tests.
#![allow(dead_code)]

use image::{GrayImage, ImageFormat};
use labelmatch::{CatalogColumns, CatalogTable, Descriptor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Cursor;
use std::path::PathBuf;

pub fn random_descriptor(rng: &mut StdRng) -> Descriptor {
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    Descriptor(bytes)
}

pub fn random_descriptors(rng: &mut StdRng, count: usize) -> Vec<Descriptor> {
    (0..count).map(|_| random_descriptor(rng)).collect()
}

/// Copy of `d` with `flips` random bits inverted (bits may repeat).
pub fn perturb(rng: &mut StdRng, d: &Descriptor, flips: usize) -> Descriptor {
    let mut bytes = d.0;
    for _ in 0..flips {
        let bit = rng.random_range(0..256usize);
        bytes[bit / 8] ^= 1 << (bit % 8);
    }
    Descriptor(bytes)
}

/// Blocky random texture: every `cell`x`cell` block gets one random level.
pub fn mosaic(seed: u64, width: u32, height: u32, cell: u32) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let cols = width.div_ceil(cell);
    let rows = height.div_ceil(cell);
    let levels: Vec<u8> = (0..cols * rows)
        .map(|_| rng.random_range(0..=255u8))
        .collect();
    GrayImage::from_fn(width, height, |x, y| {
        image::Luma([levels[((y / cell) * cols + x / cell) as usize]])
    })
}

/// Per-pixel uniform noise.
pub fn noise(seed: u64, width: u32, height: u32) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    GrayImage::from_fn(width, height, |_, _| image::Luma([rng.random::<u8>()]))
}

pub fn encode_png(img: &GrayImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn table(csv: &str) -> CatalogTable {
    CatalogTable::from_reader(csv.as_bytes(), "test", &CatalogColumns::default()).unwrap()
}

/// Fresh, empty scratch directory unique to this process and `name`.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("labelmatch-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
