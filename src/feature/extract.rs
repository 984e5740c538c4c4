//! Descriptor extraction pipeline: decode, normalize, detect, describe.

use crate::feature::brief::{describe, orientation, smooth, PATCH_BORDER};
use crate::feature::fast::{self, Corner};
use crate::feature::{DescriptorSet, Feature, Keypoint};
use crate::image::clahe::{self, ClaheConfig};
use crate::image::io::{decode_gray, downscale_to_fit, load_gray, owned_from_gray_image};
use crate::image::pyramid::ImagePyramid;
use crate::image::OwnedImage;
use crate::trace::{trace_event, trace_span};
use crate::util::{ImageResult, InitError, InitResult};
use image::GrayImage;
use std::cmp::Ordering;
use std::path::Path;

/// Configuration for descriptor extraction.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractorConfig {
    /// Maximum number of keypoints kept per image, across all levels.
    pub max_features: usize,
    /// Largest image side before downscaling; zero disables the cap.
    pub max_dimension: u32,
    /// Number of pyramid levels (2x downsampling per level).
    pub pyramid_levels: usize,
    /// FAST intensity threshold.
    pub fast_threshold: u8,
    /// Local contrast normalization; `None` skips it.
    pub clahe: Option<ClaheConfig>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_features: 1500,
            max_dimension: 1024,
            pyramid_levels: 3,
            fast_threshold: 20,
            clahe: Some(ClaheConfig::default()),
        }
    }
}

impl ExtractorConfig {
    /// Checks value ranges.
    pub fn validate(&self) -> InitResult<()> {
        if self.max_features == 0 {
            return Err(InitError::InvalidConfig("max_features must be at least 1"));
        }
        if self.pyramid_levels == 0 {
            return Err(InitError::InvalidConfig(
                "pyramid_levels must be at least 1",
            ));
        }
        if let Some(cfg) = self.clahe {
            if !cfg.clip_limit.is_finite() || cfg.clip_limit < 0.0 {
                return Err(InitError::InvalidConfig("clahe clip_limit must be >= 0"));
            }
            if cfg.tiles == 0 {
                return Err(InitError::InvalidConfig("clahe tiles must be at least 1"));
            }
        }
        Ok(())
    }
}

/// Ranks corners by descending score, then raster position.
fn corner_cmp_desc(a: &Corner, b: &Corner) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.y.cmp(&b.y))
        .then_with(|| a.x.cmp(&b.x))
}

/// Splits `total` keypoints across levels proportionally to level area.
fn level_budgets(total: usize, levels: usize) -> Vec<usize> {
    let weights: Vec<f64> = (0..levels).map(|l| 0.25f64.powi(l as i32)).collect();
    let sum: f64 = weights.iter().sum();
    let mut budgets: Vec<usize> = weights
        .iter()
        .map(|w| (total as f64 * w / sum).floor() as usize)
        .collect();
    let assigned: usize = budgets.iter().sum();
    if let Some(first) = budgets.first_mut() {
        *first += total - assigned;
    }
    budgets
}

/// Deterministic binary feature extractor.
#[derive(Clone, Debug)]
pub struct DescriptorExtractor {
    cfg: ExtractorConfig,
}

impl DescriptorExtractor {
    /// Creates an extractor after validating `cfg`.
    pub fn new(cfg: ExtractorConfig) -> InitResult<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &ExtractorConfig {
        &self.cfg
    }

    /// Extracts descriptors from encoded image bytes.
    pub fn extract(&self, bytes: &[u8]) -> ImageResult<DescriptorSet> {
        self.extract_gray(decode_gray(bytes)?)
    }

    /// Extracts descriptors from an image file.
    pub fn extract_path<P: AsRef<Path>>(&self, path: P) -> ImageResult<DescriptorSet> {
        self.extract_gray(load_gray(path)?)
    }

    /// Extracts descriptors from an already decoded grayscale image.
    pub fn extract_gray(&self, img: GrayImage) -> ImageResult<DescriptorSet> {
        let features = self.detect_and_describe(&self.normalize(img)?)?;
        Ok(DescriptorSet::new(
            features.into_iter().map(|f| f.descriptor).collect(),
        ))
    }

    /// Applies the size cap and contrast normalization.
    pub fn normalize(&self, img: GrayImage) -> ImageResult<OwnedImage> {
        let img = downscale_to_fit(img, self.cfg.max_dimension);
        let owned = owned_from_gray_image(img)?;
        match self.cfg.clahe {
            Some(cfg) => clahe::equalize(owned.view(), cfg),
            None => Ok(owned),
        }
    }

    /// Detects keypoints on every pyramid level and describes them.
    ///
    /// Output is ordered by level, then by descending corner score.
    pub fn detect_and_describe(&self, image: &OwnedImage) -> ImageResult<Vec<Feature>> {
        let _span =
            trace_span!("extract", width = image.width(), height = image.height()).entered();

        let pyramid =
            ImagePyramid::build_u8(image.view(), self.cfg.pyramid_levels, 2 * PATCH_BORDER + 1)?;
        let budgets = level_budgets(self.cfg.max_features, pyramid.levels().len());

        let mut features = Vec::new();
        for (level, (level_img, budget)) in pyramid.levels().iter().zip(budgets).enumerate() {
            let view = level_img.view();
            let mut corners = fast::detect(view, self.cfg.fast_threshold, PATCH_BORDER);
            corners.sort_by(corner_cmp_desc);
            corners.truncate(budget);
            if corners.is_empty() {
                continue;
            }

            let smoothed = smooth(view)?;
            let scale = (1usize << level) as f32;
            for corner in corners {
                let angle = orientation(view, corner.x, corner.y);
                let descriptor = describe(smoothed.view(), corner.x, corner.y, angle);
                features.push(Feature {
                    keypoint: Keypoint {
                        x: corner.x as f32 * scale,
                        y: corner.y as f32 * scale,
                        level,
                        angle,
                        score: corner.score,
                    },
                    descriptor,
                });
            }
        }

        trace_event!("extract_done", features = features.len());
        Ok(features)
    }
}

impl Default for DescriptorExtractor {
    fn default() -> Self {
        Self {
            cfg: ExtractorConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{level_budgets, DescriptorExtractor, ExtractorConfig};
    use crate::util::InitError;

    #[test]
    fn budgets_sum_to_total() {
        let budgets = level_budgets(1500, 3);
        assert_eq!(budgets.iter().sum::<usize>(), 1500);
        assert!(budgets[0] > budgets[1] && budgets[1] > budgets[2]);
        assert_eq!(level_budgets(7, 1), vec![7]);
    }

    #[test]
    fn rejects_zero_features() {
        let err = DescriptorExtractor::new(ExtractorConfig {
            max_features: 0,
            ..ExtractorConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, InitError::InvalidConfig(_)));
    }

    #[test]
    fn tiny_image_yields_empty_set() {
        let img = image::GrayImage::from_pixel(16, 16, image::Luma([3u8]));
        let set = DescriptorExtractor::default().extract_gray(img).unwrap();
        assert!(set.is_empty());
    }
}
