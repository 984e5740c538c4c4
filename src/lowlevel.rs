//! Low-level building blocks for custom pipelines.
//!
//! These expose the individual preprocessing, detection, description and
//! matching stages behind [`crate::DescriptorExtractor`] and
//! [`crate::Engine`]. Most users should prefer the top-level types.

pub use crate::candidate::{sort_matches_desc, TopK};
pub use crate::catalog::LruCache;
pub use crate::feature::brief::{describe, orientation, smooth, PATCH_BORDER};
pub use crate::feature::fast::{detect as detect_fast, Corner};
pub use crate::feature::{Feature, Keypoint};
pub use crate::image::clahe::equalize as clahe_equalize;
pub use crate::image::io::{decode_gray, downscale_to_fit, load_gray};
pub use crate::image::pyramid::ImagePyramid;
pub use crate::image::{ImageView, OwnedImage};
pub use crate::kernel::{count_good_matches, two_nearest};
