//! Pairwise descriptor matching kernels.

use crate::corpus::ReferenceEntry;
use crate::feature::DescriptorSet;
use crate::util::MatchError;

pub mod ratio;

pub use ratio::{count_good_matches, two_nearest, RatioTestMatcher};

/// Scores one query descriptor set against one reference entry.
///
/// Implementations must be pure with respect to their inputs: the scheduler
/// runs them concurrently on the shared pool and relies on the same pair
/// always producing the same count.
pub trait PairMatcher: Sync {
    /// Returns the number of good correspondences between `query` and
    /// `reference`. The count must not exceed `query.len()`.
    fn good_matches(
        &self,
        query: &DescriptorSet,
        reference: &ReferenceEntry,
    ) -> Result<usize, MatchError>;
}

impl<M: PairMatcher + ?Sized> PairMatcher for &M {
    fn good_matches(
        &self,
        query: &DescriptorSet,
        reference: &ReferenceEntry,
    ) -> Result<usize, MatchError> {
        (**self).good_matches(query, reference)
    }
}
