//! Two-nearest-neighbour Hamming matching with the distance-ratio test.
//!
//! For each query descriptor the two closest reference descriptors are found
//! by brute force. The correspondence is kept when the nearest distance is
//! strictly below `ratio * second_nearest`; near-equidistant candidates are
//! ambiguous and dropped.

use crate::corpus::ReferenceEntry;
use crate::feature::{Descriptor, DescriptorSet};
use crate::kernel::PairMatcher;
use crate::util::{InitError, InitResult, MatchError};

/// Default nearest/second-nearest distance ratio.
pub const DEFAULT_RATIO: f32 = 0.75;

/// Returns the nearest and second-nearest Hamming distances from `query` to
/// `reference`, or `None` when the reference has fewer than two descriptors.
pub fn two_nearest(query: &Descriptor, reference: &[Descriptor]) -> Option<(u32, u32)> {
    if reference.len() < 2 {
        return None;
    }
    let mut best = u32::MAX;
    let mut second = u32::MAX;
    for candidate in reference {
        let d = query.hamming(candidate);
        if d < best {
            second = best;
            best = d;
        } else if d < second {
            second = d;
        }
    }
    Some((best, second))
}

/// Counts query descriptors whose nearest reference neighbour passes the
/// ratio test. Returns zero for references with fewer than two descriptors.
pub fn count_good_matches(query: &[Descriptor], reference: &[Descriptor], ratio: f32) -> usize {
    if reference.len() < 2 {
        return 0;
    }
    query
        .iter()
        .filter_map(|q| two_nearest(q, reference))
        .filter(|&(best, second)| (best as f32) < ratio * second as f32)
        .count()
}

/// Production matcher: brute-force 2-NN with the ratio test.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RatioTestMatcher {
    ratio: f32,
}

impl RatioTestMatcher {
    /// Creates a matcher; the ratio must be finite and positive.
    pub fn new(ratio: f32) -> InitResult<Self> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(InitError::InvalidConfig(
                "ratio_threshold must be finite and positive",
            ));
        }
        Ok(Self { ratio })
    }

    /// Returns the ratio threshold.
    pub fn ratio(&self) -> f32 {
        self.ratio
    }
}

impl Default for RatioTestMatcher {
    fn default() -> Self {
        Self {
            ratio: DEFAULT_RATIO,
        }
    }
}

impl PairMatcher for RatioTestMatcher {
    fn good_matches(
        &self,
        query: &DescriptorSet,
        reference: &ReferenceEntry,
    ) -> Result<usize, MatchError> {
        Ok(count_good_matches(
            query.as_slice(),
            reference.descriptors(),
            self.ratio,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{count_good_matches, two_nearest, RatioTestMatcher};
    use crate::feature::Descriptor;

    fn with_bits(bits: &[usize]) -> Descriptor {
        let mut bytes = [0u8; 32];
        for &bit in bits {
            bytes[bit / 8] |= 1 << (bit % 8);
        }
        Descriptor(bytes)
    }

    #[test]
    fn two_nearest_tracks_best_and_second() {
        let query = with_bits(&[]);
        let reference = [
            with_bits(&[0, 1, 2, 3]),
            with_bits(&[0]),
            with_bits(&[0, 1]),
        ];
        assert_eq!(two_nearest(&query, &reference), Some((1, 2)));
        assert_eq!(two_nearest(&query, &reference[..1]), None);
    }

    #[test]
    fn ratio_test_is_strict() {
        let query = [with_bits(&[])];
        // 3 < 0.75 * 4 is false: equality must be rejected.
        let reference = [with_bits(&[0, 1, 2]), with_bits(&[0, 1, 2, 3])];
        assert_eq!(count_good_matches(&query, &reference, 0.75), 0);
        assert_eq!(count_good_matches(&query, &reference, 0.76), 1);
    }

    #[test]
    fn equal_nearest_neighbours_are_ambiguous() {
        let query = [with_bits(&[5])];
        let reference = [with_bits(&[5]), with_bits(&[5])];
        assert_eq!(count_good_matches(&query, &reference, 0.75), 0);
    }

    #[test]
    fn single_descriptor_reference_is_skipped() {
        let query = [with_bits(&[1])];
        assert_eq!(count_good_matches(&query, &[with_bits(&[1])], 0.75), 0);
    }

    #[test]
    fn rejects_non_positive_ratio() {
        assert!(RatioTestMatcher::new(0.0).is_err());
        assert!(RatioTestMatcher::new(f32::NAN).is_err());
        assert_eq!(RatioTestMatcher::new(0.8).unwrap().ratio(), 0.8);
    }
}
