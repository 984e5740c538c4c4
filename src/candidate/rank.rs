//! Best-match selection and Top-K collection over accepted references.

use crate::catalog::CatalogId;
use crate::search::ReferenceMatch;
use std::cmp::Ordering;

/// Winning reference for a query.
#[derive(Clone, Debug, PartialEq)]
pub struct BestMatch {
    /// Catalog id of the winning reference.
    pub id: CatalogId,
    /// Confidence signal; equal to the raw good-match count.
    pub score: f32,
    /// Number of descriptors that passed the ratio test.
    pub good_match_count: usize,
}

impl From<&ReferenceMatch> for BestMatch {
    fn from(m: &ReferenceMatch) -> Self {
        Self {
            id: m.reference_id.clone(),
            score: m.good_match_count as f32,
            good_match_count: m.good_match_count,
        }
    }
}

fn match_cmp_desc(a: &ReferenceMatch, b: &ReferenceMatch) -> Ordering {
    b.good_match_count
        .cmp(&a.good_match_count)
        .then_with(|| a.reference_id.cmp(&b.reference_id))
}

/// Sorts matches by descending count, smaller id first on ties.
pub fn sort_matches_desc(matches: &mut [ReferenceMatch]) {
    matches.sort_by(match_cmp_desc);
}

/// Picks the reference with the most good matches.
///
/// Returns `None` for an empty slice. Ties resolve to the smallest id, so the
/// answer never depends on the order in which references were scored.
pub fn select_best(matches: &[ReferenceMatch]) -> Option<BestMatch> {
    matches
        .iter()
        .min_by(|a, b| match_cmp_desc(a, b))
        .map(BestMatch::from)
}

/// Top-K container with O(k) insertion cost.
pub struct TopK {
    k: usize,
    items: Vec<ReferenceMatch>,
}

impl TopK {
    /// Creates a new Top-K collector.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            items: Vec::with_capacity(k),
        }
    }

    /// Pushes a match, evicting the lowest-ranked one if at capacity.
    pub fn push(&mut self, item: ReferenceMatch) {
        if self.k == 0 {
            return;
        }
        if self.items.len() < self.k {
            self.items.push(item);
            return;
        }

        let mut worst_idx = 0usize;
        for (idx, current) in self.items.iter().enumerate().skip(1) {
            if match_cmp_desc(current, &self.items[worst_idx]) == Ordering::Greater {
                worst_idx = idx;
            }
        }

        if match_cmp_desc(&item, &self.items[worst_idx]) == Ordering::Less {
            self.items[worst_idx] = item;
        }
    }

    /// Returns the retained matches, best first.
    pub fn into_sorted_desc(mut self) -> Vec<ReferenceMatch> {
        sort_matches_desc(&mut self.items);
        self.items
    }
}

/// Returns the `k` best matches, best first.
pub fn top_k(matches: &[ReferenceMatch], k: usize) -> Vec<BestMatch> {
    let mut topk = TopK::new(k);
    for m in matches {
        topk.push(m.clone());
    }
    topk.into_sorted_desc().iter().map(BestMatch::from).collect()
}
