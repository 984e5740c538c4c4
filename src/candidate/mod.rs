//! Aggregation of per-reference scores into a ranked answer.
//!
//! Ranking is total and deterministic: higher good-match counts first, ties
//! broken by the smaller catalog id.

pub mod rank;

pub use rank::{select_best, sort_matches_desc, top_k, BestMatch, TopK};
