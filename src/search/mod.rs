//! Corpus-wide match scheduling.
//!
//! The scheduler fans one pairwise matcher call per reference entry out over a
//! bounded worker pool and reduces the outcomes to the set of references that
//! reach the minimum good-match count.

use crate::catalog::CatalogId;
use crate::trace::trace_warn;
use crate::util::{IdentifyError, InitError, InitResult, MatchError};
use std::time::{Duration, Instant};

pub mod scheduler;

pub use scheduler::{default_workers, MatchScheduler};

/// Thresholds applied while scoring references.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchConfig {
    /// Nearest/second-nearest distance ratio for the ratio test.
    pub ratio_threshold: f32,
    /// Minimum good matches for a reference to be reported.
    pub min_match_count: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            ratio_threshold: crate::kernel::ratio::DEFAULT_RATIO,
            min_match_count: 10,
        }
    }
}

impl MatchConfig {
    /// Checks value ranges.
    pub fn validate(&self) -> InitResult<()> {
        if !self.ratio_threshold.is_finite() || self.ratio_threshold <= 0.0 {
            return Err(InitError::InvalidConfig(
                "ratio_threshold must be finite and positive",
            ));
        }
        if self.min_match_count == 0 {
            return Err(InitError::InvalidConfig(
                "min_match_count must be at least 1",
            ));
        }
        Ok(())
    }
}

/// A reference that reached the minimum good-match count.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReferenceMatch {
    pub reference_id: CatalogId,
    pub good_match_count: usize,
}

/// Outcome of scanning a query against the whole corpus.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Accepted references, sorted by id.
    pub matches: Vec<ReferenceMatch>,
    /// References whose matcher failed, sorted by id.
    pub failures: Vec<(CatalogId, MatchError)>,
    /// References skipped because they hold fewer than two descriptors.
    pub skipped: usize,
    /// References scored below the threshold.
    pub below_threshold: usize,
}

/// Wall-clock budget of one identify call.
///
/// The clock starts when the deadline is created, so decoding and extraction
/// spend the same budget as the corpus scan that follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    start: Instant,
    budget: Duration,
}

impl Deadline {
    /// Starts a budget now.
    pub fn start(budget: Duration) -> Self {
        Self::started_at(Instant::now(), budget)
    }

    /// Budget measured from an earlier `start`.
    pub fn started_at(start: Instant, budget: Duration) -> Self {
        Self { start, budget }
    }

    /// Returns the total budget.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Time spent since the clock started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Returns true once the budget is spent.
    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.budget
    }

    /// Fails with [`IdentifyError::Timeout`] once the budget is spent.
    pub fn check(&self) -> Result<(), IdentifyError> {
        if self.is_expired() {
            Err(self.timeout())
        } else {
            Ok(())
        }
    }

    pub(crate) fn timeout(&self) -> IdentifyError {
        let elapsed = self.elapsed();
        trace_warn!(
            "identify call exceeded its time budget",
            elapsed_ms = elapsed.as_millis(),
            budget_ms = self.budget.as_millis()
        );
        IdentifyError::Timeout {
            elapsed,
            budget: self.budget,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Deadline;
    use crate::util::IdentifyError;
    use std::time::{Duration, Instant};

    #[test]
    fn deadline_counts_time_before_it_is_checked() {
        let start = Instant::now();
        std::thread::sleep(Duration::from_millis(15));
        let deadline = Deadline::started_at(start, Duration::from_millis(10));
        assert!(deadline.is_expired());
        match deadline.check() {
            Err(IdentifyError::Timeout { elapsed, budget }) => {
                assert!(elapsed >= Duration::from_millis(15));
                assert_eq!(budget, Duration::from_millis(10));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(Deadline::start(Duration::from_secs(60)).check().is_ok());
    }
}
