//! Bounded parallel scan of the corpus with per-reference failure isolation.
//!
//! All identify calls that share a scheduler (clones share the pool) draw from
//! one fixed-size rayon pool, which caps process-wide matching parallelism.
//! Each reference is an independent task: errors and panics inside a matcher
//! are caught, recorded and logged, and never reach sibling tasks.

use crate::catalog::CatalogId;
use crate::corpus::{Corpus, ReferenceEntry};
use crate::feature::DescriptorSet;
use crate::kernel::PairMatcher;
use crate::search::{Deadline, MatchConfig, ReferenceMatch, ScanReport};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{IdentifyError, InitError, InitResult, MatchError};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Upper bound on the default pool size.
const MAX_DEFAULT_WORKERS: usize = 4;

/// Default worker count: available parallelism, capped at four.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .min(MAX_DEFAULT_WORKERS)
}

enum TaskOutcome {
    Accepted(ReferenceMatch),
    BelowThreshold,
    Skipped,
    Failed(CatalogId, MatchError),
    Expired,
}

struct TaskContext<'a, M: ?Sized> {
    matcher: &'a M,
    query: &'a DescriptorSet,
    min_match_count: usize,
    deadline: Option<Deadline>,
    expired: AtomicBool,
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

impl<M: PairMatcher + ?Sized> TaskContext<'_, M> {
    fn run(&self, entry: &ReferenceEntry) -> TaskOutcome {
        if self.expired.load(Ordering::Relaxed) {
            return TaskOutcome::Expired;
        }
        if let Some(deadline) = self.deadline {
            if deadline.is_expired() {
                self.expired.store(true, Ordering::Relaxed);
                return TaskOutcome::Expired;
            }
        }
        if entry.descriptors().len() < 2 {
            return TaskOutcome::Skipped;
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.matcher.good_matches(self.query, entry)
        }));
        let count = match result {
            Ok(Ok(count)) => count,
            Ok(Err(err)) => return TaskOutcome::Failed(entry.id().clone(), err),
            Err(payload) => {
                return TaskOutcome::Failed(
                    entry.id().clone(),
                    MatchError::Panicked {
                        reason: panic_reason(payload.as_ref()),
                    },
                )
            }
        };

        if count > self.query.len() {
            return TaskOutcome::Failed(
                entry.id().clone(),
                MatchError::CountOutOfRange {
                    count,
                    query_len: self.query.len(),
                },
            );
        }
        if count >= self.min_match_count {
            TaskOutcome::Accepted(ReferenceMatch {
                reference_id: entry.id().clone(),
                good_match_count: count,
            })
        } else {
            TaskOutcome::BelowThreshold
        }
    }
}

/// Fixed-size worker pool that scores a query against every reference.
#[derive(Clone)]
pub struct MatchScheduler {
    pool: Arc<ThreadPool>,
    workers: usize,
}

impl std::fmt::Debug for MatchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchScheduler")
            .field("workers", &self.workers)
            .finish()
    }
}

impl MatchScheduler {
    /// Builds a pool with exactly `workers` threads.
    pub fn new(workers: usize) -> InitResult<Self> {
        if workers == 0 {
            return Err(InitError::InvalidConfig("workers must be at least 1"));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|idx| format!("labelmatch-worker-{idx}"))
            .build()
            .map_err(|err| InitError::WorkerPool {
                reason: err.to_string(),
            })?;
        Ok(Self {
            pool: Arc::new(pool),
            workers,
        })
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `op` inside the pool so nested rayon iterators use its workers.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    /// Scores `query` against every reference on the worker pool.
    ///
    /// When `deadline` passes, remaining references are abandoned and the call
    /// fails with [`IdentifyError::Timeout`]. Time spent before the scan
    /// started counts against the same deadline.
    pub fn match_all<M: PairMatcher + ?Sized>(
        &self,
        query: &DescriptorSet,
        corpus: &Corpus,
        matcher: &M,
        cfg: &MatchConfig,
        deadline: Option<Deadline>,
    ) -> Result<ScanReport, IdentifyError> {
        let _span = trace_span!(
            "match_all",
            references = corpus.len(),
            query = query.len(),
            workers = self.workers
        )
        .entered();
        let ctx = TaskContext {
            matcher,
            query,
            min_match_count: cfg.min_match_count,
            deadline,
            expired: AtomicBool::new(false),
        };
        let outcomes: Vec<TaskOutcome> = self.pool.install(|| {
            corpus
                .entries()
                .par_iter()
                .map(|entry| ctx.run(entry))
                .collect()
        });
        finish(outcomes, deadline)
    }

    /// Single-threaded scan with the same semantics as [`MatchScheduler::match_all`].
    pub fn match_all_sequential<M: PairMatcher + ?Sized>(
        query: &DescriptorSet,
        corpus: &Corpus,
        matcher: &M,
        cfg: &MatchConfig,
        deadline: Option<Deadline>,
    ) -> Result<ScanReport, IdentifyError> {
        let ctx = TaskContext {
            matcher,
            query,
            min_match_count: cfg.min_match_count,
            deadline,
            expired: AtomicBool::new(false),
        };
        let outcomes: Vec<TaskOutcome> = corpus.iter().map(|entry| ctx.run(entry)).collect();
        finish(outcomes, deadline)
    }
}

fn finish(
    outcomes: Vec<TaskOutcome>,
    deadline: Option<Deadline>,
) -> Result<ScanReport, IdentifyError> {
    let mut report = ScanReport::default();
    let mut expired = false;
    for outcome in outcomes {
        match outcome {
            TaskOutcome::Accepted(m) => report.matches.push(m),
            TaskOutcome::BelowThreshold => report.below_threshold += 1,
            TaskOutcome::Skipped => report.skipped += 1,
            TaskOutcome::Failed(id, err) => report.failures.push((id, err)),
            TaskOutcome::Expired => expired = true,
        }
    }

    if let Some(deadline) = deadline.filter(|_| expired) {
        return Err(deadline.timeout());
    }

    report.matches.sort();
    report.failures.sort_by(|a, b| a.0.cmp(&b.0));
    for (id, err) in &report.failures {
        trace_warn!(
            "reference excluded after matcher failure",
            id = id,
            error = err
        );
    }
    trace_event!(
        "match_all_done",
        accepted = report.matches.len(),
        failed = report.failures.len(),
        skipped = report.skipped,
        below_threshold = report.below_threshold
    );
    Ok(report)
}
