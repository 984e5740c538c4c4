//! Engine handle tying extraction, matching, ranking and metadata together.
//!
//! An [`Engine`] only exists after a successful [`Engine::initialize`]; there
//! is no global readiness flag. [`IdentificationService`] wraps the outcome of
//! initialization for front ends that must keep answering requests while the
//! engine is disabled.

use crate::candidate::{select_best, top_k, BestMatch};
use crate::catalog::{BottleDetail, CatalogColumns, CatalogId, CatalogTable, MetadataCache};
use crate::corpus::Corpus;
use crate::feature::{DescriptorExtractor, DescriptorSet, ExtractorConfig};
use crate::kernel::RatioTestMatcher;
use crate::search::{default_workers, Deadline, MatchConfig, MatchScheduler, ScanReport};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{IdentifyError, ImageError, InitError, InitResult};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Default number of cached catalog details.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Default wall-clock budget of one identify call.
pub const DEFAULT_TIME_BUDGET: Duration = Duration::from_secs(30);

/// Engine configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Ratio test and acceptance threshold.
    pub matching: MatchConfig,
    /// Query descriptor extraction.
    pub extractor: ExtractorConfig,
    /// Size of the shared matching pool.
    pub workers: usize,
    /// Maximum number of cached catalog details.
    pub cache_capacity: usize,
    /// Per-call budget covering extraction and scan; `None` disables it.
    pub time_budget: Option<Duration>,
    /// Catalog table column names.
    pub columns: CatalogColumns,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            matching: MatchConfig::default(),
            extractor: ExtractorConfig::default(),
            workers: default_workers(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            time_budget: Some(DEFAULT_TIME_BUDGET),
            columns: CatalogColumns::default(),
        }
    }
}

impl EngineConfig {
    /// Checks every value range.
    pub fn validate(&self) -> InitResult<()> {
        self.matching.validate()?;
        self.extractor.validate()?;
        if self.workers == 0 {
            return Err(InitError::InvalidConfig("workers must be at least 1"));
        }
        if self.cache_capacity == 0 {
            return Err(InitError::InvalidConfig(
                "cache_capacity must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Why an identify call found nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NoMatchReason {
    /// The image could not be decoded or normalized.
    UnreadableImage { reason: String },
    /// The image yields fewer descriptors than any match could need.
    InsufficientDescriptors { found: usize, required: usize },
    /// No reference reached the minimum good-match count.
    BelowThreshold,
}

/// Outcome of one identify call.
#[derive(Clone, Debug, PartialEq)]
pub enum Identification {
    /// A reference won and its catalog details were resolved.
    Matched {
        best: BestMatch,
        details: Arc<BottleDetail>,
    },
    /// A reference won but the catalog has no row for its id.
    DetailsUnavailable { best: BestMatch },
    /// No reference qualified.
    NoMatch(NoMatchReason),
}

impl Identification {
    /// Returns the winning reference, if any.
    pub fn best(&self) -> Option<&BestMatch> {
        match self {
            Identification::Matched { best, .. } | Identification::DetailsUnavailable { best } => {
                Some(best)
            }
            Identification::NoMatch(_) => None,
        }
    }

    /// Returns the resolved details, if any.
    pub fn details(&self) -> Option<&BottleDetail> {
        match self {
            Identification::Matched { details, .. } => Some(details.as_ref()),
            _ => None,
        }
    }
}

/// Identification plus the ranking taken from the same corpus scan.
#[derive(Clone, Debug, PartialEq)]
pub struct Ranked {
    pub identification: Identification,
    /// Up to `k` accepted references, best first. Empty when nothing was
    /// scanned or nothing qualified.
    pub ranking: Vec<BestMatch>,
}

impl Ranked {
    fn no_match(reason: NoMatchReason) -> Self {
        Self {
            identification: Identification::NoMatch(reason),
            ranking: Vec::new(),
        }
    }

    fn unreadable(err: &ImageError) -> Self {
        trace_warn!("query image rejected", error = err);
        Self::no_match(NoMatchReason::UnreadableImage {
            reason: err.to_string(),
        })
    }
}

/// Ready-to-serve identification engine.
///
/// All methods take `&self`; the engine is `Send + Sync` and meant to be
/// shared across request threads. Corpus and catalog are immutable, the
/// metadata cache synchronizes itself.
pub struct Engine {
    corpus: Arc<Corpus>,
    extractor: DescriptorExtractor,
    matcher: RatioTestMatcher,
    scheduler: MatchScheduler,
    cache: MetadataCache,
    matching: MatchConfig,
    time_budget: Option<Duration>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("references", &self.corpus.len())
            .field("catalog_rows", &self.cache.table().len())
            .field("workers", &self.scheduler.workers())
            .field("matching", &self.matching)
            .field("time_budget", &self.time_budget)
            .finish()
    }
}

impl Engine {
    /// Loads the corpus blob and catalog table and builds the worker pool.
    pub fn initialize<P: AsRef<Path>, Q: AsRef<Path>>(
        corpus_path: P,
        catalog_path: Q,
        cfg: EngineConfig,
    ) -> InitResult<Self> {
        let _span = trace_span!("initialize").entered();
        cfg.validate()?;
        let corpus = Corpus::load(corpus_path)?;
        let table = CatalogTable::load(catalog_path, &cfg.columns)?;
        Self::from_parts(corpus, table, cfg)
    }

    /// Builds an engine from already loaded parts.
    pub fn from_parts(corpus: Corpus, table: CatalogTable, cfg: EngineConfig) -> InitResult<Self> {
        cfg.validate()?;
        let matcher = RatioTestMatcher::new(cfg.matching.ratio_threshold)?;
        let extractor = DescriptorExtractor::new(cfg.extractor.clone())?;
        let scheduler = MatchScheduler::new(cfg.workers)?;

        let unknown = corpus
            .iter()
            .filter(|entry| !table.contains(entry.id()))
            .count();
        if unknown > 0 {
            trace_warn!(
                "corpus references ids absent from the catalog",
                count = unknown
            );
        }
        trace_event!(
            "engine_ready",
            references = corpus.len(),
            catalog_rows = table.len(),
            workers = cfg.workers
        );

        Ok(Self {
            corpus: Arc::new(corpus),
            extractor,
            matcher,
            scheduler,
            cache: MetadataCache::new(Arc::new(table), cfg.cache_capacity),
            matching: cfg.matching,
            time_budget: cfg.time_budget,
        })
    }

    /// Identifies the product in an encoded image.
    ///
    /// The time budget covers the whole call, decoding and extraction included.
    pub fn identify(&self, bytes: &[u8]) -> Result<Identification, IdentifyError> {
        Ok(self.identify_ranked(bytes, 0)?.identification)
    }

    /// Identifies the product in an image file.
    pub fn identify_path<P: AsRef<Path>>(&self, path: P) -> Result<Identification, IdentifyError> {
        Ok(self.identify_path_ranked(path, 0)?.identification)
    }

    /// Identifies the product in an encoded image and ranks up to `k`
    /// accepted references from the same corpus scan.
    pub fn identify_ranked(&self, bytes: &[u8], k: usize) -> Result<Ranked, IdentifyError> {
        let _span = trace_span!("identify", bytes = bytes.len()).entered();
        let deadline = self.start_deadline();
        match self.extractor.extract(bytes) {
            Ok(query) => self.identify_until(&query, deadline, k),
            Err(err) => Ok(Ranked::unreadable(&err)),
        }
    }

    /// File variant of [`Engine::identify_ranked`].
    pub fn identify_path_ranked<P: AsRef<Path>>(
        &self,
        path: P,
        k: usize,
    ) -> Result<Ranked, IdentifyError> {
        let _span = trace_span!("identify_path").entered();
        let deadline = self.start_deadline();
        match self.extractor.extract_path(path) {
            Ok(query) => self.identify_until(&query, deadline, k),
            Err(err) => Ok(Ranked::unreadable(&err)),
        }
    }

    /// Identifies a precomputed query descriptor set.
    pub fn identify_descriptors(
        &self,
        query: &DescriptorSet,
    ) -> Result<Identification, IdentifyError> {
        Ok(self
            .identify_until(query, self.start_deadline(), 0)?
            .identification)
    }

    fn identify_until(
        &self,
        query: &DescriptorSet,
        deadline: Option<Deadline>,
        k: usize,
    ) -> Result<Ranked, IdentifyError> {
        if let Some(deadline) = deadline {
            deadline.check()?;
        }
        let required = self.matching.min_match_count;
        if query.len() < required {
            return Ok(Ranked::no_match(
                NoMatchReason::InsufficientDescriptors {
                    found: query.len(),
                    required,
                },
            ));
        }

        let report = self.scan_until(query, deadline)?;
        let ranking = top_k(&report.matches, k);
        let Some(best) = select_best(&report.matches) else {
            return Ok(Ranked::no_match(NoMatchReason::BelowThreshold));
        };
        trace_event!("best_match", good_matches = best.good_match_count);
        let identification = match self.cache.get_details(&best.id) {
            Some(details) => Identification::Matched { best, details },
            None => Identification::DetailsUnavailable { best },
        };
        Ok(Ranked {
            identification,
            ranking,
        })
    }

    /// Starts the per-call deadline, if a budget is configured.
    pub fn start_deadline(&self) -> Option<Deadline> {
        self.time_budget.map(Deadline::start)
    }

    /// Scans the corpus with the production matcher under a fresh deadline.
    pub fn scan(&self, query: &DescriptorSet) -> Result<ScanReport, IdentifyError> {
        self.scan_until(query, self.start_deadline())
    }

    /// Scans the corpus against a deadline started by the caller.
    pub fn scan_until(
        &self,
        query: &DescriptorSet,
        deadline: Option<Deadline>,
    ) -> Result<ScanReport, IdentifyError> {
        self.scheduler.match_all(
            query,
            &self.corpus,
            &self.matcher,
            &self.matching,
            deadline,
        )
    }

    /// Returns the best accepted reference, or `None` when none qualifies.
    pub fn find_best_match(
        &self,
        query: &DescriptorSet,
    ) -> Result<Option<BestMatch>, IdentifyError> {
        Ok(select_best(&self.scan(query)?.matches))
    }

    /// Returns up to `k` accepted references, best first.
    pub fn rank(&self, query: &DescriptorSet, k: usize) -> Result<Vec<BestMatch>, IdentifyError> {
        Ok(top_k(&self.scan(query)?.matches, k))
    }

    /// Looks up catalog details through the cache.
    pub fn get_details(&self, id: &CatalogId) -> Option<Arc<BottleDetail>> {
        self.cache.get_details(id)
    }

    /// Returns the reference corpus.
    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    /// Returns the metadata cache.
    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// Returns the query extractor.
    pub fn extractor(&self) -> &DescriptorExtractor {
        &self.extractor
    }

    /// Returns the shared matching scheduler.
    pub fn scheduler(&self) -> &MatchScheduler {
        &self.scheduler
    }

    /// Returns the matching thresholds.
    pub fn matching(&self) -> &MatchConfig {
        &self.matching
    }
}

/// Front-end wrapper that keeps serving after a failed initialization.
///
/// When initialization failed every identify call short-circuits with
/// [`IdentifyError::EngineNotInitialized`] without touching any input.
#[derive(Debug)]
pub struct IdentificationService {
    state: Result<Engine, InitError>,
}

impl IdentificationService {
    /// Initializes an engine; failures are recorded, never returned.
    pub fn start<P: AsRef<Path>, Q: AsRef<Path>>(
        corpus_path: P,
        catalog_path: Q,
        cfg: EngineConfig,
    ) -> Self {
        Self::from_init(Engine::initialize(corpus_path, catalog_path, cfg))
    }

    /// Wraps the outcome of an initialization attempt.
    pub fn from_init(state: InitResult<Engine>) -> Self {
        if let Err(err) = &state {
            trace_warn!("engine initialization failed", error = err);
        }
        Self { state }
    }

    /// Returns true when the engine is ready.
    pub fn is_ready(&self) -> bool {
        self.state.is_ok()
    }

    /// Returns the initialization failure, if any.
    pub fn init_error(&self) -> Option<&InitError> {
        self.state.as_ref().err()
    }

    /// Returns the engine when ready.
    pub fn engine(&self) -> Option<&Engine> {
        self.state.as_ref().ok()
    }

    /// Identifies the product in an encoded image.
    pub fn identify(&self, bytes: &[u8]) -> Result<Identification, IdentifyError> {
        self.ready()?.identify(bytes)
    }

    /// Identifies the product in an image file.
    pub fn identify_path<P: AsRef<Path>>(&self, path: P) -> Result<Identification, IdentifyError> {
        self.ready()?.identify_path(path)
    }

    fn ready(&self) -> Result<&Engine, IdentifyError> {
        self.engine().ok_or(IdentifyError::EngineNotInitialized)
    }
}
