//! labelmatch identifies a bottle from a photograph of its label.
//!
//! Query photos are reduced to 256-bit oriented binary descriptors and
//! compared against a precomputed reference corpus with a brute-force
//! two-nearest-neighbour Hamming search and the distance-ratio test. The
//! reference with the most surviving correspondences wins; its catalog
//! metadata is served through a bounded LRU cache.
//!
//! Matching fans out over a fixed-size rayon pool shared by every identify
//! call. Per-reference failures are isolated; only initialization errors and
//! scan timeouts surface as hard errors.
//!
//! ```no_run
//! use labelmatch::{Engine, EngineConfig, Identification};
//!
//! let engine = Engine::initialize("corpus.bin", "catalog.csv", EngineConfig::default())?;
//! let photo = std::fs::read("photo.jpg")?;
//! match engine.identify(&photo)? {
//!     Identification::Matched { best, details } => println!("{} ({})", details.name(), best.score),
//!     Identification::DetailsUnavailable { best } => println!("{} (no details)", best.id),
//!     Identification::NoMatch(reason) => println!("no match: {reason:?}"),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod candidate;
pub mod catalog;
pub mod corpus;
pub mod engine;
pub mod feature;
pub mod image;
pub mod kernel;
pub mod lowlevel;
pub mod search;
mod trace;
pub mod util;

pub use crate::candidate::{select_best, top_k, BestMatch};
pub use crate::catalog::{
    BottleDetail, CacheStats, CatalogColumns, CatalogId, CatalogTable, MetadataCache,
};
pub use crate::corpus::builder::{BuildReport, CorpusBuilder, SourceImage};
pub use crate::corpus::{Corpus, ReferenceEntry};
pub use crate::engine::{
    Engine, EngineConfig, Identification, IdentificationService, NoMatchReason, Ranked,
};
pub use crate::feature::{Descriptor, DescriptorExtractor, DescriptorSet, ExtractorConfig};
pub use crate::image::clahe::ClaheConfig;
pub use crate::kernel::{PairMatcher, RatioTestMatcher};
pub use crate::search::{Deadline, MatchConfig, MatchScheduler, ReferenceMatch, ScanReport};
pub use crate::util::{IdentifyError, ImageError, InitError, MatchError};
