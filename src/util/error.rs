//! Error types for labelmatch.
//!
//! Errors are split by blast radius: [`InitError`] disables the whole engine,
//! [`ImageError`] concerns one query image, [`MatchError`] one reference entry
//! inside a scan, and [`IdentifyError`] is what an identify call surfaces.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result alias for engine initialization.
pub type InitResult<T> = std::result::Result<T, InitError>;

/// Result alias for image decoding and preprocessing.
pub type ImageResult<T> = std::result::Result<T, ImageError>;

/// Failures that occur once at startup and leave the engine unusable.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InitError {
    /// A required input file does not exist.
    #[error("missing file: {}", path.display())]
    MissingFile { path: PathBuf },
    /// A file exists but its contents cannot be used.
    #[error("corrupt data in {origin}: {reason}")]
    CorruptData { origin: String, reason: String },
    /// The catalog table lacks a required column.
    #[error("missing column '{column}' in {origin}")]
    MissingColumn { origin: String, column: String },
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The matching worker pool could not be created.
    #[error("failed to build worker pool: {reason}")]
    WorkerPool { reason: String },
}

/// Errors raised while decoding or normalizing a single image.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ImageError {
    /// The bytes could not be decoded as an image.
    #[error("unreadable image: {reason}")]
    Unreadable { reason: String },
    /// Width or height is zero, or their product overflows.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// Row stride is smaller than the row width.
    #[error("invalid stride {stride} for width {width}")]
    InvalidStride { width: usize, stride: usize },
    /// The buffer does not hold `width * height` pixels.
    #[error("buffer size mismatch: need {needed} elements, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
}

/// Failure of one reference entry during a corpus scan.
///
/// These never leave the scheduler as errors; they are collected next to the
/// accepted matches so the caller can log or inspect them.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MatchError {
    /// The matcher reported more good matches than there are query descriptors.
    #[error("good match count {count} exceeds query size {query_len}")]
    CountOutOfRange { count: usize, query_len: usize },
    /// The matcher panicked while processing the reference.
    #[error("matcher panicked: {reason}")]
    Panicked { reason: String },
    /// The reference descriptor data cannot be matched.
    #[error("degenerate reference: {reason}")]
    Degenerate { reason: String },
}

/// Hard failures of an identify call.
///
/// Everything that is not listed here degrades to a typed no-match outcome.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IdentifyError {
    /// Initialization failed earlier; no work was attempted.
    #[error("engine not initialized")]
    EngineNotInitialized,
    /// The corpus scan exceeded its wall-clock budget.
    #[error("identification exceeded its {budget:?} budget after {elapsed:?}")]
    Timeout { elapsed: Duration, budget: Duration },
    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}
