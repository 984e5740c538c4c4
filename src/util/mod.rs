//! Shared utility helpers.

pub mod error;

pub use error::{IdentifyError, ImageError, ImageResult, InitError, InitResult, MatchError};
