//! Offline corpus preparation from catalog images.
//!
//! Catalog images are expected on local disk, one file per id named
//! `<sanitized id>.<jpg|jpeg|png>`. Fetching them is left to external tooling.

use crate::catalog::{CatalogId, CatalogTable};
use crate::corpus::{Corpus, ReferenceEntry};
use crate::feature::{DescriptorExtractor, DescriptorSet};
use crate::search::MatchScheduler;
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{ImageResult, InitResult};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// File extensions tried for catalog images, in priority order.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Where the pixels of a catalog image come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageSource {
    Path(PathBuf),
    Encoded(Vec<u8>),
}

/// One catalog image to describe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceImage {
    pub id: CatalogId,
    pub name: String,
    pub source: ImageSource,
}

impl SourceImage {
    /// Image stored in a file.
    pub fn from_path(id: CatalogId, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            name: name.into(),
            source: ImageSource::Path(path.into()),
        }
    }

    /// Image already held in memory as encoded bytes.
    pub fn from_bytes(id: CatalogId, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id,
            name: name.into(),
            source: ImageSource::Encoded(bytes),
        }
    }
}

/// Catalog rows resolved against an image directory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceListing {
    /// Rows with an image file, in table order.
    pub images: Vec<SourceImage>,
    /// Rows without any matching file.
    pub missing: Vec<CatalogId>,
}

/// Resolves every catalog row to `<dir>/<file stem>.<ext>`.
pub fn source_images_in_dir<P: AsRef<Path>>(table: &CatalogTable, dir: P) -> SourceListing {
    let dir = dir.as_ref();
    let mut listing = SourceListing::default();
    for (id, name, _) in table.entries() {
        let stem = id.file_stem();
        let found = IMAGE_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{stem}.{ext}")))
            .find(|path| path.is_file());
        match found {
            Some(path) => listing.images.push(SourceImage::from_path(id, name, path)),
            None => listing.missing.push(id),
        }
    }
    listing
}

/// Counters of one build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Entries written to the corpus.
    pub added: usize,
    /// Sources dropped because their id was already seen.
    pub duplicates: usize,
    /// Sources that could not be decoded.
    pub unreadable: usize,
    /// Sources that produced no descriptors.
    pub empty: usize,
}

/// Describes catalog images in parallel and assembles a corpus.
#[derive(Clone, Debug)]
pub struct CorpusBuilder {
    extractor: DescriptorExtractor,
    scheduler: MatchScheduler,
}

impl CorpusBuilder {
    /// Creates a builder that extracts on `scheduler`'s pool.
    pub fn new(extractor: DescriptorExtractor, scheduler: MatchScheduler) -> Self {
        Self {
            extractor,
            scheduler,
        }
    }

    fn describe(&self, source: &ImageSource) -> ImageResult<DescriptorSet> {
        match source {
            ImageSource::Path(path) => self.extractor.extract_path(path),
            ImageSource::Encoded(bytes) => self.extractor.extract(bytes),
        }
    }

    /// Builds a corpus from `sources`, keeping the first source of each id.
    ///
    /// Fails with `CorruptData` when no source yields descriptors.
    pub fn build(&self, sources: &[SourceImage]) -> InitResult<(Corpus, BuildReport)> {
        let _span = trace_span!("build_corpus", sources = sources.len()).entered();
        let mut report = BuildReport::default();

        let mut seen = HashSet::with_capacity(sources.len());
        let unique: Vec<&SourceImage> = sources
            .iter()
            .filter(|source| seen.insert(&source.id))
            .collect();
        report.duplicates = sources.len() - unique.len();

        let described: Vec<(&SourceImage, ImageResult<DescriptorSet>)> =
            self.scheduler.install(|| {
                unique
                    .par_iter()
                    .map(|&source| (source, self.describe(&source.source)))
                    .collect()
            });

        let mut entries = Vec::with_capacity(described.len());
        for (source, result) in described {
            match result {
                Ok(set) if set.is_empty() => {
                    trace_warn!("catalog image yields no descriptors", id = source.id);
                    report.empty += 1;
                }
                Ok(set) => entries.push(ReferenceEntry::new(
                    source.id.clone(),
                    source.name.clone(),
                    set.into_vec(),
                )),
                Err(err) => {
                    trace_warn!("catalog image unreadable", id = source.id, error = err);
                    report.unreadable += 1;
                }
            }
        }
        report.added = entries.len();
        trace_event!(
            "build_corpus_done",
            added = report.added,
            duplicates = report.duplicates,
            unreadable = report.unreadable,
            empty = report.empty
        );

        Ok((Corpus::new(entries)?, report))
    }
}
