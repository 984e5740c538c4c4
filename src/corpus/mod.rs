//! Reference feature store.
//!
//! The corpus is a frozen snapshot of per-catalog-entry descriptor sets,
//! loaded once from a bincode blob and shared read-only by every identify
//! call. There is no mutation API after construction.

pub mod builder;

use crate::catalog::CatalogId;
use crate::feature::{Descriptor, DESCRIPTOR_BYTES};
use crate::util::{InitError, InitResult};
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

const MAGIC: [u8; 8] = *b"LBLMATCH";
const FORMAT_VERSION: u32 = 1;

/// Fixed-width little-endian encoding; a blob must end where the corpus ends.
fn blob_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Precomputed descriptors of one catalog entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    id: CatalogId,
    name: String,
    descriptors: Vec<Descriptor>,
}

impl ReferenceEntry {
    /// Creates an entry.
    pub fn new(id: CatalogId, name: impl Into<String>, descriptors: Vec<Descriptor>) -> Self {
        Self {
            id,
            name: name.into(),
            descriptors,
        }
    }

    /// Returns the catalog id.
    pub fn id(&self) -> &CatalogId {
        &self.id
    }

    /// Returns the display name recorded at build time.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the reference descriptors.
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }
}

#[derive(Serialize)]
struct CorpusFileRef<'a> {
    magic: [u8; 8],
    version: u32,
    descriptor_bytes: u32,
    entries: &'a [ReferenceEntry],
}

#[derive(Deserialize)]
struct CorpusFile {
    magic: [u8; 8],
    version: u32,
    descriptor_bytes: u32,
    entries: Vec<ReferenceEntry>,
}

/// Immutable, non-empty collection of reference entries with unique ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Corpus {
    entries: Vec<ReferenceEntry>,
}

impl Corpus {
    /// Builds a corpus, keeping the first entry for every duplicated id.
    ///
    /// Fails with `CorruptData` when no entry remains.
    pub fn new(entries: Vec<ReferenceEntry>) -> InitResult<Self> {
        Self::from_entries(entries, "<memory>")
    }

    fn from_entries(entries: Vec<ReferenceEntry>, origin: &str) -> InitResult<Self> {
        let mut seen = HashSet::with_capacity(entries.len());
        let entries: Vec<ReferenceEntry> = entries
            .into_iter()
            .filter(|entry| seen.insert(entry.id.clone()))
            .collect();
        if entries.is_empty() {
            return Err(InitError::CorruptData {
                origin: origin.to_owned(),
                reason: "corpus holds no reference entries".to_owned(),
            });
        }
        Ok(Self { entries })
    }

    /// Loads a corpus blob from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> InitResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(InitError::MissingFile {
                path: path.to_path_buf(),
            });
        }
        let origin = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|err| InitError::CorruptData {
            origin: origin.clone(),
            reason: err.to_string(),
        })?;
        Self::from_bytes(&bytes, &origin)
    }

    /// Decodes a corpus blob; `origin` labels errors.
    pub fn from_bytes(bytes: &[u8], origin: &str) -> InitResult<Self> {
        let corrupt = |reason: String| InitError::CorruptData {
            origin: origin.to_owned(),
            reason,
        };
        if bytes.is_empty() {
            return Err(corrupt("file is empty".to_owned()));
        }
        let file: CorpusFile = blob_options()
            .deserialize(bytes)
            .map_err(|err| corrupt(err.to_string()))?;
        if file.magic != MAGIC {
            return Err(corrupt("not a labelmatch corpus".to_owned()));
        }
        if file.version != FORMAT_VERSION {
            let reason = format!("unsupported format version {}", file.version);
            return Err(corrupt(reason));
        }
        if file.descriptor_bytes as usize != DESCRIPTOR_BYTES {
            return Err(corrupt(format!(
                "descriptor length {} does not match {DESCRIPTOR_BYTES}",
                file.descriptor_bytes
            )));
        }
        Self::from_entries(file.entries, origin)
    }

    /// Encodes the corpus as a blob readable by [`Corpus::from_bytes`].
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        blob_options().serialize(&CorpusFileRef {
            magic: MAGIC,
            version: FORMAT_VERSION,
            descriptor_bytes: DESCRIPTOR_BYTES as u32,
            entries: &self.entries,
        })
    }

    /// Writes the corpus blob to `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let bytes = self.to_bytes().map_err(std::io::Error::other)?;
        std::fs::write(path, bytes)
    }

    /// Number of reference entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; an empty corpus cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entries in build order.
    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.entries
    }

    /// Iterates over the entries in build order.
    pub fn iter(&self) -> std::slice::Iter<'_, ReferenceEntry> {
        self.entries.iter()
    }

    /// Looks up an entry by id.
    pub fn get(&self, id: &CatalogId) -> Option<&ReferenceEntry> {
        self.entries.iter().find(|entry| &entry.id == id)
    }
}

impl<'a> IntoIterator for &'a Corpus {
    type Item = &'a ReferenceEntry;
    type IntoIter = std::slice::Iter<'a, ReferenceEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
