//! Catalog metadata: the read-only dataset table and its LRU front cache.
//!
//! The table is loaded once from a CSV file with a header row. Only the id and
//! name columns are required at serve time; the image-source column is used
//! by corpus preparation and is never part of the returned details.

pub mod cache;
mod id;

pub use cache::{CacheStats, LruCache, MetadataCache};
pub use id::CatalogId;

use crate::util::{InitError, InitResult};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;

/// Column names of the catalog table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogColumns {
    /// Unique identifier column.
    pub id: String,
    /// Display-name column.
    pub name: String,
    /// Image-source column (URL or path), excluded from details.
    pub image_source: String,
}

impl Default for CatalogColumns {
    fn default() -> Self {
        Self {
            id: "id".to_owned(),
            name: "name".to_owned(),
            image_source: "image_url".to_owned(),
        }
    }
}

/// Catalog attributes of one entry, without the image-source column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BottleDetail {
    id: CatalogId,
    name: String,
    attributes: BTreeMap<String, String>,
}

impl BottleDetail {
    /// Returns the catalog id.
    pub fn id(&self) -> &CatalogId {
        &self.id
    }

    /// Returns the display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns all attributes keyed by column name, including the name column.
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Returns one attribute by column name.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.attributes.get(column).map(String::as_str)
    }
}

/// Read-only catalog table indexed by id.
#[derive(Debug)]
pub struct CatalogTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    index: HashMap<CatalogId, usize>,
    id_col: usize,
    name_col: usize,
    image_col: Option<usize>,
}

impl CatalogTable {
    /// Loads a CSV table from disk.
    pub fn load<P: AsRef<Path>>(path: P, columns: &CatalogColumns) -> InitResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(InitError::MissingFile {
                path: path.to_path_buf(),
            });
        }
        let file = std::fs::File::open(path).map_err(|err| InitError::CorruptData {
            origin: path.display().to_string(),
            reason: err.to_string(),
        })?;
        Self::from_reader(file, &path.display().to_string(), columns)
    }

    /// Parses a CSV table from any reader; `origin` labels errors.
    pub fn from_reader<R: Read>(
        reader: R,
        origin: &str,
        columns: &CatalogColumns,
    ) -> InitResult<Self> {
        let corrupt = |err: csv::Error| InitError::CorruptData {
            origin: origin.to_owned(),
            reason: err.to_string(),
        };
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .map_err(corrupt)?
            .iter()
            .map(str::to_owned)
            .collect();
        let find = |column: &str| headers.iter().position(|h| h == column);
        let missing = |column: &str| InitError::MissingColumn {
            origin: origin.to_owned(),
            column: column.to_owned(),
        };
        let id_col = find(&columns.id).ok_or_else(|| missing(&columns.id))?;
        let name_col = find(&columns.name).ok_or_else(|| missing(&columns.name))?;
        let image_col = find(&columns.image_source);

        let mut rows = Vec::new();
        let mut index = HashMap::new();
        for record in rdr.records() {
            let record = record.map_err(corrupt)?;
            let raw_id = record.get(id_col).unwrap_or("");
            if raw_id.is_empty() {
                continue;
            }
            let id = CatalogId::parse(raw_id);
            if index.contains_key(&id) {
                continue;
            }
            index.insert(id, rows.len());
            rows.push(record.iter().map(str::to_owned).collect());
        }

        Ok(Self {
            headers,
            rows,
            index,
            id_col,
            name_col,
            image_col,
        })
    }

    /// Number of distinct ids in the table.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true when the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns true when `id` is present.
    pub fn contains(&self, id: &CatalogId) -> bool {
        self.index.contains_key(id)
    }

    /// Projects the row for `id` into a detail record.
    pub fn lookup(&self, id: &CatalogId) -> Option<BottleDetail> {
        let row = self.rows.get(*self.index.get(id)?)?;
        let attributes = self
            .headers
            .iter()
            .zip(row.iter())
            .enumerate()
            .filter(|(col, _)| *col != self.id_col && Some(*col) != self.image_col)
            .map(|(_, (header, value))| (header.clone(), value.clone()))
            .collect();
        Some(BottleDetail {
            id: id.clone(),
            name: row.get(self.name_col).cloned().unwrap_or_default(),
            attributes,
        })
    }

    /// Iterates `(id, name, image_source)` in file order.
    pub fn entries(&self) -> impl Iterator<Item = (CatalogId, &str, Option<&str>)> + '_ {
        self.rows.iter().map(move |row| {
            let id = CatalogId::parse(row.get(self.id_col).map(String::as_str).unwrap_or(""));
            let name = row.get(self.name_col).map(String::as_str).unwrap_or("");
            let image = self
                .image_col
                .and_then(|col| row.get(col))
                .map(String::as_str)
                .filter(|value| !value.is_empty());
            (id, name, image)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{CatalogColumns, CatalogId, CatalogTable};
    use crate::util::InitError;

    const CSV: &str = "id,name,distillery,image_url\n\
                       1,Glen A,North,http://x/1.jpg\n\
                       2,Glen B,South,http://x/2.jpg\n\
                       1,Dup,West,http://x/dup.jpg\n\
                       ,Blank,East,http://x/blank.jpg\n\
                       abc,\"Comma, Inc\",Isle,http://x/abc.jpg\n";

    fn table() -> CatalogTable {
        CatalogTable::from_reader(CSV.as_bytes(), "inline", &CatalogColumns::default()).unwrap()
    }

    #[test]
    fn keeps_first_duplicate_and_skips_blank_ids() {
        let table = table();
        assert_eq!(table.len(), 3);
        let detail = table.lookup(&CatalogId::Numeric(1)).unwrap();
        assert_eq!(detail.name(), "Glen A");
        assert_eq!(detail.get("distillery"), Some("North"));
    }

    #[test]
    fn details_exclude_image_and_id_columns() {
        let detail = table().lookup(&CatalogId::parse("abc")).unwrap();
        assert_eq!(detail.name(), "Comma, Inc");
        assert!(detail.get("image_url").is_none());
        assert!(detail.get("id").is_none());
        assert_eq!(detail.attributes().len(), 2);
    }

    #[test]
    fn missing_id_returns_none() {
        assert!(table().lookup(&CatalogId::Numeric(99)).is_none());
    }

    #[test]
    fn reports_missing_column() {
        let err = CatalogTable::from_reader(
            "key,name\n1,A\n".as_bytes(),
            "inline",
            &CatalogColumns::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            InitError::MissingColumn {
                origin: "inline".to_owned(),
                column: "id".to_owned(),
            }
        );
    }

    #[test]
    fn entries_iterate_in_file_order() {
        let table = table();
        let ids: Vec<CatalogId> = table.entries().map(|(id, _, _)| id).collect();
        assert_eq!(
            ids,
            vec![
                CatalogId::Numeric(1),
                CatalogId::Numeric(2),
                CatalogId::parse("abc"),
            ]
        );
        let (_, _, image) = table.entries().next().unwrap();
        assert_eq!(image, Some("http://x/1.jpg"));
    }
}
