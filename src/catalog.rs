use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use log::{info, warn};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Archive identifier of a book, digits only (e.g. `12345`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BookId(String);

impl BookId {
    /// Catalog ids carry a two-character prefix (`PG12345`) that the mirror
    /// does not use.
    pub fn from_catalog(raw: &str) -> Result<Self> {
        let digits: String = raw.chars().skip(2).collect();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            bail!("Malformed catalog identifier '{}'", raw);
        }
        Ok(Self(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the summaries TSV. The file has no header, so fields map by
/// position: the declaration order below is the column order. Columns after
/// the title may be absent.
#[derive(Debug, Clone, Deserialize)]
pub struct SummaryRecord {
    pub _wikipedia_id: IgnoredAny,
    pub _freebase_id: IgnoredAny,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub _publication_date: IgnoredAny,
    #[serde(default)]
    pub _genres: IgnoredAny,
    #[serde(default)]
    pub summary: Option<String>,
}

/// One row of the metadata catalog. Columns not named here are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataRecord {
    pub id: String,
    pub title: Option<String>,
    pub author: Option<String>,
}

/// A summary joined to one metadata entry with the same title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    pub title: String,
    pub metadata_author: Option<String>,
    pub summary_author: Option<String>,
    pub id: BookId,
}

#[derive(Debug, Serialize)]
struct MatchedTitleRecord<'a> {
    title: &'a str,
    author: Option<&'a str>,
    summary_author: Option<&'a str>,
    id: &'a BookId,
}

/// Summary text by title. The first summary row for a title wins.
#[derive(Debug, Default)]
pub struct SummaryLookup {
    by_title: HashMap<String, String>,
}

impl SummaryLookup {
    pub fn from_records(records: &[SummaryRecord]) -> Self {
        let mut by_title = HashMap::with_capacity(records.len());
        let mut repeated = 0usize;
        for record in records {
            if by_title.contains_key(&record.title) {
                repeated += 1;
                continue;
            }
            let text = record.summary.clone().unwrap_or_default();
            by_title.insert(record.title.clone(), text);
        }
        if repeated > 0 {
            warn!(
                "{} summary rows repeat an earlier title; the first summary for each title is used.",
                repeated
            );
        }
        Self { by_title }
    }

    pub fn get(&self, title: &str) -> Option<&str> {
        self.by_title.get(title).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_title.len()
    }
}

/// Everything the driver needs from the two input tables.
#[derive(Debug)]
pub struct Catalog {
    pub rows: Vec<CatalogRow>,
    pub summaries: SummaryLookup,
}

pub fn load_summaries(path: &Path) -> Result<Vec<SummaryRecord>> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open summaries file: {}", path.display()))?;

    let mut records = Vec::new();
    for (i, result) in rdr.deserialize::<SummaryRecord>().enumerate() {
        let record = result
            .with_context(|| format!("Malformed summary row {} in {}", i + 1, path.display()))?;
        records.push(record);
    }
    Ok(records)
}

pub fn load_metadata(path: &Path) -> Result<Vec<MetadataRecord>> {
    let mut rdr = ReaderBuilder::new()
        .from_path(path)
        .with_context(|| format!("Failed to open metadata file: {}", path.display()))?;

    let mut records = Vec::new();
    for (i, result) in rdr.deserialize::<MetadataRecord>().enumerate() {
        let record = result
            .with_context(|| format!("Malformed metadata row {} in {}", i + 1, path.display()))?;
        records.push(record);
    }
    Ok(records)
}

/// Inner join on exact title equality. Output follows summary order, fanning
/// out over every metadata entry sharing the title in metadata order.
pub fn join(summaries: &[SummaryRecord], metadata: &[MetadataRecord]) -> Result<Vec<CatalogRow>> {
    let mut by_title: HashMap<&str, Vec<&MetadataRecord>> = HashMap::new();
    for record in metadata {
        if let Some(title) = record.title.as_deref() {
            by_title.entry(title).or_default().push(record);
        }
    }

    let mut rows = Vec::new();
    for summary in summaries {
        let Some(matches) = by_title.get(summary.title.as_str()) else {
            continue;
        };
        for meta in matches {
            rows.push(CatalogRow {
                title: summary.title.clone(),
                metadata_author: meta.author.clone(),
                summary_author: summary.author.clone(),
                id: BookId::from_catalog(&meta.id)?,
            });
        }
    }
    Ok(rows)
}

/// Snapshot of the join before any filtering: fan-out duplicates and author
/// mismatches included.
pub fn write_matched_titles(rows: &[CatalogRow], path: &Path) -> Result<()> {
    let mut wtr = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        wtr.serialize(MatchedTitleRecord {
            title: &row.title,
            author: row.metadata_author.as_deref(),
            summary_author: row.summary_author.as_deref(),
            id: &row.id,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn load_catalog(summaries_path: &Path, metadata_path: &Path, matched_titles_path: &Path) -> Result<Catalog> {
    info!("Loading summaries from: {}", summaries_path.display());
    let summaries = load_summaries(summaries_path)?;
    info!("Loaded {} summary rows.", summaries.len());

    info!("Loading book metadata from: {}", metadata_path.display());
    let metadata = load_metadata(metadata_path)?;
    info!("Loaded {} metadata rows.", metadata.len());

    let rows = join(&summaries, &metadata)?;
    info!("Title join produced {} candidate rows.", rows.len());

    write_matched_titles(&rows, matched_titles_path)?;
    info!("Matched titles written to: {}", matched_titles_path.display());

    let lookup = SummaryLookup::from_records(&summaries);
    info!("{} distinct titles have a summary.", lookup.len());
    Ok(Catalog { rows, summaries: lookup })
}
