use crate::archive::extract_book;
use crate::author::{author_match, AUTHOR_MATCH_THRESHOLD};
use crate::boilerplate::{strip_boilerplate, CleanOutcome};
use crate::catalog::{BookId, Catalog, CatalogRow};
use crate::gutenberg::ArchiveSource;
use crate::stats::{collect_pair_stats, StatsRow};
use crate::summary::write_summary;
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Where the run puts its files.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub books_dir: PathBuf,
    pub summaries_dir: PathBuf,
    /// Archives are downloaded and unpacked here.
    pub work_dir: PathBuf,
}

impl OutputLayout {
    /// Deletes and recreates the book and summary directories. Output from
    /// any previous run is lost.
    pub fn reset(&self) -> Result<()> {
        for dir in [&self.books_dir, &self.summaries_dir] {
            if dir.exists() {
                fs::remove_dir_all(dir).with_context(|| format!("Failed to remove {}", dir.display()))?;
            }
            fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        fs::create_dir_all(&self.work_dir)
            .with_context(|| format!("Failed to create {}", self.work_dir.display()))?;
        Ok(())
    }

    fn archive_path(&self, id: &BookId) -> PathBuf {
        self.work_dir.join(format!("{}.zip", id))
    }

    pub fn book_path(&self, id: &BookId) -> PathBuf {
        self.books_dir.join(format!("{}.txt", id))
    }

    fn clean_book_path(&self, id: &BookId) -> PathBuf {
        self.books_dir.join(format!("clean-{}.txt", id))
    }

    pub fn summary_path(&self, id: &BookId) -> PathBuf {
        self.summaries_dir.join(format!("{}.txt", id))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub rows_considered: usize,
    pub duplicate_titles: usize,
    pub author_mismatches: usize,
    pub failed_downloads: usize,
    pub verbatim_books: usize,
    pub pairs_written: usize,
}

/// Walks the joined catalog in order and produces one book/summary pair per
/// distinct title whose authors agree and whose archive can be fetched.
///
/// Download failures are skipped. Any other error aborts the run and the
/// stats gathered so far are dropped with it.
pub fn run(
    catalog: &Catalog,
    source: &dyn ArchiveSource,
    layout: &OutputLayout,
    progress: &ProgressBar,
) -> Result<(Vec<StatsRow>, RunReport)> {
    let mut titles: HashMap<String, BookId> = HashMap::new();
    let mut stats = Vec::new();
    let mut report = RunReport::default();

    for row in &catalog.rows {
        report.rows_considered += 1;
        if let Some(stats_row) = process_row(row, catalog, source, layout, &mut titles, &mut report)? {
            stats.push(stats_row);
        }
        progress.inc(1);
    }

    report.pairs_written = stats.len();
    Ok((stats, report))
}

fn process_row(
    row: &CatalogRow,
    catalog: &Catalog,
    source: &dyn ArchiveSource,
    layout: &OutputLayout,
    titles: &mut HashMap<String, BookId>,
    report: &mut RunReport,
) -> Result<Option<StatsRow>> {
    if let Some(existing) = titles.get(&row.title) {
        debug!("Skipping book {}: '{}' already paired with {}", row.id, row.title, existing);
        report.duplicate_titles += 1;
        return Ok(None);
    }

    let score = author_match(row.metadata_author.as_deref(), row.summary_author.as_deref());
    if score <= AUTHOR_MATCH_THRESHOLD {
        debug!(
            "Skipping book {}: author mismatch ({}) {:?} vs {:?}",
            row.id, score, row.metadata_author, row.summary_author
        );
        report.author_mismatches += 1;
        return Ok(None);
    }

    let archive_path = layout.archive_path(&row.id);
    if !source.fetch(&row.id, &archive_path) {
        report.failed_downloads += 1;
        return Ok(None);
    }

    let book_path = layout.book_path(&row.id);
    let summary_path = layout.summary_path(&row.id);
    extract_book(&row.id, &archive_path, &layout.work_dir, &book_path)
        .with_context(|| format!("Failed to extract book {}", row.id))?;
    write_summary(&catalog.summaries, &row.title, &summary_path)?;
    if strip_boilerplate(&book_path, &layout.clean_book_path(&row.id))? == CleanOutcome::Verbatim {
        warn!("No license sentinels found in book {}; kept full text.", row.id);
        report.verbatim_books += 1;
    }

    titles.insert(row.title.clone(), row.id.clone());
    info!("Paired '{}' with book {}", row.title, row.id);

    let pair = collect_pair_stats(&book_path, &summary_path)?;
    Ok(Some(StatsRow::new(
        &row.title,
        &row.id,
        row.metadata_author.as_deref(),
        row.summary_author.as_deref(),
        pair,
    )))
}

/// Number of files directly inside `dir`.
pub fn count_files(dir: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        if entry?.file_type()?.is_file() {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::write_zip;
    use crate::catalog::{join, MetadataRecord, SummaryLookup, SummaryRecord};
    use serde::de::IgnoredAny;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Serves archives from memory and records every request.
    #[derive(Default)]
    struct FakeMirror {
        books: HashMap<String, Vec<u8>>,
        requests: RefCell<Vec<String>>,
    }

    impl FakeMirror {
        fn with_book(mut self, id: &str, text: &str) -> Self {
            self.books.insert(id.to_string(), text.as_bytes().to_vec());
            self
        }
    }

    impl ArchiveSource for FakeMirror {
        fn fetch(&self, id: &BookId, dest: &Path) -> bool {
            self.requests.borrow_mut().push(id.to_string());
            match self.books.get(id.as_str()) {
                Some(text) => {
                    write_zip(dest, &format!("{}.txt", id), text);
                    true
                }
                None => false,
            }
        }
    }

    fn summary(title: &str, author: Option<&str>, text: &str) -> SummaryRecord {
        SummaryRecord {
            _wikipedia_id: IgnoredAny,
            _freebase_id: IgnoredAny,
            title: title.to_string(),
            author: author.map(str::to_string),
            _publication_date: IgnoredAny,
            _genres: IgnoredAny,
            summary: Some(text.to_string()),
        }
    }

    fn metadata(id: &str, title: &str, author: Option<&str>) -> MetadataRecord {
        MetadataRecord {
            id: format!("PG{}", id),
            title: Some(title.to_string()),
            author: author.map(str::to_string),
        }
    }

    fn catalog(summaries: Vec<SummaryRecord>, metadata: Vec<MetadataRecord>) -> Catalog {
        Catalog {
            rows: join(&summaries, &metadata).unwrap(),
            summaries: SummaryLookup::from_records(&summaries),
        }
    }

    fn layout(root: &TempDir) -> OutputLayout {
        let layout = OutputLayout {
            books_dir: root.path().join("books"),
            summaries_dir: root.path().join("summaries"),
            work_dir: root.path().join("work"),
        };
        layout.reset().unwrap();
        layout
    }

    const BOOK: &str = "Project header\n*** START OF THIS EBOOK ***\nCall me Ishmael.\n*** END OF THIS EBOOK ***\nLicense\n";

    #[test]
    fn test_failed_download_is_skipped() {
        let root = TempDir::new().unwrap();
        let layout = layout(&root);
        let catalog = catalog(
            vec![
                summary("Moby Dick", Some("Herman Melville"), "A whale hunt."),
                summary("Lost Book", None, "Nobody knows."),
            ],
            vec![
                metadata("2701", "Moby Dick", Some("Melville, Herman")),
                metadata("99999", "Lost Book", None),
            ],
        );
        let mirror = FakeMirror::default().with_book("2701", BOOK);

        let (stats, report) = run(&catalog, &mirror, &layout, &ProgressBar::hidden()).unwrap();

        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].id.as_str(), "2701");
        assert_eq!(stats[0].book_sentences, 1);
        assert_eq!(stats[0].summary_words, 3);
        assert_eq!(report.failed_downloads, 1);
        assert_eq!(report.pairs_written, 1);
        assert_eq!(count_files(&layout.books_dir).unwrap(), 1);
        assert_eq!(count_files(&layout.summaries_dir).unwrap(), 1);

        let id = BookId::from_catalog("PG2701").unwrap();
        assert_eq!(fs::read_to_string(layout.book_path(&id)).unwrap(), "Call me Ishmael.\n");
        assert_eq!(fs::read_to_string(layout.summary_path(&id)).unwrap(), "A whale hunt.");
        assert!(!layout.work_dir.join("2701.zip").exists());
    }

    #[test]
    fn test_duplicate_title_processed_once() {
        let root = TempDir::new().unwrap();
        let layout = layout(&root);
        let catalog = catalog(
            vec![summary("Emma", Some("Jane Austen"), "Matchmaking.")],
            vec![
                metadata("158", "Emma", Some("Austen, Jane")),
                metadata("19839", "Emma", Some("Austen, Jane")),
            ],
        );
        let mirror = FakeMirror::default().with_book("158", BOOK).with_book("19839", BOOK);

        let (stats, report) = run(&catalog, &mirror, &layout, &ProgressBar::hidden()).unwrap();

        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].id.as_str(), "158");
        assert_eq!(report.duplicate_titles, 1);
        assert_eq!(*mirror.requests.borrow(), vec!["158".to_string()]);
    }

    #[test]
    fn test_duplicate_title_skipped_before_author_check() {
        let root = TempDir::new().unwrap();
        let layout = layout(&root);
        let catalog = catalog(
            vec![summary("Emma", Some("Jane Austen"), "Matchmaking.")],
            vec![
                metadata("158", "Emma", Some("Austen, Jane")),
                metadata("19839", "Emma", Some("Woolf, Virginia")),
            ],
        );
        let mirror = FakeMirror::default().with_book("158", BOOK).with_book("19839", BOOK);

        let (stats, report) = run(&catalog, &mirror, &layout, &ProgressBar::hidden()).unwrap();

        assert_eq!(stats.len(), 1);
        assert_eq!(report.duplicate_titles, 1);
        assert_eq!(report.author_mismatches, 0);
        assert_eq!(*mirror.requests.borrow(), vec!["158".to_string()]);
    }

    #[test]
    fn test_title_retried_after_failed_download() {
        let root = TempDir::new().unwrap();
        let layout = layout(&root);
        let catalog = catalog(
            vec![summary("Emma", None, "Matchmaking.")],
            vec![metadata("1", "Emma", None), metadata("158", "Emma", None)],
        );
        let mirror = FakeMirror::default().with_book("158", BOOK);

        let (stats, _) = run(&catalog, &mirror, &layout, &ProgressBar::hidden()).unwrap();

        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].id.as_str(), "158");
    }

    #[test]
    fn test_author_mismatch_is_not_downloaded() {
        let root = TempDir::new().unwrap();
        let layout = layout(&root);
        let catalog = catalog(
            vec![summary("Dracula", Some("Bram Stoker"), "A count.")],
            vec![metadata("345", "Dracula", Some("Woolf, Virginia"))],
        );
        let mirror = FakeMirror::default().with_book("345", BOOK);

        let (stats, report) = run(&catalog, &mirror, &layout, &ProgressBar::hidden()).unwrap();

        assert!(stats.is_empty());
        assert_eq!(report.author_mismatches, 1);
        assert!(mirror.requests.borrow().is_empty());
    }

    #[test]
    fn test_bad_archive_aborts_run() {
        struct WrongArchive;
        impl ArchiveSource for WrongArchive {
            fn fetch(&self, _id: &BookId, dest: &Path) -> bool {
                write_zip(dest, "notes.txt", b"not the book");
                true
            }
        }

        let root = TempDir::new().unwrap();
        let layout = layout(&root);
        let catalog = catalog(
            vec![summary("Emma", None, "Matchmaking.")],
            vec![metadata("158", "Emma", None)],
        );

        assert!(run(&catalog, &WrongArchive, &layout, &ProgressBar::hidden()).is_err());
    }

    #[test]
    fn test_reset_discards_previous_output() {
        let root = TempDir::new().unwrap();
        let layout = layout(&root);
        fs::write(layout.books_dir.join("old.txt"), "stale").unwrap();

        layout.reset().unwrap();

        assert_eq!(count_files(&layout.books_dir).unwrap(), 0);
        assert!(layout.summaries_dir.exists());
    }
}
