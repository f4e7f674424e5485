use crate::catalog::BookId;
use anyhow::{Context, Result};
use csv::WriterBuilder;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use unicode_segmentation::UnicodeSegmentation;

lazy_static! {
    // A word starts with a letter and continues with letters, apostrophes or hyphens.
    static ref WORD_RE: Regex = Regex::new(r"^[^\W\d_](?:[^\W\d_]|['-])*$").unwrap();
    static ref ABBREVIATIONS: HashSet<&'static str> = [
        "mr", "mrs", "ms", "dr", "st", "jr", "sr", "prof", "rev", "capt", "col", "gen", "lt", "sgt",
        "hon", "messrs", "mme", "mlle", "vs", "viz", "cf", "vol", "ch",
    ]
    .into_iter()
    .collect();
}

/// Sentence and word counts for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextCounts {
    pub sentences: usize,
    pub words: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairStats {
    pub book_sentences: usize,
    pub book_words: usize,
    pub book_bytes: u64,
    pub summary_sentences: usize,
    pub summary_words: usize,
    pub summary_bytes: u64,
}

/// One line of `data_stats.csv`, written without a header.
#[derive(Debug, Clone, Serialize)]
pub struct StatsRow {
    pub title: String,
    pub id: BookId,
    pub metadata_author: Option<String>,
    pub summary_author: Option<String>,
    pub book_sentences: usize,
    pub book_words: usize,
    pub book_bytes: u64,
    pub summary_sentences: usize,
    pub summary_words: usize,
    pub summary_bytes: u64,
}

impl StatsRow {
    pub fn new(
        title: &str,
        id: &BookId,
        metadata_author: Option<&str>,
        summary_author: Option<&str>,
        stats: PairStats,
    ) -> Self {
        Self {
            title: title.to_string(),
            id: id.clone(),
            metadata_author: metadata_author.map(str::to_string),
            summary_author: summary_author.map(str::to_string),
            book_sentences: stats.book_sentences,
            book_words: stats.book_words,
            book_bytes: stats.book_bytes,
            summary_sentences: stats.summary_sentences,
            summary_words: stats.summary_words,
            summary_bytes: stats.summary_bytes,
        }
    }
}

pub fn collect_pair_stats(book_path: &Path, summary_path: &Path) -> Result<PairStats> {
    let (book, book_bytes) = count_file(book_path)?;
    let (summary, summary_bytes) = count_file(summary_path)?;
    Ok(PairStats {
        book_sentences: book.sentences,
        book_words: book.words,
        book_bytes,
        summary_sentences: summary.sentences,
        summary_words: summary.words,
        summary_bytes,
    })
}

pub fn write_stats(rows: &[StatsRow], path: &Path) -> Result<()> {
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

fn count_file(path: &Path) -> Result<(TextCounts, u64)> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let size = fs::metadata(path)?.len();
    Ok((count_text(&decode(bytes)), size))
}

/// UTF-8 when valid, otherwise one character per byte.
fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

/// Counts sentences and words the way a plain-text document reader would:
/// blank lines separate paragraphs, all-uppercase lines are headings, and
/// the lines of a paragraph are joined before sentence splitting. Headings
/// contribute words but are not sentences.
pub fn count_text(text: &str) -> TextCounts {
    let mut counts = TextCounts::default();
    let mut pending = String::new();

    for line in text.lines() {
        let line = line.trim();
        if is_heading(line) {
            count_paragraph_text(&pending, &mut counts);
            pending.clear();
            counts.words += count_words(line);
        } else if line.is_empty() {
            count_paragraph_text(&pending, &mut counts);
            pending.clear();
        } else {
            pending.push(' ');
            pending.push_str(line);
        }
    }
    count_paragraph_text(&pending, &mut counts);
    counts
}

fn count_paragraph_text(text: &str, counts: &mut TextCounts) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    for sentence in split_sentences(text) {
        counts.sentences += 1;
        counts.words += count_words(&sentence);
    }
}

fn is_heading(line: &str) -> bool {
    let mut has_cased = false;
    for c in line.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            has_cased = true;
        }
    }
    has_cased
}

/// Unicode sentence boundaries, with breaks after English abbreviations and
/// single-letter initials undone.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for piece in text.unicode_sentences() {
        current.push_str(piece);
        if !ends_with_abbreviation(&current) {
            sentences.push(current.trim().to_string());
            current.clear();
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

fn ends_with_abbreviation(sentence: &str) -> bool {
    let Some(last) = sentence.split_whitespace().last() else {
        return false;
    };
    let Some(stem) = last.strip_suffix('.') else {
        return false;
    };
    let stem = stem.trim_start_matches(|c: char| !c.is_alphanumeric());
    let mut chars = stem.chars();
    match (chars.next(), chars.next()) {
        // "I." ends sentences far more often than it abbreviates a name.
        (Some(c), None) => c.is_uppercase() && c != 'I',
        (Some(_), Some(_)) => ABBREVIATIONS.contains(stem.to_lowercase().as_str()),
        _ => false,
    }
}

pub fn count_words(text: &str) -> usize {
    text.unicode_words().filter(|w| WORD_RE.is_match(w)).count()
}
