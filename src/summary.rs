use crate::catalog::SummaryLookup;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;

/// Writes the summary for `title` to `path`, text unchanged.
pub fn write_summary(lookup: &SummaryLookup, title: &str, path: &Path) -> Result<()> {
    let text = lookup
        .get(title)
        .ok_or_else(|| anyhow!("No summary found for title '{}'", title))?;
    fs::write(path, text).with_context(|| format!("Failed to write summary {}", path.display()))
}
