use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

const START_MARKERS: [&[u8]; 3] = [b"*** START OF", b"***START OF", b"*END*THE SM"];
const END_MARKERS: [&[u8]; 2] = [b"*** END OF", b"***END OF"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Skipping,
    Writing,
}

/// How the cleaned text was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanOutcome {
    /// Body text between start and end sentinels.
    Sentinels,
    /// No body text was isolated; the raw file was kept as is.
    Verbatim,
}

/// Removes license boilerplate from `book_path` in place.
///
/// Lines are treated as raw bytes (the archive's legacy single-byte
/// encoding), so whatever is kept is kept byte for byte. `clean_path` is the
/// scratch file; it replaces `book_path` when done. The result is never
/// empty unless the input was.
pub fn strip_boilerplate(book_path: &Path, clean_path: &Path) -> Result<CleanOutcome> {
    let written = write_body(book_path, clean_path)?;

    let outcome = if written == 0 {
        fs::copy(book_path, clean_path).with_context(|| {
            format!("Failed to copy {} to {}", book_path.display(), clean_path.display())
        })?;
        CleanOutcome::Verbatim
    } else {
        CleanOutcome::Sentinels
    };

    fs::remove_file(book_path).with_context(|| format!("Failed to remove {}", book_path.display()))?;
    fs::rename(clean_path, book_path).with_context(|| {
        format!("Failed to rename {} to {}", clean_path.display(), book_path.display())
    })?;
    Ok(outcome)
}

/// Runs the sentinel state machine, returning the number of bytes written.
fn write_body(book_path: &Path, clean_path: &Path) -> Result<usize> {
    let input = File::open(book_path).with_context(|| format!("Failed to open {}", book_path.display()))?;
    let mut reader = BufReader::new(input);
    let output = File::create(clean_path).with_context(|| format!("Failed to create {}", clean_path.display()))?;
    let mut writer = BufWriter::new(output);

    let mut state = State::Skipping;
    let mut written = 0usize;
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if START_MARKERS.iter().any(|m| line.starts_with(m)) {
            state = State::Writing;
        } else if END_MARKERS.iter().any(|m| line.starts_with(m)) {
            state = State::Skipping;
        } else if state == State::Writing {
            writer.write_all(&line)?;
            written += line.len();
        }
    }
    writer.flush()?;
    Ok(written)
}
