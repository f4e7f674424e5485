use crate::catalog::BookId;
use anyhow::{bail, Context, Result};
use log::debug;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use zip::ZipArchive;

/// Unpacks `archive_path` into `work_dir` and moves `<id>.txt` to `target`.
///
/// Most archives hold the text file at the top level; some wrap it in a
/// `<id>/` directory, which is removed once the file has been moved. The
/// archive is deleted on success. If neither location holds the file the
/// error propagates and the archive is left in place.
pub fn extract_book(id: &BookId, archive_path: &Path, work_dir: &Path, target: &Path) -> Result<()> {
    unpack(archive_path, work_dir)?;

    let text_name = format!("{}.txt", id);
    let flat = work_dir.join(&text_name);
    if flat.exists() {
        move_file(&flat, target)?;
    } else {
        let nested_dir = work_dir.join(id.as_str());
        let nested = nested_dir.join(&text_name);
        if !nested.exists() {
            bail!(
                "Archive {} contains neither {} nor {}",
                archive_path.display(),
                flat.display(),
                nested.display()
            );
        }
        move_file(&nested, target)?;
        fs::remove_dir_all(&nested_dir)
            .with_context(|| format!("Failed to remove {}", nested_dir.display()))?;
    }

    fs::remove_file(archive_path)
        .with_context(|| format!("Failed to remove archive {}", archive_path.display()))?;
    Ok(())
}

fn unpack(archive_path: &Path, work_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("Invalid zip archive {}", archive_path.display()))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        // Entries that would land outside the work dir are ignored.
        let outpath = match entry.enclosed_name() {
            Some(path) => work_dir.join(path),
            None => continue,
        };

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&outpath)
                .with_context(|| format!("Failed to create {}", outpath.display()))?;
            io::copy(&mut entry, &mut outfile)?;
        }
    }
    debug!("Unpacked {} entries from {}", archive.len(), archive_path.display());
    Ok(())
}

/// Rename, falling back to copy and delete when the two paths sit on
/// different filesystems.
pub(crate) fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).with_context(|| format!("Failed to move {} to {}", from.display(), to.display()))?;
    fs::remove_file(from).with_context(|| format!("Failed to remove {}", from.display()))?;
    Ok(())
}
