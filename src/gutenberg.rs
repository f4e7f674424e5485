use crate::catalog::BookId;
use anyhow::{bail, Context, Result};
use log::{debug, warn};
use reqwest::blocking::Client;
use std::fs;
use std::io;
use std::path::Path;

pub const DEFAULT_MIRROR: &str = "http://aleph.gutenberg.org/";

/// Mirror layout: for book `abcde` the archive lives at
/// `<base>/a/b/c/d/abcde/abcde.zip`.
pub fn archive_url(base: &str, id: &BookId) -> String {
    let id = id.as_str();
    let mut url = base.trim_end_matches('/').to_string();
    url.push('/');
    for digit in id[..id.len().saturating_sub(1)].chars() {
        url.push(digit);
        url.push('/');
    }
    url.push_str(&format!("{}/{}.zip", id, id));
    url
}

/// Where book archives come from. Implementations report whether the archive
/// now exists at `dest`; failures are logged and skipped, never raised.
pub trait ArchiveSource {
    fn fetch(&self, id: &BookId, dest: &Path) -> bool;
}

pub struct GutenbergMirror {
    client: Client,
    base_url: String,
}

impl GutenbergMirror {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {}", status);
        }
        let bytes = response.bytes()?;
        fs::write(dest, &bytes).with_context(|| format!("Failed to write {}", dest.display()))?;
        debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(())
    }
}

impl ArchiveSource for GutenbergMirror {
    fn fetch(&self, id: &BookId, dest: &Path) -> bool {
        let url = archive_url(&self.base_url, id);
        match self.download(&url, dest) {
            Ok(()) => true,
            Err(e) => {
                warn!("Download failed for book {} ({}): {}", id, url, e);
                // no partial archive left behind
                if let Err(err) = fs::remove_file(dest) {
                    if err.kind() != io::ErrorKind::NotFound {
                        warn!("Could not remove partial archive {}: {}", dest.display(), err);
                    }
                }
                false
            }
        }
    }
}
