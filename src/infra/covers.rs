use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::models::Show;

/// On-disk cache of show cover images, one file per show name.
#[derive(Debug)]
pub struct CoverCache {
    dir: PathBuf,
    client: reqwest::blocking::Client,
}

impl CoverCache {
    pub fn new(dir: &Path, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            dir: dir.to_path_buf(),
            client,
        })
    }

    /// Where the cover for `show` lives, named after the show and keeping the
    /// image URL's extension. `None` when the show has no image.
    pub fn cover_path(&self, show: &Show) -> Option<PathBuf> {
        let image = show.image()?;
        let extension = reqwest::Url::parse(image)
            .ok()
            .and_then(|url| {
                Path::new(url.path())
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
            })
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        Some(self.dir.join(format!("{}{extension}", show.name)))
    }

    /// Downloads the cover unless it is already cached.
    pub fn fetch(&self, show: &Show) -> Result<Option<PathBuf>> {
        let (Some(path), Some(image)) = (self.cover_path(show), show.image()) else {
            return Ok(None);
        };
        if path.exists() {
            return Ok(Some(path));
        }

        let response = self.client.get(image).send()?;
        if !response.status().is_success() {
            bail!("Cover download failed: HTTP {} ({image})", response.status());
        }
        let bytes = response.bytes()?;

        fs::create_dir_all(&self.dir)?;
        fs::write(&path, &bytes)?;
        tracing::debug!(show = %show.name, path = %path.display(), "cached cover");
        Ok(Some(path))
    }

    /// Deletes the cached cover. Returns whether a file was removed.
    pub fn remove(&self, show: &Show) -> Result<bool> {
        let Some(path) = self.cover_path(show) else {
            return Ok(false);
        };
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        Ok(true)
    }
}
