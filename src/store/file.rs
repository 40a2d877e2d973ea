// src/store/file.rs

//! Digest store persisted as a TOML table.
//!
//! ```toml
//! "file:a.foo" = "f:9b2c..."
//! "file:out" = "d:11af..."
//! ```
//!
//! The whole table is read at transaction start and rewritten at the end.
//! Writes go to a sibling temp file which is then renamed over the target,
//! so a crash mid-flush leaves the previous table intact.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::{DigestMap, DigestStore};

/// Default file name for the digest store, relative to the build directory.
pub const DEFAULT_SUM_FILE: &str = ".dagmake.sum";

#[derive(Debug, Clone)]
pub struct FileDigestStore {
    path: PathBuf,
}

impl FileDigestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl DigestStore for FileDigestStore {
    fn load(&self) -> Result<DigestMap> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "digest store absent; starting empty");
                return Ok(DigestMap::new());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading digest store {:?}", self.path));
            }
        };

        if contents.trim().is_empty() {
            return Ok(DigestMap::new());
        }

        let digests: DigestMap = toml::from_str(&contents)
            .with_context(|| format!("parsing digest store {:?}", self.path))?;
        debug!(path = ?self.path, entries = digests.len(), "loaded digest store");
        Ok(digests)
    }

    fn persist(&self, digests: &DigestMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating digest store directory {:?}", parent))?;
            }
        }

        let body = toml::to_string(digests).context("serialising digest store")?;
        let tmp = self.temp_path();
        {
            let mut file = fs::File::create(&tmp)
                .with_context(|| format!("creating digest store temp file {:?}", tmp))?;
            file.write_all(body.as_bytes())
                .with_context(|| format!("writing digest store temp file {:?}", tmp))?;
            file.sync_all()
                .with_context(|| format!("syncing digest store temp file {:?}", tmp))?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing digest store {:?}", self.path))?;

        info!(path = ?self.path, entries = digests.len(), "stored target digests (file)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::store::{DigestWrite, read_only, read_write};
    use tempfile::tempdir;

    #[test]
    fn absent_and_empty_files_load_as_empty() -> Result<()> {
        let dir = tempdir()?;
        let store = FileDigestStore::new(dir.path().join("nested/sum"));
        assert!(store.load()?.is_empty());

        fs::write(dir.path().join("empty.sum"), "\n")?;
        assert!(FileDigestStore::new(dir.path().join("empty.sum")).load()?.is_empty());
        Ok(())
    }

    #[test]
    fn garbage_file_is_a_load_error() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("bad.sum");
        fs::write(&path, "this is = = not toml")?;
        assert!(FileDigestStore::new(path).load().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn digests_round_trip_through_a_new_transaction() -> crate::errors::Result<()> {
        let dir = tempdir()?;
        let store = FileDigestStore::new(dir.path().join("state/.dagmake.sum"));

        read_write(&store, &CancelToken::new(), |tx| async move {
            tx.buffer_writes([
                DigestWrite::new("file:a b.txt", "f:00ff"),
                DigestWrite::new("file:out", "d:1234"),
                DigestWrite::new("file:out\0inputs", "i:abcd"),
            ])
        })
        .await?;
        assert!(store.path().exists());
        assert!(!store.temp_path().exists());

        // A fresh store instance over the same file sees the same values.
        let reopened = FileDigestStore::new(store.path());
        let values = read_only(&reopened, |tx| async move {
            Ok(tx.read_values(&["file:a b.txt", "file:out", "file:out\0inputs"]))
        })
        .await?;
        assert_eq!(values, ["f:00ff", "d:1234", "i:abcd"]);
        Ok(())
    }
}
