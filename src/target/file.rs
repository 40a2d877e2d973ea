// src/target/file.rs

//! Filesystem targets (plain files and directories).
//!
//! Digests are tagged by kind so that a path flipping between file and
//! directory is always seen as a change:
//!
//! - `f:<blake3>` for a regular file, hashed over its bytes
//! - `d:<blake3>` for a directory, hashed over its sorted tree of
//!   `(relative path, content hash)` entries

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blake3::Hasher;
use walkdir::WalkDir;

use super::{Target, TargetStatus};

/// A file or directory, addressed by a path relative to a base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTarget {
    dir: PathBuf,
    locator: String,
    name: String,
}

impl FileTarget {
    /// A target for `path`, resolved against `dir` when probing.
    ///
    /// The identity only depends on `path`, so the same relative path used
    /// from two front ends maps to the same graph node.
    pub fn new(dir: impl Into<PathBuf>, path: impl AsRef<Path>) -> Self {
        let locator = to_slash(path.as_ref());
        let name = file_name_for(&locator);
        Self {
            dir: dir.into(),
            locator,
            name,
        }
    }

    /// Absolute (or base-relative) location on disk.
    pub fn full_path(&self) -> PathBuf {
        self.dir.join(&self.locator)
    }

    fn digest(&self) -> Result<Option<String>> {
        let path = self.full_path();
        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("cannot digest {}", self.locator));
            }
        };

        if meta.is_dir() {
            Ok(Some(format!("d:{}", hash_directory(&path)?)))
        } else {
            Ok(Some(format!("f:{}", hash_file(&path)?)))
        }
    }
}

impl Target for FileTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn locator(&self) -> &str {
        &self.locator
    }

    fn check(&self, digest: &str) -> Result<TargetStatus> {
        match self.digest()? {
            Some(current) => Ok(TargetStatus::new(true, current, digest)),
            None => Ok(TargetStatus::missing()),
        }
    }
}

fn to_slash(path: &Path) -> String {
    let s = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// `file:rel/path` for relative paths, `file:///abs/path` for absolute ones.
fn file_name_for(locator: &str) -> String {
    if locator.starts_with('/') {
        format!("file://{locator}")
    } else {
        format!("file:{locator}")
    }
}

/// Hex blake3 digest of a file's bytes.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file =
        File::open(path).with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("reading file for hashing: {:?}", path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Order-independent hex blake3 digest of a directory tree.
///
/// Only regular files contribute, each as its slash-separated path relative
/// to `root` plus its content hash. Symlinks are not followed.
pub fn hash_directory(root: &Path) -> Result<String> {
    let mut entries: Vec<(String, String)> = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.with_context(|| format!("walking directory {:?}", root))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path());
        entries.push((to_slash(rel), hash_file(entry.path())?));
    }

    entries.sort();

    let mut hasher = Hasher::new();
    for (rel, hash) in &entries {
        hasher.update(rel.as_bytes());
        hasher.update(b"\0");
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }
    Ok(hasher.finalize().to_hex().to_string())
}
