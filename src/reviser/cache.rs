//! On-disk record of the last processed state of each file.
//!
//! One record per absolute path, named by the xxh3 digest of the path. A record
//! holds the content digest and, when metadata caching is on, the file size
//! and modification time so unchanged files can be skipped without reading
//! them. Records written by older versions hold only the bare hex digest.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tracing::debug;
use xxhash_rust::xxh3::{xxh3_64, Xxh3};

use crate::error::{ReviserError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Modification time, UTC nanoseconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mod_time: Option<i64>,
}

impl CacheEntry {
    pub fn hash_only(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            size: None,
            mod_time: None,
        }
    }

    pub fn with_metadata(hash: impl Into<String>, size: u64, mod_time: i64) -> Self {
        Self {
            hash: hash.into(),
            size: Some(size),
            mod_time: Some(mod_time),
        }
    }

    /// Entry for `path` with `hash`. Metadata is captured when asked for and
    /// available; a file that vanished yields a hash-only entry.
    pub fn for_file(path: &Path, hash: impl Into<String>, with_metadata: bool) -> Result<Self> {
        if !with_metadata {
            return Ok(Self::hash_only(hash));
        }
        match file_metadata(path) {
            Ok(Some((size, mod_time))) => Ok(Self::with_metadata(hash, size, mod_time)),
            Ok(None) => Ok(Self::hash_only(hash)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::hash_only(hash)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn has_metadata(&self) -> bool {
        self.size.is_some() && self.mod_time.is_some()
    }

    /// Either both metadata fields or none.
    fn normalized(self) -> Self {
        if self.has_metadata() {
            self
        } else {
            Self::hash_only(self.hash)
        }
    }
}

fn encode_hash(sum: u64) -> String {
    format!("{:016x}", sum)
}

pub fn compute_content_hash(data: &[u8]) -> String {
    encode_hash(xxh3_64(data))
}

pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Xxh3::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(encode_hash(hasher.digest()))
}

pub fn cache_file_path(cache_dir: &Path, abs_path: &Path) -> PathBuf {
    cache_dir.join(compute_content_hash(abs_path.to_string_lossy().as_bytes()))
}

/// Size and modification time, `None` when the platform reports no mtime.
fn file_metadata(path: &Path) -> io::Result<Option<(u64, i64)>> {
    let metadata = fs::metadata(path)?;
    let Ok(modified) = metadata.modified() else {
        return Ok(None);
    };
    let nanos = match modified.duration_since(UNIX_EPOCH) {
        Ok(since) => i64::try_from(since.as_nanos()).ok(),
        Err(before) => i64::try_from(before.duration().as_nanos()).ok().map(|n| -n),
    };
    Ok(nanos.map(|n| (metadata.len(), n)))
}

/// Loads the record for `abs_path`; `None` when there is none yet.
pub fn read_entry(cache_dir: &Path, abs_path: &Path) -> Result<Option<CacheEntry>> {
    let cache_file = cache_file_path(cache_dir, abs_path);
    let raw = match fs::read(&cache_file) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let corrupted = |message: String| ReviserError::CacheCorruption {
        path: cache_file.display().to_string(),
        message,
    };

    let raw = raw.trim_ascii();
    if raw.is_empty() {
        return Ok(None);
    }
    if raw[0] == b'{' {
        let entry: CacheEntry =
            serde_json::from_slice(raw).map_err(|e| corrupted(e.to_string()))?;
        return Ok(Some(entry.normalized()));
    }
    if raw.iter().all(u8::is_ascii_hexdigit) {
        let hash = String::from_utf8_lossy(raw).into_owned();
        return Ok(Some(CacheEntry::hash_only(hash)));
    }
    Err(corrupted("neither a JSON record nor a hex digest".to_string()))
}

/// Stores `entry`; hash-only entries keep the bare digest format.
pub fn write_entry(cache_dir: &Path, abs_path: &Path, entry: &CacheEntry) -> Result<()> {
    let cache_file = cache_file_path(cache_dir, abs_path);
    if entry.has_metadata() {
        fs::write(&cache_file, serde_json::to_vec(entry)?)?;
    } else {
        fs::write(&cache_file, entry.hash.as_bytes())?;
    }
    Ok(())
}

fn forget(cache_dir: &Path, abs_path: &Path) {
    let cache_file = cache_file_path(cache_dir, abs_path);
    if let Err(e) = fs::remove_file(&cache_file) {
        if e.kind() != io::ErrorKind::NotFound {
            debug!(path = %cache_file.display(), error = %e, "failed to remove stale cache record");
        }
    }
}

/// Re-hashes the file and skips only on an identical digest.
pub fn should_skip_by_hash(cache_dir: &Path, abs_path: &Path) -> Result<bool> {
    let Some(entry) = read_entry(cache_dir, abs_path)? else {
        return Ok(false);
    };
    skip_by_hash(cache_dir, abs_path, &entry)
}

fn skip_by_hash(cache_dir: &Path, abs_path: &Path, entry: &CacheEntry) -> Result<bool> {
    match hash_file(abs_path) {
        Ok(current) => Ok(current == entry.hash),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            forget(cache_dir, abs_path);
            Ok(true)
        }
        Err(e) => Err(e.into()),
    }
}

/// Compares size and modification time without reading the file; hash-only
/// records fall back to the digest comparison.
///
/// An edit that keeps both the size and the modification time is not seen.
pub fn should_skip_by_metadata(cache_dir: &Path, abs_path: &Path) -> Result<bool> {
    let Some(entry) = read_entry(cache_dir, abs_path)? else {
        return Ok(false);
    };
    let (Some(size), Some(mod_time)) = (entry.size, entry.mod_time) else {
        return skip_by_hash(cache_dir, abs_path, &entry);
    };
    match file_metadata(abs_path) {
        Ok(Some(current)) => Ok(current == (size, mod_time)),
        Ok(None) => skip_by_hash(cache_dir, abs_path, &entry),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            forget(cache_dir, abs_path);
            Ok(true)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn should_skip(cache_dir: &Path, abs_path: &Path, prefer_metadata: bool) -> Result<bool> {
    if prefer_metadata {
        should_skip_by_metadata(cache_dir, abs_path)
    } else {
        should_skip_by_hash(cache_dir, abs_path)
    }
}

/// Cache directory plus the skip strategy of one run.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
    prefer_metadata: bool,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefer_metadata: true,
        }
    }

    pub fn with_metadata(mut self, prefer_metadata: bool) -> Self {
        self.prefer_metadata = prefer_metadata;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn prefers_metadata(&self) -> bool {
        self.prefer_metadata
    }

    pub fn should_skip(&self, abs_path: &Path) -> Result<bool> {
        should_skip(&self.dir, abs_path, self.prefer_metadata)
    }

    /// Records `content` as the processed state of `abs_path`, whose bytes on
    /// disk must equal `content`.
    pub fn record(&self, abs_path: &Path, content: &[u8]) -> Result<()> {
        let entry = CacheEntry::for_file(abs_path, compute_content_hash(content), self.prefer_metadata)?;
        write_entry(&self.dir, abs_path, &entry)
    }
}
