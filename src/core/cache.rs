//! Read-through file cache for vocabulary files.
//!
//! The raw bytes of a vocabulary file are copied into a cache directory under
//! a name derived from the BLAKE3 hash of the source path. Later reads of the
//! same path are served from the copy. Writing the cache is best effort: any
//! failure is logged and the source bytes are returned anyway.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::vocab::{load_tiktoken_bpe, VocabError, Vocabulary};

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "COREBPE_CACHE_DIR";

const DEFAULT_CACHE_SUBDIR: &str = "data-gym-cache";

/// Distinguishes concurrent writers within one process.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `$COREBPE_CACHE_DIR` if set and non-empty, else `<temp>/data-gym-cache`.
pub fn default_cache_dir() -> PathBuf {
    if let Ok(value) = std::env::var(CACHE_DIR_ENV) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    std::env::temp_dir().join(DEFAULT_CACHE_SUBDIR)
}

/// Hex BLAKE3 digest of the path string.
pub fn cache_key(source: &Path) -> String {
    blake3::hash(source.to_string_lossy().as_bytes())
        .to_hex()
        .to_string()
}

/// Cache of raw vocabulary bytes rooted at one directory.
#[derive(Debug, Clone)]
pub struct VocabCache {
    dir: PathBuf,
}

impl VocabCache {
    /// Cache rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache rooted at [`default_cache_dir`].
    pub fn from_env() -> Self {
        Self::new(default_cache_dir())
    }

    /// Cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the cached copy of `source`.
    pub fn entry_path(&self, source: impl AsRef<Path>) -> PathBuf {
        self.dir.join(cache_key(source.as_ref()))
    }

    /// Read `source`, preferring the cached copy.
    ///
    /// Only a failure to read the source itself is an error.
    pub fn read(&self, source: impl AsRef<Path>) -> Result<Vec<u8>, VocabError> {
        let source = source.as_ref();
        let entry = self.entry_path(source);

        if entry.is_file() {
            match fs::read(&entry) {
                Ok(data) => {
                    log::debug!("vocabulary cache hit for {}", source.display());
                    return Ok(data);
                }
                Err(e) => log::warn!("unreadable cache entry {}: {e}", entry.display()),
            }
        }

        let data = fs::read(source)?;
        if let Err(e) = self.store(&entry, &data) {
            log::warn!("could not write vocabulary cache {}: {e}", entry.display());
        }
        Ok(data)
    }

    /// Read and parse a tiktoken vocabulary through the cache.
    pub fn load_tiktoken_bpe(&self, source: impl AsRef<Path>) -> Result<Vocabulary, VocabError> {
        let data = self.read(source)?;
        Ok(load_tiktoken_bpe(&data))
    }

    /// Write to a temporary sibling and rename it into place.
    fn store(&self, entry: &Path, data: &[u8]) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let tmp = tmp_path(entry);
        fs::write(&tmp, data)?;
        if let Err(e) = fs::rename(&tmp, entry) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(())
    }
}

/// Sibling of `entry` unique to this process and call.
fn tmp_path(entry: &Path) -> PathBuf {
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    entry.with_extension(format!("tmp{}-{seq}", std::process::id()))
}

/// Read `path` through the default cache directory.
pub fn read_file_cached(path: impl AsRef<Path>) -> Result<Vec<u8>, VocabError> {
    VocabCache::from_env().read(path)
}

/// Load a tiktoken vocabulary through the default cache directory.
pub fn load_tiktoken_bpe_cached(path: impl AsRef<Path>) -> Result<Vocabulary, VocabError> {
    VocabCache::from_env().load_tiktoken_bpe(path)
}
