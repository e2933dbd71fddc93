//! Download-once resource cache
//!
//! Thumbnails and similar static resources are stored under a stable,
//! filesystem-safe name. A non-empty file at that name is a cache hit and is
//! never fetched again.

use crate::crawler::FetchError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Delay after each successful download
const POLITE_DELAY: Duration = Duration::from_millis(50);

/// Extension used when the remote path has none
const DEFAULT_EXTENSION: &str = ".png";

/// Source of remote resource bytes
pub trait ResourceFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Cache of downloaded resources, guarded by its own lock
pub struct ResourceCache {
    fetcher: Box<dyn ResourceFetcher>,
    lock: Mutex<()>,
    polite_delay: Duration,
}

impl ResourceCache {
    /// Creates a cache backed by the given fetcher
    pub fn new(fetcher: Box<dyn ResourceFetcher>) -> Self {
        Self {
            fetcher,
            lock: Mutex::new(()),
            polite_delay: POLITE_DELAY,
        }
    }

    /// Overrides the delay that follows each download
    pub fn with_polite_delay(mut self, delay: Duration) -> Self {
        self.polite_delay = delay;
        self
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolves a remote resource to a local file, downloading it if needed
    ///
    /// # Arguments
    ///
    /// * `remote` - URL of the resource
    /// * `dest_dir` - Directory holding cached files
    /// * `identity_hint` - Stable identifier used for the file name, if known
    ///
    /// # Returns
    ///
    /// * `Some(PathBuf)` - The cached file (fresh or pre-existing)
    /// * `None` - The download failed; nothing was written and a later call may retry
    pub fn resolve(
        &self,
        remote: &str,
        dest_dir: &Path,
        identity_hint: Option<&str>,
    ) -> Option<PathBuf> {
        if remote.is_empty() {
            return None;
        }

        let dest = dest_dir.join(cache_file_name(remote, identity_hint));
        let _guard = self.guard();

        if is_populated(&dest) {
            tracing::trace!("Resource cache hit: {}", dest.display());
            return Some(dest);
        }

        let bytes = match self.fetcher.fetch(remote) {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => {
                tracing::warn!("Resource {} came back empty", remote);
                return None;
            }
            Err(e) => {
                tracing::warn!("Resource download failed for {}: {}", remote, e);
                return None;
            }
        };

        if let Err(e) = write_resource(&dest, &bytes) {
            tracing::warn!("Could not store {}: {}", dest.display(), e);
            return None;
        }

        tracing::debug!("Cached {} as {}", remote, dest.display());
        thread::sleep(self.polite_delay);
        Some(dest)
    }
}

fn is_populated(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

fn write_resource(dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// Formats a cached file's path the way the site front end references it
///
/// Separators become `/` and the path gets exactly one leading `/`, so
/// `assets/support_thumbs/a.png` becomes `/assets/support_thumbs/a.png`.
pub fn site_path(path: &Path) -> String {
    let posix = path.to_string_lossy().replace('\\', "/");
    format!("/{}", posix.trim_start_matches('/')).replace("//", "/")
}

/// Computes the cache file name for a resource
///
/// The base is the identity hint, else an identifier parsed from the remote file
/// name (its trailing digits, else its whole stem). It is lowercased and every
/// character outside `[a-z0-9-_.]` becomes `-`. The remote extension is kept.
pub fn cache_file_name(remote: &str, identity_hint: Option<&str>) -> String {
    let remote_path = url::Url::parse(remote)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| remote.to_string());
    let remote_file = Path::new(&remote_path);

    let extension = remote_file
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());

    let base = identity_hint
        .filter(|hint| !hint.is_empty())
        .map(str::to_string)
        .or_else(|| {
            remote_file
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(identifier_from_stem)
        })
        .unwrap_or_else(|| "resource".to_string());

    let safe: String = base
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '-',
        })
        .collect();

    format!("{}{}", safe, extension)
}

fn identifier_from_stem(stem: &str) -> Option<String> {
    if stem.is_empty() {
        return None;
    }

    let digits: String = stem
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    if digits.is_empty() {
        Some(stem.to_string())
    } else {
        Some(digits)
    }
}
