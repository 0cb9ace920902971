use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use exif::{In, Reader, Tag, Value};
use hashlink::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::MetadataError;

/// EXIF datetimes have no timezone info - they are local time as-is.
pub const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Snapshot of the extractor cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Share of lookups answered from the cache, 0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

struct DateCache {
    entries: LruCache<PathBuf, Option<NaiveDateTime>>,
    hits: u64,
    misses: u64,
}

/// Reads capture dates from image files and remembers them per file.
///
/// Each extractor owns its cache; the lock is never held while a file is
/// being read, so concurrent callers only contend on the lookup itself.
pub struct MetadataExtractor {
    cache: Mutex<DateCache>,
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl MetadataExtractor {
    /// Create an extractor remembering at most `capacity` files (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(DateCache {
                entries: LruCache::new(capacity.max(1)),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Capture date of `path`, from the cache when the file was seen before.
    ///
    /// `Ok(None)` means the image has no usable `DateTimeOriginal`. Failures
    /// to open or recognize the file are not cached.
    pub fn extract(&self, path: &Path) -> Result<Option<NaiveDateTime>, MetadataError> {
        let key = fs::canonicalize(path).map_err(|e| MetadataError {
            path: path.to_path_buf(),
            reason: format!("cannot open image: {}", e),
        })?;

        {
            let mut cache = self.cache.lock();
            if let Some(cached) = cache.entries.get(&key).copied() {
                cache.hits += 1;
                return Ok(cached);
            }
            cache.misses += 1;
        }

        let taken = read_capture_date(&key)?;
        self.cache.lock().entries.insert(key, taken);
        Ok(taken)
    }

    /// Drop every cached entry and reset the counters.
    pub fn clear(&self) {
        let mut cache = self.cache.lock();
        cache.entries.clear();
        cache.hits = 0;
        cache.misses = 0;
        debug!("EXIF cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let cache = self.cache.lock();
        CacheStats {
            hits: cache.hits,
            misses: cache.misses,
            size: cache.entries.len(),
            capacity: cache.entries.capacity(),
        }
    }
}

fn read_capture_date(path: &Path) -> Result<Option<NaiveDateTime>, MetadataError> {
    let file = File::open(path).map_err(|e| MetadataError {
        path: path.to_path_buf(),
        reason: format!("cannot open image: {}", e),
    })?;

    let exif = match Reader::new().read_from_container(&mut BufReader::new(file)) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_)) => {
            debug!("No EXIF data found in {}", path.display());
            return Ok(None);
        }
        Err(e) => {
            return Err(MetadataError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };

    let Some(field) = exif.get_field(Tag::DateTimeOriginal, In::PRIMARY) else {
        debug!("No DateTimeOriginal tag found in {}", path.display());
        return Ok(None);
    };

    let raw = match &field.value {
        Value::Ascii(parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default(),
        other => {
            warn!("Unexpected DateTimeOriginal type in {}: {:?}", path.display(), other);
            return Ok(None);
        }
    };

    match parse_exif_datetime(&raw) {
        Some(dt) => Ok(Some(dt)),
        None => {
            warn!("Invalid date format in {}: {:?}", path.display(), raw);
            Ok(None)
        }
    }
}

/// Strict `YYYY:MM:DD HH:MM:SS` parse; trailing NULs and spaces are ignored.
pub fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    let cleaned = s.trim_end_matches(['\0', ' ']);
    NaiveDateTime::parse_from_str(cleaned, EXIF_DATE_FORMAT).ok()
}
