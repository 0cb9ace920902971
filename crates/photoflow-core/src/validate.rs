use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use crate::error::{SpaceError, ValidationError};
use crate::media::walk_files;

/// Longest sanitized name, in bytes.
pub const MAX_NAME_LENGTH: usize = 255;

/// Name used when sanitizing leaves nothing behind.
pub const PLACEHOLDER_NAME: &str = "unnamed";

/// User-facing date format.
pub const USER_DATE_FORMAT: &str = "%d-%m-%Y";

/// Stored and folder-name date format.
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

static UNSAFE_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).unwrap());

/// Make `name` safe to use as a single path component on every platform.
///
/// Unsafe characters become `_`, leading and trailing dots and whitespace
/// are trimmed, and the result is cut to `max_len` bytes on a char boundary.
/// A name made only of unsafe characters, dots and whitespace becomes
/// [`PLACEHOLDER_NAME`].
pub fn sanitize_name(name: &str, max_len: usize) -> String {
    if trim_name(&UNSAFE_CHARS_RE.replace_all(name, "")).is_empty() {
        return PLACEHOLDER_NAME.to_string();
    }

    let replaced = UNSAFE_CHARS_RE.replace_all(name, "_");
    let trimmed = trim_name(&replaced);

    let mut end = trimmed.len().min(max_len);
    while end > 0 && !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    let cut = trim_name(&trimmed[..end]);

    if cut.is_empty() {
        PLACEHOLDER_NAME.to_string()
    } else {
        cut.to_string()
    }
}

fn trim_name(s: &str) -> &str {
    s.trim_matches(|c: char| c == '.' || c.is_whitespace())
}

/// Check that `path` is an existing, listable directory and return its
/// canonical form.
pub fn validate_directory(path: &Path) -> Result<PathBuf, ValidationError> {
    let canonical = canonical_existing(path)?;
    if !canonical.is_dir() {
        return Err(ValidationError::NotADirectory { path: canonical });
    }
    fs::read_dir(&canonical).map_err(|source| ValidationError::Unreadable {
        path: canonical.clone(),
        source,
    })?;
    Ok(canonical)
}

/// Check that `path` is an existing regular file that can be opened.
pub fn validate_file(path: &Path) -> Result<(), ValidationError> {
    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ValidationError::PathNotFound {
            path: path.to_path_buf(),
        },
        _ => ValidationError::Unreadable {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    if !metadata.is_file() {
        return Err(ValidationError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    File::open(path).map_err(|source| ValidationError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn canonical_existing(path: &Path) -> Result<PathBuf, ValidationError> {
    fs::canonicalize(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ValidationError::PathNotFound {
            path: path.to_path_buf(),
        },
        _ => ValidationError::Unreadable {
            path: path.to_path_buf(),
            source: e,
        },
    })
}

/// Parse a `DD-MM-YYYY` date typed by a user.
pub fn parse_user_date(s: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(s.trim(), USER_DATE_FORMAT).map_err(|_| {
        ValidationError::InvalidDate {
            value: s.to_string(),
            expected: "DD-MM-YYYY",
        }
    })
}

pub fn format_user_date(date: NaiveDate) -> String {
    date.format(USER_DATE_FORMAT).to_string()
}

pub fn format_iso_date(date: NaiveDate) -> String {
    date.format(ISO_DATE_FORMAT).to_string()
}

/// Sum of regular file sizes under `dir`. Entries that cannot be read are
/// left out of the estimate.
pub fn estimate_directory_size(dir: &Path) -> u64 {
    walk_files(dir, true)
        .filter_map(|path| fs::metadata(&path).ok())
        .map(|meta| meta.len())
        .sum()
}

/// Source of free-space figures for a destination.
pub trait SpaceProbe {
    fn available_space(&self, path: &Path) -> io::Result<u64>;
}

/// Queries the filesystem holding `path`, or its nearest existing ancestor
/// when `path` has not been created yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskSpace;

impl SpaceProbe for DiskSpace {
    fn available_space(&self, path: &Path) -> io::Result<u64> {
        let existing = path
            .ancestors()
            .find(|p| p.exists())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no existing ancestor"))?;
        fs2::available_space(existing)
    }
}

/// Fail unless `probe` reports at least `required` bytes free at `path`.
/// Returns the available byte count on success.
pub fn check_disk_space(
    probe: &dyn SpaceProbe,
    path: &Path,
    required: u64,
) -> Result<u64, SpaceError> {
    let available = probe
        .available_space(path)
        .map_err(|source| SpaceError::Probe {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(
        "Free space on {}: {} bytes available, {} required",
        path.display(),
        available,
        required
    );
    if available < required {
        return Err(SpaceError::Insufficient {
            path: path.to_path_buf(),
            required,
            available,
        });
    }
    Ok(available)
}
