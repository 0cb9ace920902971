use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::CollisionError;

/// Highest numeric suffix tried before giving up on a name.
pub const MAX_COLLISION_ATTEMPTS: u32 = 9999;

/// Return `intended` if no directory entry exists there, otherwise the first free
/// `<stem>_<n><ext>` sibling with `n` counting up from 1.
pub fn resolve(intended: &Path) -> Result<PathBuf, CollisionError> {
    resolve_with(intended, |_| false)
}

/// Like [`resolve`], but also treats every path for which `taken` returns
/// true as occupied. The copier uses this to skip names already claimed by
/// copies that have not created their file yet.
pub fn resolve_with<F>(intended: &Path, taken: F) -> Result<PathBuf, CollisionError>
where
    F: Fn(&Path) -> bool,
{
    // lstat: a dangling symlink still occupies its name.
    let occupied = |p: &Path| fs::symlink_metadata(p).is_ok() || taken(p);

    if !occupied(intended) {
        return Ok(intended.to_path_buf());
    }

    let parent = intended.parent().unwrap_or_else(|| Path::new(""));
    let stem = intended
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let ext = intended
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    for counter in 1..=MAX_COLLISION_ATTEMPTS {
        let new_name = if ext.is_empty() {
            format!("{}_{}", stem, counter)
        } else {
            format!("{}_{}.{}", stem, counter, ext)
        };
        let candidate = parent.join(new_name);
        if !occupied(&candidate) {
            info!(
                "Collision resolved: {} -> {}",
                intended.display(),
                candidate.display()
            );
            return Ok(candidate);
        }
    }

    Err(CollisionError::TooManyCollisions {
        path: intended.to_path_buf(),
        attempts: MAX_COLLISION_ATTEMPTS,
    })
}
