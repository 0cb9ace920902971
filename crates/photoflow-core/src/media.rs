use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;
use walkdir::WalkDir;

/// Camera RAW formats, upper-case without the dot.
pub const RAW_EXTENSIONS: &[&str] = &[
    "ARW", // Sony
    "CR2", "CR3", // Canon
    "NEF", // Nikon
    "RAF", // Fujifilm
    "DNG", // Adobe
    "ORF", // Olympus
    "RW2", // Panasonic
];

/// Processed image formats, upper-case without the dot.
pub const IMAGE_EXTENSIONS: &[&str] = &["JPG", "JPEG", "TIFF", "TIF", "PNG"];

/// Whether a path carries one of the supported extensions (case-insensitive).
pub fn is_supported(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    RAW_EXTENSIONS
        .iter()
        .chain(IMAGE_EXTENSIONS)
        .any(|known| known.eq_ignore_ascii_case(ext))
}

/// Which files a copy pass picks up from a source directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyFilter {
    /// Every regular file.
    #[default]
    All,
    /// Only files with a supported image extension.
    Supported,
}

impl CopyFilter {
    pub fn accepts(self, path: &Path) -> bool {
        match self {
            CopyFilter::All => true,
            CopyFilter::Supported => is_supported(path),
        }
    }
}

/// Walk regular files under `dir`, depth-first, sorted by file name at each
/// level. Unreadable entries are logged and skipped.
pub fn walk_files(dir: &Path, recursive: bool) -> impl Iterator<Item = PathBuf> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(max_depth)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
}

/// Supported image files under `dir`, in walk order.
pub fn walk_images(dir: &Path, recursive: bool) -> impl Iterator<Item = PathBuf> {
    walk_files(dir, recursive).filter(|path| is_supported(path))
}
