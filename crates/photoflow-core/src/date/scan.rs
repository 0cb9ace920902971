use std::path::Path;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::date::exif::MetadataExtractor;
use crate::media::walk_images;
use crate::notify::DateObserver;

/// Earliest capture date among the supported images under `dir`.
///
/// Files are visited in [`walk_images`] order (sorted by name, depth-first).
/// `observer` hears about every strictly earlier date as it is found; equal
/// dates keep the first file seen. Unreadable images are logged and skipped.
pub fn find_earliest(
    extractor: &MetadataExtractor,
    dir: &Path,
    recursive: bool,
    observer: &dyn DateObserver,
) -> Option<NaiveDateTime> {
    let mut earliest: Option<NaiveDateTime> = None;
    let mut files_checked = 0usize;
    let mut dates_found = 0usize;

    for image in walk_images(dir, recursive) {
        files_checked += 1;

        let taken = match extractor.extract(&image) {
            Ok(Some(taken)) => taken,
            Ok(None) => continue,
            Err(e) => {
                warn!("Skipping {}: {}", image.display(), e.reason);
                continue;
            }
        };
        dates_found += 1;

        if earliest.map_or(true, |current| taken < current) {
            earliest = Some(taken);
            info!(
                "Earlier date found: {} in {}",
                taken.format("%d-%m-%Y"),
                image.display()
            );
            observer.on_date_found(&image, taken);
        }
    }

    info!(
        "Scanned {} images in {}, found {} with EXIF dates",
        files_checked,
        dir.display(),
        dates_found
    );
    earliest
}
