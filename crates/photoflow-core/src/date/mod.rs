pub mod exif;
pub mod scan;

pub use exif::{CacheStats, MetadataExtractor};
pub use scan::find_earliest;
