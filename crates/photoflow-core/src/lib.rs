//! Turns folders of camera files into dated photo projects.
//!
//! A source folder is scanned for the earliest EXIF capture date, a fixed
//! project layout is created under `<dest>/PROJETS_PHOTO/<YYYY>/`, and the
//! source files are copied in parallel into its `02_RAW` folder.

pub mod cancel;
pub mod collision;
pub mod config;
pub mod date;
pub mod error;
pub mod media;
pub mod notify;
pub mod project;
pub mod structure;
pub mod validate;
pub mod writer;

pub use cancel::CancellationToken;
pub use config::OrganizerConfig;
pub use date::{CacheStats, MetadataExtractor};
pub use error::{Error, Result};
pub use media::CopyFilter;
pub use notify::{CopyProgress, DateObserver, Silent};
pub use project::{BatchReport, FailureKind, Organizer, ProjectOutcome, SourceSpec, MAX_SOURCES};
pub use validate::{DiskSpace, SpaceProbe};
pub use writer::{Copier, CopyOutcome};
