use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Input rejected at the boundary (paths, dates, source lists).
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("path does not exist: {}", path.display())]
    PathNotFound { path: PathBuf },

    #[error("not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    #[error("not a regular file: {}", path.display())]
    NotAFile { path: PathBuf },

    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid date '{value}', expected {expected}")]
    InvalidDate {
        value: String,
        expected: &'static str,
    },

    #[error("too many sources: {count} given, at most {max} allowed")]
    TooManySources { count: usize, max: usize },
}

/// An image whose metadata container could not be read at all.
#[derive(Debug, Error)]
#[error("cannot read metadata from {}: {reason}", path.display())]
pub struct MetadataError {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum SpaceError {
    #[error(
        "insufficient disk space on {}: {required} bytes required, {available} bytes available",
        path.display()
    )]
    Insufficient {
        path: PathBuf,
        required: u64,
        available: u64,
    },

    #[error("cannot query free space on {}: {source}", path.display())]
    Probe {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Directory creation failed while materializing a project layout.
#[derive(Debug, Error)]
#[error("cannot create directory {}: {source}", path.display())]
pub struct StructureError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Error)]
pub enum CollisionError {
    #[error("too many collisions for {} (tried {attempts} names)", path.display())]
    TooManyCollisions { path: PathBuf, attempts: u32 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Umbrella error for callers that do not care which stage failed.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Space(#[from] SpaceError),
    #[error(transparent)]
    Structure(#[from] StructureError),
    #[error(transparent)]
    Collision(#[from] CollisionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to start copy workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
