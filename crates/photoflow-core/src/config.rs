use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::date::exif::DEFAULT_CACHE_CAPACITY;
use crate::error::ConfigError;
use crate::media::CopyFilter;
use crate::validate::MAX_NAME_LENGTH;

/// Folder created under the destination root to hold every project.
pub const PROJECTS_DIR: &str = "PROJETS_PHOTO";

/// Parallel copies per source.
pub const DEFAULT_WORKERS: usize = 4;

/// Free space required on the destination, as a multiple of the source size.
pub const DEFAULT_SAFETY_MARGIN: f64 = 1.2;

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_safety_margin() -> f64 {
    DEFAULT_SAFETY_MARGIN
}

fn default_projects_dir() -> String {
    PROJECTS_DIR.to_string()
}

fn default_recursive() -> bool {
    true
}

fn default_max_name_len() -> usize {
    MAX_NAME_LENGTH
}

/// Tunables for an [`Organizer`](crate::Organizer). Every field has a
/// default, so a config file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizerConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,
    #[serde(default = "default_projects_dir")]
    pub projects_dir: String,
    /// Descend into subdirectories when scanning and copying sources.
    #[serde(default = "default_recursive")]
    pub recursive: bool,
    #[serde(default)]
    pub copy_filter: CopyFilter,
    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,
}

impl Default for OrganizerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            cache_capacity: default_cache_capacity(),
            safety_margin: default_safety_margin(),
            projects_dir: default_projects_dir(),
            recursive: default_recursive(),
            copy_filter: CopyFilter::default(),
            max_name_len: default_max_name_len(),
        }
    }
}

impl OrganizerConfig {
    /// Read a JSON config file and validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "workers",
                reason: "must be at least 1",
            });
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "cache_capacity",
                reason: "must be at least 1",
            });
        }
        if !(self.safety_margin >= 1.0) {
            return Err(ConfigError::Invalid {
                field: "safety_margin",
                reason: "must be a number no lower than 1.0",
            });
        }
        if self.max_name_len == 0 {
            return Err(ConfigError::Invalid {
                field: "max_name_len",
                reason: "must be at least 1",
            });
        }
        let projects_dir = self.projects_dir.trim();
        if projects_dir.is_empty() || projects_dir.contains(['/', '\\']) || projects_dir == ".." {
            return Err(ConfigError::Invalid {
                field: "projects_dir",
                reason: "must be a single folder name",
            });
        }
        Ok(())
    }
}
