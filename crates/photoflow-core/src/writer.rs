use std::collections::HashSet;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use filetime::FileTime;
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::cancel::CancellationToken;
use crate::collision;
use crate::error::{Error, StructureError};
use crate::media::{walk_files, CopyFilter};
use crate::notify::CopyProgress;
use crate::validate::validate_file;

/// Result of one attempted file copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyOutcome {
    pub source: PathBuf,
    /// Final destination, after collision handling.
    pub destination: PathBuf,
    pub success: bool,
    pub error: Option<String>,
    /// True when the file landed under a different name than its own.
    pub renamed: bool,
}

impl CopyOutcome {
    fn failed(source: &Path, destination: PathBuf, error: impl ToString) -> Self {
        Self {
            source: source.to_path_buf(),
            destination,
            success: false,
            error: Some(error.to_string()),
            renamed: false,
        }
    }
}

/// Destination names claimed by copies of one batch that may not have
/// created their file yet.
type Reservations = Mutex<HashSet<PathBuf>>;

/// Copies files into a directory on a fixed pool of worker threads.
pub struct Copier {
    pool: ThreadPool,
    workers: usize,
    filter: CopyFilter,
    cancel: CancellationToken,
}

impl Copier {
    /// Build a copier with `workers` threads (minimum 1).
    pub fn new(workers: usize) -> Result<Self, Error> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("photoflow-copy-{}", i))
            .build()?;
        Ok(Self {
            pool,
            workers,
            filter: CopyFilter::default(),
            cancel: CancellationToken::new(),
        })
    }

    /// Restrict [`organize`](Self::organize) to the files accepted by `filter`.
    pub fn with_filter(mut self, filter: CopyFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Share a cancellation token; once cancelled no further copy starts.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Copy one file into `destination_dir`, renaming on collision.
    /// Never fails: problems are reported in the outcome.
    pub fn copy_one(&self, source: &Path, destination_dir: &Path) -> CopyOutcome {
        copy_reserving(source, destination_dir, &Reservations::default())
    }

    /// Copy `files` into `destination_dir` in parallel.
    ///
    /// `progress` runs on the calling thread after every finished copy, in
    /// completion order. One outcome is returned per copy that was started;
    /// the only error is failing to create `destination_dir`.
    pub fn copy_many(
        &self,
        files: &[PathBuf],
        destination_dir: &Path,
        progress: &dyn CopyProgress,
    ) -> Result<Vec<CopyOutcome>, StructureError> {
        fs::create_dir_all(destination_dir).map_err(|source| StructureError {
            path: destination_dir.to_path_buf(),
            source,
        })?;

        let total = files.len();
        let reservations = Reservations::default();
        let mut outcomes = Vec::with_capacity(total);
        let (tx, rx) = mpsc::channel::<CopyOutcome>();

        self.pool.in_place_scope(|scope| {
            let mut pending = files.iter();
            let mut in_flight = 0usize;
            let mut stopped = false;

            loop {
                while in_flight < self.workers && !stopped {
                    if self.cancel.check().is_err() {
                        warn!(
                            "Copy cancelled, {} file(s) not started",
                            total - outcomes.len() - in_flight
                        );
                        stopped = true;
                        break;
                    }
                    let Some(source) = pending.next() else {
                        stopped = true;
                        break;
                    };
                    let tx = tx.clone();
                    let reservations = &reservations;
                    scope.spawn(move |_| {
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                            copy_reserving(source, destination_dir, reservations)
                        }))
                        .unwrap_or_else(|_| {
                            CopyOutcome::failed(
                                source,
                                destination_dir.join(source.file_name().unwrap_or_default()),
                                "copy worker panicked",
                            )
                        });
                        let _ = tx.send(outcome);
                    });
                    in_flight += 1;
                }

                if in_flight == 0 {
                    break;
                }
                let Ok(outcome) = rx.recv() else {
                    break;
                };
                in_flight -= 1;
                progress.on_progress(outcomes.len() + 1, total, &outcome.source);
                outcomes.push(outcome);
            }
        });

        log_summary(&outcomes, total);
        Ok(outcomes)
    }

    /// Copy every file under `source_dir` accepted by the copier's filter
    /// into `destination_dir`. An empty source yields an empty list.
    pub fn organize(
        &self,
        source_dir: &Path,
        destination_dir: &Path,
        recursive: bool,
        progress: &dyn CopyProgress,
    ) -> Result<Vec<CopyOutcome>, StructureError> {
        let files: Vec<PathBuf> = walk_files(source_dir, recursive)
            .filter(|path| self.filter.accepts(path))
            .collect();

        if files.is_empty() {
            warn!("No files found in {}", source_dir.display());
            return Ok(Vec::new());
        }

        info!(
            "Found {} files to organize from {}",
            files.len(),
            source_dir.display()
        );
        self.copy_many(&files, destination_dir, progress)
    }
}

fn copy_reserving(source: &Path, destination_dir: &Path, reservations: &Reservations) -> CopyOutcome {
    let intended = destination_dir.join(source.file_name().unwrap_or_default());

    if let Err(e) = validate_file(source) {
        error!("Failed to copy {}: {}", source.display(), e);
        return CopyOutcome::failed(source, intended, e);
    }

    let destination = {
        let mut reserved = reservations.lock();
        match collision::resolve_with(&intended, |p| reserved.contains(p)) {
            Ok(dest) => {
                reserved.insert(dest.clone());
                dest
            }
            Err(e) => {
                error!("Failed to copy {}: {}", source.display(), e);
                return CopyOutcome::failed(source, intended, e);
            }
        }
    };
    let renamed = destination != intended;

    if let Err(e) = copy_preserving_times(source, &destination) {
        error!("Failed to copy {}: {}", source.display(), e);
        return CopyOutcome {
            renamed,
            ..CopyOutcome::failed(source, destination, e)
        };
    }

    debug!("Copied: {} -> {}", source.display(), destination.display());
    CopyOutcome {
        source: source.to_path_buf(),
        destination,
        success: true,
        error: None,
        renamed,
    }
}

fn copy_preserving_times(source: &Path, destination: &Path) -> std::io::Result<()> {
    fs::copy(source, destination)?;
    let meta = fs::metadata(source)?;
    filetime::set_file_times(
        destination,
        FileTime::from_last_access_time(&meta),
        FileTime::from_last_modification_time(&meta),
    )
}

fn log_summary(outcomes: &[CopyOutcome], total: usize) {
    let successful = outcomes.iter().filter(|o| o.success).count();
    let failed = outcomes.len() - successful;
    let renamed = outcomes.iter().filter(|o| o.renamed).count();
    info!(
        "Copy summary: {}/{} successful, {} failed, {} renamed",
        successful, total, failed, renamed
    );
}
