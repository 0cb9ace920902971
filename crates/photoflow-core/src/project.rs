use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::cancel::CancellationToken;
use crate::config::OrganizerConfig;
use crate::date::{find_earliest, CacheStats, MetadataExtractor};
use crate::error::{Error, ValidationError};
use crate::notify::{CopyProgress, DateObserver, Silent};
use crate::structure::{self, PROJECT_TEMPLATE, RAW_FOLDER};
use crate::validate::{
    check_disk_space, estimate_directory_size, format_iso_date, sanitize_name, validate_directory,
    DiskSpace, SpaceProbe,
};
use crate::writer::{CopyOutcome, Copier};

/// At most this many sources per batch.
pub const MAX_SOURCES: usize = 10;

/// One directory to turn into a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSpec {
    path: PathBuf,
    name: String,
    date: Option<NaiveDate>,
}

impl SourceSpec {
    /// Validate `path` as a readable directory and sanitize `name`.
    pub fn new(
        path: impl AsRef<Path>,
        name: &str,
        date: Option<NaiveDate>,
    ) -> Result<Self, ValidationError> {
        let path = validate_directory(path.as_ref())?;
        Ok(Self {
            path,
            name: sanitize_name(name, crate::validate::MAX_NAME_LENGTH),
            date,
        })
    }

    /// Canonical source directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn set_date(&mut self, date: NaiveDate) {
        self.date = Some(date);
    }

    /// `<YYYY-MM-DD>_<name>`, once a date is known.
    pub fn project_folder_name(&self) -> Option<String> {
        self.date
            .map(|date| format!("{}_{}", format_iso_date(date), self.name))
    }
}

/// Why a source ended up FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NoDate,
    Validation,
    InsufficientSpace,
    Structure,
    NoFiles,
    Cancelled,
}

/// What happened to one source.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectOutcome {
    pub source: SourceSpec,
    /// Empty when the project folder was never created.
    pub project_root: PathBuf,
    pub copy_outcomes: Vec<CopyOutcome>,
    pub success: bool,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
}

impl ProjectOutcome {
    fn failed(source: &SourceSpec, kind: FailureKind, message: impl Into<String>) -> Self {
        let message = message.into();
        error!("Failed to create project for {}: {}", source.name(), message);
        Self {
            source: source.clone(),
            project_root: PathBuf::new(),
            copy_outcomes: Vec::new(),
            success: false,
            error: Some(message),
            failure: Some(kind),
        }
    }

    pub fn files_copied(&self) -> usize {
        self.copy_outcomes.iter().filter(|o| o.success).count()
    }

    pub fn files_failed(&self) -> usize {
        self.copy_outcomes.iter().filter(|o| !o.success).count()
    }

    pub fn files_renamed(&self) -> usize {
        self.copy_outcomes.iter().filter(|o| o.renamed).count()
    }
}

/// Outcomes of a whole batch, in source order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<ProjectOutcome>,
    /// The batch stopped early on request; later sources have no outcome.
    pub cancelled: bool,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Drives date detection, space checks, layout creation and copying for
/// a batch of sources, one source at a time.
pub struct Organizer<P: SpaceProbe = DiskSpace> {
    config: OrganizerConfig,
    extractor: MetadataExtractor,
    copier: Copier,
    probe: P,
    cancel: CancellationToken,
}

impl Organizer<DiskSpace> {
    pub fn new(config: OrganizerConfig) -> Result<Self, Error> {
        Self::with_probe(config, DiskSpace)
    }
}

impl<P: SpaceProbe> Organizer<P> {
    /// Build an organizer that asks `probe` for destination free space.
    pub fn with_probe(config: OrganizerConfig, probe: P) -> Result<Self, Error> {
        config.validate()?;
        let cancel = CancellationToken::new();
        let copier = Copier::new(config.workers)?
            .with_filter(config.copy_filter)
            .with_cancel_token(cancel.clone());
        Ok(Self {
            extractor: MetadataExtractor::new(config.cache_capacity),
            copier,
            probe,
            cancel,
            config,
        })
    }

    pub fn config(&self) -> &OrganizerConfig {
        &self.config
    }

    /// Handle sharing this organizer's cancellation state. A request made
    /// through it stops the running batch; the next
    /// [`process_multiple`](Self::process_multiple) call starts cleared.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Earliest capture date found in the source, as a calendar date.
    pub fn detect_date(&self, source: &SourceSpec, observer: &dyn DateObserver) -> Option<NaiveDate> {
        info!("Detecting date for {} from {}", source.name(), source.path().display());
        let earliest = find_earliest(&self.extractor, source.path(), self.config.recursive, observer);
        match earliest {
            Some(taken) => {
                let date = taken.date();
                info!("Date detected: {}", format_iso_date(date));
                Some(date)
            }
            None => {
                warn!("No date found in EXIF data for {}", source.name());
                None
            }
        }
    }

    /// Build the project for one dated source and copy its files into
    /// `<destination_root>/<projects_dir>/<YYYY>/<YYYY-MM-DD>_<name>/02_RAW`.
    ///
    /// Free space is checked before anything is created, so a source that
    /// fails for lack of a date or of space leaves the destination untouched.
    pub fn create_project(
        &self,
        source: &SourceSpec,
        destination_root: &Path,
        progress: &dyn CopyProgress,
    ) -> ProjectOutcome {
        let (Some(date), Some(folder_name)) = (source.date(), source.project_folder_name()) else {
            return ProjectOutcome::failed(
                source,
                FailureKind::NoDate,
                format!("no date available for source {}", source.name()),
            );
        };

        // The folder may have been moved or deleted since the source was built.
        if let Err(e) = validate_directory(source.path()) {
            return ProjectOutcome::failed(source, FailureKind::Validation, e.to_string());
        }

        let source_size = estimate_directory_size(source.path());
        let required = (source_size as f64 * self.config.safety_margin).ceil() as u64;
        if let Err(e) = check_disk_space(&self.probe, destination_root, required) {
            return ProjectOutcome::failed(source, FailureKind::InsufficientSpace, e.to_string());
        }

        let year_dir = destination_root
            .join(&self.config.projects_dir)
            .join(date.format("%Y").to_string());
        info!("Creating project: {}", folder_name);
        let project_root = match structure::build(
            &year_dir,
            &folder_name,
            PROJECT_TEMPLATE,
            self.config.max_name_len,
        ) {
            Ok(root) => root,
            Err(e) => return ProjectOutcome::failed(source, FailureKind::Structure, e.to_string()),
        };

        let raw_dir = project_root.join(RAW_FOLDER);
        info!("Organizing files to {}", raw_dir.display());
        let copy_outcomes =
            match self.copier.organize(source.path(), &raw_dir, self.config.recursive, progress) {
                Ok(outcomes) => outcomes,
                Err(e) => {
                    return ProjectOutcome {
                        project_root,
                        ..ProjectOutcome::failed(source, FailureKind::Structure, e.to_string())
                    }
                }
            };

        let success = copy_outcomes.iter().any(|o| o.success);
        let (error, failure) = if success {
            (None, None)
        } else if self.cancel.is_cancelled() {
            (Some("cancelled before any file was copied".to_string()), Some(FailureKind::Cancelled))
        } else if copy_outcomes.is_empty() {
            (Some(format!("no files to copy in {}", source.path().display())), Some(FailureKind::NoFiles))
        } else {
            (Some("every file copy failed".to_string()), Some(FailureKind::NoFiles))
        };

        let outcome = ProjectOutcome {
            source: source.clone(),
            project_root,
            copy_outcomes,
            success,
            error,
            failure,
        };
        if outcome.success {
            info!(
                "Project created: {} files copied, {} failed, {} renamed",
                outcome.files_copied(),
                outcome.files_failed(),
                outcome.files_renamed()
            );
        } else if let Some(message) = &outcome.error {
            error!("Failed to create project for {}: {}", source.name(), message);
        }
        outcome
    }

    /// Process `sources` one after another. Sources without a date are
    /// scanned first when `auto_detect` is set; a source that still has no
    /// date fails without stopping the batch. Any earlier cancellation
    /// request is cleared before the first source.
    pub fn process_multiple(
        &self,
        sources: Vec<SourceSpec>,
        destination_root: &Path,
        auto_detect: bool,
        progress: &dyn CopyProgress,
    ) -> Result<BatchReport, ValidationError> {
        if sources.len() > MAX_SOURCES {
            return Err(ValidationError::TooManySources {
                count: sources.len(),
                max: MAX_SOURCES,
            });
        }

        self.cancel.reset();
        let total = sources.len();
        let mut report = BatchReport::default();

        for (idx, mut source) in sources.into_iter().enumerate() {
            if self.cancel.check().is_err() {
                warn!("Batch cancelled before source {}/{}", idx + 1, total);
                report.cancelled = true;
                break;
            }
            info!("Processing source {}/{}: {}", idx + 1, total, source.name());

            if auto_detect && source.date().is_none() {
                if let Some(date) = self.detect_date(&source, &Silent) {
                    source.set_date(date);
                }
            }

            let outcome = self.create_project(&source, destination_root, progress);
            report.outcomes.push(outcome);
        }

        if !report.cancelled && self.cancel.is_cancelled() {
            report.cancelled = true;
        }
        info!(
            "Batch processing complete: {} successful, {} failed",
            report.succeeded(),
            report.failed()
        );
        Ok(report)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.extractor.stats()
    }

    pub fn clear_cache(&self) {
        self.extractor.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::exif::tests::tiff_with_date;
    use std::fs;
    use std::io;
    use tempfile::tempdir;

    struct Fixed(u64);

    impl SpaceProbe for Fixed {
        fn available_space(&self, _path: &Path) -> io::Result<u64> {
            Ok(self.0)
        }
    }

    fn organizer() -> Organizer<Fixed> {
        Organizer::with_probe(OrganizerConfig::default(), Fixed(u64::MAX)).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn shoot(dir: &Path) {
        fs::create_dir_all(dir.join("card2")).unwrap();
        fs::write(dir.join("IMG_0002.TIF"), tiff_with_date("2024:05:02 09:00:00")).unwrap();
        fs::write(dir.join("card2").join("IMG_0001.TIF"), tiff_with_date("2024:05:01 17:45:00")).unwrap();
        fs::write(dir.join("notes.txt"), b"call the client").unwrap();
    }

    #[test]
    fn test_source_spec_validates_once() {
        let dir = tempdir().unwrap();
        let spec = SourceSpec::new(dir.path(), "Mariage: Dupont", None).unwrap();
        assert_eq!(spec.name(), "Mariage_ Dupont");
        assert_eq!(spec.project_folder_name(), None);

        let file = dir.path().join("a.jpg");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            SourceSpec::new(&file, "x", None),
            Err(ValidationError::NotADirectory { .. })
        ));
        assert!(SourceSpec::new(dir.path().join("missing"), "x", None).is_err());
    }

    #[test]
    fn test_create_project_full_run() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        shoot(src.path());

        let org = organizer();
        let mut spec = SourceSpec::new(src.path(), "Wedding Smith", None).unwrap();
        let detected = org.detect_date(&spec, &Silent).unwrap();
        assert_eq!(detected, date("2024-05-01"));
        spec.set_date(detected);

        let outcome = org.create_project(&spec, dst.path(), &Silent);
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(
            outcome.project_root,
            dst.path().join("PROJETS_PHOTO").join("2024").join("2024-05-01_Wedding Smith")
        );
        assert_eq!(outcome.files_copied(), 3);
        assert_eq!(outcome.files_failed(), 0);
        assert_eq!(outcome.files_renamed(), 0);

        let raw = outcome.project_root.join("02_RAW");
        for name in ["IMG_0001.TIF", "IMG_0002.TIF", "notes.txt"] {
            assert!(raw.join(name).is_file(), "missing {name}");
        }
        assert!(outcome.project_root.join("04_RETOUCHE").join("PSD").is_dir());
    }

    #[test]
    fn test_create_project_without_date_touches_nothing() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        shoot(src.path());

        let spec = SourceSpec::new(src.path(), "Undated", None).unwrap();
        let outcome = organizer().create_project(&spec, dst.path(), &Silent);

        assert!(!outcome.success);
        assert_eq!(outcome.failure, Some(FailureKind::NoDate));
        assert!(outcome.error.unwrap().contains("no date"));
        assert_eq!(fs::read_dir(dst.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_insufficient_space_fails_before_copying() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::write(src.path().join("a.jpg"), vec![0u8; 1000]).unwrap();

        // 1000 bytes need 1200 with the margin.
        let org = Organizer::with_probe(OrganizerConfig::default(), Fixed(1199)).unwrap();
        let spec = SourceSpec::new(src.path(), "Tight", Some(date("2023-12-31"))).unwrap();
        let outcome = org.create_project(&spec, dst.path(), &Silent);

        assert!(!outcome.success);
        assert_eq!(outcome.failure, Some(FailureKind::InsufficientSpace));
        assert!(outcome.error.unwrap().contains("insufficient disk space"));
        assert!(outcome.copy_outcomes.is_empty());
        assert!(!dst.path().join("PROJETS_PHOTO").exists());

        let org = Organizer::with_probe(OrganizerConfig::default(), Fixed(1300)).unwrap();
        assert!(org.create_project(&spec, dst.path(), &Silent).success);
    }

    #[test]
    fn test_empty_source_is_a_failure() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();

        let spec = SourceSpec::new(src.path(), "Empty", Some(date("2022-01-01"))).unwrap();
        let outcome = organizer().create_project(&spec, dst.path(), &Silent);

        assert!(!outcome.success);
        assert_eq!(outcome.failure, Some(FailureKind::NoFiles));
        assert!(outcome.project_root.join("02_RAW").is_dir());
    }

    #[test]
    fn test_process_multiple_continues_past_failures() {
        let dated = tempdir().unwrap();
        let undated = tempdir().unwrap();
        let manual = tempdir().unwrap();
        let dst = tempdir().unwrap();
        shoot(dated.path());
        fs::write(undated.path().join("scan.png"), b"no exif here").unwrap();
        fs::write(manual.path().join("DSC_1.NEF"), b"raw").unwrap();

        let sources = vec![
            SourceSpec::new(dated.path(), "Auto", None).unwrap(),
            SourceSpec::new(undated.path(), "Lost", None).unwrap(),
            SourceSpec::new(manual.path(), "Manual", Some(date("2019-07-14"))).unwrap(),
        ];

        let org = organizer();
        let report = org.process_multiple(sources, dst.path(), true, &Silent).unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert!(!report.cancelled);
        assert_eq!(report.outcomes[0].source.date(), Some(date("2024-05-01")));
        assert_eq!(report.outcomes[1].failure, Some(FailureKind::NoDate));
        assert!(dst
            .path()
            .join("PROJETS_PHOTO/2019/2019-07-14_Manual/02_RAW/DSC_1.NEF")
            .is_file());
        assert!(org.cache_stats().misses >= 2);
    }

    #[test]
    fn test_process_multiple_rejects_too_many_sources() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::write(src.path().join("a.jpg"), b"x").unwrap();
        let spec = SourceSpec::new(src.path(), "S", Some(date("2020-01-01"))).unwrap();

        let org = organizer();
        let too_many = vec![spec; MAX_SOURCES + 1];
        assert!(matches!(
            org.process_multiple(too_many, dst.path(), false, &Silent),
            Err(ValidationError::TooManySources { .. })
        ));
        assert!(!dst.path().join("PROJETS_PHOTO").exists());
    }

    #[test]
    fn test_cancel_stops_batch_and_next_batch_runs() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::write(first.path().join("a.jpg"), b"x").unwrap();
        fs::write(second.path().join("b.jpg"), b"y").unwrap();
        let sources = vec![
            SourceSpec::new(first.path(), "First", Some(date("2020-01-01"))).unwrap(),
            SourceSpec::new(second.path(), "Second", Some(date("2020-02-02"))).unwrap(),
        ];

        let org = organizer();
        // A stale request from before the batch is ignored.
        org.cancel_token().cancel();
        let token = org.cancel_token();
        let stop_after_first_copy = |_completed: usize, _total: usize, _current: &Path| token.cancel();
        let report = org
            .process_multiple(sources.clone(), dst.path(), false, &stop_after_first_copy)
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.outcomes.len(), 1);
        assert!(report.outcomes[0].success);
        assert!(!dst.path().join("PROJETS_PHOTO/2020/2020-02-02_Second").exists());

        let report = org.process_multiple(sources, dst.path(), false, &Silent).unwrap();
        assert!(!report.cancelled);
        assert_eq!(report.succeeded(), 2);
    }

    #[test]
    fn test_vanished_source_fails_validation() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let gone = src.path().join("card");
        fs::create_dir(&gone).unwrap();
        fs::write(gone.join("a.jpg"), b"x").unwrap();
        let spec = SourceSpec::new(&gone, "Gone", Some(date("2021-06-01"))).unwrap();
        fs::remove_dir_all(&gone).unwrap();

        let outcome = organizer().create_project(&spec, dst.path(), &Silent);
        assert_eq!(outcome.failure, Some(FailureKind::Validation));
        assert!(!dst.path().join("PROJETS_PHOTO").exists());
    }

    #[test]
    fn test_year_folder_is_four_digits() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::write(src.path().join("a.jpg"), b"x").unwrap();
        let spec = SourceSpec::new(src.path(), "Old", Some(date("0999-01-01"))).unwrap();

        let outcome = organizer().create_project(&spec, dst.path(), &Silent);
        assert!(outcome.success);
        assert_eq!(
            outcome.project_root,
            dst.path().join("PROJETS_PHOTO").join("0999").join("0999-01-01_Old")
        );
    }

    #[test]
    fn test_cache_stats_and_clear() {
        let src = tempdir().unwrap();
        shoot(src.path());
        let org = organizer();
        let spec = SourceSpec::new(src.path(), "S", None).unwrap();

        org.detect_date(&spec, &Silent);
        org.detect_date(&spec, &Silent);
        let stats = org.cache_stats();
        assert_eq!((stats.hits, stats.misses, stats.size), (2, 2, 2));
        assert_eq!(stats.capacity, 128);

        org.clear_cache();
        assert_eq!(org.cache_stats().hit_rate(), 0.0);
    }

    #[test]
    fn test_outcome_serializes() {
        let src = tempdir().unwrap();
        let spec = SourceSpec::new(src.path(), "S", Some(date("2020-01-01"))).unwrap();
        let report = BatchReport {
            outcomes: vec![ProjectOutcome::failed(&spec, FailureKind::NoFiles, "nothing")],
            cancelled: false,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcomes"][0]["source"]["date"], "2020-01-01");
        assert_eq!(json["outcomes"][0]["failure"], "no_files");
    }
}
