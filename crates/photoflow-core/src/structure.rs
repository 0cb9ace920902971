use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::StructureError;
use crate::validate::sanitize_name;

/// Ordered `(folder, subfolders)` table describing a project layout.
pub type ProjectTemplate = &'static [(&'static str, &'static [&'static str])];

/// Folder receiving the copied source files.
pub const RAW_FOLDER: &str = "02_RAW";

pub const PROJECT_TEMPLATE: ProjectTemplate = &[
    ("01_PRE-PRODUCTION", &["Moodboard", "References", "Brief"]),
    (RAW_FOLDER, &[]),
    ("03_SELECTS", &[]),
    ("04_RETOUCHE", &["PSD", "FINALS"]),
    ("05_VIDEO", &["RUSH", "FINALS"]),
    ("06_ADMIN", &["Factures", "Contrats"]),
];

/// Create `base_dir/<sanitized project_name>` and every folder of
/// `template` inside it. Existing directories are left alone.
pub fn build(
    base_dir: &Path,
    project_name: &str,
    template: ProjectTemplate,
    max_name_len: usize,
) -> Result<PathBuf, StructureError> {
    let project_root = base_dir.join(sanitize_name(project_name, max_name_len));
    create_dir(&project_root)?;

    for (folder, subfolders) in template {
        let folder_path = project_root.join(folder);
        create_dir(&folder_path)?;
        for sub in subfolders.iter() {
            create_dir(&folder_path.join(sub))?;
        }
    }

    info!("Project structure created: {}", project_root.display());
    Ok(project_root)
}

fn create_dir(path: &Path) -> Result<(), StructureError> {
    fs::create_dir_all(path).map_err(|source| StructureError {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::MAX_NAME_LENGTH;
    use crate::media::walk_files;
    use tempfile::tempdir;
    use walkdir::WalkDir;

    fn tree(root: &Path) -> Vec<String> {
        WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .map(|e| {
                e.unwrap()
                    .path()
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn test_build_layout() {
        let dir = tempdir().unwrap();
        let root = build(dir.path(), "2024-05-01_Mariage", PROJECT_TEMPLATE, MAX_NAME_LENGTH).unwrap();
        assert_eq!(root, dir.path().join("2024-05-01_Mariage"));

        let t = tree(&root);
        for expected in [
            "01_PRE-PRODUCTION/Brief",
            "01_PRE-PRODUCTION/Moodboard",
            "01_PRE-PRODUCTION/References",
            "02_RAW",
            "03_SELECTS",
            "04_RETOUCHE/FINALS",
            "04_RETOUCHE/PSD",
            "05_VIDEO/FINALS",
            "05_VIDEO/RUSH",
            "06_ADMIN/Contrats",
            "06_ADMIN/Factures",
        ] {
            assert!(t.iter().any(|p| p == expected), "missing {expected}");
        }
        assert_eq!(t.len(), 15);
        assert_eq!(walk_files(&root, true).count(), 0);
    }

    #[test]
    fn test_build_is_idempotent() {
        let dir = tempdir().unwrap();
        let first = build(dir.path(), "Shoot", PROJECT_TEMPLATE, MAX_NAME_LENGTH).unwrap();
        let before = tree(&first);
        let second = build(dir.path(), "Shoot", PROJECT_TEMPLATE, MAX_NAME_LENGTH).unwrap();
        assert_eq!(first, second);
        assert_eq!(before, tree(&second));
    }

    #[test]
    fn test_build_sanitizes_name() {
        let dir = tempdir().unwrap();
        let root = build(dir.path(), " Client: A/B ", &[("x", &[])], MAX_NAME_LENGTH).unwrap();
        assert_eq!(root, dir.path().join("Client_ A_B"));
        assert!(root.join("x").is_dir());
    }

    #[test]
    fn test_build_reports_os_failure() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"file in the way").unwrap();
        let err = build(&blocker, "Shoot", PROJECT_TEMPLATE, MAX_NAME_LENGTH).unwrap_err();
        assert_eq!(err.path, blocker.join("Shoot"));
    }
}
