//! Consistency report across the catalog, project directories and packages.
//!
//! This only detects and reports. Interrupted operations can leave a project
//! half active and half archived; deciding what to keep is left to the user.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::catalog::AccessMode;
use crate::error::Result;
use crate::package::{PARTIAL_PREFIX, PARTIAL_SUFFIX, STAGING_PREFIX};
use crate::project::{ProjectStateManager, is_hidden};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectState {
    /// Catalog record and directory, no package.
    Active,
    /// Package only.
    Archived,
    /// Catalog record, directory and package (left by preserve mode).
    Snapshot,
    /// Catalog record without a directory.
    StaleRecord,
    /// Directory without a catalog record.
    OrphanDirectory,
}

impl fmt::Display for ProjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProjectState::Active => "active",
            ProjectState::Archived => "archived",
            ProjectState::Snapshot => "snapshot",
            ProjectState::StaleRecord => "stale_record",
            ProjectState::OrphanDirectory => "orphan_directory",
        };
        write!(f, "{s}")
    }
}

impl ProjectState {
    pub fn is_issue(self) -> bool {
        matches!(self, ProjectState::StaleRecord | ProjectState::OrphanDirectory)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatus {
    pub id: String,
    pub name: Option<String>,
    pub state: ProjectState,
    pub has_record: bool,
    pub has_directory: bool,
    pub packages: Vec<PathBuf>,
}

#[derive(Debug, Default, Serialize)]
pub struct ReconcileReport {
    pub projects: Vec<ProjectStatus>,
    pub staging_leftovers: Vec<PathBuf>,
    pub partial_packages: Vec<PathBuf>,
}

impl ReconcileReport {
    pub fn issues(&self) -> impl Iterator<Item = &ProjectStatus> {
        self.projects.iter().filter(|p| p.state.is_issue())
    }

    pub fn is_clean(&self) -> bool {
        self.issues().next().is_none()
            && self.staging_leftovers.is_empty()
            && self.partial_packages.is_empty()
    }

    pub fn status(&self, id: &str) -> Option<&ProjectStatus> {
        self.projects.iter().find(|p| p.id == id)
    }
}

#[derive(Default)]
struct Sighting {
    name: Option<String>,
    record: bool,
    directory: bool,
    packages: Vec<PathBuf>,
}

/// Classify every project id seen in the catalog, the project root or the archive directory.
pub fn reconcile<M: AccessMode>(manager: &ProjectStateManager<'_, M>) -> Result<ReconcileReport> {
    let layout = manager.layout();
    let mut seen: BTreeMap<String, Sighting> = BTreeMap::new();
    let mut report = ReconcileReport::default();

    for entry in manager.catalog().entries()? {
        let s = seen.entry(entry.id).or_default();
        s.record = true;
        s.name = Some(entry.name);
    }

    for path in list_dir(&layout.project_root)? {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if path.is_dir() {
            if file_name.starts_with(STAGING_PREFIX) {
                report.staging_leftovers.push(path);
            } else if !is_hidden(&path) {
                seen.entry(file_name).or_default().directory = true;
            }
        } else if is_partial_package(&file_name) {
            report.partial_packages.push(path);
        }
    }

    if layout.archive_dir != layout.project_root {
        for path in list_dir(&layout.archive_dir)? {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if path.is_file() && is_partial_package(&file_name) {
                report.partial_packages.push(path);
            }
        }
    }

    for archived in manager.archived_projects()? {
        let s = seen.entry(archived.id).or_default();
        s.name.get_or_insert(archived.name);
        s.packages.push(archived.package);
    }

    report.projects = seen
        .into_iter()
        .map(|(id, s)| {
            let state = match (s.record, s.directory, !s.packages.is_empty()) {
                (true, true, true) => ProjectState::Snapshot,
                (true, true, false) => ProjectState::Active,
                (true, false, _) => ProjectState::StaleRecord,
                (false, true, _) => ProjectState::OrphanDirectory,
                (false, false, _) => ProjectState::Archived,
            };
            ProjectStatus {
                id,
                name: s.name,
                state,
                has_record: s.record,
                has_directory: s.directory,
                packages: s.packages,
            }
        })
        .collect();

    Ok(report)
}

fn is_partial_package(file_name: &str) -> bool {
    file_name.starts_with(PARTIAL_PREFIX) && file_name.ends_with(PARTIAL_SUFFIX)
}

fn list_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    match std::fs::read_dir(dir) {
        Ok(rd) => {
            let mut paths: Vec<PathBuf> = rd.filter_map(|e| e.ok()).map(|e| e.path()).collect();
            paths.sort();
            Ok(paths)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}
