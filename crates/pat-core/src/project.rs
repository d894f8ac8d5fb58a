use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{AccessMode, CatalogRecord, CatalogStore, ReadWrite};
use crate::config::Layout;
use crate::error::{PatError, ProjectSet, Result};
use crate::naming::{self, PACKAGE_EXTENSION, ProjectIdentity};
use crate::package::{self, PackageManifest};

/// A project with both a catalog record and a directory on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveProject {
    pub id: String,
    pub name: String,
    pub dir: PathBuf,
}

/// Where an archived project's identity was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    Manifest,
    FileName,
}

/// A package in the archive directory whose identity could be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchivedProject {
    pub id: String,
    pub name: String,
    pub package: PathBuf,
    /// Top-level directory entry inside the package.
    pub root: String,
    pub source: IdentitySource,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveOutcome {
    pub project: ProjectIdentity,
    pub package: PathBuf,
    pub package_bytes: u64,
    pub source_bytes: u64,
    pub removed_source: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreOutcome {
    pub project: ProjectIdentity,
    pub dir: PathBuf,
    pub record: CatalogRecord,
    pub removed_package: bool,
}

/// Coordinates the catalog, the project directories and the packages.
///
/// Listing and lookup work with any catalog mode; [`archive`](Self::archive)
/// and [`restore`](Self::restore) exist only when the catalog was opened
/// read-write.
pub struct ProjectStateManager<'a, M: AccessMode> {
    catalog: &'a CatalogStore<M>,
    layout: &'a Layout,
}

impl<'a, M: AccessMode> ProjectStateManager<'a, M> {
    pub fn new(catalog: &'a CatalogStore<M>, layout: &'a Layout) -> Self {
        Self { catalog, layout }
    }

    pub fn catalog(&self) -> &CatalogStore<M> {
        self.catalog
    }

    pub fn layout(&self) -> &Layout {
        self.layout
    }

    /// Catalog entries whose directory exists, in catalog order.
    ///
    /// Records without a directory are left out silently.
    pub fn active_projects(&self) -> Result<Vec<ActiveProject>> {
        let mut active = Vec::new();
        for entry in self.catalog.entries()? {
            let dir = self.layout.project_dir(&entry.id);
            if dir.is_dir() {
                active.push(ActiveProject {
                    id: entry.id,
                    name: entry.name,
                    dir,
                });
            } else {
                debug!(id = %entry.id, name = %entry.name, "catalog record has no directory");
            }
        }
        Ok(active)
    }

    /// Packages in the archive directory, sorted by file name.
    ///
    /// Identity comes from the package manifest when there is one and from
    /// the file name otherwise. Files matching neither are ignored.
    pub fn archived_projects(&self) -> Result<Vec<ArchivedProject>> {
        let dir = &self.layout.archive_dir;
        let read_dir = match std::fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut candidates: Vec<(String, PathBuf)> = read_dir
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let file_name = e.file_name().into_string().ok()?;
                let path = e.path();
                (file_name.ends_with(PACKAGE_EXTENSION) && path.is_file())
                    .then_some((file_name, path))
            })
            .collect();
        candidates.sort();

        Ok(candidates
            .into_iter()
            .filter_map(|(file_name, path)| resolve_package(&file_name, path))
            .collect())
    }

    pub fn find_active(&self, name: &str) -> Result<ActiveProject> {
        self.active_projects()?
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| not_found(ProjectSet::Active, name))
    }

    pub fn find_archived(&self, name: &str) -> Result<ArchivedProject> {
        self.archived_projects()?
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| not_found(ProjectSet::Archived, name))
    }
}

impl ProjectStateManager<'_, ReadWrite> {
    /// Package an active project and, unless `preserve` is set, drop its
    /// catalog record and directory.
    ///
    /// Nothing is removed unless the package was written completely.
    pub fn archive(&self, name: &str, preserve: bool) -> Result<ArchiveOutcome> {
        let project = self.find_active(name)?;
        let record = self
            .catalog
            .record(&project.id)?
            .ok_or_else(|| not_found(ProjectSet::Active, name))?;
        check_file_name_safe(&project.name)?;

        let identity = ProjectIdentity::new(&project.id, &project.name);
        let package_path = self.layout.archive_dir.join(identity.package_file_name());
        info!(
            id = %project.id,
            name = %project.name,
            package = %package_path.display(),
            preserve,
            "archiving project"
        );

        let metadata = project.dir.join(package::METADATA_FILE);
        let previous = std::fs::read(&metadata).ok();
        package::write_metadata(&project.dir, &record)?;
        let source_bytes = package::directory_size(&project.dir);
        let package_bytes = package::write_package(
            &project.dir,
            &PackageManifest::for_project(&identity),
            &package_path,
        )
        .inspect_err(|_| {
            // Put back whatever snapshot the directory had before this attempt.
            let undo = match &previous {
                Some(bytes) => std::fs::write(&metadata, bytes),
                None => std::fs::remove_file(&metadata),
            };
            if let Err(e) = undo {
                warn!(path = %metadata.display(), error = %e, "could not undo metadata snapshot");
            }
        })?;

        if !preserve {
            self.catalog.delete(&project.id)?;
            std::fs::remove_dir_all(&project.dir).inspect_err(|e| {
                warn!(
                    dir = %project.dir.display(),
                    error = %e,
                    "catalog record removed but project directory could not be deleted"
                );
            })?;
            info!(id = %project.id, "removed catalog record and project directory");
        }

        Ok(ArchiveOutcome {
            project: identity,
            package: package_path,
            package_bytes,
            source_bytes,
            removed_source: !preserve,
        })
    }

    /// Extract an archived project, re-insert its catalog record and, unless
    /// `preserve` is set, delete the package.
    ///
    /// Refuses to touch anything when the id already has a catalog record or
    /// a directory. Extraction goes through a staging directory that is
    /// dropped on failure, so a failed restore leaves the catalog and the
    /// package as they were.
    pub fn restore(&self, name: &str, preserve: bool) -> Result<RestoreOutcome> {
        let archived = self.find_archived(name)?;
        if self.catalog.contains(&archived.id)? {
            return Err(PatError::DuplicateProject {
                id: archived.id.clone(),
            });
        }
        let dir = self.layout.project_dir(&archived.id);
        if dir.exists() {
            return Err(PatError::DirectoryConflict(dir));
        }
        info!(
            id = %archived.id,
            name = %archived.name,
            package = %archived.package.display(),
            preserve,
            "restoring project"
        );

        let staging = package::staging_dir(&self.layout.project_root)?;
        let extracted = package::extract_package(&archived.package, &archived.root, staging.path())?;

        // The snapshot is checked while still staged, so a bad one leaves no directory behind.
        let record = package::read_metadata(&extracted)?;
        if record.id != archived.id {
            return Err(PatError::Metadata(format!(
                "{} belongs to project {}, expected {}",
                package::METADATA_FILE,
                record.id,
                archived.id
            )));
        }

        std::fs::rename(&extracted, &dir).map_err(|e| PatError::package(&archived.package, e))?;
        if let Err(e) = staging.close() {
            warn!(error = %e, "could not remove restore staging directory");
        }
        self.catalog.insert(&record)?;

        if !preserve {
            std::fs::remove_file(&archived.package)?;
            info!(package = %archived.package.display(), "removed package");
        }

        Ok(RestoreOutcome {
            project: ProjectIdentity::new(&archived.id, &archived.name),
            dir,
            record,
            removed_package: !preserve,
        })
    }
}

fn not_found(set: ProjectSet, name: &str) -> PatError {
    PatError::NotFound {
        set,
        name: name.to_string(),
    }
}

fn check_file_name_safe(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(PatError::Metadata(format!(
            "project name {name:?} cannot be used in a package file name"
        )));
    }
    Ok(())
}

fn resolve_package(file_name: &str, path: PathBuf) -> Option<ArchivedProject> {
    match package::read_manifest(&path) {
        Ok(Some(manifest)) => {
            let identity = manifest.identity();
            return Some(ArchivedProject {
                id: identity.id,
                name: identity.name,
                package: path,
                root: manifest.root,
                source: IdentitySource::Manifest,
            });
        }
        Ok(None) => {}
        Err(e) => warn!(package = %path.display(), error = %e, "unreadable package manifest"),
    }

    let Some(identity) = naming::parse_package_file_name(file_name) else {
        debug!(file = file_name, "ignoring package with unrecognised name");
        return None;
    };
    Some(ArchivedProject {
        root: identity.id.clone(),
        id: identity.id,
        name: identity.name,
        package: path,
        source: IdentitySource::FileName,
    })
}

/// True when `path` names a hidden entry (staging directories, partial packages).
pub(crate) fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::catalog::ReadOnly;

    struct Fixture {
        _tmp: tempfile::TempDir,
        layout: Layout,
        catalog: CatalogStore<ReadWrite>,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let layout = Layout::new(tmp.path());
            std::fs::create_dir_all(&layout.project_root).unwrap();
            let catalog = CatalogStore::create(&layout.catalog_path).unwrap();
            Self {
                _tmp: tmp,
                layout,
                catalog,
            }
        }

        fn add(&self, id: &str, name: &str, with_dir: bool) {
            self.catalog
                .insert(&CatalogRecord {
                    id: id.to_string(),
                    name: name.to_string(),
                    version: "1".to_string(),
                    created_at: "c".to_string(),
                    updated_at: "u".to_string(),
                    status: "ready".to_string(),
                    selected_at: None,
                })
                .unwrap();
            if with_dir {
                std::fs::create_dir_all(self.layout.project_dir(id)).unwrap();
            }
        }

        fn manager(&self) -> ProjectStateManager<'_, ReadWrite> {
            ProjectStateManager::new(&self.catalog, &self.layout)
        }
    }

    #[test]
    fn active_listing_keeps_catalog_order_and_skips_stale() {
        let fx = Fixture::new();
        fx.add("id-b", "bravo", true);
        fx.add("id-a", "alpha", true);
        fx.add("id-s", "stale", false);

        let names: Vec<_> = fx
            .manager()
            .active_projects()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["bravo", "alpha"]);
    }

    #[test]
    fn archived_listing_uses_file_names_when_no_manifest() {
        let fx = Fixture::new();
        let id = "11111111-2222-3333-4444-555555555555";
        // Not a real package: the manifest read fails and the name is used.
        std::fs::write(fx.layout.archive_dir.join(format!("my-project-{id}.tgz")), b"x").unwrap();
        std::fs::write(fx.layout.archive_dir.join("random.tgz"), b"x").unwrap();
        std::fs::write(fx.layout.archive_dir.join("notes.txt"), b"x").unwrap();

        let archived = fx.manager().archived_projects().unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].name, "my-project");
        assert_eq!(archived[0].id, id);
        assert_eq!(archived[0].root, id);
        assert_eq!(archived[0].source, IdentitySource::FileName);
    }

    #[test]
    fn missing_archive_dir_lists_nothing() {
        let fx = Fixture::new();
        let layout = fx.layout.clone().with_archive_dir(fx.layout.data_dir.join("nope"));
        let manager = ProjectStateManager::new(&fx.catalog, &layout);
        assert!(manager.archived_projects().unwrap().is_empty());
    }

    #[test]
    fn lookup_takes_first_match_and_reports_missing() {
        let fx = Fixture::new();
        fx.add("id-1", "dup", true);
        fx.add("id-2", "dup", true);

        assert_eq!(fx.manager().find_active("dup").unwrap().id, "id-1");
        assert_matches!(
            fx.manager().find_active("other"),
            Err(PatError::NotFound { set: ProjectSet::Active, .. })
        );
        assert_matches!(
            fx.manager().find_archived("dup"),
            Err(PatError::NotFound { set: ProjectSet::Archived, .. })
        );
    }

    #[test]
    fn listing_works_read_only() {
        let fx = Fixture::new();
        fx.add("id-1", "alpha", true);
        let ro = CatalogStore::<ReadOnly>::open(&fx.layout.catalog_path).unwrap();
        let manager = ProjectStateManager::new(&ro, &fx.layout);
        assert_eq!(manager.active_projects().unwrap().len(), 1);
    }

    #[test]
    fn archive_rejects_unusable_names_before_side_effects() {
        let fx = Fixture::new();
        fx.add("id-1", "a/b", true);

        assert_matches!(fx.manager().archive("a/b", false), Err(PatError::Metadata(_)));
        assert!(fx.catalog.contains("id-1").unwrap());
        assert!(!fx.layout.project_dir("id-1").join(package::METADATA_FILE).exists());
    }

    #[test]
    fn hidden_entries() {
        assert!(is_hidden(Path::new("/x/.pat-restore-abc")));
        assert!(!is_hidden(Path::new("/x/abc")));
    }
}
