use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{PatError, Result};

const CATALOG_FILE: &str = "projects.db";
const PROJECTS_DIR: &str = "projects";

/// User configuration loaded from `~/.config/pat/config.toml`.
///
/// Every field is optional so the config file is too. Command-line flags
/// take precedence over anything set here.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Root of the Caido data directory (holds `projects.db` and `projects/`).
    pub data_path: Option<PathBuf>,
    /// Where packages are written and looked up. Defaults to the project root.
    pub archive_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PatError::Config(Box::new(e)))?;
        toml::from_str(&content).map_err(|e| PatError::Config(Box::new(e)))
    }

    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "pat").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Resolve the on-disk layout, preferring explicit overrides over config values
    /// and config values over the platform default.
    pub fn layout(&self, data_path: Option<&Path>, archive_dir: Option<&Path>) -> Result<Layout> {
        let data_dir = data_path
            .map(Path::to_path_buf)
            .or_else(|| self.data_path.clone())
            .or_else(default_data_dir)
            .ok_or_else(|| PatError::StoreUnavailable {
                path: PathBuf::from(CATALOG_FILE),
                source: "could not locate the Caido data directory (use --data-path)".into(),
            })?;

        let mut layout = Layout::new(data_dir);
        if let Some(dir) = archive_dir
            .map(Path::to_path_buf)
            .or_else(|| self.archive_dir.clone())
        {
            layout = layout.with_archive_dir(dir);
        }
        Ok(layout)
    }
}

/// The host application's data directory, if it exists on this machine.
///
/// Resolves to `~/.local/share/caido` on Linux,
/// `~/Library/Application Support/io.caido.Caido` on macOS and
/// `%APPDATA%\caido\Caido\data` on Windows.
pub fn default_data_dir() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("io", "caido", "Caido")?;
    let path = dirs.data_dir();
    path.is_dir().then(|| path.to_path_buf())
}

/// Filesystem locations of the catalog, the project directories and the packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub data_dir: PathBuf,
    pub catalog_path: PathBuf,
    pub project_root: PathBuf,
    pub archive_dir: PathBuf,
}

impl Layout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let project_root = data_dir.join(PROJECTS_DIR);
        Self {
            catalog_path: data_dir.join(CATALOG_FILE),
            archive_dir: project_root.clone(),
            project_root,
            data_dir,
        }
    }

    pub fn with_archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = dir.into();
        self
    }

    pub fn project_dir(&self, id: &str) -> PathBuf {
        self.project_root.join(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_defaults_archive_dir_to_project_root() {
        let layout = Layout::new("/data/caido");
        assert_eq!(layout.catalog_path, PathBuf::from("/data/caido/projects.db"));
        assert_eq!(layout.project_root, PathBuf::from("/data/caido/projects"));
        assert_eq!(layout.archive_dir, layout.project_root);
        assert_eq!(
            layout.project_dir("abc"),
            PathBuf::from("/data/caido/projects/abc")
        );
    }

    #[test]
    fn flags_override_config() {
        let config = Config {
            data_path: Some(PathBuf::from("/from/config")),
            archive_dir: Some(PathBuf::from("/archives/config")),
        };

        let layout = config.layout(None, None).unwrap();
        assert_eq!(layout.data_dir, PathBuf::from("/from/config"));
        assert_eq!(layout.archive_dir, PathBuf::from("/archives/config"));

        let layout = config
            .layout(Some(Path::new("/from/flag")), Some(Path::new("/archives/flag")))
            .unwrap();
        assert_eq!(layout.data_dir, PathBuf::from("/from/flag"));
        assert_eq!(layout.archive_dir, PathBuf::from("/archives/flag"));
    }

    #[test]
    fn parses_partial_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "archive_dir = \"/mnt/cold\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.data_path, None);
        assert_eq!(config.archive_dir, Some(PathBuf::from("/mnt/cold")));
    }

    #[test]
    fn rejects_malformed_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "archive_dir = [").unwrap();

        assert!(matches!(Config::load_from(&path), Err(PatError::Config(_))));
    }
}
