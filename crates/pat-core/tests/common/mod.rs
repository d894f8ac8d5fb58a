use std::path::{Path, PathBuf};

use pat_core::catalog::{CatalogRecord, CatalogStore, ReadWrite};
use pat_core::config::Layout;
use pat_core::project::ProjectStateManager;
use tempfile::TempDir;
use walkdir::WalkDir;

pub const ALPHA_ID: &str = "3f2504e0-4f89-11d3-9a0c-0305e82c3301";
pub const BRAVO_ID: &str = "9b2c9a4e-7d1f-4c3a-8e21-5a6b7c8d9e0f";

pub struct Workspace {
    _tmp: TempDir,
    pub layout: Layout,
    pub catalog: CatalogStore<ReadWrite>,
}

impl Workspace {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::new(tmp.path().join("caido"));
        std::fs::create_dir_all(&layout.project_root).unwrap();
        let catalog = CatalogStore::create(&layout.catalog_path).unwrap();
        Self {
            _tmp: tmp,
            layout,
            catalog,
        }
    }

    pub fn manager(&self) -> ProjectStateManager<'_, ReadWrite> {
        ProjectStateManager::new(&self.catalog, &self.layout)
    }

    /// Register a project in the catalog and give it a small directory tree.
    pub fn add_project(&self, id: &str, name: &str) -> CatalogRecord {
        let record = CatalogRecord {
            id: id.to_string(),
            name: name.to_string(),
            version: "0.39.0".to_string(),
            created_at: "2024-02-10 08:15:00".to_string(),
            updated_at: "2024-02-12 19:02:33".to_string(),
            status: "ready".to_string(),
            selected_at: Some("2024-02-12 19:02:34".to_string()),
        };
        self.catalog.insert(&record).unwrap();

        let dir = self.layout.project_dir(id);
        std::fs::create_dir_all(dir.join("database")).unwrap();
        std::fs::create_dir_all(dir.join("files/empty")).unwrap();
        std::fs::write(dir.join("database/database.caido"), noise(64 * 1024)).unwrap();
        std::fs::write(dir.join("database/database.caido-wal"), b"wal").unwrap();
        std::fs::write(dir.join("settings.json"), format!(r#"{{"name":"{name}"}}"#)).unwrap();
        record
    }

    pub fn package_path(&self, name: &str, id: &str) -> PathBuf {
        self.layout
            .archive_dir
            .join(pat_core::naming::package_file_name(name, id))
    }
}

/// Relative path and contents of every entry under `dir`, sorted.
pub fn snapshot_tree(dir: &Path) -> Vec<(String, Option<Vec<u8>>)> {
    let mut entries: Vec<_> = WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .map(|e| e.unwrap())
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(dir)
                .unwrap()
                .to_string_lossy()
                .into_owned();
            let contents = e
                .file_type()
                .is_file()
                .then(|| std::fs::read(e.path()).unwrap());
            (rel, contents)
        })
        .collect();
    entries.sort();
    entries
}

/// Incompressible bytes, so package sizes track the input.
pub fn noise(len: usize) -> Vec<u8> {
    let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}
