//! Package codec: a gzip-compressed tar holding one project directory.
//!
//! Packages written here start with a small identity manifest entry, followed
//! by the project tree rooted at `<id>/`. Packages without a manifest (older
//! ones) are still readable; their identity comes from the file name.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

use crate::catalog::CatalogRecord;
use crate::error::{PatError, Result};
use crate::naming::ProjectIdentity;

/// Snapshot of the catalog record, written into the project directory before packaging.
pub const METADATA_FILE: &str = "metadata.txt";
pub const MANIFEST_ENTRY: &str = ".pat-manifest.toml";

pub const PARTIAL_PREFIX: &str = ".pat-package-";
pub const PARTIAL_SUFFIX: &str = ".partial";
pub const STAGING_PREFIX: &str = ".pat-restore-";

const MANIFEST_FORMAT: u32 = 1;
const MANIFEST_MAX_BYTES: u64 = 64 * 1024;
const METADATA_FIELDS: usize = 7;

/// Identity record stored as the first entry of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    pub format: u32,
    pub id: String,
    pub name: String,
    /// Name of the top-level directory entry inside the package.
    pub root: String,
}

impl PackageManifest {
    pub fn for_project(identity: &ProjectIdentity) -> Self {
        Self {
            format: MANIFEST_FORMAT,
            id: identity.id.clone(),
            name: identity.name.clone(),
            root: identity.id.clone(),
        }
    }

    pub fn identity(&self) -> ProjectIdentity {
        ProjectIdentity::new(&self.id, &self.name)
    }
}

fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

// --- metadata snapshot ---

pub fn encode_metadata(record: &CatalogRecord) -> Result<String> {
    let fields = record.fields();
    if let Some(field) = fields.iter().find(|f| f.contains('\n')) {
        return Err(PatError::Metadata(format!(
            "field {field:?} of project {} contains a newline and cannot be snapshotted",
            record.id
        )));
    }
    let mut out = String::new();
    for field in fields {
        out.push_str(field);
        out.push('\n');
    }
    Ok(out)
}

/// Parse a snapshot written by [`encode_metadata`].
///
/// Snapshots whose every line ends in `\r\n` (written in text mode on
/// Windows) are read with that separator instead.
pub fn decode_metadata(text: &str) -> Result<CatalogRecord> {
    let crlf = text.ends_with("\r\n") && text.matches('\n').count() == text.matches("\r\n").count();
    let separator = if crlf { "\r\n" } else { "\n" };
    let body = text.strip_suffix(separator).unwrap_or(text);
    let fields: Vec<&str> = body.split(separator).collect();
    let [id, name, version, created_at, updated_at, status, selected_at] = fields[..] else {
        return Err(PatError::Metadata(format!(
            "expected {METADATA_FIELDS} lines in {METADATA_FILE}, found {}",
            fields.len()
        )));
    };
    Ok(CatalogRecord {
        id: id.to_string(),
        name: name.to_string(),
        version: version.to_string(),
        created_at: created_at.to_string(),
        updated_at: updated_at.to_string(),
        status: status.to_string(),
        selected_at: (!selected_at.is_empty()).then(|| selected_at.to_string()),
    })
}

pub fn write_metadata(project_dir: &Path, record: &CatalogRecord) -> Result<PathBuf> {
    let path = project_dir.join(METADATA_FILE);
    std::fs::write(&path, encode_metadata(record)?)?;
    Ok(path)
}

pub fn read_metadata(project_dir: &Path) -> Result<CatalogRecord> {
    let path = project_dir.join(METADATA_FILE);
    let text = std::fs::read_to_string(&path)
        .map_err(|e| PatError::Metadata(format!("could not read {}: {e}", path.display())))?;
    decode_metadata(&text)
}

// --- writing ---

/// Package `source_dir` into `dest`, returning the package size in bytes.
///
/// The package is assembled in a hidden temporary file next to `dest` and
/// renamed into place only once complete, so `dest` never holds a partial
/// package. An existing package at `dest` is replaced.
pub fn write_package(source_dir: &Path, manifest: &PackageManifest, dest: &Path) -> Result<u64> {
    let io_err = |e| PatError::package(dest, e);

    if !source_dir.is_dir() {
        return Err(io_err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("project directory {} does not exist", source_dir.display()),
        )));
    }

    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent).map_err(io_err)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .suffix(PARTIAL_SUFFIX)
        .tempfile_in(parent)
        .map_err(io_err)?;

    build_package(BufWriter::new(tmp.as_file_mut()), source_dir, manifest)
        .and_then(|w| w.into_inner().map_err(|e| e.into_error()))
        .and_then(|f| f.sync_all())
        .map_err(io_err)?;

    let size = tmp.as_file().metadata().map_err(io_err)?.len();
    debug!(tmp = %tmp.path().display(), size, "package assembled");
    tmp.persist(dest).map_err(|e| io_err(e.error))?;
    Ok(size)
}

fn build_package<W: Write>(writer: W, source_dir: &Path, manifest: &PackageManifest) -> io::Result<W> {
    let encoder = GzEncoder::new(writer, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let manifest_bytes = toml::to_string(manifest).map_err(io::Error::other)?.into_bytes();
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(manifest_bytes.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    );
    builder.append_data(&mut header, MANIFEST_ENTRY, manifest_bytes.as_slice())?;

    builder.append_dir_all(&manifest.root, source_dir)?;
    builder.into_inner()?.finish()
}

// --- reading ---

fn open_archive(package: &Path) -> io::Result<tar::Archive<GzDecoder<BufReader<File>>>> {
    let file = File::open(package)?;
    Ok(tar::Archive::new(GzDecoder::new(BufReader::new(file))))
}

/// Read the identity manifest, if the package has one.
///
/// Only the first entry is inspected, so this stays cheap for large packages.
pub fn read_manifest(package: &Path) -> Result<Option<PackageManifest>> {
    let io_err = |e| PatError::package(package, e);

    let mut archive = open_archive(package).map_err(io_err)?;
    let mut entries = archive.entries().map_err(io_err)?;
    let Some(entry) = entries.next() else {
        return Ok(None);
    };
    let entry = entry.map_err(io_err)?;
    if entry.path().map_err(io_err)? != Path::new(MANIFEST_ENTRY) {
        return Ok(None);
    }

    let mut text = String::new();
    entry
        .take(MANIFEST_MAX_BYTES)
        .read_to_string(&mut text)
        .map_err(io_err)?;
    let manifest: PackageManifest =
        toml::from_str(&text).map_err(|e| io_err(invalid_data(format!("bad manifest: {e}"))))?;
    if manifest.format > MANIFEST_FORMAT {
        return Err(io_err(invalid_data(format!(
            "unsupported manifest format {}",
            manifest.format
        ))));
    }
    Ok(Some(manifest))
}

/// Create a hidden staging directory under `root` for extraction.
///
/// The directory and whatever was extracted into it are removed on drop.
pub fn staging_dir(root: &Path) -> Result<TempDir> {
    std::fs::create_dir_all(root)?;
    Ok(tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(root)?)
}

/// Extract the tree rooted at `root_name` from `package` into `dest`,
/// returning the path of the extracted root directory.
///
/// The manifest entry is skipped. Entries outside `root_name/`, or whose
/// paths would escape `dest`, make the extraction fail.
pub fn extract_package(package: &Path, root_name: &str, dest: &Path) -> Result<PathBuf> {
    let io_err = |e| PatError::package(package, e);

    let mut archive = open_archive(package).map_err(io_err)?;
    archive.set_preserve_permissions(true);

    let mut count = 0usize;
    for entry in archive.entries().map_err(io_err)? {
        let mut entry = entry.map_err(io_err)?;
        let path = entry.path().map_err(io_err)?.into_owned();
        if path == Path::new(MANIFEST_ENTRY) {
            continue;
        }

        let in_root = matches!(
            path.components().next(),
            Some(Component::Normal(first)) if first == OsStr::new(root_name)
        );
        if !in_root {
            return Err(io_err(invalid_data(format!(
                "entry {} is outside the project root {root_name}",
                path.display()
            ))));
        }
        if !entry.unpack_in(dest).map_err(io_err)? {
            return Err(io_err(invalid_data(format!(
                "entry {} has an unsafe path",
                path.display()
            ))));
        }
        count += 1;
    }

    let extracted = dest.join(root_name);
    if !extracted.is_dir() {
        return Err(io_err(invalid_data(format!(
            "package has no {root_name} directory"
        ))));
    }
    debug!(entries = count, dest = %extracted.display(), "package extracted");
    Ok(extracted)
}

/// Total size of regular files under `dir`.
pub fn directory_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.metadata().map(|m| m.len()).unwrap_or(0))
        .sum()
}
