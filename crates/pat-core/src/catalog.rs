//! The host application's project catalog (`projects.db`).
//!
//! The access mode is part of the store's type: a [`CatalogStore<ReadOnly>`]
//! cannot insert or delete records, so mutating operations further up the
//! stack require a [`CatalogStore<ReadWrite>`] handle.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, OpenFlags, OptionalExtension, Row, params};
use serde::Serialize;
use tracing::debug;

use crate::error::{PatError, Result};

/// Schema used by the host application. Only needed to create fresh catalogs.
pub const SCHEMA: &str = r#"CREATE TABLE IF NOT EXISTS "projects" (
    id text NOT NULL PRIMARY KEY,
    name text NOT NULL,
    version text NOT NULL,
    created_at datetime NOT NULL,
    updated_at datetime NOT NULL,
    "status" TEXT NOT NULL DEFAULT 'ready',
    selected_at datetime
)"#;

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::ReadOnly {}
    impl Sealed for super::ReadWrite {}
}

/// Connection mode for a [`CatalogStore`].
pub trait AccessMode: sealed::Sealed {
    const FLAGS: OpenFlags;
    const LABEL: &'static str;
}

#[derive(Debug)]
pub struct ReadOnly;

#[derive(Debug)]
pub struct ReadWrite;

impl AccessMode for ReadOnly {
    const FLAGS: OpenFlags = OpenFlags::SQLITE_OPEN_READ_ONLY;
    const LABEL: &'static str = "read-only";
}

impl AccessMode for ReadWrite {
    const FLAGS: OpenFlags = OpenFlags::SQLITE_OPEN_READ_WRITE;
    const LABEL: &'static str = "read-write";
}

/// `(id, name)` pair as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
}

/// A full catalog row, in column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRecord {
    pub id: String,
    pub name: String,
    pub version: String,
    pub created_at: String,
    pub updated_at: String,
    pub status: String,
    pub selected_at: Option<String>,
}

impl CatalogRecord {
    /// Fields in column order. A missing `selected_at` is rendered as an empty string.
    pub fn fields(&self) -> [&str; 7] {
        [
            &self.id,
            &self.name,
            &self.version,
            &self.created_at,
            &self.updated_at,
            &self.status,
            self.selected_at.as_deref().unwrap_or(""),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: text_column(row, 0)?.unwrap_or_default(),
            name: text_column(row, 1)?.unwrap_or_default(),
            version: text_column(row, 2)?.unwrap_or_default(),
            created_at: text_column(row, 3)?.unwrap_or_default(),
            updated_at: text_column(row, 4)?.unwrap_or_default(),
            status: text_column(row, 5)?.unwrap_or_default(),
            selected_at: text_column(row, 6)?,
        })
    }
}

/// Read any SQLite value as text. The catalog declares several columns as
/// `datetime`, which has numeric affinity, so values are not always TEXT.
///
/// Bytes that are not UTF-8 fail with [`rusqlite::Error::Utf8Error`] rather
/// than being replaced.
fn text_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => Some(
            std::str::from_utf8(bytes)
                .map_err(rusqlite::Error::Utf8Error)?
                .to_string(),
        ),
    })
}

fn read_error(e: rusqlite::Error) -> PatError {
    match e {
        rusqlite::Error::Utf8Error(e) => {
            PatError::Metadata(format!("catalog value is not valid UTF-8: {e}"))
        }
        e => PatError::Catalog(e),
    }
}

/// Handle on the catalog database, opened in mode `M`.
///
/// The connection is closed when the store is dropped.
#[derive(Debug)]
pub struct CatalogStore<M: AccessMode> {
    conn: Connection,
    path: PathBuf,
    _mode: PhantomData<M>,
}

impl<M: AccessMode> CatalogStore<M> {
    /// Open an existing catalog. Never creates the file.
    pub fn open(path: &Path) -> Result<Self> {
        let unavailable = |source: Box<dyn std::error::Error + Send + Sync>| {
            PatError::StoreUnavailable {
                path: path.to_path_buf(),
                source,
            }
        };

        if !path.is_file() {
            return Err(unavailable(Box::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "catalog file does not exist",
            ))));
        }

        let conn = Connection::open_with_flags(path, M::FLAGS | OpenFlags::SQLITE_OPEN_NO_MUTEX)
            .map_err(|e| unavailable(Box::new(e)))?;

        // Surfaces "not a database" and a missing table up front rather than mid-operation.
        conn.prepare("SELECT id FROM projects LIMIT 1")
            .map_err(|e| unavailable(Box::new(e)))?;

        debug!(path = %path.display(), mode = M::LABEL, "opened catalog");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            _mode: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All `(id, name)` pairs in catalog iteration order.
    pub fn entries(&self) -> Result<Vec<CatalogEntry>> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM projects")?;
        let rows = stmt.query_map([], |row| {
            Ok(CatalogEntry {
                id: text_column(row, 0)?.unwrap_or_default(),
                name: text_column(row, 1)?.unwrap_or_default(),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(read_error)
    }

    pub fn record(&self, id: &str) -> Result<Option<CatalogRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, name, version, created_at, updated_at, status, selected_at \
                 FROM projects WHERE id = ?1",
                params![id],
                CatalogRecord::from_row,
            )
            .optional()
            .map_err(read_error)?;
        Ok(record)
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM projects WHERE id = ?1",
                params![id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl CatalogStore<ReadWrite> {
    /// Create a catalog file with the host schema. Fails if the file exists.
    pub fn create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Err(PatError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already exists", path.display()),
            )));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            _mode: PhantomData,
        })
    }

    /// Insert a record. A primary-key collision is reported as
    /// [`PatError::DuplicateProject`] and leaves the existing row untouched.
    pub fn insert(&self, record: &CatalogRecord) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let result = tx.execute(
            "INSERT INTO projects (id, name, version, created_at, updated_at, status, selected_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.name,
                record.version,
                record.created_at,
                record.updated_at,
                record.status,
                record.selected_at,
            ],
        );

        match result {
            Ok(_) => {
                tx.commit()?;
                debug!(id = %record.id, "inserted catalog record");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation
                    && matches!(
                        err.extended_code,
                        rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                            | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    ) =>
            {
                Err(PatError::DuplicateProject {
                    id: record.id.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the record for `id`. Returns whether a row was removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let removed = tx.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        tx.commit()?;
        debug!(id, removed, "deleted catalog record");
        Ok(removed > 0)
    }
}
