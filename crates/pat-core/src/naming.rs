//! Package file names.
//!
//! A package is named `<name>-<id>.tgz`. Ids are UUIDs, which contain four
//! hyphens of their own, so the stem is split from the right with at most
//! five cuts: the five rightmost pieces form the id and whatever is left
//! (hyphens included) is the name.

use serde::{Deserialize, Serialize};

pub const PACKAGE_EXTENSION: &str = ".tgz";

const ID_PARTS: usize = 5;

/// The `{id, name}` pair that identifies a project across its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectIdentity {
    pub id: String,
    pub name: String,
}

impl ProjectIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn package_file_name(&self) -> String {
        package_file_name(&self.name, &self.id)
    }
}

pub fn package_file_name(name: &str, id: &str) -> String {
    format!("{name}-{id}{PACKAGE_EXTENSION}")
}

/// Recover identity from a legacy package file name.
///
/// Returns `None` unless the name ends in `.tgz` and the stem splits into
/// exactly six pieces.
pub fn parse_package_file_name(file_name: &str) -> Option<ProjectIdentity> {
    let stem = file_name.strip_suffix(PACKAGE_EXTENSION)?;
    let mut parts: Vec<&str> = stem.rsplitn(ID_PARTS + 1, '-').collect();
    if parts.len() != ID_PARTS + 1 {
        return None;
    }
    let name = parts.pop()?;
    parts.reverse();
    Some(ProjectIdentity::new(parts.join("-"), name))
}
