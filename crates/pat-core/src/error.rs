use std::fmt;
use std::path::PathBuf;

/// Which half of the lifecycle a name lookup was made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectSet {
    Active,
    Archived,
}

impl fmt::Display for ProjectSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectSet::Active => write!(f, "active workspace"),
            ProjectSet::Archived => write!(f, "archived workspace"),
        }
    }
}

/// Errors produced by core `pat` operations.
#[derive(Debug, thiserror::Error)]
pub enum PatError {
    #[error("{set} not found: {name}")]
    NotFound { set: ProjectSet, name: String },

    #[error("project {id} already has a catalog record; not restoring over it")]
    DuplicateProject { id: String },

    #[error("restore target already exists: {}", .0.display())]
    DirectoryConflict(PathBuf),

    #[error("catalog unavailable at {}: {source}", .path.display())]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("package error at {}: {source}", .path.display())]
    PackageIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("metadata error: {0}")]
    Metadata(String),

    #[error("{0}")]
    CallerMisuse(String),

    #[error("catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    #[error("failed to read config: {0}")]
    Config(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PatError {
    pub(crate) fn package(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PatError::PackageIo {
            path: path.into(),
            source,
        }
    }

    /// Process exit status the CLI should use for this error, if it has a dedicated one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            PatError::CallerMisuse(_) => Some(1),
            PatError::NotFound {
                set: ProjectSet::Active,
                ..
            } => Some(2),
            PatError::NotFound {
                set: ProjectSet::Archived,
                ..
            } => Some(3),
            _ => None,
        }
    }
}

pub type Result<T, E = PatError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn not_found(set: ProjectSet) -> PatError {
        PatError::NotFound {
            set,
            name: "alpha".to_string(),
        }
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        assert_eq!(PatError::CallerMisuse("no name".to_string()).exit_code(), Some(1));
        assert_eq!(not_found(ProjectSet::Active).exit_code(), Some(2));
        assert_eq!(not_found(ProjectSet::Archived).exit_code(), Some(3));
    }

    #[test]
    fn other_errors_have_no_dedicated_exit_code() {
        let errors = [
            PatError::DuplicateProject {
                id: "id-1".to_string(),
            },
            PatError::DirectoryConflict(PathBuf::from("/projects/id-1")),
            PatError::Metadata("bad".to_string()),
            PatError::Io(std::io::Error::other("disk")),
            PatError::package("/projects/a.tgz", std::io::Error::other("short read")),
        ];
        for err in errors {
            assert_eq!(err.exit_code(), None, "{err}");
        }
    }

    #[test]
    fn not_found_names_the_set() {
        assert_eq!(
            not_found(ProjectSet::Archived).to_string(),
            "archived workspace not found: alpha"
        );
    }
}
