use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser)]
#[command(
    name = "pat",
    about = "Project Archive Tool for Caido workspaces",
    long_about = "List, archive, and restore Caido workspaces.\n\n\
                  Archiving and restoring update Caido's projects.db, so they require --modify.",
    version
)]
pub struct Cli {
    /// Operation to perform
    #[arg(value_enum)]
    pub operation: Operation,

    /// Workspace name (required for archive and restore)
    pub workspace: Option<String>,

    /// Preserve original content (do not delete workspace/archive)
    #[arg(short, long)]
    pub preserve: bool,

    /// Modify the Caido projects.db file to reflect changes
    #[arg(short, long)]
    pub modify: bool,

    /// Output as JSON (list and reconcile)
    #[arg(long)]
    pub json: bool,

    /// Caido data directory containing projects.db and projects/
    #[arg(long, value_name = "DIR")]
    pub data_path: Option<PathBuf>,

    /// Directory holding workspace archives (defaults to the projects directory)
    #[arg(long, value_name = "DIR")]
    pub archive_dir: Option<PathBuf>,

    /// Increase log output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Operation {
    /// List active and archived workspaces
    List,
    /// Package a workspace into <name>-<id>.tgz
    Archive,
    /// Restore a workspace from its package
    Restore,
    /// Report workspaces that are neither cleanly active nor cleanly archived
    Reconcile,
}

impl Operation {
    pub fn mutates_catalog(self) -> bool {
        matches!(self, Operation::Archive | Operation::Restore)
    }
}
