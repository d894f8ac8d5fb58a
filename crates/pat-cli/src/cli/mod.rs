pub mod args;

use bytesize::ByteSize;
use serde::Serialize;
use tracing::debug;

use pat_core::catalog::{CatalogStore, ReadOnly, ReadWrite};
use pat_core::config::{Config, Layout};
use pat_core::error::PatError;
use pat_core::project::{ActiveProject, ArchivedProject, ProjectStateManager};
use pat_core::reconcile::{self, ReconcileReport};

use self::args::{Cli, Operation};

pub fn run(cli: Cli) -> color_eyre::Result<()> {
    // Argument checks come first so misuse never touches the catalog.
    if cli.operation.mutates_catalog() {
        check_mutation_args(&cli)?;
    }

    let config = Config::load()?;
    let layout = config.layout(cli.data_path.as_deref(), cli.archive_dir.as_deref())?;
    debug!(?layout, "resolved data layout");

    match cli.operation {
        Operation::List => cmd_list(&layout, cli.json)?,
        Operation::Reconcile => cmd_reconcile(&layout, cli.json)?,
        Operation::Archive => cmd_archive(&layout, workspace_name(&cli)?, cli.preserve)?,
        Operation::Restore => cmd_restore(&layout, workspace_name(&cli)?, cli.preserve)?,
    }

    Ok(())
}

fn workspace_name(cli: &Cli) -> Result<&str, PatError> {
    cli.workspace
        .as_deref()
        .ok_or_else(|| PatError::CallerMisuse("operation requires a workspace name".to_string()))
}

fn check_mutation_args(cli: &Cli) -> Result<(), PatError> {
    let name = workspace_name(cli)?;
    if !cli.modify {
        return Err(PatError::CallerMisuse(format!(
            "{name}: archive and restore update projects.db; re-run with --modify (-m)"
        )));
    }
    Ok(())
}

fn cmd_list(layout: &Layout, json: bool) -> color_eyre::Result<()> {
    let catalog = CatalogStore::<ReadOnly>::open(&layout.catalog_path)?;
    let manager = ProjectStateManager::new(&catalog, layout);
    let active = manager.active_projects()?;
    let archived = manager.archived_projects()?;

    if json {
        #[derive(Serialize)]
        struct Listing<'a> {
            active: &'a [ActiveProject],
            archived: &'a [ArchivedProject],
        }
        println!(
            "{}",
            serde_json::to_string_pretty(&Listing {
                active: &active,
                archived: &archived,
            })?
        );
        return Ok(());
    }

    println!("Active Workspaces:");
    for p in &active {
        println!("{} ({})", p.name, p.id);
    }
    println!();
    println!("-------------------");
    println!("Archived Workspaces:");
    for p in &archived {
        println!("{} ({})", p.name, p.id);
    }
    println!();
    Ok(())
}

fn cmd_archive(layout: &Layout, name: &str, preserve: bool) -> color_eyre::Result<()> {
    let catalog = CatalogStore::<ReadWrite>::open(&layout.catalog_path)?;
    let manager = ProjectStateManager::new(&catalog, layout);

    let project = manager.find_active(name)?;
    eprintln!("Creating archive of {} ({}).", project.name, project.id);
    eprintln!("This may take some time, depending on project size");

    let outcome = manager.archive(name, preserve)?;
    eprintln!(
        "Wrote {} ({} from {} on disk)",
        outcome.package.display(),
        ByteSize(outcome.package_bytes),
        ByteSize(outcome.source_bytes)
    );
    if outcome.removed_source {
        eprintln!("Complete. Removed workspace directory.");
    } else {
        eprintln!("Complete.");
    }
    Ok(())
}

fn cmd_restore(layout: &Layout, name: &str, preserve: bool) -> color_eyre::Result<()> {
    let catalog = CatalogStore::<ReadWrite>::open(&layout.catalog_path)?;
    let manager = ProjectStateManager::new(&catalog, layout);

    let archived = manager.find_archived(name)?;
    eprintln!("Restoring archive {}.", archived.package.display());
    eprintln!("This may take some time, depending on project size");

    let outcome = manager.restore(name, preserve)?;
    eprintln!(
        "Restored {} ({}) to {}",
        outcome.project.name,
        outcome.project.id,
        outcome.dir.display()
    );
    if outcome.removed_package {
        eprintln!("Complete. Removed workspace archive.");
    } else {
        eprintln!("Complete.");
    }
    Ok(())
}

fn cmd_reconcile(layout: &Layout, json: bool) -> color_eyre::Result<()> {
    let catalog = CatalogStore::<ReadOnly>::open(&layout.catalog_path)?;
    let manager = ProjectStateManager::new(&catalog, layout);
    let report = reconcile::reconcile(&manager)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &ReconcileReport) {
    println!(
        "  {:<38} {:<20} {:<17} {:<6} {:<4} {:<8}",
        "ID", "Name", "State", "Record", "Dir", "Packages"
    );
    println!("  {}", "-".repeat(98));

    let yes_no = |b: bool| if b { "yes" } else { "no" };
    for p in &report.projects {
        println!(
            "  {:<38} {:<20} {:<17} {:<6} {:<4} {:<8}",
            p.id,
            p.name.as_deref().unwrap_or("-"),
            p.state.to_string(),
            yes_no(p.has_record),
            yes_no(p.has_directory),
            p.packages.len(),
        );
    }

    for path in &report.staging_leftovers {
        println!("  leftover restore staging directory: {}", path.display());
    }
    for path in &report.partial_packages {
        println!("  leftover partial package: {}", path.display());
    }

    println!();
    if report.is_clean() {
        println!("No inconsistencies found.");
    } else {
        let issues = report.issues().count()
            + report.staging_leftovers.len()
            + report.partial_packages.len();
        println!("{issues} item(s) need manual attention. Nothing was changed.");
    }
}
