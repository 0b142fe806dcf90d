use std::path::Path;
use tracing::{error, info, warn};

use tmbackup_core::address::Destination;
use tmbackup_core::cancel::CancelFlag;
use tmbackup_core::exec::CommandRunner;
use tmbackup_core::plan::plan_computer;
use tmbackup_core::snapshot::{scan_local, Timestamp};
use tmbackup_core::{BackupError, Result};
use tmbackup_storage::{ensure_computer_dir, list_remote, prune, Rsync, Transfer};

#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    pub computers: Vec<String>,
    pub prune: bool,
    pub dry_run: bool,
}

#[derive(Debug, Default)]
pub struct BackupSummary {
    pub transferred: usize,
    pub refreshed: usize,
    pub up_to_date: usize,
    pub pruned: usize,
    pub failed: Vec<(String, String)>,
}

struct Context<'a> {
    runner: &'a dyn CommandRunner,
    rsync: &'a Rsync,
    source_root: &'a Path,
    destination: &'a Destination,
    options: &'a BackupOptions,
    cancel: &'a CancelFlag,
}

// A failing computer is recorded in the summary and the next one is attempted.
// Cancellation stops the whole run.
pub fn run_backup(
    runner: &dyn CommandRunner,
    rsync: &Rsync,
    source_root: &Path,
    destination: &Destination,
    options: &BackupOptions,
    cancel: &CancelFlag,
) -> Result<BackupSummary> {
    let catalog = scan_local(source_root)?;
    for wanted in &options.computers {
        if !catalog.contains_key(wanted) {
            warn!(computer = %wanted, "no snapshots for computer in source");
        }
    }

    let ctx = Context {
        runner,
        rsync,
        source_root,
        destination,
        options,
        cancel,
    };
    let mut summary = BackupSummary::default();
    for (computer, local) in &catalog {
        if !options.computers.is_empty() && !options.computers.contains(computer) {
            continue;
        }
        match backup_computer(&ctx, computer, local, &mut summary) {
            Ok(()) => {}
            Err(BackupError::Cancelled) => return Err(BackupError::Cancelled),
            Err(err) => {
                error!(computer = %computer, error = %err, "backup failed");
                summary.failed.push((computer.clone(), err.to_string()));
            }
        }
    }
    Ok(summary)
}

fn backup_computer(
    ctx: &Context<'_>,
    computer: &str,
    local: &[Timestamp],
    summary: &mut BackupSummary,
) -> Result<()> {
    ctx.cancel.check()?;
    let remote = list_remote(ctx.runner, ctx.rsync, ctx.destination, computer)?;
    let plan = plan_computer(local, &remote);
    info!(
        computer,
        local = local.len(),
        remote = remote.len(),
        to_transfer = plan.transfers.len(),
        stale = plan.stale.len(),
        "planned"
    );
    summary.up_to_date += local.len() - plan.transfers.len();

    if remote.is_empty() && !plan.transfers.is_empty() && !ctx.options.dry_run {
        ensure_computer_dir(ctx.runner, ctx.rsync, ctx.destination, computer)?;
    }

    for step in &plan.transfers {
        ctx.cancel.check()?;
        let transfer = Transfer {
            source_root: ctx.source_root,
            computer,
            timestamp: &step.timestamp,
            previous: step.previous.as_ref(),
            destination: ctx.destination,
        };
        if ctx.options.dry_run {
            info!(command = %transfer.invocation(ctx.rsync), "dry run: would transfer");
        } else {
            transfer.run(ctx.runner, ctx.rsync)?;
        }
        if step.refresh {
            summary.refreshed += 1;
        } else {
            summary.transferred += 1;
        }
    }

    if !ctx.options.prune {
        if !plan.stale.is_empty() {
            info!(computer, stale = plan.stale.len(), "stale snapshots kept; pass --prune to remove");
        }
        return Ok(());
    }
    for stale in &plan.stale {
        ctx.cancel.check()?;
        if ctx.options.dry_run {
            info!(computer, timestamp = %stale, "dry run: would prune");
        } else {
            prune(ctx.runner, ctx.rsync, ctx.destination, computer, stale)?;
        }
        summary.pruned += 1;
    }
    Ok(())
}
