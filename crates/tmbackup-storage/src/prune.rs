use tracing::{info, warn};

use tmbackup_core::address::Destination;
use tmbackup_core::error::{BackupError, Result};
use tmbackup_core::exec::{CommandRunner, Invocation};
use tmbackup_core::snapshot::Timestamp;

use crate::rsync::{contents_of, empty_source, Rsync};

// Only `<timestamp>/` and everything under it is open to deletion.
fn selective_delete_filters(timestamp: &Timestamp) -> [String; 3] {
    [
        format!("--include=/{timestamp}/"),
        format!("--include=/{timestamp}/**"),
        "--exclude=*".to_string(),
    ]
}

const DELETE_EXCLUDED: &str = "--delete-excluded";

// `--delete-excluded` (or an abbreviation of it) would turn `--exclude=*` into
// "delete every sibling snapshot".
fn deletes_excluded(arg: &str) -> bool {
    arg.len() > "--delete-".len() && DELETE_EXCLUDED.starts_with(arg)
}

pub fn prune_invocation(
    rsync: &Rsync,
    empty_source: &str,
    destination: &Destination,
    computer: &str,
    timestamp: &Timestamp,
) -> Invocation {
    let extra = rsync.extra_args().iter().filter(|arg| {
        if deletes_excluded(arg) {
            warn!(arg = arg.as_str(), "ignoring rsync argument for prune");
            return false;
        }
        true
    });
    rsync
        .invocation()
        .args(["--recursive", "--delete"])
        .args(selective_delete_filters(timestamp))
        .args(extra.cloned())
        .arg(empty_source)
        .arg(destination.join(&[computer, ""]))
}

/// Deletes `<destination>/<computer>/<timestamp>` by syncing an empty directory over the
/// computer directory with every other entry excluded. Pruning a missing snapshot succeeds.
pub fn prune(
    runner: &dyn CommandRunner,
    rsync: &Rsync,
    destination: &Destination,
    computer: &str,
    timestamp: &Timestamp,
) -> Result<()> {
    let empty = empty_source()?;
    let invocation = prune_invocation(rsync, &contents_of(&empty), destination, computer, timestamp);
    info!(computer, %timestamp, destination = %destination, "pruning snapshot");

    let output = runner
        .output(&invocation)
        .map_err(|source| BackupError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;
    if !output.success() {
        warn!(computer, %timestamp, stderr = output.stderr.trim(), "prune failed");
        return Err(BackupError::PruneFailure {
            computer: computer.to_string(),
            timestamp: timestamp.to_string(),
            exit_code: output.exit_code(),
        });
    }
    Ok(())
}
