use tracing::debug;

use tmbackup_core::address::Destination;
use tmbackup_core::error::{BackupError, Result};
use tmbackup_core::exec::{CommandRunner, Invocation};
use tmbackup_core::snapshot::{parse_listing, Timestamp};

use crate::rsync::Rsync;

const PARTIAL_TRANSFER: i32 = 23;

pub fn listing_invocation(rsync: &Rsync, destination: &Destination, computer: &str) -> Invocation {
    rsync
        .invocation()
        .arg("--list-only")
        .args(rsync.extra_args().iter().cloned())
        .arg(destination.join(&[computer, ""]))
}

pub fn list_remote(
    runner: &dyn CommandRunner,
    rsync: &Rsync,
    destination: &Destination,
    computer: &str,
) -> Result<Vec<Timestamp>> {
    let invocation = listing_invocation(rsync, destination, computer);
    let output = runner
        .output(&invocation)
        .map_err(|source| BackupError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

    if output.success() {
        return Ok(parse_listing(&output.stdout));
    }
    if output.code == Some(PARTIAL_TRANSFER) && output.stderr.contains("No such file or directory") {
        debug!(computer, destination = %destination, "no snapshots on destination yet");
        return Ok(Vec::new());
    }
    Err(BackupError::ListingFailure {
        destination: destination.join(&[computer]),
        exit_code: output.exit_code(),
        stderr: output.stderr.trim().to_string(),
    })
}
