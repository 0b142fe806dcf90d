use std::path::Path;
use tracing::{info, warn};

use tmbackup_core::address::{join_segments, Destination};
use tmbackup_core::error::{BackupError, ExitCode, Result};
use tmbackup_core::exec::{run_checked, CommandRunner, Invocation};
use tmbackup_core::snapshot::Timestamp;

use crate::rsync::{contents_of, empty_source, Rsync};

#[derive(Debug, Clone, Copy)]
pub struct Transfer<'a> {
    pub source_root: &'a Path,
    pub computer: &'a str,
    pub timestamp: &'a Timestamp,
    pub previous: Option<&'a Timestamp>,
    pub destination: &'a Destination,
}

impl Transfer<'_> {
    pub fn invocation(&self, rsync: &Rsync) -> Invocation {
        let mut invocation = rsync
            .invocation()
            .args(["--archive", "--relative", "--delete", "--numeric-ids"])
            .args(rsync.extra_args().iter().cloned());

        if let Some(previous) = self.previous {
            invocation = invocation
                .arg("--link-dest")
                .arg(self.destination.predecessor(self.computer, previous.as_str()));
        }

        // The "/./" marker makes --relative recreate nothing above the snapshot contents.
        let source = join_segments(
            &self.source_root.to_string_lossy(),
            &[self.computer, self.timestamp.as_str(), ".", ""],
        );
        let target = self
            .destination
            .join(&[self.computer, self.timestamp.as_str()]);
        invocation.arg(source).arg(target)
    }

    pub fn run(&self, runner: &dyn CommandRunner, rsync: &Rsync) -> Result<()> {
        let invocation = self.invocation(rsync);
        info!(
            computer = self.computer,
            timestamp = %self.timestamp,
            previous = self.previous.map(Timestamp::as_str).unwrap_or("none"),
            "transferring snapshot"
        );
        let code = runner
            .status(&invocation)
            .map_err(|source| BackupError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;
        if code != Some(0) {
            warn!(computer = self.computer, timestamp = %self.timestamp, code = ?code, "transfer failed");
            return Err(BackupError::TransferFailure {
                computer: self.computer.to_string(),
                timestamp: self.timestamp.to_string(),
                exit_code: ExitCode(code),
            });
        }
        Ok(())
    }
}

pub fn ensure_computer_dir(
    runner: &dyn CommandRunner,
    rsync: &Rsync,
    destination: &Destination,
    computer: &str,
) -> Result<()> {
    let empty = empty_source()?;
    let invocation = rsync
        .invocation()
        .args(["--recursive", "--exclude=*"])
        .args(rsync.extra_args().iter().cloned())
        .arg(contents_of(&empty))
        .arg(destination.join(&[computer, ""]));
    run_checked(runner, &invocation)?;
    Ok(())
}
