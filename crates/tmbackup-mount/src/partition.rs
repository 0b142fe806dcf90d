use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

use tmbackup_core::error::{BackupError, Result};
use tmbackup_core::exec::{run_checked, CommandRunner, Invocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionGeometry {
    pub offset: u64,
    pub size: u64,
}

// Number, Start, End, Size, optional msdos Type, File system.
fn partition_row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*[0-9]+\s+([0-9]+)B\s+[0-9]+B\s+([0-9]+)B\s+(?:(?:primary|logical|extended)\s+)?(\S+)",
        )
        .expect("valid regex")
    })
}

pub fn parse_partition_table(output: &str, filesystem: &str) -> Option<PartitionGeometry> {
    output.lines().find_map(|line| {
        let caps = partition_row_re().captures(line)?;
        if &caps[3] != filesystem {
            return None;
        }
        Some(PartitionGeometry {
            offset: caps[1].parse().ok()?,
            size: caps[2].parse().ok()?,
        })
    })
}

pub fn locate_partition(
    runner: &dyn CommandRunner,
    parted: &str,
    image: &Path,
    filesystem: &str,
) -> Result<PartitionGeometry> {
    let invocation = Invocation::new(parted)
        .arg(image.to_string_lossy())
        .args(["unit", "B", "print"]);
    let output = run_checked(runner, &invocation)?;
    let geometry = parse_partition_table(&output.stdout, filesystem).ok_or_else(|| {
        BackupError::PartitionNotFound {
            image: image.to_path_buf(),
            filesystem: filesystem.to_string(),
        }
    })?;
    debug!(image = %image.display(), offset = geometry.offset, size = geometry.size, "located partition");
    Ok(geometry)
}
