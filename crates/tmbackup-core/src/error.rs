use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountLayer {
    SparseBundle,
    LoopDevice,
    Filesystem,
    TimeMachine,
}

impl fmt::Display for MountLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MountLayer::SparseBundle => "sparse bundle",
            MountLayer::LoopDevice => "loop device",
            MountLayer::Filesystem => "filesystem",
            MountLayer::TimeMachine => "time machine",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub Option<i32>);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "exit code {code}"),
            None => f.write_str("termination by signal"),
        }
    }
}

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("failed to mount {layer} layer: {reason}")]
    MountFailure { layer: MountLayer, reason: String },

    #[error("no {filesystem} partition found in {}", image.display())]
    PartitionNotFound { image: PathBuf, filesystem: String },

    #[error("transfer of {computer}/{timestamp} failed with {exit_code}")]
    TransferFailure {
        computer: String,
        timestamp: String,
        exit_code: ExitCode,
    },

    #[error("prune of {computer}/{timestamp} failed with {exit_code}")]
    PruneFailure {
        computer: String,
        timestamp: String,
        exit_code: ExitCode,
    },

    #[error("listing {destination} failed with {exit_code}: {stderr}")]
    ListingFailure {
        destination: String,
        exit_code: ExitCode,
        stderr: String,
    },

    #[error("{program} failed with {exit_code}: {stderr}")]
    ToolFailure {
        program: String,
        exit_code: ExitCode,
        stderr: String,
    },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("teardown incomplete: {}", failures.join("; "))]
    TeardownFailure { failures: Vec<String> },

    #[error("invalid snapshot timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("invalid config {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to scan snapshots: {0}")]
    Walk(#[from] walkdir::Error),
}

pub type Result<T> = std::result::Result<T, BackupError>;
