pub mod address;
pub mod cancel;
pub mod config;
pub mod error;
pub mod exec;
pub mod plan;
pub mod snapshot;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{BackupError, Result};
