//! Exposes the snapshot tree of a Time Machine sparse bundle through a chain of read-only
//! mounts: sparse bundle image, loop device over the HFS+ partition, the partition itself,
//! then the Time Machine structure on top.

pub mod partition;
pub mod stack;

use std::path::{Path, PathBuf};

use tmbackup_core::config::MountSettings;
use tmbackup_core::error::{MountLayer, Result};
use tmbackup_core::exec::CommandRunner;

pub use partition::{locate_partition, PartitionGeometry};
pub use stack::MountStack;

pub struct TimeMachineView<'r> {
    stack: MountStack<'r>,
    root: PathBuf,
}

impl TimeMachineView<'_> {
    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn release(self) -> Result<()> {
        self.stack.release()
    }
}

pub fn mount_time_machine<'r>(
    runner: &'r dyn CommandRunner,
    settings: &MountSettings,
    sparse_bundle: &Path,
) -> Result<TimeMachineView<'r>> {
    let mut stack = MountStack::new(runner, settings);

    let bundle = stack.mount(
        MountLayer::SparseBundle,
        &settings.sparsebundlefs,
        &sparse_bundle.to_string_lossy(),
        &["-o", "ro"],
    )?;

    let image = bundle.join(&settings.image_name);
    let geometry = match locate_partition(runner, &settings.parted, &image, &settings.partition_type)
    {
        Ok(geometry) => geometry,
        Err(err) => return Err(stack.abort(err)),
    };
    let device = stack.attach_loop(&image, geometry, &["-r"])?;

    let disk = stack.mount(
        MountLayer::Filesystem,
        &settings.mount,
        &device,
        &["-t", settings.filesystem.as_str(), "-o", "ro"],
    )?;

    let root = stack.mount(
        MountLayer::TimeMachine,
        &settings.tmfs,
        &disk.to_string_lossy(),
        &["-o", "ro"],
    )?;

    Ok(TimeMachineView { stack, root })
}
