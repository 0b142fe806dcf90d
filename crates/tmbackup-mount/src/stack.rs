use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use tmbackup_core::config::MountSettings;
use tmbackup_core::error::{BackupError, MountLayer, Result};
use tmbackup_core::exec::{CommandOutput, CommandRunner, Invocation};

use crate::partition::PartitionGeometry;

#[derive(Debug)]
enum Attachment {
    Mount { directory: PathBuf },
    Loop { device: String },
}

#[derive(Debug)]
struct Held {
    layer: MountLayer,
    attachment: Attachment,
}

/// Host resources acquired so far, innermost last.
///
/// Teardown pops in reverse acquisition order. Every step is attempted even when an
/// earlier one failed. Dropping the stack tears it down.
pub struct MountStack<'r> {
    runner: &'r dyn CommandRunner,
    umount: String,
    losetup: String,
    temp_root: PathBuf,
    held: Vec<Held>,
}

impl<'r> MountStack<'r> {
    pub fn new(runner: &'r dyn CommandRunner, settings: &MountSettings) -> Self {
        Self {
            runner,
            umount: settings.umount.clone(),
            losetup: settings.losetup.clone(),
            temp_root: settings.temp_root(),
            held: Vec::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.held.len()
    }

    pub fn mount(
        &mut self,
        layer: MountLayer,
        program: &str,
        source: &str,
        options: &[&str],
    ) -> Result<PathBuf> {
        let directory = match tempfile::Builder::new()
            .prefix("tmbackup-")
            .tempdir_in(&self.temp_root)
        {
            Ok(dir) => dir.keep(),
            Err(err) => {
                return Err(self.abort(BackupError::MountFailure {
                    layer,
                    reason: format!(
                        "cannot create mount point in {}: {err}",
                        self.temp_root.display()
                    ),
                }))
            }
        };

        let invocation = Invocation::new(program)
            .arg(source)
            .args(options.iter().copied())
            .arg(directory.to_string_lossy());
        if let Err(reason) = attach(self.runner, &invocation) {
            if let Err(err) = fs::remove_dir(&directory) {
                warn!(directory = %directory.display(), error = %err, "failed to remove unused mount point");
            }
            return Err(self.abort(BackupError::MountFailure { layer, reason }));
        }

        info!(%layer, directory = %directory.display(), "mounted");
        self.held.push(Held {
            layer,
            attachment: Attachment::Mount {
                directory: directory.clone(),
            },
        });
        Ok(directory)
    }

    pub fn attach_loop(
        &mut self,
        image: &Path,
        geometry: PartitionGeometry,
        options: &[&str],
    ) -> Result<String> {
        let layer = MountLayer::LoopDevice;
        let invocation = Invocation::new(&self.losetup)
            .args(["-f".to_string(), image.to_string_lossy().into_owned()])
            .args(["--offset".to_string(), geometry.offset.to_string()])
            .args(["--sizelimit".to_string(), geometry.size.to_string()])
            .arg("--show")
            .args(options.iter().copied());
        let output = match attach(self.runner, &invocation) {
            Ok(output) => output,
            Err(reason) => return Err(self.abort(BackupError::MountFailure { layer, reason })),
        };

        let device = output.stdout.trim().to_string();
        if device.is_empty() {
            return Err(self.abort(BackupError::MountFailure {
                layer,
                reason: format!("{} did not report a device", self.losetup),
            }));
        }

        info!(%layer, %device, offset = geometry.offset, size = geometry.size, "attached");
        self.held.push(Held {
            layer,
            attachment: Attachment::Loop {
                device: device.clone(),
            },
        });
        Ok(device)
    }

    pub fn abort(&mut self, err: BackupError) -> BackupError {
        for failure in self.unwind() {
            warn!(error = %failure, "teardown step failed while unwinding");
        }
        err
    }

    pub fn release(mut self) -> Result<()> {
        let failures = self.unwind();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(BackupError::TeardownFailure { failures })
        }
    }

    fn unwind(&mut self) -> Vec<String> {
        let mut failures = Vec::new();
        while let Some(held) = self.held.pop() {
            match held.attachment {
                Attachment::Mount { directory } => {
                    let invocation =
                        Invocation::new(&self.umount).arg(directory.to_string_lossy());
                    if let Err(reason) = attach(self.runner, &invocation) {
                        failures.push(format!("{} layer: {reason}", held.layer));
                    }
                    if let Err(err) = fs::remove_dir(&directory) {
                        failures.push(format!(
                            "{} layer: cannot remove {}: {err}",
                            held.layer,
                            directory.display()
                        ));
                    }
                }
                Attachment::Loop { device } => {
                    let invocation = Invocation::new(&self.losetup).args(["-d", device.as_str()]);
                    if let Err(reason) = attach(self.runner, &invocation) {
                        failures.push(format!("{} layer: {reason}", held.layer));
                    }
                }
            }
            info!(layer = %held.layer, "released");
        }
        failures
    }
}

impl Drop for MountStack<'_> {
    fn drop(&mut self) {
        for failure in self.unwind() {
            warn!(error = %failure, "teardown step failed");
        }
    }
}

fn attach(runner: &dyn CommandRunner, invocation: &Invocation) -> std::result::Result<CommandOutput, String> {
    match runner.output(invocation) {
        Ok(output) if output.success() => Ok(output),
        Ok(output) => Err(format!(
            "{invocation} exited with {}: {}",
            output.exit_code(),
            output.stderr.trim()
        )),
        Err(err) => Err(format!("cannot run {}: {err}", invocation.program)),
    }
}
