use tempfile::TempDir;

use tmbackup_core::config::RsyncSettings;
use tmbackup_core::exec::Invocation;
use tmbackup_core::Result;

#[derive(Debug, Clone)]
pub struct Rsync {
    program: String,
    extra_args: Vec<String>,
}

impl Rsync {
    pub fn new(program: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            extra_args,
        }
    }

    pub fn from_settings(settings: &RsyncSettings, extra_args: &[String]) -> Self {
        let mut args = settings.extra_args.clone();
        args.extend(extra_args.iter().cloned());
        Self::new(settings.program.clone(), args)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn extra_args(&self) -> &[String] {
        &self.extra_args
    }

    pub(crate) fn invocation(&self) -> Invocation {
        Invocation::new(&self.program)
    }
}

impl Default for Rsync {
    fn default() -> Self {
        Self::from_settings(&RsyncSettings::default(), &[])
    }
}

pub(crate) fn empty_source() -> Result<TempDir> {
    Ok(tempfile::Builder::new().prefix("tmbackup-empty-").tempdir()?)
}

pub(crate) fn contents_of(dir: &TempDir) -> String {
    format!("{}/", dir.path().display())
}
