use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BackupError, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    pub source: Option<Source>,
    pub destination: Option<Destination>,
    #[serde(default)]
    pub rsync: RsyncSettings,
    #[serde(default)]
    pub mount: MountSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Source {
    pub sparse_bundle: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Destination {
    pub root: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RsyncSettings {
    pub program: String,
    pub extra_args: Vec<String>,
}

impl Default for RsyncSettings {
    fn default() -> Self {
        Self {
            program: "rsync".to_string(),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MountSettings {
    pub sparsebundlefs: String,
    pub tmfs: String,
    pub mount: String,
    pub umount: String,
    pub losetup: String,
    pub parted: String,
    pub image_name: String,
    pub filesystem: String,
    pub partition_type: String,
    pub temp_root: Option<PathBuf>,
}

impl Default for MountSettings {
    fn default() -> Self {
        Self {
            sparsebundlefs: "sparsebundlefs".to_string(),
            tmfs: "tmfs".to_string(),
            mount: "mount".to_string(),
            umount: "umount".to_string(),
            losetup: "losetup".to_string(),
            parted: "parted".to_string(),
            image_name: "sparsebundle.dmg".to_string(),
            filesystem: "hfsplus".to_string(),
            partition_type: "hfs+".to_string(),
            temp_root: None,
        }
    }
}

impl MountSettings {
    pub fn temp_root(&self) -> PathBuf {
        self.temp_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| BackupError::Config {
            path: path.to_path_buf(),
            reason: source.to_string(),
        })?;
        toml::from_str(&contents).map_err(|source| BackupError::Config {
            path: path.to_path_buf(),
            reason: source.to_string(),
        })
    }

    pub fn sparse_bundle(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.sparse_bundle.as_str())
    }

    pub fn destination_root(&self) -> Option<&str> {
        self.destination.as_ref().map(|d| d.root.as_str())
    }
}
