use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use time::PrimitiveDateTime;
use walkdir::WalkDir;

use crate::error::{BackupError, Result};

// Fixed width and zero padded, so string order is chronological order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(String);

pub type Catalog = BTreeMap<String, Vec<Timestamp>>;

fn timestamp_re() -> &'static Regex {
    static TIMESTAMP_RE: OnceLock<Regex> = OnceLock::new();
    TIMESTAMP_RE.get_or_init(|| {
        Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}-[0-9]{6}$").expect("valid regex")
    })
}

impl Timestamp {
    pub fn parse(value: &str) -> Result<Self> {
        if timestamp_re().is_match(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(BackupError::InvalidTimestamp(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_datetime(&self) -> Result<PrimitiveDateTime> {
        let format = time::format_description::parse(
            "[year]-[month]-[day]-[hour][minute][second]",
        )
        .map_err(|_| BackupError::InvalidTimestamp(self.0.clone()))?;
        PrimitiveDateTime::parse(&self.0, &format)
            .map_err(|_| BackupError::InvalidTimestamp(self.0.clone()))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Timestamp {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn scan_local(root: &Path) -> Result<Catalog> {
    let mut catalog = Catalog::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(2) {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if entry.depth() == 1 {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        let Ok(timestamp) = Timestamp::parse(name) else {
            continue;
        };
        let computer = entry
            .path()
            .parent()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str());
        if let Some(computer) = computer {
            catalog.entry(computer.to_string()).or_default().push(timestamp);
        }
    }
    for timestamps in catalog.values_mut() {
        timestamps.sort();
    }
    Ok(catalog)
}

/// Extracts snapshot directories from an `rsync --list-only` listing: mode first, name last.
pub fn parse_listing(output: &str) -> Vec<Timestamp> {
    let mut timestamps: Vec<Timestamp> = output
        .lines()
        .filter(|line| line.starts_with('d'))
        .filter_map(|line| line.split_whitespace().last())
        .filter_map(|token| Timestamp::parse(token.trim_end_matches('/')).ok())
        .collect();
    timestamps.sort();
    timestamps.dedup();
    timestamps
}
