use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheme {
    LocalPath {
        path: String,
    },
    RemoteShell {
        userhost: String,
        path: String,
    },
    RemoteDaemon {
        userhost: String,
        module: String,
        path: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    raw: String,
    scheme: Scheme,
}

fn daemon_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^rsync://([^/]+)/([^/]+)(?:/(.*))?$").expect("valid regex"))
}

fn daemon_colons_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([^/:]+)::([^/]+)(?:/(.*))?$").expect("valid regex"))
}

fn shell_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([^/:]+):(.*)$").expect("valid regex"))
}

impl Destination {
    pub fn parse(root: &str) -> Self {
        let scheme = if let Some(caps) = daemon_url_re()
            .captures(root)
            .or_else(|| daemon_colons_re().captures(root))
        {
            Scheme::RemoteDaemon {
                userhost: caps[1].to_string(),
                module: caps[2].to_string(),
                path: caps.get(3).map_or("", |m| m.as_str()).to_string(),
            }
        } else if let Some(caps) = shell_re().captures(root) {
            Scheme::RemoteShell {
                userhost: caps[1].to_string(),
                path: caps[2].to_string(),
            }
        } else {
            Scheme::LocalPath {
                path: root.to_string(),
            }
        };
        Self {
            raw: root.to_string(),
            scheme,
        }
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_remote(&self) -> bool {
        !matches!(self.scheme, Scheme::LocalPath { .. })
    }

    pub fn join(&self, segments: &[&str]) -> String {
        join_segments(&self.raw, segments)
    }

    // The receiving rsync resolves --link-dest on its own side, so remote prefixes are dropped.
    pub fn predecessor(&self, computer: &str, previous: &str) -> String {
        let base = match &self.scheme {
            Scheme::LocalPath { path } => path,
            Scheme::RemoteShell { path, .. } => path,
            Scheme::RemoteDaemon { path, .. } => path,
        };
        join_segments(base, &[computer, previous])
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

pub fn join_segments(base: &str, segments: &[&str]) -> String {
    let mut joined = base.to_string();
    for segment in segments {
        if !(joined.is_empty() || joined.ends_with('/') || joined.ends_with(':')) {
            joined.push('/');
        }
        joined.push_str(segment);
    }
    joined
}

pub fn resolve_predecessor(destination_root: &str, computer: &str, previous: &str) -> String {
    Destination::parse(destination_root).predecessor(computer, previous)
}
