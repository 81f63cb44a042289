//! Host/Origin allow-list loader.
//!
//! File format: a decimal count on the first line, followed by exactly
//! that many lines, one entry per line. A missing file or a zero count
//! denies everything by default — an ACL that was never configured
//! must not be mistaken for "no restriction", since that would open the
//! gateway to any Host/Origin the moment an operator forgets a flag.
//! The `default_allow` escape hatch flips that default for operators
//! who explicitly want an unconfigured ACL to allow everything.
//!
//! A lookup succeeds when any configured entry is a case-insensitive
//! prefix of the value being checked. For host checks, when `port` is
//! outside the privileged/ephemeral range `(1024, 65535)`, the suffix
//! `:port` is appended to each configured entry before comparing, so an
//! ACL entry of `example.com` matches a `Host: example.com:8080` request
//! on a non-default port.

use crate::error::Error;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Acl {
    hosts: Vec<String>,
    origins: Vec<String>,
    default_allow: bool,
}

impl Acl {
    /// Deny-all: no hosts/origins configured, and an empty list at lookup
    /// time is rejected rather than treated as "no restriction".
    pub fn deny_all() -> Self {
        Acl { hosts: Vec::new(), origins: Vec::new(), default_allow: false }
    }

    /// Explicit opt-in counterpart to [`Acl::deny_all`]: an empty list at
    /// lookup time allows everything. Only reachable via the operator's
    /// own configuration, never an implicit fallback.
    pub fn allow_all() -> Self {
        Acl { hosts: Vec::new(), origins: Vec::new(), default_allow: true }
    }

    /// Loads hosts/origins files. A file path of `None`, or a file whose
    /// header declares a zero count, yields an empty list for that side;
    /// `default_allow` decides whether an empty list then allows or
    /// denies lookups.
    pub async fn load(
        hosts_file: Option<&str>,
        origins_file: Option<&str>,
        default_allow: bool,
    ) -> Result<Self, Error> {
        let hosts = match hosts_file {
            Some(path) => load_entries(path).await?,
            None => Vec::new(),
        };
        let origins = match origins_file {
            Some(path) => load_entries(path).await?,
            None => Vec::new(),
        };
        Ok(Acl { hosts, origins, default_allow })
    }

    pub fn host_allowed(&self, host: &str, port: u16) -> bool {
        prefix_match(&self.hosts, host, Some(port), self.default_allow)
    }

    pub fn origin_allowed(&self, origin: &str) -> bool {
        prefix_match(&self.origins, origin, None, self.default_allow)
    }
}

fn prefix_match(entries: &[String], needle: &str, port: Option<u16>, default_allow: bool) -> bool {
    if entries.is_empty() {
        return default_allow;
    }
    let needle_lower = needle.to_ascii_lowercase();
    entries.iter().any(|entry| {
        let candidate = match port {
            Some(p) if p > 1024 && p < 65535 => format!("{entry}:{p}"),
            _ => entry.clone(),
        };
        needle_lower.starts_with(&candidate.to_ascii_lowercase())
    })
}

async fn load_entries(path: impl AsRef<Path>) -> Result<Vec<String>, Error> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::AclLoad(path.display().to_string(), e.to_string())
    })?;

    let mut lines = contents.lines();
    let count_line = lines.next().unwrap_or("0");
    let count: usize = count_line.trim().parse().unwrap_or(0);
    if count == 0 {
        return Ok(Vec::new());
    }

    let entries: Vec<String> = lines.take(count).map(|l| l.trim().to_string()).collect();
    if entries.len() != count {
        return Err(Error::AclLoad(
            path.display().to_string(),
            format!("expected {count} entries, found {}", entries.len()),
        ));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_all_rejects_everything() {
        let acl = Acl::deny_all();
        assert!(!acl.host_allowed("anything.example", 4567));
        assert!(!acl.origin_allowed("http://anything.example"));
    }

    #[test]
    fn allow_all_is_an_explicit_opt_in() {
        let acl = Acl::allow_all();
        assert!(acl.host_allowed("anything.example", 4567));
        assert!(acl.origin_allowed("http://anything.example"));
    }

    #[test]
    fn prefix_match_is_case_insensitive() {
        let entries = vec!["Example.com".to_string()];
        assert!(prefix_match(&entries, "example.com", None, false));
        assert!(!prefix_match(&entries, "other.com", None, false));
    }

    #[test]
    fn port_suffix_applies_only_in_ephemeral_range() {
        let entries = vec!["example.com".to_string()];
        assert!(prefix_match(&entries, "example.com:8080", Some(8080), false));
        assert!(!prefix_match(&entries, "example.com", Some(8080), false));
        // Port 80 is outside (1024, 65535): no suffix is appended.
        assert!(prefix_match(&entries, "example.com", Some(80), false));
    }

    #[tokio::test]
    async fn zero_count_file_denies_by_default() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("acl_zero_count_{}.txt", std::process::id()));
        tokio::fs::write(&path, "0\n").await.unwrap();
        let acl = Acl::load(Some(path.to_str().unwrap()), None, false).await.unwrap();
        assert!(!acl.host_allowed("anything.example", 4567));
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn zero_count_file_honors_default_allow_override() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("acl_zero_count_override_{}.txt", std::process::id()));
        tokio::fs::write(&path, "0\n").await.unwrap();
        let acl = Acl::load(Some(path.to_str().unwrap()), None, true).await.unwrap();
        assert!(acl.host_allowed("anything.example", 4567));
        tokio::fs::remove_file(&path).await.unwrap();
    }
}
