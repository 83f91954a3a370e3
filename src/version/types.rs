//! Server version parsing.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error types for version operations.
#[derive(Error, Debug)]
pub enum VersionError {
    #[error("Invalid version format: {0}")]
    InvalidFormat(String),

    #[error("Transport error: {0}")]
    Transport(#[from] crate::client::TransportError),

    #[error("API error: {0}")]
    Api(#[from] crate::client::ApiError),

    #[error("Unknown server capability {0}, expected legacy or datasources")]
    UnknownCapability(String),
}

/// A semantic version as reported by the server, e.g. `v2.0.0-alpha.1`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SemVer {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// Pre-release tag after `-`, if any
    pub pre: Option<String>,
}

impl SemVer {
    /// Create a new release version.
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: None,
        }
    }

    /// Parse `1.2.3`, `v1.2.3`, `v2.0.0-beta.1` or `v2.0.0+build`.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::InvalidFormat(s.to_string());

        let trimmed = s.trim().trim_start_matches('v');
        let without_build = trimmed.split('+').next().unwrap_or(trimmed);
        let (core, pre) = match without_build.split_once('-') {
            Some((core, pre)) if !pre.is_empty() => (core, Some(pre.to_string())),
            Some(_) => return Err(invalid()),
            None => (without_build, None),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() != 3 {
            return Err(invalid());
        }

        Ok(Self {
            major: parts[0].parse().map_err(|_| invalid())?,
            minor: parts[1].parse().map_err(|_| invalid())?,
            patch: parts[2].parse().map_err(|_| invalid())?,
            pre,
        })
    }

    /// Whether `major.minor.patch` is at least the given triple, ignoring any
    /// pre-release tag.
    pub fn at_least(&self, major: u32, minor: u32, patch: u32) -> bool {
        (self.major, self.minor, self.patch) >= (major, minor, patch)
    }
}

impl FromStr for SemVer {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

impl Ord for SemVer {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                // a pre-release sorts before its release
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// What the server can do, as far as migration tracking is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerCapability {
    /// Tracking tables in `hdb_catalog`, single database
    Legacy,
    /// Cli catalog state, multiple data sources
    Datasources,
}

impl ServerCapability {
    /// Capability of a server reporting `version`. Versions that do not
    /// parse (development builds) are treated as the latest.
    pub fn from_version(version: &str) -> Self {
        match SemVer::parse(version) {
            Ok(semver) if !semver.at_least(2, 0, 0) => ServerCapability::Legacy,
            _ => ServerCapability::Datasources,
        }
    }

    pub fn has_datasources(&self) -> bool {
        matches!(self, ServerCapability::Datasources)
    }
}

impl FromStr for ServerCapability {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" => Ok(ServerCapability::Legacy),
            "datasources" => Ok(ServerCapability::Datasources),
            _ => Err(VersionError::UnknownCapability(s.to_string())),
        }
    }
}

impl fmt::Display for ServerCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerCapability::Legacy => f.write_str("legacy"),
            ServerCapability::Datasources => f.write_str("datasources"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semver_parse_valid() {
        let v = SemVer::parse("1.2.3").unwrap();
        assert_eq!(v.major, 1);
        assert_eq!(v.minor, 2);
        assert_eq!(v.patch, 3);
        assert!(v.pre.is_none());
    }

    #[test]
    fn test_semver_parse_server_formats() {
        let v = SemVer::parse("v2.0.0-alpha.1").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (2, 0, 0));
        assert_eq!(v.pre.as_deref(), Some("alpha.1"));

        let v = SemVer::parse("v1.3.3+cloud").unwrap();
        assert_eq!(v, SemVer::new(1, 3, 3));
    }

    #[test]
    fn test_semver_parse_invalid_format() {
        assert!(SemVer::parse("1.2").is_err());
        assert!(SemVer::parse("1.2.3.4").is_err());
        assert!(SemVer::parse("").is_err());
        assert!(SemVer::parse("1.2.3-").is_err());
        assert!(SemVer::parse("a.b.c").is_err());
        assert!(SemVer::parse("13c5d9b-dirty").is_err());
    }

    #[test]
    fn test_semver_display() {
        assert_eq!(SemVer::new(1, 2, 3).to_string(), "1.2.3");
        assert_eq!(SemVer::parse("v2.0.0-beta.2").unwrap().to_string(), "2.0.0-beta.2");
    }

    #[test]
    fn test_semver_ordering() {
        let mut versions = vec![
            SemVer::parse("2.0.0").unwrap(),
            SemVer::parse("1.3.3").unwrap(),
            SemVer::parse("2.0.0-alpha.1").unwrap(),
            SemVer::parse("1.4.0").unwrap(),
        ];
        versions.sort();

        let ordered: Vec<String> = versions.iter().map(|v| v.to_string()).collect();
        assert_eq!(ordered, vec!["1.3.3", "1.4.0", "2.0.0-alpha.1", "2.0.0"]);
    }

    #[test]
    fn test_capability_from_version() {
        assert_eq!(ServerCapability::from_version("v1.3.3"), ServerCapability::Legacy);
        assert_eq!(ServerCapability::from_version("v2.0.0-alpha.1"), ServerCapability::Datasources);
        assert_eq!(ServerCapability::from_version("v2.1.0"), ServerCapability::Datasources);
        assert_eq!(ServerCapability::from_version("13c5d9b-dirty"), ServerCapability::Datasources);
    }

    #[test]
    fn test_capability_from_str() {
        assert_eq!("legacy".parse::<ServerCapability>().unwrap(), ServerCapability::Legacy);
        assert_eq!(
            "Datasources".parse::<ServerCapability>().unwrap(),
            ServerCapability::Datasources
        );
        assert!("other".parse::<ServerCapability>().is_err());
    }
}
