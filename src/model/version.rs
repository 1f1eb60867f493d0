use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Dotted numeric version as published by the release feed (`1.7.10861`) or
/// reported by the package inventory (`1.22.10861.0`).
///
/// Missing trailing components compare as zero, so `1.7` == `1.7.0`.
#[derive(Debug, Clone)]
pub struct Version {
    parts: Vec<u64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid version: {0:?}")]
pub struct VersionError(pub String);

impl Version {
    /// Parse a release tag such as `v1.7.10861`, skipping any leading
    /// non-numeric prefix.
    pub fn parse_tag(raw: &str) -> Result<Self, VersionError> {
        let trimmed = raw.trim();
        let start = trimmed
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| VersionError(raw.to_string()))?;
        trimmed[start..]
            .parse()
            .map_err(|_| VersionError(raw.to_string()))
    }

    fn component(&self, idx: usize) -> u64 {
        self.parts.get(idx).copied().unwrap_or(0)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionError(s.to_string()));
        }

        let mut parts = Vec::new();
        for segment in s.split('.') {
            // Pre-release or build suffixes ("1.8.0-preview") end the numeric part.
            let digits: String = segment.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                return Err(VersionError(s.to_string()));
            }
            parts.push(digits.parse().map_err(|_| VersionError(s.to_string()))?);
            if digits.len() != segment.len() {
                break;
            }
        }

        Ok(Self { parts })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|idx| self.component(idx).cmp(&other.component(idx)))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text: Vec<String> = self.parts.iter().map(u64::to_string).collect();
        f.write_str(&text.join("."))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
