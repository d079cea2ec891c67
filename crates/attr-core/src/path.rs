//! Attribute paths and path patterns.
//!
//! An attribute is addressed by the `(endpoint, cluster, attribute)` triple.
//! Patterns use the same three slash-separated segments, where each segment is
//! either a number (decimal or `0x` hex) or a `*` wildcard, e.g. `"1/0x6/*"`.
//! A trailing `*` also matches the remaining segments, so `"1/*"` matches every
//! attribute on endpoint 1.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identity of an attribute in the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributePath {
    pub endpoint: u16,
    pub cluster: u32,
    pub attribute: u32,
}

impl AttributePath {
    pub const fn new(endpoint: u16, cluster: u32, attribute: u32) -> Self {
        Self {
            endpoint,
            cluster,
            attribute,
        }
    }

    /// Key used by persistence backends, one per attribute.
    pub fn storage_key(&self) -> String {
        format!("{:04x}{:08x}{:08x}", self.endpoint, self.cluster, self.attribute)
    }
}

impl std::fmt::Display for AttributePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "0x{:04X}/0x{:08X}/0x{:08X}",
            self.endpoint, self.cluster, self.attribute
        )
    }
}

impl From<(u16, u32, u32)> for AttributePath {
    fn from((endpoint, cluster, attribute): (u16, u32, u32)) -> Self {
        Self::new(endpoint, cluster, attribute)
    }
}

/// A pattern matching a set of attribute paths.
#[derive(Debug, Clone, PartialEq)]
pub struct PathPattern {
    raw: String,
    endpoint: Option<u16>,
    cluster: Option<u32>,
    attribute: Option<u32>,
}

impl PathPattern {
    /// Parse a pattern such as `"1/0x0006/0"`, `"*/0x8/*"` or `"*"`.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(PatternError::EmptyPattern);
        }

        let parts: Vec<&str> = trimmed.split('/').collect();
        if parts.len() > 3 {
            return Err(PatternError::TooManySegments(parts.len()));
        }
        // Fewer than three segments is only allowed with a trailing wildcard
        if parts.len() < 3 && parts.last() != Some(&"*") {
            return Err(PatternError::MissingSegments(trimmed.to_string()));
        }

        let segment = |index: usize| parts.get(index).copied().unwrap_or("*");
        let endpoint = parse_segment(segment(0))?
            .map(|value| {
                u16::try_from(value)
                    .map_err(|_| PatternError::OutOfRange(segment(0).to_string()))
            })
            .transpose()?;
        let cluster = parse_segment(segment(1))?;
        let attribute = parse_segment(segment(2))?;

        Ok(Self {
            raw: trimmed.to_string(),
            endpoint,
            cluster,
            attribute,
        })
    }

    /// A pattern matching exactly one path.
    pub fn exact(path: AttributePath) -> Self {
        Self {
            raw: format!("{}/{}/{}", path.endpoint, path.cluster, path.attribute),
            endpoint: Some(path.endpoint),
            cluster: Some(path.cluster),
            attribute: Some(path.attribute),
        }
    }

    /// A pattern matching every path.
    pub fn all() -> Self {
        Self {
            raw: "*".to_string(),
            endpoint: None,
            cluster: None,
            attribute: None,
        }
    }

    /// Check if a path matches this pattern.
    pub fn matches(&self, path: &AttributePath) -> bool {
        self.endpoint.map_or(true, |e| e == path.endpoint)
            && self.cluster.map_or(true, |c| c == path.cluster)
            && self.attribute.map_or(true, |a| a == path.attribute)
    }

    /// Get the raw pattern string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for PathPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PathPattern::new(s)
    }
}

fn parse_segment(segment: &str) -> Result<Option<u32>, PatternError> {
    if segment == "*" {
        return Ok(None);
    }
    let parsed = match segment
        .strip_prefix("0x")
        .or_else(|| segment.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => segment.parse::<u32>(),
    };
    parsed
        .map(Some)
        .map_err(|_| PatternError::InvalidSegment(segment.to_string()))
}

/// Errors that can occur when creating a path pattern.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatternError {
    #[error("Empty pattern")]
    EmptyPattern,

    #[error("Too many segments: {0}")]
    TooManySegments(usize),

    #[error("Missing segments in pattern '{0}'")]
    MissingSegments(String),

    #[error("Invalid segment '{0}'")]
    InvalidSegment(String),

    #[error("Segment out of range '{0}'")]
    OutOfRange(String),
}
