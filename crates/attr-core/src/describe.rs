//! Diagnostic output for attribute reads and writes.

use crate::path::AttributePath;
use crate::value::AttributeValue;
use tracing::info;

/// Whether a value is being read from or written to an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    fn marker(self) -> &'static str {
        match self {
            Direction::Read => "R",
            Direction::Write => "W",
        }
    }
}

/// Format the diagnostic line for an attribute access.
pub fn description(
    path: &AttributePath,
    value: &AttributeValue<'_>,
    direction: Direction,
) -> String {
    format!(
        "{} : Endpoint 0x{:04X}'s Cluster 0x{:08X}'s Attribute 0x{:08X} is {}",
        direction.marker(),
        path.endpoint,
        path.cluster,
        path.attribute,
        value
    )
}

/// Log an attribute access at info level.
pub fn describe(path: &AttributePath, value: &AttributeValue<'_>, direction: Direction) {
    info!("{}", description(path, value, direction));
}
