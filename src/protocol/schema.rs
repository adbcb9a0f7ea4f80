//! Per-version inbound frame schemas.
//!
//! Each supported protocol version maps command names to header constraint
//! sets. The tables are process-wide constants, built once and never mutated;
//! a session picks the table for its negotiated version at construction.

use std::collections::HashMap;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::StompError;

/// Supported STOMP protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVersion {
    /// STOMP 1.0 (default).
    #[default]
    V1_0,
    /// STOMP 1.1.
    V1_1,
}

impl ProtocolVersion {
    /// Wire representation of the version.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::V1_0 => "1.0",
            ProtocolVersion::V1_1 => "1.1",
        }
    }
}

impl FromStr for ProtocolVersion {
    type Err = StompError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1.0" => Ok(ProtocolVersion::V1_0),
            "1.1" => Ok(ProtocolVersion::V1_1),
            other => Err(StompError::UnsupportedVersion(other.to_string())),
        }
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constraint on a single header of an inbound command.
#[derive(Debug)]
pub struct HeaderRule {
    /// Absence of the header fails validation.
    pub required: bool,
    /// A present value must match this pattern.
    pub pattern: Option<Regex>,
}

impl HeaderRule {
    fn required() -> Self {
        Self {
            required: true,
            pattern: None,
        }
    }
}

/// Header constraint set for one inbound command.
#[derive(Debug, Default)]
pub struct CommandSchema {
    rules: Vec<(&'static str, HeaderRule)>,
}

impl CommandSchema {
    fn with_required(headers: &[&'static str]) -> Self {
        Self {
            rules: headers.iter().map(|h| (*h, HeaderRule::required())).collect(),
        }
    }

    /// Iterate the header rules.
    pub fn rules(&self) -> impl Iterator<Item = &(&'static str, HeaderRule)> {
        self.rules.iter()
    }
}

/// Inbound command vocabulary and constraints for one protocol version.
#[derive(Debug)]
pub struct VersionSchema {
    commands: HashMap<&'static str, CommandSchema>,
}

impl VersionSchema {
    /// Check whether a command line is part of the active vocabulary.
    pub fn contains(&self, command: &str) -> bool {
        self.commands.contains_key(command)
    }

    /// Look up the constraint set for a command.
    pub fn get(&self, command: &str) -> Option<&CommandSchema> {
        self.commands.get(command)
    }
}

// Both supported revisions validate the same inbound subset.
fn build_inbound_schema() -> VersionSchema {
    let mut commands = HashMap::new();
    commands.insert("CONNECTED", CommandSchema::with_required(&["session"]));
    commands.insert(
        "MESSAGE",
        CommandSchema::with_required(&["destination", "message-id"]),
    );
    commands.insert("ERROR", CommandSchema::default());
    commands.insert("RECEIPT", CommandSchema::default());
    VersionSchema { commands }
}

static SCHEMA_V1_0: Lazy<VersionSchema> = Lazy::new(build_inbound_schema);
static SCHEMA_V1_1: Lazy<VersionSchema> = Lazy::new(build_inbound_schema);

/// Get the static schema table for a protocol version.
pub fn for_version(version: ProtocolVersion) -> &'static VersionSchema {
    match version {
        ProtocolVersion::V1_0 => &SCHEMA_V1_0,
        ProtocolVersion::V1_1 => &SCHEMA_V1_1,
    }
}
