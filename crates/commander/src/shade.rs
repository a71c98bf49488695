// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core shade types: actions, remote families, and the directory record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Action payload value meaning "this action is not configured".
pub const NOT_CONFIGURED: &str = "FF FF";

/// Logical shade action. Wire letters are `u`, `d`, `s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "u")]
    Raise,
    #[serde(rename = "d")]
    Lower,
    #[serde(rename = "s")]
    Stop,
}

impl Action {
    /// Numeric action code carried in the TX frame.
    pub fn code(&self) -> u8 {
        match self {
            Self::Raise => 0,
            Self::Lower => 1,
            Self::Stop => 2,
        }
    }

    /// Single-letter wire form.
    pub fn letter(&self) -> char {
        match self {
            Self::Raise => 'u',
            Self::Lower => 'd',
            Self::Stop => 's',
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Raise => "up",
            Self::Lower => "down",
            Self::Stop => "stop",
        })
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "u" => Ok(Self::Raise),
            "d" => Ok(Self::Lower),
            "s" => Ok(Self::Stop),
            other => Err(format!("invalid action '{other}': must be u, d, or s")),
        }
    }
}

/// Remote control family. Selects the 6-channel or 16-channel RF encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteFamily {
    SixChannel,
    SixteenChannel,
}

impl RemoteFamily {
    /// Derive the family from the tag stored in the shade table.
    pub fn from_tag(tag: &str) -> Self {
        if tag == "AC123-06D" {
            Self::SixChannel
        } else {
            Self::SixteenChannel
        }
    }

    /// Family flag carried in the TX frame.
    pub fn flag(&self) -> u8 {
        match self {
            Self::SixChannel => 0,
            Self::SixteenChannel => 1,
        }
    }
}

/// Immutable snapshot of one shade row from the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadeRecord {
    pub shade_id: u32,
    pub remote_id: u8,
    pub family: RemoteFamily,
    /// Channel tag; the literal "CC" raises a flag in the encoded frame.
    pub channel: String,
    pub header_bytes: String,
    pub id_bytes: String,
    pub up_code: String,
    pub down_code: String,
    pub stop_code: String,
    pub common_byte: u8,
    pub room: String,
    pub location: String,
    pub facing: String,
    pub kind: String,
}

impl ShadeRecord {
    /// Computed display name, `room location`.
    pub fn name(&self) -> String {
        format!("{} {}", self.room, self.location)
    }

    /// Payload bytes for the given action, or `None` when unconfigured.
    pub fn payload(&self, action: Action) -> Option<&str> {
        let code = match action {
            Action::Raise => &self.up_code,
            Action::Lower => &self.down_code,
            Action::Stop => &self.stop_code,
        };
        if code.is_empty() || code == NOT_CONFIGURED {
            None
        } else {
            Some(code)
        }
    }
}

#[cfg(test)]
#[path = "shade_tests.rs"]
mod tests;
