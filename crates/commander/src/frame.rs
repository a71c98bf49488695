// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame encoder: builds the `TX:` serial line for one RF transmission.
//!
//! The line format is stable, bit-for-bit, with the microcontroller
//! firmware:
//!
//! `TX:<remote_id_hex>,<header>,<id_bytes>,<payload>,<family_flag>,<common>,<cc_flag>,<action_code>`
//!
//! Hex byte strings are concatenated without spaces; flags and the common
//! byte are decimal. The newline is appended only at transmit time.

use crate::error::Error;
use crate::shade::{Action, ShadeRecord};

/// One encoded RF transmission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxFrame {
    line: String,
    shade_id: u32,
    action: Action,
}

impl TxFrame {
    /// The serial line, without the trailing newline.
    pub fn as_line(&self) -> &str {
        &self.line
    }

    pub fn shade_id(&self) -> u32 {
        self.shade_id
    }

    pub fn action(&self) -> Action {
        self.action
    }
}

/// Encode one transmission for `record` performing `action`.
///
/// Pure; the only failure is [`Error::ActionNotConfigured`] when the
/// action's payload is the `FF FF` sentinel (or absent).
pub fn encode(record: &ShadeRecord, action: Action) -> Result<TxFrame, Error> {
    let payload = record.payload(action).ok_or(Error::ActionNotConfigured {
        shade_id: record.shade_id,
        action,
    })?;

    let cc_flag: u8 = if record.channel == "CC" { 1 } else { 0 };
    let line = format!(
        "TX:{:02X},{},{},{},{},{},{},{}",
        record.remote_id,
        strip_spaces(&record.header_bytes),
        strip_spaces(&record.id_bytes),
        strip_spaces(payload),
        record.family.flag(),
        record.common_byte,
        cc_flag,
        action.code(),
    );

    Ok(TxFrame { line, shade_id: record.shade_id, action })
}

fn strip_spaces(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
