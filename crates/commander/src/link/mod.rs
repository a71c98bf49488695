// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serial link to the RF microcontroller.
//!
//! The link owner is the sole writer to the device. All writes — bursts,
//! scene single-shots, health probes, reconnects — pass through one
//! exclusive lock with bounded acquisition.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;

use crate::error::Error;

pub mod serial;

pub use serial::SerialLink;

/// Outcome of a single serial write.
#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    /// Response lines read within the caller's read budget. Usually empty;
    /// no reply is not an error.
    pub responses: Vec<String>,
    pub port: Option<String>,
    pub duration_ms: u64,
}

/// One entry in the recent-transmission ring.
#[derive(Debug, Clone, Serialize)]
pub struct RecentTx {
    pub line: String,
    pub timestamp_ms: u64,
    pub ok: bool,
}

/// Link state snapshot for operator surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct LinkStatus {
    pub connected: bool,
    pub port: Option<String>,
    /// Epoch millis of the last successful write.
    pub last_write_ms: Option<u64>,
    /// Most recent transmissions, newest first.
    pub recent: Vec<RecentTx>,
}

/// Owner of the serial device.
///
/// Object-safe for use as `Arc<dyn Link>`; tests substitute a recording
/// fake.
pub trait Link: Send + Sync + 'static {
    /// Write one newline-terminated line, then read response lines for up to
    /// `read_budget` (zero skips the read entirely).
    fn send_line<'a>(
        &'a self,
        line: &'a str,
        read_budget: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<SendOutcome, Error>> + Send + 'a>>;

    /// On-demand health probe: send `INFO`, read briefly, report liveness.
    fn probe(&self) -> Pin<Box<dyn Future<Output = Result<bool, Error>> + Send + '_>>;

    /// Drop any bound device and run auto-detection again.
    fn reconnect(&self) -> Pin<Box<dyn Future<Output = Result<LinkStatus, Error>> + Send + '_>>;

    /// Close the bound device, returning the link to the unbound state.
    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Current state snapshot.
    fn status(&self) -> LinkStatus;
}
