// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serial link implementation over tokio-serial.
//!
//! Auto-detects the controller on first need, caches the bound device, and
//! serializes every write behind one mutex with bounded acquisition. Health
//! probing is on demand only — a periodic probe would contend with command
//! writes and has been observed to stall the link.

use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::link::{Link, LinkStatus, RecentTx, SendOutcome};

/// Fixed firmware baud rate, 8N1.
pub const BAUD_RATE: u32 = 115_200;

/// Bounded wait for the exclusive write lock.
const LOCK_WAIT: Duration = Duration::from_secs(1);
/// Write timeout. A write that completes slower than 10 ms is logged.
const WRITE_TIMEOUT: Duration = Duration::from_millis(100);
const SLOW_WRITE: Duration = Duration::from_millis(10);
/// Microcontroller reset cycle after opening the port.
const RESET_SETTLE: Duration = Duration::from_secs(2);
/// Identification read window during auto-detection.
const DETECT_READ: Duration = Duration::from_secs(3);
/// Health probe read window.
const PROBE_READ: Duration = Duration::from_secs(1);
/// Writes spaced closer than this draw a warning but proceed.
const RAPID_FIRE: Duration = Duration::from_millis(100);
/// Recent-transmission ring capacity.
const RECENT_CAP: usize = 10;

/// Substrings (lowercased) that identify the controller's INFO reply.
const IDENT_KEYWORDS: [&str; 4] = ["shade", "tx", "ready", "arduino"];

struct Conn {
    port: SerialStream,
    path: String,
}

#[derive(Default)]
struct Shared {
    port: Option<String>,
    last_write: Option<Instant>,
    last_write_ms: Option<u64>,
    recent: VecDeque<RecentTx>,
}

/// Exclusive owner of the serial device to the shade controller.
pub struct SerialLink {
    conn: tokio::sync::Mutex<Option<Conn>>,
    shared: parking_lot::Mutex<Shared>,
}

impl Default for SerialLink {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialLink {
    pub fn new() -> Self {
        Self {
            conn: tokio::sync::Mutex::new(None),
            shared: parking_lot::Mutex::new(Shared::default()),
        }
    }

    /// Enumerate candidate device paths: `/dev/ttyACM*`, `/dev/ttyUSB*`, and
    /// by-id entries whose name mentions the vendor.
    fn candidate_ports() -> Vec<PathBuf> {
        let mut out = Vec::new();
        if let Ok(entries) = std::fs::read_dir("/dev") {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if is_candidate_name(&name) {
                    out.push(entry.path());
                }
            }
        }
        if let Ok(entries) = std::fs::read_dir("/dev/serial/by-id") {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if is_vendor_match(&name) {
                    out.push(entry.path());
                }
            }
        }
        out.sort();
        out
    }

    /// Probe one candidate: open, wait out the reset cycle, send `INFO`,
    /// and look for an identifying reply.
    async fn probe_candidate(path: &PathBuf) -> Option<SerialStream> {
        let port_display = path.to_string_lossy().into_owned();
        let mut port = match tokio_serial::new(&port_display, BAUD_RATE).open_native_async() {
            Ok(p) => p,
            Err(e) => {
                debug!(port = %port_display, err = %e, "failed to open candidate");
                return None;
            }
        };
        tokio::time::sleep(RESET_SETTLE).await;

        if let Err(e) = port.write_all(b"INFO\n").await {
            debug!(port = %port_display, err = %e, "candidate rejected INFO write");
            return None;
        }

        let lines = read_lines_for(&mut port, DETECT_READ).await;
        if lines.iter().any(|l| identifies_controller(l)) {
            info!(port = %port_display, "found shade controller");
            Some(port)
        } else {
            debug!(port = %port_display, "candidate did not identify as shade controller");
            None
        }
    }

    /// Run auto-detection across all candidates; the first match is bound.
    async fn detect(&self) -> Result<Conn, Error> {
        let candidates = Self::candidate_ports();
        if candidates.is_empty() {
            warn!("no serial ports found");
            return Err(Error::NoDevice);
        }
        info!(count = candidates.len(), "scanning serial ports for shade controller");

        for path in &candidates {
            if let Some(port) = Self::probe_candidate(path).await {
                let path = path.to_string_lossy().into_owned();
                self.shared.lock().port = Some(path.clone());
                return Ok(Conn { port, path });
            }
        }
        warn!("no shade controller found on any port");
        Err(Error::NoDevice)
    }

    async fn lock_conn(&self) -> Result<tokio::sync::MutexGuard<'_, Option<Conn>>, Error> {
        tokio::time::timeout(LOCK_WAIT, self.conn.lock())
            .await
            .map_err(|_| Error::LinkBusy)
    }

    fn record_tx(&self, line: &str, ok: bool) {
        let mut shared = self.shared.lock();
        if shared.recent.len() >= RECENT_CAP {
            shared.recent.pop_front();
        }
        shared.recent.push_back(RecentTx {
            line: line.to_owned(),
            timestamp_ms: epoch_ms(),
            ok,
        });
        if ok {
            shared.last_write = Some(Instant::now());
            shared.last_write_ms = Some(epoch_ms());
        }
    }

    async fn send_line_inner(
        &self,
        line: &str,
        read_budget: Duration,
    ) -> Result<SendOutcome, Error> {
        let mut guard = self.lock_conn().await?;
        if guard.is_none() {
            *guard = Some(self.detect().await?);
        }
        let conn = match guard.as_mut() {
            Some(c) => c,
            None => return Err(Error::NoDevice),
        };

        if let Some(prev) = self.shared.lock().last_write {
            let spacing = prev.elapsed();
            if spacing < RAPID_FIRE {
                warn!(spacing_ms = spacing.as_millis() as u64, line, "rapid-fire serial writes");
            }
        }

        if let Err(e) = conn.port.clear(tokio_serial::ClearBuffer::All) {
            debug!(err = %e, "failed to flush serial buffers before write");
        }

        let started = Instant::now();
        let mut payload = line.as_bytes().to_vec();
        payload.push(b'\n');
        match tokio::time::timeout(WRITE_TIMEOUT, conn.port.write_all(&payload)).await {
            Err(_) => {
                self.record_tx(line, false);
                warn!(line, "serial write timed out");
                return Err(Error::LinkTimeout);
            }
            Ok(Err(e)) => {
                self.record_tx(line, false);
                warn!(line, err = %e, "serial write failed");
                return Err(Error::LinkWrite { reason: e.to_string() });
            }
            Ok(Ok(())) => {}
        }

        let write_elapsed = started.elapsed();
        if write_elapsed > SLOW_WRITE {
            warn!(write_ms = write_elapsed.as_millis() as u64, "slow serial write");
        }
        self.record_tx(line, true);

        let responses = if read_budget.is_zero() {
            Vec::new()
        } else {
            read_lines_for(&mut conn.port, read_budget).await
        };

        Ok(SendOutcome {
            responses,
            port: Some(conn.path.clone()),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn probe_inner(&self) -> Result<bool, Error> {
        let mut guard = self.lock_conn().await?;
        let conn = match guard.as_mut() {
            Some(c) => c,
            None => return Err(Error::NoDevice),
        };
        if let Err(e) = conn.port.write_all(b"INFO\n").await {
            warn!(err = %e, "health probe write failed");
            return Ok(false);
        }
        let lines = read_lines_for(&mut conn.port, PROBE_READ).await;
        let healthy = !lines.is_empty();
        if healthy {
            debug!(port = %conn.path, "controller link healthy");
        } else {
            warn!(port = %conn.path, "controller link appears dead");
        }
        Ok(healthy)
    }

    async fn reconnect_inner(&self) -> Result<LinkStatus, Error> {
        info!("reconnect requested");
        let mut guard = self.lock_conn().await?;
        *guard = None;
        self.shared.lock().port = None;
        *guard = Some(self.detect().await?);
        drop(guard);
        Ok(self.status())
    }

    async fn close_inner(&self) {
        let mut guard = self.conn.lock().await;
        if guard.take().is_some() {
            info!("serial link closed");
        }
        self.shared.lock().port = None;
    }
}

impl Link for SerialLink {
    fn send_line<'a>(
        &'a self,
        line: &'a str,
        read_budget: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<SendOutcome, Error>> + Send + 'a>> {
        Box::pin(self.send_line_inner(line, read_budget))
    }

    fn probe(&self) -> Pin<Box<dyn Future<Output = Result<bool, Error>> + Send + '_>> {
        Box::pin(self.probe_inner())
    }

    fn reconnect(&self) -> Pin<Box<dyn Future<Output = Result<LinkStatus, Error>> + Send + '_>> {
        Box::pin(self.reconnect_inner())
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.close_inner())
    }

    fn status(&self) -> LinkStatus {
        let shared = self.shared.lock();
        LinkStatus {
            connected: shared.port.is_some(),
            port: shared.port.clone(),
            last_write_ms: shared.last_write_ms,
            recent: shared.recent.iter().rev().cloned().collect(),
        }
    }
}

/// Read newline-terminated lines from the port for up to `budget`.
async fn read_lines_for(port: &mut SerialStream, budget: Duration) -> Vec<String> {
    let deadline = Instant::now() + budget;
    let mut lines = Vec::new();
    let mut acc: Vec<u8> = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        match tokio::time::timeout(deadline - now, port.read(&mut byte)).await {
            Ok(Ok(n)) if n > 0 => {
                if byte[0] == b'\n' {
                    push_line(&mut lines, &acc);
                    acc.clear();
                } else {
                    acc.push(byte[0]);
                }
            }
            _ => break,
        }
    }
    push_line(&mut lines, &acc);
    lines
}

fn push_line(lines: &mut Vec<String>, acc: &[u8]) {
    let text = String::from_utf8_lossy(acc);
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        lines.push(trimmed.to_owned());
    }
}

/// Whether a `/dev` entry name looks like a serial candidate.
fn is_candidate_name(name: &str) -> bool {
    name.starts_with("ttyACM") || name.starts_with("ttyUSB")
}

/// Whether a by-id entry name matches the controller vendor.
fn is_vendor_match(name: &str) -> bool {
    name.to_lowercase().contains("arduino")
}

/// Whether an INFO reply line identifies the shade controller.
fn identifies_controller(line: &str) -> bool {
    let lower = line.to_lowercase();
    IDENT_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "serial_tests.rs"]
mod tests;
