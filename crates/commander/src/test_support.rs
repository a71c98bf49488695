// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: fakes and fixture builders.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::Error;
use crate::link::{Link, LinkStatus, SendOutcome};
use crate::shade::{Action, RemoteFamily, ShadeRecord};

/// One write captured by [`FakeLink`].
#[derive(Debug, Clone)]
pub struct RecordedWrite {
    pub line: String,
    pub at: Instant,
}

/// Recording link fake. Successful sends are captured with their timestamp;
/// failure injection covers the silent-failure paths.
pub struct FakeLink {
    writes: Mutex<Vec<RecordedWrite>>,
    fail_with: Mutex<Option<Error>>,
    delay: Mutex<Duration>,
}

impl Default for FakeLink {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeLink {
    pub fn new() -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Make every subsequent send fail with `err` (or succeed again with
    /// `None`).
    pub fn fail_with(&self, err: Option<Error>) {
        *self.fail_with.lock() = err;
    }

    /// Delay each send by `d` before it is recorded.
    pub fn set_delay(&self, d: Duration) {
        *self.delay.lock() = d;
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.writes.lock().iter().map(|w| w.line.clone()).collect()
    }

    /// Write offsets in milliseconds relative to `origin`.
    pub fn offsets_ms(&self, origin: Instant) -> Vec<u64> {
        self.writes
            .lock()
            .iter()
            .map(|w| w.at.saturating_duration_since(origin).as_millis() as u64)
            .collect()
    }
}

impl Link for FakeLink {
    fn send_line<'a>(
        &'a self,
        line: &'a str,
        _read_budget: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<SendOutcome, Error>> + Send + 'a>> {
        Box::pin(async move {
            let delay = *self.delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Some(err) = self.fail_with.lock().clone() {
                return Err(err);
            }
            self.writes.lock().push(RecordedWrite {
                line: line.to_owned(),
                at: Instant::now(),
            });
            Ok(SendOutcome {
                responses: Vec::new(),
                port: Some("fake".to_owned()),
                duration_ms: 0,
            })
        })
    }

    fn probe(&self) -> Pin<Box<dyn Future<Output = Result<bool, Error>> + Send + '_>> {
        Box::pin(async { Ok(true) })
    }

    fn reconnect(&self) -> Pin<Box<dyn Future<Output = Result<LinkStatus, Error>> + Send + '_>> {
        Box::pin(async { Ok(self.status()) })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }

    fn status(&self) -> LinkStatus {
        LinkStatus {
            connected: true,
            port: Some("fake".to_owned()),
            last_write_ms: None,
            recent: Vec::new(),
        }
    }
}

/// In-memory shade directory.
pub struct MemoryDirectory {
    shades: HashMap<u32, ShadeRecord>,
}

impl MemoryDirectory {
    pub fn new(records: impl IntoIterator<Item = ShadeRecord>) -> Self {
        Self {
            shades: records.into_iter().map(|r| (r.shade_id, r)).collect(),
        }
    }
}

impl crate::directory::ShadeDirectory for MemoryDirectory {
    fn lookup(&self, shade_id: u32) -> Result<ShadeRecord, Error> {
        self.shades
            .get(&shade_id)
            .cloned()
            .ok_or(Error::ShadeNotFound { shade_id })
    }

    fn list_all(&self) -> Result<Vec<ShadeRecord>, Error> {
        let mut out: Vec<ShadeRecord> = self.shades.values().cloned().collect();
        out.sort_by_key(|r| r.shade_id);
        Ok(out)
    }
}

/// Canonical shade fixture; fully configured for all three actions.
pub fn shade_record(shade_id: u32) -> ShadeRecord {
    ShadeRecord {
        shade_id,
        remote_id: 254,
        family: RemoteFamily::SixChannel,
        channel: "A1".to_owned(),
        header_bytes: "5C 2D 0D 39".to_owned(),
        id_bytes: "FE FF".to_owned(),
        up_code: "F4 69".to_owned(),
        down_code: "AA BB".to_owned(),
        stop_code: "C3 10".to_owned(),
        common_byte: 80,
        room: "Bedroom".to_owned(),
        location: "East Window".to_owned(),
        facing: "east".to_owned(),
        kind: "Privacy".to_owned(),
    }
}

/// A scene step literal for fixture documents.
pub fn scene_step(shade_id: u32, action: Action, delay_ms: u64) -> serde_json::Value {
    serde_json::json!({
        "shade_id": shade_id,
        "action": match action {
            Action::Raise => "u",
            Action::Lower => "d",
            Action::Stop => "s",
        },
        "delay_ms": delay_ms,
    })
}

/// Write scene documents into a fresh temp directory and return it.
pub fn scene_dir(scenes: &[(&str, serde_json::Value)]) -> tempfile::TempDir {
    #[allow(clippy::expect_used)]
    let dir = tempfile::tempdir().expect("create temp scene dir");
    for (name, doc) in scenes {
        let path = dir.path().join(format!("{name}.json"));
        #[allow(clippy::expect_used)]
        std::fs::write(&path, doc.to_string()).expect("write scene fixture");
    }
    dir
}
