// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shade directory: read-only lookup from shade id to [`ShadeRecord`].

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, Row};

use crate::error::Error;
use crate::shade::{RemoteFamily, ShadeRecord};

/// Read-only lookup of shade configuration.
///
/// Callers are on the slow path relative to the RF transmission, so no
/// caching is done; implementations may open a fresh store handle per query.
pub trait ShadeDirectory: Send + Sync + 'static {
    /// Fetch one shade by id.
    fn lookup(&self, shade_id: u32) -> Result<ShadeRecord, Error>;

    /// All configured shades in ascending shade-id order.
    fn list_all(&self) -> Result<Vec<ShadeRecord>, Error>;
}

const COLUMNS: &str = "shade_id, remote_id, remote_type, channel, header_bytes, \
     identifier_bytes, up_command, down_command, stop_command, common_byte, \
     room, location, facing, type";

/// SQLite-backed directory over the `shades` table.
pub struct SqliteDirectory {
    path: PathBuf,
}

impl SqliteDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn open(&self) -> Result<Connection, Error> {
        Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(store_unavailable)
    }
}

impl ShadeDirectory for SqliteDirectory {
    fn lookup(&self, shade_id: u32) -> Result<ShadeRecord, Error> {
        let conn = self.open()?;
        let sql = format!("SELECT {COLUMNS} FROM shades WHERE shade_id = ?1");
        let mut stmt = conn.prepare(&sql).map_err(store_unavailable)?;
        match stmt.query_row([shade_id], row_to_record) {
            Ok(record) => Ok(record),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::ShadeNotFound { shade_id }),
            Err(e) => Err(store_unavailable(e)),
        }
    }

    fn list_all(&self) -> Result<Vec<ShadeRecord>, Error> {
        let conn = self.open()?;
        let sql = format!("SELECT {COLUMNS} FROM shades ORDER BY shade_id ASC");
        let mut stmt = conn.prepare(&sql).map_err(store_unavailable)?;
        let rows = stmt.query_map([], row_to_record).map_err(store_unavailable)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(store_unavailable)?);
        }
        Ok(out)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ShadeRecord> {
    let family_tag: String = row.get(2)?;
    Ok(ShadeRecord {
        shade_id: row.get::<_, i64>(0)? as u32,
        remote_id: row.get::<_, i64>(1)? as u8,
        family: RemoteFamily::from_tag(&family_tag),
        channel: row.get(3)?,
        header_bytes: row.get(4)?,
        id_bytes: row.get(5)?,
        up_code: row.get(6)?,
        down_code: row.get(7)?,
        stop_code: row.get(8)?,
        common_byte: row.get::<_, i64>(9)? as u8,
        room: row.get(10)?,
        location: row.get(11)?,
        facing: row.get(12)?,
        kind: row.get(13)?,
    })
}

fn store_unavailable(e: rusqlite::Error) -> Error {
    Error::StoreUnavailable { reason: e.to_string() }
}

/// Seed a shade database at `path` with the given records (fixtures and
/// provisioning tooling).
pub fn seed_database(path: &Path, records: &[ShadeRecord]) -> Result<(), Error> {
    let conn = Connection::open(path).map_err(store_unavailable)?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS shades (
            shade_id INTEGER PRIMARY KEY,
            remote_id INTEGER NOT NULL,
            remote_type TEXT NOT NULL,
            channel TEXT NOT NULL,
            header_bytes TEXT NOT NULL,
            identifier_bytes TEXT NOT NULL,
            up_command TEXT NOT NULL,
            down_command TEXT NOT NULL,
            stop_command TEXT NOT NULL,
            common_byte INTEGER NOT NULL,
            room TEXT NOT NULL DEFAULT '',
            location TEXT NOT NULL DEFAULT '',
            facing TEXT NOT NULL DEFAULT '',
            type TEXT NOT NULL DEFAULT ''
        )",
    )
    .map_err(store_unavailable)?;

    for r in records {
        let family_tag = match r.family {
            RemoteFamily::SixChannel => "AC123-06D",
            RemoteFamily::SixteenChannel => "AC123-16D",
        };
        conn.execute(
            "INSERT OR REPLACE INTO shades VALUES
                (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            rusqlite::params![
                r.shade_id,
                r.remote_id,
                family_tag,
                r.channel,
                r.header_bytes,
                r.id_bytes,
                r.up_code,
                r.down_code,
                r.stop_code,
                r.common_byte,
                r.room,
                r.location,
                r.facing,
                r.kind,
            ],
        )
        .map_err(store_unavailable)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "directory_tests.rs"]
mod tests;
