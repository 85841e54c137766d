// src/checkpoint.rs
//
// =============================================================================
// VASPLAB: JOB STORE
// =============================================================================
//
// The Persistence Layer.
//
// Architecture:
// - One SQLite file (`DB.db`) inside each calculation directory, so the
//   record travels with the directory when it is copied.
// - Key/value `meta` table with upsert writes.
// - HPC-safe journaling (DELETE mode, no WAL side files on Lustre/GPFS).
// - Lookups never create the database.

use crate::error::Result;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};

pub const DB_FILE: &str = "DB.db";

const KEY_JOB_ID: &str = "jobid";

pub struct JobStore {
    path: PathBuf,
}

impl JobStore {
    /// Opens (creating if needed) the store of a calculation directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            path: dir.as_ref().join(DB_FILE),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the schema if it doesn't exist.
    fn init(&self) -> Result<()> {
        let conn = Connection::open(&self.path)?;

        conn.execute_batch(
            "PRAGMA journal_mode=DELETE;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=10000;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT
            );",
        )?;

        Ok(())
    }

    fn conn(&self) -> Result<Connection> {
        Ok(Connection::open(&self.path)?)
    }

    // -------------------------------------------------------------------------
    // WRITE API
    // -------------------------------------------------------------------------

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM meta WHERE key = ?1", params![key])?;
        Ok(())
    }

    pub fn set_job_id(&self, job_id: &str) -> Result<()> {
        log::debug!("Recording job {} in {:?}", job_id, self.path);
        self.set(KEY_JOB_ID, job_id)
    }

    pub fn clear_job_id(&self) -> Result<()> {
        self.remove(KEY_JOB_ID)
    }

    // -------------------------------------------------------------------------
    // READ API
    // -------------------------------------------------------------------------

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        read_key(&conn, key)
    }

    pub fn job_id(&self) -> Result<Option<String>> {
        self.get(KEY_JOB_ID)
    }

    /// Job id recorded for `dir`, without creating a store when none exists.
    pub fn lookup_job_id(dir: impl AsRef<Path>) -> Result<Option<String>> {
        let path = dir.as_ref().join(DB_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let conn = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        read_key(&conn, KEY_JOB_ID)
    }
}

fn read_key(conn: &Connection, key: &str) -> Result<Option<String>> {
    let exists: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type='table' AND name='meta'",
            [],
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Ok(None);
    }

    let val: Option<Option<String>> = conn
        .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(val.flatten())
}
