//! SQLite connection management for the local session database.
//!
//! The [`Database`] owns a `rusqlite::Connection` and brings the schema up to
//! date on open.

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use super::migrations;
use crate::types::errors::SessionError;

/// File name of the session database inside the data directory.
pub const DATABASE_FILE: &str = "smart-bookmarks.db";

/// Local SQLite database holding the persisted auth session.
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Opens (or creates) a database at `path` and runs migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SessionError> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;
        Self::init(conn, Some(path.as_ref().to_path_buf()))
    }

    /// Opens `DATABASE_FILE` inside `dir`, creating the directory if needed.
    pub fn open_in_dir<P: AsRef<Path>>(dir: P) -> Result<Self, SessionError> {
        std::fs::create_dir_all(dir.as_ref()).map_err(|e| {
            SessionError::DatabaseError(format!("Failed to create data directory: {}", e))
        })?;
        Self::open(dir.as_ref().join(DATABASE_FILE))
    }

    /// Opens an in-memory database, discarded on drop.
    pub fn open_in_memory() -> Result<Self, SessionError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, SessionError> {
        migrations::run_all(&conn).map_err(db_err)?;
        Ok(Self { conn, path })
    }

    /// File backing this database, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn db_err(e: rusqlite::Error) -> SessionError {
    SessionError::DatabaseError(e.to_string())
}
