//! Blob store backed by a single SQLite table.

use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::persist::store::{missing_blob, BlobStore};
use rusqlite::{params, Connection, OptionalExtension};
use std::io;
use std::path::Path;

/// Saves every blob as a row of `blobs(key, bytes)`.
pub struct SqliteBlobStore {
    conn: Connection,
}

impl SqliteBlobStore {
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Ok(Self {
            conn: open_db(path)?,
        })
    }

    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self {
            conn: open_db_in_memory()?,
        })
    }

    /// Stored keys in ascending order.
    pub fn keys(&self) -> io::Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM blobs ORDER BY key ASC;")
            .map_err(to_io)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(to_io)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(to_io)
    }
}

impl BlobStore for SqliteBlobStore {
    fn write(&mut self, key: &str, bytes: &[u8]) -> io::Result<()> {
        self.conn
            .execute(
                "INSERT INTO blobs (key, bytes) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET bytes = excluded.bytes;",
                params![key, bytes],
            )
            .map(|_| ())
            .map_err(to_io)
    }

    fn read(&self, key: &str) -> io::Result<Vec<u8>> {
        self.conn
            .query_row(
                "SELECT bytes FROM blobs WHERE key = ?1;",
                params![key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()
            .map_err(to_io)?
            .ok_or_else(|| missing_blob(key))
    }

    fn clear(&mut self) -> io::Result<()> {
        self.conn
            .execute("DELETE FROM blobs;", [])
            .map(|_| ())
            .map_err(to_io)
    }
}

fn to_io(err: rusqlite::Error) -> io::Error {
    io::Error::other(err)
}
