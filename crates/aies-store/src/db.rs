use rusqlite::Connection;

use crate::error::Result;

/// Initialise the documents table.
///
/// Safe to call on every startup (`IF NOT EXISTS`).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS documents (
            key         TEXT    NOT NULL PRIMARY KEY,
            version     INTEGER NOT NULL,
            data        TEXT    NOT NULL,   -- JSON envelope
            updated_at  TEXT    NOT NULL    -- ISO-8601
        ) STRICT;",
    )?;
    Ok(())
}
