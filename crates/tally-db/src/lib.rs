pub mod feed;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod votes;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Single-connection SQLite handle. Every read and write goes through the
/// one connection, so a write transaction is never interleaved with another
/// call from this process.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent readers in other processes
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let db = Self::init(conn)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    /// Like `with_conn`, with the mutable access transactions need.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&mut conn)
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::Database;
    use crate::queries::NewUser;

    pub fn user(db: &Database, name: &str) -> i64 {
        match db
            .create_user(name, &format!("{name}@example.com"), "hash")
            .unwrap()
        {
            NewUser::Created(row) => row.id,
            NewUser::Taken(field) => panic!("{name} already taken: {field:?}"),
        }
    }

    pub fn post_at(db: &Database, creator: i64, title: &str, created_at: i64) -> i64 {
        db.create_post_at(creator, title, "body", created_at)
            .unwrap()
            .id
    }

    /// Recomputes the score from the vote rows.
    pub fn vote_sum(db: &Database, post_id: i64) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COALESCE(SUM(value), 0) FROM votes WHERE post_id = ?1",
                [post_id],
                |row| row.get(0),
            )?)
        })
        .unwrap()
    }

    pub fn points(db: &Database, post_id: i64) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT points FROM posts WHERE id = ?1",
                [post_id],
                |row| row.get(0),
            )?)
        })
        .unwrap()
    }
}
