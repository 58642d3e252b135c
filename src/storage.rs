use anyhow::Result;
use rusqlite::{params, Connection};

/// One row of the fetch history.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRecord {
    pub ts: u64,
    pub status: String,
    pub path: Option<String>,
    pub bytes: u64,
    pub sha256: Option<String>,
    pub error: Option<String>,
}

/// Operational history of the daemon: fetches and cleanups. Queries never read it.
pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    pub fn new(path: &str) -> Result<Self> {
        Ok(Self { conn: Connection::open(path)? })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS fetches (
                ts INTEGER NOT NULL,
                status TEXT NOT NULL,
                path TEXT,
                bytes INTEGER NOT NULL,
                sha256 TEXT,
                error TEXT
            );
            CREATE TABLE IF NOT EXISTS cleanups (
                ts INTEGER NOT NULL,
                removed INTEGER NOT NULL
            );
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn record_fetch(&mut self, rec: &FetchRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO fetches (ts, status, path, bytes, sha256, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                rec.ts as i64,
                rec.status,
                rec.path,
                rec.bytes as i64,
                rec.sha256,
                rec.error
            ],
        )?;
        Ok(())
    }

    pub fn record_cleanup(&mut self, ts: u64, removed: usize) -> Result<()> {
        self.conn.execute(
            "INSERT INTO cleanups (ts, removed) VALUES (?1, ?2)",
            params![ts as i64, removed as i64],
        )?;
        Ok(())
    }

    /// Most recent fetches, newest first.
    pub fn recent_fetches(&self, limit: usize) -> Result<Vec<FetchRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT ts, status, path, bytes, sha256, error FROM fetches
             ORDER BY ts DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(FetchRecord {
                ts: row.get::<_, i64>(0)? as u64,
                status: row.get(1)?,
                path: row.get(2)?,
                bytes: row.get::<_, i64>(3)? as u64,
                sha256: row.get(4)?,
                error: row.get(5)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn total_removed(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COALESCE(SUM(removed), 0) FROM cleanups", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}
