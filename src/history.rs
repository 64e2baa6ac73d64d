use chrono::{DateTime, Local};
use rusqlite::{params, Connection, Result};
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;
use crate::stats::Summary;

/// One finished window as stored in the session log.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub taps: u32,
    pub mean_secs: Option<f64>,
    pub std_dev_secs: Option<f64>,
    pub played_at: DateTime<Local>,
}

/// Database manager for the per-window session log
#[derive(Debug)]
pub struct SessionDb {
    conn: Connection,
}

impl SessionDb {
    /// Open the session log in the application state directory, creating
    /// the table on first use.
    pub fn new() -> Result<Self> {
        let db_path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("tapr_sessions.db"));
        Self::open(db_path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(format!("Failed to create directory: {}", e)),
                )
            })?;
        }

        let conn = Connection::open(path)?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                taps INTEGER NOT NULL,
                mean_secs REAL,
                std_dev_secs REAL,
                played_at TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_played_at ON sessions(played_at)",
            [],
        )?;

        Ok(SessionDb { conn })
    }

    /// Record one finished window. The summary columns stay NULL for short
    /// sessions where no meaningful statistics exist.
    pub fn record(&self, taps: u32, summary: Option<&Summary>) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO sessions (taps, mean_secs, std_dev_secs, played_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                taps,
                summary.map(|s| s.mean),
                summary.map(|s| s.std_dev),
                Local::now().to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Most recent sessions, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<SessionRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT taps, mean_secs, std_dev_secs, played_at
            FROM sessions
            ORDER BY played_at DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map([limit as i64], Self::row_to_record)?;

        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }

        Ok(records)
    }

    /// Full log in play order, for export.
    pub fn all(&self) -> Result<Vec<SessionRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT taps, mean_secs, std_dev_secs, played_at
            FROM sessions
            ORDER BY played_at ASC
            "#,
        )?;

        let rows = stmt.query_map([], Self::row_to_record)?;

        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }

        Ok(records)
    }

    /// Best recorded tap count across the whole log.
    pub fn best(&self) -> Result<Option<u32>> {
        self.conn
            .query_row("SELECT MAX(taps) FROM sessions", [], |row| row.get(0))
    }

    /// Dump the full session log as CSV.
    pub fn export_csv<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["played_at", "taps", "mean_secs", "std_dev_secs"])?;

        for record in self.all()? {
            writer.write_record([
                record.played_at.to_rfc3339(),
                record.taps.to_string(),
                record.mean_secs.map_or(String::new(), |v| format!("{:.4}", v)),
                record
                    .std_dev_secs
                    .map_or(String::new(), |v| format!("{:.4}", v)),
            ])?;
        }

        writer.flush()?;
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
        let played_at_str: String = row.get(3)?;
        let played_at = DateTime::parse_from_rfc3339(&played_at_str)
            .map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    3,
                    "played_at".to_string(),
                    rusqlite::types::Type::Text,
                )
            })?
            .with_timezone(&Local);

        Ok(SessionRecord {
            taps: row.get(0)?,
            mean_secs: row.get(1)?,
            std_dev_secs: row.get(2)?,
            played_at,
        })
    }
}
