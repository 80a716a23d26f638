// src/db.rs

use crate::error::{BotError, Result};
use crate::models::LogEntry;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// Timestamp format shown back to users in "Logged at ..." replies.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The durable side of a dispatch: entries are appended and looked up by text, never edited.
pub trait RecordStore {
    /// Inserts a new entry and returns its timestamp.
    fn append(&self, text: &str, summary: &str, tags: &str) -> Result<String>;

    /// First entry whose `text` equals `text` exactly.
    fn find_summary_by_text(&self, text: &str) -> Result<Option<String>>;
}

/// Default database location (~/.config/mention-bot/logs.db)
pub fn default_db_path() -> Result<PathBuf> {
    let home_dir = dirs::home_dir().ok_or(BotError::HomeDirNotFound)?;
    Ok(home_dir.join(".config/mention-bot/logs.db"))
}

pub fn open_connection(path: &Path) -> Result<Connection> {
    Connection::open(path).map_err(BotError::Sql)
}

/// Creates the table if it does not exist yet.
pub fn initialize_db(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS log_entries (
            id INTEGER PRIMARY KEY,
            timestamp TEXT,
            text TEXT,
            summary TEXT,
            tags TEXT
        )",
        [],
    )?;
    Ok(())
}

pub fn add_entry(conn: &Connection, text: &str, summary: &str, tags: &str) -> Result<String> {
    let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
    conn.execute(
        "INSERT INTO log_entries (timestamp, text, summary, tags) VALUES (?1, ?2, ?3, ?4)",
        params![timestamp, text, summary, tags],
    )?;
    Ok(timestamp)
}

pub fn find_summary_by_text(conn: &Connection, text: &str) -> Result<Option<String>> {
    let summary = conn
        .query_row(
            "SELECT summary FROM log_entries WHERE text = ? ORDER BY id LIMIT 1",
            [text],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(summary.map(Option::unwrap_or_default))
}

/// Newest entries first, optionally filtered by a keyword in text or summary.
pub fn fetch_entries(conn: &Connection, limit: u32, search: Option<&str>) -> Result<Vec<LogEntry>> {
    let mut query = String::from("SELECT id, timestamp, text, summary, tags FROM log_entries ");
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(keyword) = search {
        query.push_str("WHERE (text LIKE '%' || ? || '%' OR summary LIKE '%' || ? || '%') ");
        params.push(Box::new(keyword.to_string()));
        params.push(Box::new(keyword.to_string()));
    }

    query.push_str("ORDER BY id DESC LIMIT ?");
    params.push(Box::new(limit as i64));

    let mut stmt = conn.prepare(&query)?;
    let entries = stmt
        .query_map(rusqlite::params_from_iter(params.iter().map(|b| b.as_ref())), |row| {
            Ok(LogEntry {
                id: row.get(0)?,
                timestamp: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                text: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                summary: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                tags: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(entries)
}

pub fn count_entries(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM log_entries", [], |row| row.get(0))?;
    Ok(count as usize)
}

/// SQLite-backed store that opens a fresh connection for every operation.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for SqliteStore {
    fn append(&self, text: &str, summary: &str, tags: &str) -> Result<String> {
        let conn = open_connection(&self.path)?;
        add_entry(&conn, text, summary, tags)
    }

    fn find_summary_by_text(&self, text: &str) -> Result<Option<String>> {
        let conn = open_connection(&self.path)?;
        find_summary_by_text(&conn, text)
    }
}
