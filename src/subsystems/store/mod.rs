//! `store` — relational tables for users, projects, snippets, analysis
//! results and chat history (SQLite via `rusqlite`).
//!
//! Every operation opens its own connection, so a `Store` is just the
//! database path and clones freely across handlers. Calls are blocking;
//! async callers go through [`Store::run`], which moves the work onto the
//! blocking pool.

mod analysis;
mod chat;
mod projects;
mod snippets;
pub mod types;
mod users;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;

use crate::error::AppError;

pub use types::*;

const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone)]
pub struct Store {
    db_path: PathBuf,
    /// openId granted the `admin` role when a user row is first written.
    owner_open_id: Option<String>,
}

impl Store {
    /// Open (creating if needed) the database at `db_path` and make sure the
    /// schema is current.
    pub fn open(db_path: &Path, owner_open_id: Option<String>) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Store(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let store = Self { db_path: db_path.to_path_buf(), owner_open_id };
        store.init_db()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Run a blocking store call on the blocking thread pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> Result<T, AppError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| AppError::Store(format!("blocking task failed: {e}")))?
    }

    fn init_db(&self) -> Result<(), AppError> {
        let conn = self.open_conn()?;
        let version: i64 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .map_err(|e| AppError::Store(format!("read schema version: {e}")))?;

        if version == 0 {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    openId TEXT NOT NULL UNIQUE,
                    name TEXT,
                    email TEXT,
                    loginMethod TEXT,
                    role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin')),
                    createdAt TEXT NOT NULL,
                    updatedAt TEXT NOT NULL,
                    lastSignedIn TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS projects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    userId INTEGER NOT NULL,
                    name TEXT NOT NULL,
                    description TEXT,
                    language TEXT NOT NULL DEFAULT 'javascript',
                    createdAt TEXT NOT NULL,
                    updatedAt TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS codeSnippets (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    projectId INTEGER NOT NULL,
                    userId INTEGER NOT NULL,
                    title TEXT NOT NULL,
                    code TEXT NOT NULL,
                    language TEXT NOT NULL DEFAULT 'javascript',
                    createdAt TEXT NOT NULL,
                    updatedAt TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS analysisResults (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    snippetId INTEGER NOT NULL,
                    userId INTEGER NOT NULL,
                    analysisType TEXT NOT NULL,
                    result TEXT NOT NULL,
                    score INTEGER,
                    createdAt TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS chatHistory (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    userId INTEGER NOT NULL,
                    snippetId INTEGER,
                    role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                    message TEXT NOT NULL,
                    createdAt TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_projects_user ON projects (userId);
                CREATE INDEX IF NOT EXISTS idx_snippets_user ON codeSnippets (userId);
                CREATE INDEX IF NOT EXISTS idx_analysis_snippet ON analysisResults (snippetId);
                CREATE INDEX IF NOT EXISTS idx_chat_user_snippet ON chatHistory (userId, snippetId);

                PRAGMA user_version = 1;
                ",
            )
            .map_err(|e| AppError::Store(format!("initialize schema: {e}")))?;
            return Ok(());
        }

        if version != SCHEMA_VERSION {
            return Err(AppError::Store(format!(
                "unsupported schema version {version}, expected {SCHEMA_VERSION}"
            )));
        }

        Ok(())
    }

    fn open_conn(&self) -> Result<Connection, AppError> {
        let conn = Connection::open(&self.db_path)
            .map_err(|e| AppError::Store(format!("open {}: {e}", self.db_path.display())))?;

        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))
            .map_err(|e| AppError::Store(format!("set journal_mode WAL: {e}")))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| AppError::Store(format!("set busy_timeout: {e}")))?;

        Ok(conn)
    }
}

pub(crate) fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Collect a `query_map` result, tagging row errors with `what`.
fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
    what: &str,
) -> Result<Vec<T>, AppError> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| AppError::Store(format!("map {what} row: {e}")))?);
    }
    Ok(out)
}
