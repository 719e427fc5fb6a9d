use rusqlite::{OptionalExtension, Row, params};

use crate::error::AppError;

use super::types::{CodeSnippet, NewSnippet};
use super::{Store, collect_rows, now_iso8601};

const SNIPPET_COLUMNS: &str =
    "id, projectId, userId, title, code, language, createdAt, updatedAt";

fn map_snippet(row: &Row<'_>) -> rusqlite::Result<CodeSnippet> {
    Ok(CodeSnippet {
        id: row.get(0)?,
        project_id: row.get(1)?,
        user_id: row.get(2)?,
        title: row.get(3)?,
        code: row.get(4)?,
        language: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl Store {
    pub fn list_snippets(&self, user_id: i64) -> Result<Vec<CodeSnippet>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SNIPPET_COLUMNS} FROM codeSnippets WHERE userId = ?1 ORDER BY id"
            ))
            .map_err(|e| AppError::Store(format!("prepare list_snippets: {e}")))?;
        let rows = stmt
            .query_map(params![user_id], map_snippet)
            .map_err(|e| AppError::Store(format!("query list_snippets: {e}")))?;
        collect_rows(rows, "list_snippets")
    }

    pub fn create_snippet(&self, user_id: i64, snippet: NewSnippet) -> Result<CodeSnippet, AppError> {
        let now = now_iso8601();
        let conn = self.open_conn()?;
        conn.execute(
            "INSERT INTO codeSnippets (projectId, userId, title, code, language, createdAt, updatedAt) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![snippet.project_id, user_id, snippet.title, snippet.code, snippet.language, now],
        )
        .map_err(|e| AppError::Store(format!("insert snippet: {e}")))?;

        Ok(CodeSnippet {
            id: conn.last_insert_rowid(),
            project_id: snippet.project_id,
            user_id,
            title: snippet.title,
            code: snippet.code,
            language: snippet.language,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// The snippet with `id`, only if it belongs to `user_id`.
    pub fn get_snippet(&self, id: i64, user_id: i64) -> Result<Option<CodeSnippet>, AppError> {
        let conn = self.open_conn()?;
        conn.query_row(
            &format!("SELECT {SNIPPET_COLUMNS} FROM codeSnippets WHERE id = ?1 AND userId = ?2 LIMIT 1"),
            params![id, user_id],
            map_snippet,
        )
        .optional()
        .map_err(|e| AppError::Store(format!("get snippet #{id}: {e}")))
    }
}
