use rusqlite::{Row, params};

use crate::error::AppError;

use super::types::{ChatHistoryEntry, NewChatMessage, chat_role};
use super::{Store, collect_rows, now_iso8601};

fn map_entry(row: &Row<'_>) -> rusqlite::Result<ChatHistoryEntry> {
    let role: String = row.get(3)?;
    Ok(ChatHistoryEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        snippet_id: row.get(2)?,
        role: chat_role(&role),
        message: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl Store {
    /// Messages of `user_id`, oldest first. With `snippet_id`, only the
    /// conversation attached to that snippet.
    pub fn chat_history(
        &self,
        user_id: i64,
        snippet_id: Option<i64>,
    ) -> Result<Vec<ChatHistoryEntry>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, userId, snippetId, role, message, createdAt FROM chatHistory \
                 WHERE userId = ?1 AND (?2 IS NULL OR snippetId = ?2) \
                 ORDER BY createdAt, id",
            )
            .map_err(|e| AppError::Store(format!("prepare chat_history: {e}")))?;
        let rows = stmt
            .query_map(params![user_id, snippet_id], map_entry)
            .map_err(|e| AppError::Store(format!("query chat_history: {e}")))?;
        collect_rows(rows, "chat_history")
    }

    pub fn save_chat_message(&self, msg: NewChatMessage) -> Result<ChatHistoryEntry, AppError> {
        let now = now_iso8601();
        let conn = self.open_conn()?;
        conn.execute(
            "INSERT INTO chatHistory (userId, snippetId, role, message, createdAt) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![msg.user_id, msg.snippet_id, msg.role.as_str(), msg.message, now],
        )
        .map_err(|e| AppError::Store(format!("insert chat message: {e}")))?;

        Ok(ChatHistoryEntry {
            id: conn.last_insert_rowid(),
            user_id: msg.user_id,
            snippet_id: msg.snippet_id,
            role: msg.role,
            message: msg.message,
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::store::ChatRole;
    use tempfile::TempDir;

    fn msg(user_id: i64, snippet_id: Option<i64>, role: ChatRole, text: &str) -> NewChatMessage {
        NewChatMessage { user_id, snippet_id, role, message: text.into() }
    }

    #[test]
    fn history_filters_on_user_and_snippet() {
        let tmp = TempDir::new().unwrap();
        let s = Store::open(&tmp.path().join("app.db"), None).unwrap();

        s.save_chat_message(msg(1, Some(7), ChatRole::User, "q1")).unwrap();
        s.save_chat_message(msg(1, Some(7), ChatRole::Assistant, "a1")).unwrap();
        s.save_chat_message(msg(1, None, ChatRole::User, "loose")).unwrap();
        s.save_chat_message(msg(2, Some(7), ChatRole::User, "someone else")).unwrap();

        let thread: Vec<_> = s
            .chat_history(1, Some(7))
            .unwrap()
            .into_iter()
            .map(|m| (m.role, m.message))
            .collect();
        assert_eq!(
            thread,
            vec![(ChatRole::User, "q1".to_string()), (ChatRole::Assistant, "a1".to_string())]
        );

        assert_eq!(s.chat_history(1, None).unwrap().len(), 3);
        assert_eq!(s.chat_history(2, None).unwrap().len(), 1);
        assert!(s.chat_history(3, None).unwrap().is_empty());
    }

    #[test]
    fn invalid_role_is_rejected_by_schema() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("app.db");
        Store::open(&path, None).unwrap();
        let conn = rusqlite::Connection::open(&path).unwrap();
        let res = conn.execute(
            "INSERT INTO chatHistory (userId, role, message, createdAt) VALUES (1, 'system', 'x', 'now')",
            [],
        );
        assert!(res.is_err());
    }
}
