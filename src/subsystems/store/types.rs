//! Row types. Serialized with camelCase keys, matching the column names
//! the browser client reads.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }

    fn parse(s: &str) -> Self {
        if s == "admin" { UserRole::Admin } else { UserRole::User }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub open_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub login_method: Option<String>,
    pub role: UserRole,
    pub created_at: String,
    pub updated_at: String,
    pub last_signed_in: String,
}

/// Fields for `upsert_user`. `None` means "not supplied": the column is
/// left untouched on update and takes its default on insert.
#[derive(Debug, Clone, Default)]
pub struct UserUpsert {
    pub open_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub login_method: Option<String>,
    pub role: Option<UserRole>,
    pub last_signed_in: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub language: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSnippet {
    pub id: i64,
    pub project_id: i64,
    pub user_id: i64,
    pub title: String,
    pub code: String,
    pub language: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewSnippet {
    pub project_id: i64,
    pub title: String,
    pub code: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub id: i64,
    pub snippet_id: i64,
    pub user_id: i64,
    pub analysis_type: String,
    pub result: String,
    pub score: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub snippet_id: i64,
    pub user_id: i64,
    pub analysis_type: String,
    pub result: String,
    pub score: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }

    fn parse(s: &str) -> Self {
        if s == "assistant" { ChatRole::Assistant } else { ChatRole::User }
    }
}

/// One persisted `chatHistory` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryEntry {
    pub id: i64,
    pub user_id: i64,
    pub snippet_id: Option<i64>,
    pub role: ChatRole,
    pub message: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub user_id: i64,
    pub snippet_id: Option<i64>,
    pub role: ChatRole,
    pub message: String,
}

// Column-text conversions used by the row mappers.
pub(super) fn user_role(s: &str) -> UserRole {
    UserRole::parse(s)
}

pub(super) fn chat_role(s: &str) -> ChatRole {
    ChatRole::parse(s)
}
