use rusqlite::{OptionalExtension, Row, params};

use crate::error::AppError;

use super::types::{User, UserRole, UserUpsert, user_role};
use super::{Store, now_iso8601};

const USER_COLUMNS: &str =
    "id, openId, name, email, loginMethod, role, createdAt, updatedAt, lastSignedIn";

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(5)?;
    Ok(User {
        id: row.get(0)?,
        open_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        login_method: row.get(4)?,
        role: user_role(&role),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        last_signed_in: row.get(8)?,
    })
}

impl Store {
    /// Insert the user or update the existing row with the same `openId`.
    ///
    /// Only supplied fields are written on update. The configured owner gets
    /// `admin` unless a role is given explicitly. When nothing was supplied
    /// the update still bumps `lastSignedIn`.
    pub fn upsert_user(&self, user: UserUpsert) -> Result<User, AppError> {
        if user.open_id.is_empty() {
            return Err(AppError::Store("user openId is required for upsert".into()));
        }

        let role = user.role.or_else(|| {
            (self.owner_open_id.as_deref() == Some(user.open_id.as_str())).then_some(UserRole::Admin)
        });

        let mut update_set: Vec<&str> = Vec::new();
        if user.name.is_some() {
            update_set.push("name = excluded.name");
        }
        if user.email.is_some() {
            update_set.push("email = excluded.email");
        }
        if user.login_method.is_some() {
            update_set.push("loginMethod = excluded.loginMethod");
        }
        if user.last_signed_in.is_some() {
            update_set.push("lastSignedIn = excluded.lastSignedIn");
        }
        if role.is_some() {
            update_set.push("role = excluded.role");
        }
        if update_set.is_empty() {
            update_set.push("lastSignedIn = excluded.lastSignedIn");
        }
        update_set.push("updatedAt = excluded.updatedAt");

        let now = now_iso8601();
        let last_signed_in = user.last_signed_in.clone().unwrap_or_else(|| now.clone());
        let role = role.unwrap_or(UserRole::User);

        let sql = format!(
            "INSERT INTO users (openId, name, email, loginMethod, role, createdAt, updatedAt, lastSignedIn) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7) \
             ON CONFLICT(openId) DO UPDATE SET {}",
            update_set.join(", ")
        );

        let conn = self.open_conn()?;
        conn.execute(
            &sql,
            params![
                user.open_id,
                user.name,
                user.email,
                user.login_method,
                role.as_str(),
                now,
                last_signed_in,
            ],
        )
        .map_err(|e| AppError::Store(format!("upsert user {}: {e}", user.open_id)))?;

        self.get_user_by_open_id(&user.open_id)?
            .ok_or_else(|| AppError::Store(format!("user {} missing after upsert", user.open_id)))
    }

    pub fn get_user_by_open_id(&self, open_id: &str) -> Result<Option<User>, AppError> {
        let conn = self.open_conn()?;
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE openId = ?1 LIMIT 1"),
            params![open_id],
            map_user,
        )
        .optional()
        .map_err(|e| AppError::Store(format!("get user {open_id}: {e}")))
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let conn = self.open_conn()?;
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            map_user,
        )
        .optional()
        .map_err(|e| AppError::Store(format!("get user #{id}: {e}")))
    }
}
