use rusqlite::{Row, params};

use crate::error::AppError;

use super::types::{NewProject, Project};
use super::{Store, collect_rows, now_iso8601};

const PROJECT_COLUMNS: &str = "id, userId, name, description, language, createdAt, updatedAt";

fn map_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        language: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl Store {
    pub fn list_projects(&self, user_id: i64) -> Result<Vec<Project>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PROJECT_COLUMNS} FROM projects WHERE userId = ?1 ORDER BY id"
            ))
            .map_err(|e| AppError::Store(format!("prepare list_projects: {e}")))?;
        let rows = stmt
            .query_map(params![user_id], map_project)
            .map_err(|e| AppError::Store(format!("query list_projects: {e}")))?;
        collect_rows(rows, "list_projects")
    }

    /// Insert a project owned by `user_id` and return the stored row.
    pub fn create_project(&self, user_id: i64, project: NewProject) -> Result<Project, AppError> {
        let now = now_iso8601();
        let conn = self.open_conn()?;
        conn.execute(
            "INSERT INTO projects (userId, name, description, language, createdAt, updatedAt) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![user_id, project.name, project.description, project.language, now],
        )
        .map_err(|e| AppError::Store(format!("insert project: {e}")))?;

        Ok(Project {
            id: conn.last_insert_rowid(),
            user_id,
            name: project.name,
            description: project.description,
            language: project.language,
            created_at: now.clone(),
            updated_at: now,
        })
    }
}
