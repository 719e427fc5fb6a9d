use rusqlite::{Row, params};

use crate::error::AppError;

use super::types::{AnalysisResult, NewAnalysis};
use super::{Store, collect_rows, now_iso8601};

fn map_analysis(row: &Row<'_>) -> rusqlite::Result<AnalysisResult> {
    Ok(AnalysisResult {
        id: row.get(0)?,
        snippet_id: row.get(1)?,
        user_id: row.get(2)?,
        analysis_type: row.get(3)?,
        result: row.get(4)?,
        score: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl Store {
    /// Analysis rows for `snippet_id` written by `user_id`, oldest first.
    pub fn list_analysis(&self, snippet_id: i64, user_id: i64) -> Result<Vec<AnalysisResult>, AppError> {
        let conn = self.open_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, snippetId, userId, analysisType, result, score, createdAt \
                 FROM analysisResults WHERE snippetId = ?1 AND userId = ?2 ORDER BY id",
            )
            .map_err(|e| AppError::Store(format!("prepare list_analysis: {e}")))?;
        let rows = stmt
            .query_map(params![snippet_id, user_id], map_analysis)
            .map_err(|e| AppError::Store(format!("query list_analysis: {e}")))?;
        collect_rows(rows, "list_analysis")
    }

    pub fn save_analysis(&self, analysis: NewAnalysis) -> Result<AnalysisResult, AppError> {
        let now = now_iso8601();
        let conn = self.open_conn()?;
        conn.execute(
            "INSERT INTO analysisResults (snippetId, userId, analysisType, result, score, createdAt) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                analysis.snippet_id,
                analysis.user_id,
                analysis.analysis_type,
                analysis.result,
                analysis.score,
                now,
            ],
        )
        .map_err(|e| AppError::Store(format!("insert analysis: {e}")))?;

        Ok(AnalysisResult {
            id: conn.last_insert_rowid(),
            snippet_id: analysis.snippet_id,
            user_id: analysis.user_id,
            analysis_type: analysis.analysis_type,
            result: analysis.result,
            score: analysis.score,
            created_at: now,
        })
    }
}
