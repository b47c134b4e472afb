// ==========================================
// 产线排产系统 - 排产冲突仓储
// ==========================================
// 职责: 冲突记录落库、未解决冲突查询、处置结果回写
// ==========================================

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::domain::conflict::ScheduleConflict;
use crate::domain::types::{ConflictSeverity, ConflictType};
use crate::repository::error::{RepositoryError, RepositoryResult};

pub struct ScheduleConflictRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ScheduleConflictRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入单条冲突
    pub fn insert(&self, conflict: &ScheduleConflict) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::insert_with_conn(&conn, conflict)?;
        Ok(())
    }

    /// 批量插入冲突
    pub fn batch_insert(&self, conflicts: &[ScheduleConflict]) -> RepositoryResult<usize> {
        if conflicts.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        for conflict in conflicts {
            Self::insert_with_conn(&tx, conflict)?;
        }
        tx.commit()?;
        Ok(conflicts.len())
    }

    /// 在指定连接上插入冲突（供批次落库事务复用）
    pub(crate) fn insert_with_conn(
        conn: &Connection,
        conflict: &ScheduleConflict,
    ) -> RepositoryResult<()> {
        let task_ids_json = serde_json::to_string(&conflict.task_ids)
            .map_err(|e| RepositoryError::ValidationError(e.to_string()))?;

        conn.execute(
            r#"INSERT INTO schedule_conflict (
                    conflict_id, conflict_type, severity, line_id, task_ids,
                    mold_id, window_start, window_end,
                    description, suggestion,
                    resolved, resolution_method, resolved_at, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &conflict.conflict_id,
                conflict.conflict_type.to_db_str(),
                conflict.severity.to_db_str(),
                &conflict.line_id,
                &task_ids_json,
                &conflict.mold_id,
                conflict.window_start.map(|dt| dt.to_rfc3339()),
                conflict.window_end.map(|dt| dt.to_rfc3339()),
                &conflict.description,
                &conflict.suggestion,
                if conflict.resolved { 1 } else { 0 },
                &conflict.resolution_method,
                conflict.resolved_at.map(|dt| dt.to_rfc3339()),
                conflict.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 按 ID 查询冲突
    pub fn find_by_id(&self, conflict_id: &str) -> RepositoryResult<Option<ScheduleConflict>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT
                conflict_id, conflict_type, severity, line_id, task_ids,
                mold_id, window_start, window_end,
                description, suggestion,
                resolved, resolution_method, resolved_at, created_at
               FROM schedule_conflict WHERE conflict_id = ?"#,
        )?;

        let result = stmt.query_row(params![conflict_id], |row| self.map_row(row));
        match result {
            Ok(conflict) => Ok(Some(conflict)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询未解决冲突
    pub fn list_open(&self) -> RepositoryResult<Vec<ScheduleConflict>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT
                conflict_id, conflict_type, severity, line_id, task_ids,
                mold_id, window_start, window_end,
                description, suggestion,
                resolved, resolution_method, resolved_at, created_at
               FROM schedule_conflict
               WHERE resolved = 0
               ORDER BY severity DESC, created_at"#,
        )?;

        let rows = stmt.query_map([], |row| self.map_row(row))?;
        let mut conflicts = Vec::new();
        for row in rows {
            conflicts.push(row?);
        }
        Ok(conflicts)
    }

    /// 查询全部冲突
    pub fn list_all(&self) -> RepositoryResult<Vec<ScheduleConflict>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT
                conflict_id, conflict_type, severity, line_id, task_ids,
                mold_id, window_start, window_end,
                description, suggestion,
                resolved, resolution_method, resolved_at, created_at
               FROM schedule_conflict
               ORDER BY created_at"#,
        )?;

        let rows = stmt.query_map([], |row| self.map_row(row))?;
        let mut conflicts = Vec::new();
        for row in rows {
            conflicts.push(row?);
        }
        Ok(conflicts)
    }

    /// 回写处置结果
    pub fn mark_resolved(
        &self,
        conflict_id: &str,
        method: &str,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"UPDATE schedule_conflict
               SET resolved = 1, resolution_method = ?, resolved_at = ?
               WHERE conflict_id = ?"#,
            params![method, at.to_rfc3339(), conflict_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ScheduleConflict".to_string(),
                id: conflict_id.to_string(),
            });
        }
        Ok(())
    }

    fn map_row(&self, row: &rusqlite::Row) -> rusqlite::Result<ScheduleConflict> {
        let type_str: String = row.get(1)?;
        let conflict_type = ConflictType::from_str(&type_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                format!("未知冲突类型: {}", type_str).into(),
            )
        })?;

        let task_ids_json: String = row.get(4)?;
        let task_ids: Vec<String> = serde_json::from_str(&task_ids_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;

        Ok(ScheduleConflict {
            conflict_id: row.get(0)?,
            conflict_type,
            severity: ConflictSeverity::from_str(&row.get::<_, String>(2)?),
            line_id: row.get(3)?,
            task_ids,
            mold_id: row.get(5)?,
            window_start: row
                .get::<_, Option<String>>(6)?
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc)),
            window_end: row
                .get::<_, Option<String>>(7)?
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc)),
            description: row.get(8)?,
            suggestion: row.get(9)?,
            resolved: row.get::<_, i32>(10)? == 1,
            resolution_method: row.get(11)?,
            resolved_at: row
                .get::<_, Option<String>>(12)?
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc)),
            created_at: row
                .get::<_, String>(13)?
                .parse::<chrono::DateTime<chrono::Utc>>()
                .unwrap_or_else(|_| chrono::Utc::now()),
        })
    }
}
