// ==========================================
// 产线排产系统 - 生产线仓储
// ==========================================
// 职责:
// 1) 产线 CRUD
// 2) 为批量排产提供"可排产线"快照查询
// 3) 批次落库后回写产线运行快照
// ==========================================

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::domain::line::ProductionLine;
use crate::domain::types::LineStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};

pub struct ProductionLineRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProductionLineRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入产线
    pub fn insert(&self, line: &ProductionLine) -> RepositoryResult<()> {
        let categories_json = serde_json::to_string(&line.producible_categories)
            .map_err(|e| RepositoryError::ValidationError(e.to_string()))?;

        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO production_line (
                    line_id, line_name, status, producible_categories,
                    standard_capacity, efficiency_factor,
                    standard_workers, current_workers, max_workers,
                    current_category, next_available_time,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &line.line_id,
                &line.line_name,
                line.status.to_db_str(),
                &categories_json,
                line.standard_capacity,
                line.efficiency_factor,
                line.standard_workers,
                line.current_workers,
                line.max_workers,
                &line.current_category,
                line.next_available_time.map(|dt| dt.to_rfc3339()),
                line.created_at.to_rfc3339(),
                line.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 按 ID 查询产线
    pub fn find_by_id(&self, line_id: &str) -> RepositoryResult<Option<ProductionLine>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT
                line_id, line_name, status, producible_categories,
                standard_capacity, efficiency_factor,
                standard_workers, current_workers, max_workers,
                current_category, next_available_time,
                created_at, updated_at
               FROM production_line WHERE line_id = ?"#,
        )?;

        let result = stmt.query_row(params![line_id], |row| self.map_row(row));
        match result {
            Ok(line) => Ok(Some(line)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询可参与排产的产线（AVAILABLE / RUNNING）
    pub fn find_schedulable(&self) -> RepositoryResult<Vec<ProductionLine>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT
                line_id, line_name, status, producible_categories,
                standard_capacity, efficiency_factor,
                standard_workers, current_workers, max_workers,
                current_category, next_available_time,
                created_at, updated_at
               FROM production_line
               WHERE status IN ('AVAILABLE', 'RUNNING')
               ORDER BY line_id"#,
        )?;

        let rows = stmt.query_map([], |row| self.map_row(row))?;
        let mut lines = Vec::new();
        for row in rows {
            lines.push(row?);
        }
        Ok(lines)
    }

    /// 查询全部产线
    pub fn find_all(&self) -> RepositoryResult<Vec<ProductionLine>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT
                line_id, line_name, status, producible_categories,
                standard_capacity, efficiency_factor,
                standard_workers, current_workers, max_workers,
                current_category, next_available_time,
                created_at, updated_at
               FROM production_line ORDER BY line_id"#,
        )?;

        let rows = stmt.query_map([], |row| self.map_row(row))?;
        let mut lines = Vec::new();
        for row in rows {
            lines.push(row?);
        }
        Ok(lines)
    }

    /// 更新产线状态
    pub fn update_status(&self, line_id: &str, status: LineStatus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE production_line SET status = ?, updated_at = ? WHERE line_id = ?",
            params![status.to_db_str(), Utc::now().to_rfc3339(), line_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ProductionLine".to_string(),
                id: line_id.to_string(),
            });
        }
        Ok(())
    }

    /// 回写产线运行快照（当前品类 + 下一可用时间）
    pub fn update_runtime_snapshot(
        &self,
        line_id: &str,
        current_category: Option<&str>,
        next_available_time: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"UPDATE production_line
               SET current_category = ?, next_available_time = ?, updated_at = ?
               WHERE line_id = ?"#,
            params![
                current_category,
                next_available_time.to_rfc3339(),
                Utc::now().to_rfc3339(),
                line_id
            ],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ProductionLine".to_string(),
                id: line_id.to_string(),
            });
        }
        Ok(())
    }

    fn map_row(&self, row: &rusqlite::Row) -> rusqlite::Result<ProductionLine> {
        let categories_json: String = row.get(3)?;
        let producible_categories: Vec<String> = serde_json::from_str(&categories_json)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;

        Ok(ProductionLine {
            line_id: row.get(0)?,
            line_name: row.get(1)?,
            status: LineStatus::from_str(&row.get::<_, String>(2)?),
            producible_categories,
            standard_capacity: row.get(4)?,
            efficiency_factor: row.get(5)?,
            standard_workers: row.get(6)?,
            current_workers: row.get(7)?,
            max_workers: row.get(8)?,
            current_category: row.get(9)?,
            next_available_time: row
                .get::<_, Option<String>>(10)?
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc)),
            created_at: row
                .get::<_, String>(11)?
                .parse::<chrono::DateTime<chrono::Utc>>()
                .unwrap_or_else(|_| chrono::Utc::now()),
            updated_at: row
                .get::<_, String>(12)?
                .parse::<chrono::DateTime<chrono::Utc>>()
                .unwrap_or_else(|_| chrono::Utc::now()),
        })
    }
}
