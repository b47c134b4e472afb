// ==========================================
// 产线排产系统 - 模具仓储
// ==========================================
// 职责: 模具 CRUD 与"可替代模具"查询（模具冲突改派用）
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};

use crate::domain::resource::Mold;
use crate::domain::types::MoldStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};

pub struct MoldRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MoldRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入模具
    pub fn insert(&self, mold: &Mold) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO mold (
                    mold_id, mold_name, category, status, line_id, created_at
                ) VALUES (?, ?, ?, ?, ?, ?)"#,
            params![
                &mold.mold_id,
                &mold.mold_name,
                &mold.category,
                mold.status.to_db_str(),
                &mold.line_id,
                mold.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 按 ID 查询模具
    pub fn find_by_id(&self, mold_id: &str) -> RepositoryResult<Option<Mold>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT mold_id, mold_name, category, status, line_id, created_at
               FROM mold WHERE mold_id = ?"#,
        )?;

        let result = stmt.query_row(params![mold_id], |row| self.map_row(row));
        match result {
            Ok(mold) => Ok(Some(mold)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询可替代模具
    ///
    /// 口径: 状态 AVAILABLE、非被替换模具本身,品类已知时要求品类一致。
    pub fn find_alternate(
        &self,
        exclude_mold_id: &str,
        category: Option<&str>,
    ) -> RepositoryResult<Option<Mold>> {
        let conn = self.get_conn()?;

        let result = match category {
            Some(cat) => {
                let mut stmt = conn.prepare(
                    r#"SELECT mold_id, mold_name, category, status, line_id, created_at
                       FROM mold
                       WHERE status = 'AVAILABLE' AND mold_id != ? AND category = ?
                       ORDER BY mold_id LIMIT 1"#,
                )?;
                stmt.query_row(params![exclude_mold_id, cat], |row| self.map_row(row))
            }
            None => {
                let mut stmt = conn.prepare(
                    r#"SELECT mold_id, mold_name, category, status, line_id, created_at
                       FROM mold
                       WHERE status = 'AVAILABLE' AND mold_id != ?
                       ORDER BY mold_id LIMIT 1"#,
                )?;
                stmt.query_row(params![exclude_mold_id], |row| self.map_row(row))
            }
        };

        match result {
            Ok(mold) => Ok(Some(mold)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 更新模具状态
    pub fn update_status(&self, mold_id: &str, status: MoldStatus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE mold SET status = ? WHERE mold_id = ?",
            params![status.to_db_str(), mold_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Mold".to_string(),
                id: mold_id.to_string(),
            });
        }
        Ok(())
    }

    fn map_row(&self, row: &rusqlite::Row) -> rusqlite::Result<Mold> {
        Ok(Mold {
            mold_id: row.get(0)?,
            mold_name: row.get(1)?,
            category: row.get(2)?,
            status: MoldStatus::from_str(&row.get::<_, String>(3)?),
            line_id: row.get(4)?,
            created_at: row
                .get::<_, String>(5)?
                .parse::<chrono::DateTime<chrono::Utc>>()
                .unwrap_or_else(|_| chrono::Utc::now()),
        })
    }
}
