// ==========================================
// 产线排产系统 - 换型规则仓储
// ==========================================
// 职责: 换型规则 CRUD,为引擎提供全量规则快照
// 说明: 规则量级小（品类对 x 产线）,引擎在批次开始时一次性拉取
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};

use crate::domain::changeover::ChangeoverRule;
use crate::repository::error::{RepositoryError, RepositoryResult};

pub struct ChangeoverRuleRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ChangeoverRuleRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入换型规则
    pub fn insert(&self, rule: &ChangeoverRule) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO changeover_rule (
                    rule_id, from_category, to_category, line_id,
                    changeover_minutes,
                    requires_cleaning, cleaning_minutes,
                    requires_mold_change, mold_change_minutes,
                    requires_calibration, calibration_minutes,
                    created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &rule.rule_id,
                &rule.from_category,
                &rule.to_category,
                &rule.line_id,
                rule.changeover_minutes,
                if rule.requires_cleaning { 1 } else { 0 },
                rule.cleaning_minutes,
                if rule.requires_mold_change { 1 } else { 0 },
                rule.mold_change_minutes,
                if rule.requires_calibration { 1 } else { 0 },
                rule.calibration_minutes,
                rule.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 拉取全量规则（批次开始时构建内存快照用）
    pub fn list_all(&self) -> RepositoryResult<Vec<ChangeoverRule>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT
                rule_id, from_category, to_category, line_id,
                changeover_minutes,
                requires_cleaning, cleaning_minutes,
                requires_mold_change, mold_change_minutes,
                requires_calibration, calibration_minutes,
                created_at
               FROM changeover_rule
               ORDER BY from_category, to_category"#,
        )?;

        let rows = stmt.query_map([], |row| self.map_row(row))?;
        let mut rules = Vec::new();
        for row in rows {
            rules.push(row?);
        }
        Ok(rules)
    }

    /// 查询指定品类对的全部规则（产线专属 + 通用）
    pub fn find_by_pair(
        &self,
        from_category: &str,
        to_category: &str,
    ) -> RepositoryResult<Vec<ChangeoverRule>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT
                rule_id, from_category, to_category, line_id,
                changeover_minutes,
                requires_cleaning, cleaning_minutes,
                requires_mold_change, mold_change_minutes,
                requires_calibration, calibration_minutes,
                created_at
               FROM changeover_rule
               WHERE from_category = ? AND to_category = ?
               ORDER BY CASE WHEN line_id IS NULL THEN 1 ELSE 0 END"#,
        )?;

        let rows = stmt.query_map(params![from_category, to_category], |row| self.map_row(row))?;
        let mut rules = Vec::new();
        for row in rows {
            rules.push(row?);
        }
        Ok(rules)
    }

    fn map_row(&self, row: &rusqlite::Row) -> rusqlite::Result<ChangeoverRule> {
        Ok(ChangeoverRule {
            rule_id: row.get(0)?,
            from_category: row.get(1)?,
            to_category: row.get(2)?,
            line_id: row.get(3)?,
            changeover_minutes: row.get(4)?,
            requires_cleaning: row.get::<_, i32>(5)? == 1,
            cleaning_minutes: row.get(6)?,
            requires_mold_change: row.get::<_, i32>(7)? == 1,
            mold_change_minutes: row.get(8)?,
            requires_calibration: row.get::<_, i32>(9)? == 1,
            calibration_minutes: row.get(10)?,
            created_at: row
                .get::<_, String>(11)?
                .parse::<chrono::DateTime<chrono::Utc>>()
                .unwrap_or_else(|_| chrono::Utc::now()),
        })
    }
}
