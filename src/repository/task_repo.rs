// ==========================================
// 产线排产系统 - 排产任务仓储
// ==========================================
// 职责:
// 1) 任务 CRUD 与时间调整
// 2) 为冲突检测提供"活动任务"查询（PLANNED/CONFIRMED）
// 红线: 任务只是批次落位快照,不反向修改订单主数据
// ==========================================

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::domain::task::ScheduleTask;
use crate::domain::types::TaskStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};

pub struct ScheduleTaskRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ScheduleTaskRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入单个任务
    pub fn insert(&self, task: &ScheduleTask) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::insert_with_conn(&conn, task)?;
        Ok(())
    }

    /// 批量插入任务
    ///
    /// # 红线
    /// - 必须在事务中完成
    pub fn batch_insert(&self, tasks: &[ScheduleTask]) -> RepositoryResult<usize> {
        if tasks.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        for task in tasks {
            Self::insert_with_conn(&tx, task)?;
        }
        tx.commit()?;
        Ok(tasks.len())
    }

    /// 在指定连接上插入任务（供批次落库事务复用）
    pub(crate) fn insert_with_conn(
        conn: &Connection,
        task: &ScheduleTask,
    ) -> RepositoryResult<()> {
        let merged_json = match &task.merged_order_ids {
            Some(ids) => Some(
                serde_json::to_string(ids)
                    .map_err(|e| RepositoryError::ValidationError(e.to_string()))?,
            ),
            None => None,
        };

        conn.execute(
            r#"INSERT INTO schedule_task (
                    task_id, order_id, line_id, batch_no, sequence_no,
                    start_time, end_time, changeover_minutes,
                    planned_qty, product_category, mold_id,
                    is_mix_batch, merged_order_ids,
                    deadline_gap_minutes, meets_deadline, status,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &task.task_id,
                &task.order_id,
                &task.line_id,
                &task.batch_no,
                task.sequence_no,
                task.start_time.to_rfc3339(),
                task.end_time.to_rfc3339(),
                task.changeover_minutes,
                task.planned_qty,
                &task.product_category,
                &task.mold_id,
                if task.is_mix_batch { 1 } else { 0 },
                merged_json,
                task.deadline_gap_minutes,
                if task.meets_deadline { 1 } else { 0 },
                task.status.to_db_str(),
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 按 ID 查询任务
    pub fn find_by_id(&self, task_id: &str) -> RepositoryResult<Option<ScheduleTask>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT
                task_id, order_id, line_id, batch_no, sequence_no,
                start_time, end_time, changeover_minutes,
                planned_qty, product_category, mold_id,
                is_mix_batch, merged_order_ids,
                deadline_gap_minutes, meets_deadline, status,
                created_at, updated_at
               FROM schedule_task WHERE task_id = ?"#,
        )?;

        let result = stmt.query_row(params![task_id], |row| self.map_row(row));
        match result {
            Ok(task) => Ok(Some(task)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询产线上的活动任务队列（按开工时间升序）
    pub fn find_active_by_line(&self, line_id: &str) -> RepositoryResult<Vec<ScheduleTask>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT
                task_id, order_id, line_id, batch_no, sequence_no,
                start_time, end_time, changeover_minutes,
                planned_qty, product_category, mold_id,
                is_mix_batch, merged_order_ids,
                deadline_gap_minutes, meets_deadline, status,
                created_at, updated_at
               FROM schedule_task
               WHERE line_id = ? AND status IN ('PLANNED', 'CONFIRMED')
               ORDER BY start_time"#,
        )?;

        let rows = stmt.query_map(params![line_id], |row| self.map_row(row))?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    /// 查询全部活动任务（跨产线冲突检测用）
    pub fn find_all_active(&self) -> RepositoryResult<Vec<ScheduleTask>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT
                task_id, order_id, line_id, batch_no, sequence_no,
                start_time, end_time, changeover_minutes,
                planned_qty, product_category, mold_id,
                is_mix_batch, merged_order_ids,
                deadline_gap_minutes, meets_deadline, status,
                created_at, updated_at
               FROM schedule_task
               WHERE status IN ('PLANNED', 'CONFIRMED')
               ORDER BY line_id, start_time"#,
        )?;

        let rows = stmt.query_map([], |row| self.map_row(row))?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    /// 查询批次内任务
    pub fn find_by_batch(&self, batch_no: &str) -> RepositoryResult<Vec<ScheduleTask>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT
                task_id, order_id, line_id, batch_no, sequence_no,
                start_time, end_time, changeover_minutes,
                planned_qty, product_category, mold_id,
                is_mix_batch, merged_order_ids,
                deadline_gap_minutes, meets_deadline, status,
                created_at, updated_at
               FROM schedule_task
               WHERE batch_no = ?
               ORDER BY line_id, start_time"#,
        )?;

        let rows = stmt.query_map(params![batch_no], |row| self.map_row(row))?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    /// 查询指定时刻之后开工的 PLANNED 任务（重排范围圈定用）
    pub fn find_planned_from(&self, from: DateTime<Utc>) -> RepositoryResult<Vec<ScheduleTask>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT
                task_id, order_id, line_id, batch_no, sequence_no,
                start_time, end_time, changeover_minutes,
                planned_qty, product_category, mold_id,
                is_mix_batch, merged_order_ids,
                deadline_gap_minutes, meets_deadline, status,
                created_at, updated_at
               FROM schedule_task
               WHERE status = 'PLANNED' AND start_time >= ?
               ORDER BY start_time"#,
        )?;

        let rows = stmt.query_map(params![from.to_rfc3339()], |row| self.map_row(row))?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    /// 调整任务时间（冲突消解 / 紧急插单顺延用）
    pub fn shift_time(
        &self,
        task_id: &str,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"UPDATE schedule_task
               SET start_time = ?, end_time = ?, updated_at = ?
               WHERE task_id = ?"#,
            params![
                new_start.to_rfc3339(),
                new_end.to_rfc3339(),
                Utc::now().to_rfc3339(),
                task_id
            ],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ScheduleTask".to_string(),
                id: task_id.to_string(),
            });
        }
        Ok(())
    }

    /// 更新任务占用的模具（模具冲突消解用）
    pub fn update_mold(&self, task_id: &str, mold_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE schedule_task SET mold_id = ?, updated_at = ? WHERE task_id = ?",
            params![mold_id, Utc::now().to_rfc3339(), task_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ScheduleTask".to_string(),
                id: task_id.to_string(),
            });
        }
        Ok(())
    }

    /// 批量更新线内顺序号（顺序优化落库用）
    pub fn batch_update_sequence(&self, sequence: &[(String, i32)]) -> RepositoryResult<usize> {
        if sequence.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE schedule_task SET sequence_no = ?, updated_at = ? WHERE task_id = ?",
            )?;
            let now = Utc::now().to_rfc3339();
            for (task_id, sequence_no) in sequence {
                stmt.execute(params![sequence_no, &now, task_id])?;
            }
        }
        tx.commit()?;
        Ok(sequence.len())
    }

    /// 更新任务状态
    pub fn update_status(&self, task_id: &str, status: TaskStatus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE schedule_task SET status = ?, updated_at = ? WHERE task_id = ?",
            params![status.to_db_str(), Utc::now().to_rfc3339(), task_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ScheduleTask".to_string(),
                id: task_id.to_string(),
            });
        }
        Ok(())
    }

    /// 批量取消任务
    pub fn batch_cancel(&self, task_ids: &[String]) -> RepositoryResult<usize> {
        if task_ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE schedule_task SET status = 'CANCELLED', updated_at = ? WHERE task_id = ?",
            )?;
            let now = Utc::now().to_rfc3339();
            for task_id in task_ids {
                stmt.execute(params![&now, task_id])?;
            }
        }
        tx.commit()?;
        Ok(task_ids.len())
    }

    fn map_row(&self, row: &rusqlite::Row) -> rusqlite::Result<ScheduleTask> {
        let merged_json: Option<String> = row.get(12)?;
        let merged_order_ids = match merged_json {
            Some(s) => Some(serde_json::from_str::<Vec<String>>(&s).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    12,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?),
            None => None,
        };

        Ok(ScheduleTask {
            task_id: row.get(0)?,
            order_id: row.get(1)?,
            line_id: row.get(2)?,
            batch_no: row.get(3)?,
            sequence_no: row.get(4)?,
            start_time: row
                .get::<_, String>(5)?
                .parse::<chrono::DateTime<chrono::Utc>>()
                .unwrap_or_else(|_| chrono::Utc::now()),
            end_time: row
                .get::<_, String>(6)?
                .parse::<chrono::DateTime<chrono::Utc>>()
                .unwrap_or_else(|_| chrono::Utc::now()),
            changeover_minutes: row.get(7)?,
            planned_qty: row.get(8)?,
            product_category: row.get(9)?,
            mold_id: row.get(10)?,
            is_mix_batch: row.get::<_, i32>(11)? == 1,
            merged_order_ids,
            deadline_gap_minutes: row.get(13)?,
            meets_deadline: row.get::<_, i32>(14)? == 1,
            status: TaskStatus::from_str(&row.get::<_, String>(15)?),
            created_at: row
                .get::<_, String>(16)?
                .parse::<chrono::DateTime<chrono::Utc>>()
                .unwrap_or_else(|_| chrono::Utc::now()),
            updated_at: row
                .get::<_, String>(17)?
                .parse::<chrono::DateTime<chrono::Utc>>()
                .unwrap_or_else(|_| chrono::Utc::now()),
        })
    }
}
