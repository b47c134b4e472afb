// ==========================================
// 产线排产系统 - 工人与分配记录仓储
// ==========================================
// 职责:
// 1) 工人主数据 CRUD
// 2) 按产线查询可分配工人
// 3) 工人任务分配记录落库与查询
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};

use crate::domain::resource::{Worker, WorkerAssignment};
use crate::domain::types::WorkerStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};

pub struct WorkerRepository {
    conn: Arc<Mutex<Connection>>,
}

impl WorkerRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入工人
    pub fn insert(&self, worker: &Worker) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO worker (
                    worker_id, worker_name, skill_level, default_line_id, status, created_at
                ) VALUES (?, ?, ?, ?, ?, ?)"#,
            params![
                &worker.worker_id,
                &worker.worker_name,
                worker.skill_level,
                &worker.default_line_id,
                worker.status.to_db_str(),
                worker.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 查询指定产线的可分配工人
    pub fn find_available_by_line(&self, line_id: &str) -> RepositoryResult<Vec<Worker>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT worker_id, worker_name, skill_level, default_line_id, status, created_at
               FROM worker
               WHERE status = 'AVAILABLE' AND default_line_id = ?
               ORDER BY skill_level DESC, worker_id"#,
        )?;

        let rows = stmt.query_map(params![line_id], |row| self.map_row(row))?;
        let mut workers = Vec::new();
        for row in rows {
            workers.push(row?);
        }
        Ok(workers)
    }

    /// 查询全部可分配工人
    pub fn find_all_available(&self) -> RepositoryResult<Vec<Worker>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT worker_id, worker_name, skill_level, default_line_id, status, created_at
               FROM worker
               WHERE status = 'AVAILABLE'
               ORDER BY worker_id"#,
        )?;

        let rows = stmt.query_map([], |row| self.map_row(row))?;
        let mut workers = Vec::new();
        for row in rows {
            workers.push(row?);
        }
        Ok(workers)
    }

    /// 统计可分配工人数
    pub fn count_available(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM worker WHERE status = 'AVAILABLE'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 批量插入分配记录
    pub fn batch_insert_assignments(
        &self,
        assignments: &[WorkerAssignment],
    ) -> RepositoryResult<usize> {
        if assignments.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        for assignment in assignments {
            Self::insert_assignment_with_conn(&tx, assignment)?;
        }
        tx.commit()?;
        Ok(assignments.len())
    }

    /// 在指定连接上插入分配记录（供批次落库事务复用）
    pub(crate) fn insert_assignment_with_conn(
        conn: &Connection,
        assignment: &WorkerAssignment,
    ) -> RepositoryResult<()> {
        conn.execute(
            r#"INSERT INTO worker_assignment (
                    assignment_id, task_id, worker_id, line_id, batch_no, assigned_at
                ) VALUES (?, ?, ?, ?, ?, ?)"#,
            params![
                &assignment.assignment_id,
                &assignment.task_id,
                &assignment.worker_id,
                &assignment.line_id,
                &assignment.batch_no,
                assignment.assigned_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 查询任务的分配记录
    pub fn find_assignments_by_task(
        &self,
        task_id: &str,
    ) -> RepositoryResult<Vec<WorkerAssignment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT assignment_id, task_id, worker_id, line_id, batch_no, assigned_at
               FROM worker_assignment
               WHERE task_id = ?
               ORDER BY worker_id"#,
        )?;

        let rows = stmt.query_map(params![task_id], |row| {
            Ok(WorkerAssignment {
                assignment_id: row.get(0)?,
                task_id: row.get(1)?,
                worker_id: row.get(2)?,
                line_id: row.get(3)?,
                batch_no: row.get(4)?,
                assigned_at: row
                    .get::<_, String>(5)?
                    .parse::<chrono::DateTime<chrono::Utc>>()
                    .unwrap_or_else(|_| chrono::Utc::now()),
            })
        })?;

        let mut assignments = Vec::new();
        for row in rows {
            assignments.push(row?);
        }
        Ok(assignments)
    }

    /// 统计批次内分配记录数
    pub fn count_assignments_by_batch(&self, batch_no: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM worker_assignment WHERE batch_no = ?",
            params![batch_no],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn map_row(&self, row: &rusqlite::Row) -> rusqlite::Result<Worker> {
        Ok(Worker {
            worker_id: row.get(0)?,
            worker_name: row.get(1)?,
            skill_level: row.get(2)?,
            default_line_id: row.get(3)?,
            status: WorkerStatus::from_str(&row.get::<_, String>(4)?),
            created_at: row
                .get::<_, String>(5)?
                .parse::<chrono::DateTime<chrono::Utc>>()
                .unwrap_or_else(|_| chrono::Utc::now()),
        })
    }
}
