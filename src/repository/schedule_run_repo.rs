// ==========================================
// 产线排产系统 - 排产批次落库仓储
// ==========================================
// 职责: 一次批量排产/紧急插单的全部写入在单事务内完成
// 红线:
// 1) 任务、冲突、工人分配、订单状态、产线快照要么全部落库要么全部回滚
// 2) 不含排产决策逻辑,只做写入编排
// ==========================================

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::domain::conflict::ScheduleConflict;
use crate::domain::resource::WorkerAssignment;
use crate::domain::task::ScheduleTask;
use crate::repository::conflict_repo::ScheduleConflictRepository;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::task_repo::ScheduleTaskRepository;
use crate::repository::worker_repo::WorkerRepository;

/// 订单排产结果回写
#[derive(Debug, Clone)]
pub struct OrderScheduleUpdate {
    pub order_id: String,
    pub line_id: String,
    pub batch_no: String,
}

/// 产线运行快照回写
#[derive(Debug, Clone)]
pub struct LineSnapshotUpdate {
    pub line_id: String,
    pub current_category: Option<String>,
    pub next_available_time: DateTime<Utc>,
}

/// 任务时间顺延
#[derive(Debug, Clone)]
pub struct TaskTimeShift {
    pub task_id: String,
    pub new_start: DateTime<Utc>,
    pub new_end: DateTime<Utc>,
}

pub struct ScheduleRunRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ScheduleRunRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量排产结果落库（单事务）
    ///
    /// # 参数
    /// - `tasks`: 本批次生成的任务
    /// - `conflicts`: 检测出的冲突（含已自动解决的）
    /// - `assignments`: 工人分配记录
    /// - `order_updates`: 排入任务的订单状态回写
    /// - `line_updates`: 产线运行快照回写
    pub fn persist_batch_run(
        &self,
        tasks: &[ScheduleTask],
        conflicts: &[ScheduleConflict],
        assignments: &[WorkerAssignment],
        order_updates: &[OrderScheduleUpdate],
        line_updates: &[LineSnapshotUpdate],
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        for task in tasks {
            ScheduleTaskRepository::insert_with_conn(&tx, task)?;
        }
        for conflict in conflicts {
            ScheduleConflictRepository::insert_with_conn(&tx, conflict)?;
        }
        for assignment in assignments {
            WorkerRepository::insert_assignment_with_conn(&tx, assignment)?;
        }

        let now = Utc::now().to_rfc3339();
        {
            let mut stmt = tx.prepare(
                r#"UPDATE production_order
                   SET status = 'SCHEDULED', assigned_line_id = ?, batch_no = ?, updated_at = ?
                   WHERE order_id = ?"#,
            )?;
            for update in order_updates {
                stmt.execute(params![
                    &update.line_id,
                    &update.batch_no,
                    &now,
                    &update.order_id
                ])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                r#"UPDATE production_line
                   SET current_category = ?, next_available_time = ?, updated_at = ?
                   WHERE line_id = ?"#,
            )?;
            for update in line_updates {
                stmt.execute(params![
                    &update.current_category,
                    update.next_available_time.to_rfc3339(),
                    &now,
                    &update.line_id
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// 紧急插单结果落库（单事务）
    ///
    /// 插入任务、顺延受影响任务、新增冲突、工人分配、订单回写一并提交。
    pub fn persist_urgent_insertion(
        &self,
        inserted_task: &ScheduleTask,
        shifts: &[TaskTimeShift],
        conflicts: &[ScheduleConflict],
        assignments: &[WorkerAssignment],
        order_update: &OrderScheduleUpdate,
        line_update: &LineSnapshotUpdate,
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        ScheduleTaskRepository::insert_with_conn(&tx, inserted_task)?;

        let now = Utc::now().to_rfc3339();
        {
            let mut stmt = tx.prepare(
                r#"UPDATE schedule_task
                   SET start_time = ?, end_time = ?, updated_at = ?
                   WHERE task_id = ?"#,
            )?;
            for shift in shifts {
                stmt.execute(params![
                    shift.new_start.to_rfc3339(),
                    shift.new_end.to_rfc3339(),
                    &now,
                    &shift.task_id
                ])?;
            }
        }

        for conflict in conflicts {
            ScheduleConflictRepository::insert_with_conn(&tx, conflict)?;
        }
        for assignment in assignments {
            WorkerRepository::insert_assignment_with_conn(&tx, assignment)?;
        }

        tx.execute(
            r#"UPDATE production_order
               SET status = 'SCHEDULED', assigned_line_id = ?, batch_no = ?, updated_at = ?
               WHERE order_id = ?"#,
            params![
                &order_update.line_id,
                &order_update.batch_no,
                &now,
                &order_update.order_id
            ],
        )?;
        tx.execute(
            r#"UPDATE production_line
               SET current_category = ?, next_available_time = ?, updated_at = ?
               WHERE line_id = ?"#,
            params![
                &line_update.current_category,
                line_update.next_available_time.to_rfc3339(),
                &now,
                &line_update.line_id
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// 重排前清场（单事务）: 取消任务并回退对应订单
    pub fn cancel_tasks_and_revert_orders(
        &self,
        task_ids: &[String],
        order_ids: &[String],
    ) -> RepositoryResult<()> {
        if task_ids.is_empty() && order_ids.is_empty() {
            return Ok(());
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        {
            let mut stmt = tx.prepare(
                "UPDATE schedule_task SET status = 'CANCELLED', updated_at = ? WHERE task_id = ?",
            )?;
            for task_id in task_ids {
                stmt.execute(params![&now, task_id])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                r#"UPDATE production_order
                   SET status = 'PENDING', batch_no = NULL, updated_at = ?
                   WHERE order_id = ?"#,
            )?;
            for order_id in order_ids {
                stmt.execute(params![&now, order_id])?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}
