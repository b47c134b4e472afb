// ==========================================
// 产线排产系统 - 生产订单仓储
// ==========================================
// 职责:
// 1) 订单 CRUD 与状态流转
// 2) 为批量排产提供"窗口内待排订单"快照查询
// 红线: 不含排产决策逻辑
// ==========================================

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::domain::order::ProductionOrder;
use crate::domain::types::{MaterialStatus, OrderStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};

pub struct ProductionOrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProductionOrderRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入订单
    pub fn insert(&self, order: &ProductionOrder) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO production_order (
                    order_id, order_no, product_category, product_spec,
                    planned_qty, completed_qty, priority, is_urgent, allow_mix_batch,
                    earliest_start, latest_end,
                    material_status, mold_id, assigned_line_id,
                    pre_wait_minutes, post_wait_minutes,
                    status, batch_no, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &order.order_id,
                &order.order_no,
                &order.product_category,
                &order.product_spec,
                order.planned_qty,
                order.completed_qty,
                order.priority,
                if order.is_urgent { 1 } else { 0 },
                if order.allow_mix_batch { 1 } else { 0 },
                order.earliest_start.map(|dt| dt.to_rfc3339()),
                order.latest_end.map(|dt| dt.to_rfc3339()),
                order.material_status.to_db_str(),
                &order.mold_id,
                &order.assigned_line_id,
                order.pre_wait_minutes,
                order.post_wait_minutes,
                order.status.to_db_str(),
                &order.batch_no,
                order.created_at.to_rfc3339(),
                order.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 按 ID 查询订单
    pub fn find_by_id(&self, order_id: &str) -> RepositoryResult<Option<ProductionOrder>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT
                order_id, order_no, product_category, product_spec,
                planned_qty, completed_qty, priority, is_urgent, allow_mix_batch,
                earliest_start, latest_end,
                material_status, mold_id, assigned_line_id,
                pre_wait_minutes, post_wait_minutes,
                status, batch_no, created_at, updated_at
               FROM production_order WHERE order_id = ?"#,
        )?;

        let result = stmt.query_row(params![order_id], |row| self.map_row(row));
        match result {
            Ok(order) => Ok(Some(order)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询窗口内待排产订单
    ///
    /// # 口径
    /// - status = PENDING
    /// - 交期落在窗口结束前（无交期订单也纳入,排序时靠后）
    /// - 最早开工时间不晚于窗口结束
    ///
    /// # 排序
    /// 优先级降序,交期升序,无交期排最后
    pub fn find_pending_in_window(
        &self,
        window_end: DateTime<Utc>,
    ) -> RepositoryResult<Vec<ProductionOrder>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT
                order_id, order_no, product_category, product_spec,
                planned_qty, completed_qty, priority, is_urgent, allow_mix_batch,
                earliest_start, latest_end,
                material_status, mold_id, assigned_line_id,
                pre_wait_minutes, post_wait_minutes,
                status, batch_no, created_at, updated_at
               FROM production_order
               WHERE status = 'PENDING'
                 AND (latest_end IS NULL OR latest_end <= ?)
                 AND (earliest_start IS NULL OR earliest_start <= ?)
               ORDER BY priority DESC,
                        CASE WHEN latest_end IS NULL THEN 1 ELSE 0 END,
                        latest_end ASC"#,
        )?;

        let end_str = window_end.to_rfc3339();
        let rows = stmt.query_map(params![&end_str, &end_str], |row| self.map_row(row))?;

        let mut orders = Vec::new();
        for row in rows {
            orders.push(row?);
        }
        Ok(orders)
    }

    /// 按状态查询订单
    pub fn find_by_status(&self, status: OrderStatus) -> RepositoryResult<Vec<ProductionOrder>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT
                order_id, order_no, product_category, product_spec,
                planned_qty, completed_qty, priority, is_urgent, allow_mix_batch,
                earliest_start, latest_end,
                material_status, mold_id, assigned_line_id,
                pre_wait_minutes, post_wait_minutes,
                status, batch_no, created_at, updated_at
               FROM production_order WHERE status = ? ORDER BY priority DESC"#,
        )?;

        let rows = stmt.query_map(params![status.to_db_str()], |row| self.map_row(row))?;
        let mut orders = Vec::new();
        for row in rows {
            orders.push(row?);
        }
        Ok(orders)
    }

    /// 标记订单为紧急（优先级提升到 10）
    pub fn mark_urgent(&self, order_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"UPDATE production_order
               SET is_urgent = 1, priority = 10, updated_at = ?
               WHERE order_id = ?"#,
            params![Utc::now().to_rfc3339(), order_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ProductionOrder".to_string(),
                id: order_id.to_string(),
            });
        }
        Ok(())
    }

    /// 批量回退订单到待排产状态（重排时使用）
    pub fn batch_revert_to_pending(&self, order_ids: &[String]) -> RepositoryResult<usize> {
        if order_ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"UPDATE production_order
                   SET status = 'PENDING', batch_no = NULL, updated_at = ?
                   WHERE order_id = ?"#,
            )?;
            let now = Utc::now().to_rfc3339();
            for order_id in order_ids {
                stmt.execute(params![&now, order_id])?;
            }
        }
        tx.commit()?;
        Ok(order_ids.len())
    }

    /// 按状态统计订单数
    pub fn count_by_status(&self, status: OrderStatus) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM production_order WHERE status = ?",
            params![status.to_db_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn map_row(&self, row: &rusqlite::Row) -> rusqlite::Result<ProductionOrder> {
        Ok(ProductionOrder {
            order_id: row.get(0)?,
            order_no: row.get(1)?,
            product_category: row.get(2)?,
            product_spec: row.get(3)?,
            planned_qty: row.get(4)?,
            completed_qty: row.get(5)?,
            priority: row.get(6)?,
            is_urgent: row.get::<_, i32>(7)? == 1,
            allow_mix_batch: row.get::<_, i32>(8)? == 1,
            earliest_start: row
                .get::<_, Option<String>>(9)?
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc)),
            latest_end: row
                .get::<_, Option<String>>(10)?
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc)),
            material_status: MaterialStatus::from_str(&row.get::<_, String>(11)?),
            mold_id: row.get(12)?,
            assigned_line_id: row.get(13)?,
            pre_wait_minutes: row.get(14)?,
            post_wait_minutes: row.get(15)?,
            status: OrderStatus::from_str(&row.get::<_, String>(16)?),
            batch_no: row.get(17)?,
            created_at: row
                .get::<_, String>(18)?
                .parse::<chrono::DateTime<chrono::Utc>>()
                .unwrap_or_else(|_| chrono::Utc::now()),
            updated_at: row
                .get::<_, String>(19)?
                .parse::<chrono::DateTime<chrono::Utc>>()
                .unwrap_or_else(|_| chrono::Utc::now()),
        })
    }
}
