// ==========================================
// 产线排产系统 - 生产订单领域模型
// ==========================================
// 用途: 排产输入主实体,引擎只读,仓储层写入状态流转
// 对齐: production_order 表
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::types::{MaterialStatus, OrderStatus};

// ==========================================
// ProductionOrder - 生产订单
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionOrder {
    // ===== 主键 =====
    pub order_id: String, // 订单唯一标识（UUID）

    // ===== 基础信息 =====
    pub order_no: String,            // 业务订单号
    pub product_category: String,    // 产品品类（换型成本口径）
    pub product_spec: Option<String>, // 产品规格描述

    // ===== 数量 =====
    pub planned_qty: f64,   // 计划数量（件/吨）
    pub completed_qty: f64, // 已完成数量（始终 <= planned_qty）

    // ===== 优先级与标志 =====
    pub priority: i32,        // 优先级 1-10（10 最高）
    pub is_urgent: bool,      // 紧急订单标志
    pub allow_mix_batch: bool, // 允许同品类合批

    // ===== 时间窗口 =====
    pub earliest_start: Option<DateTime<Utc>>, // 最早开工时间
    pub latest_end: Option<DateTime<Utc>>,     // 交期/最晚完工时间（NULL=无明确交期）

    // ===== 资源约束 =====
    pub material_status: MaterialStatus, // 物料到位状态
    pub mold_id: Option<String>,         // 指定模具
    pub assigned_line_id: Option<String>, // 预指定产线（人工锁线）

    // ===== 工艺等待 =====
    pub pre_wait_minutes: i64,  // 开工前等待（分钟）
    pub post_wait_minutes: i64, // 完工后等待（分钟）

    // ===== 状态流转 =====
    pub status: OrderStatus,     // 订单状态
    pub batch_no: Option<String>, // 最近一次排产批次号

    // ===== 审计字段 =====
    pub created_at: DateTime<Utc>, // 记录创建时间
    pub updated_at: DateTime<Utc>, // 记录更新时间
}

impl ProductionOrder {
    /// 剩余待产数量
    pub fn remaining_qty(&self) -> f64 {
        (self.planned_qty - self.completed_qty).max(0.0)
    }

    /// 距交期小时数（无交期返回 None,已超期为负值）
    pub fn hours_to_deadline(&self, now: DateTime<Utc>) -> Option<f64> {
        self.latest_end
            .map(|d| (d - now).num_minutes() as f64 / 60.0)
    }

    /// 校验订单数据合法性
    ///
    /// 规则:
    /// 1. planned_qty > 0
    /// 2. completed_qty ∈ [0, planned_qty]
    /// 3. priority ∈ [1, 10]
    /// 4. earliest_start <= latest_end（均存在时）
    pub fn validate(&self) -> Result<(), String> {
        if self.planned_qty <= 0.0 {
            return Err(format!("订单 {} 计划数量必须大于 0", self.order_no));
        }
        if self.completed_qty < 0.0 || self.completed_qty > self.planned_qty {
            return Err(format!(
                "订单 {} 完成数量 {} 超出范围 [0, {}]",
                self.order_no, self.completed_qty, self.planned_qty
            ));
        }
        if !(1..=10).contains(&self.priority) {
            return Err(format!(
                "订单 {} 优先级 {} 超出范围 [1, 10]",
                self.order_no, self.priority
            ));
        }
        if let (Some(start), Some(end)) = (self.earliest_start, self.latest_end) {
            if start > end {
                return Err(format!(
                    "订单 {} 最早开工时间晚于最晚完工时间",
                    self.order_no
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_test_order() -> ProductionOrder {
        let now = Utc::now();
        ProductionOrder {
            order_id: "ORD-001".to_string(),
            order_no: "PO20260101001".to_string(),
            product_category: "CAT-A".to_string(),
            product_spec: None,
            planned_qty: 100.0,
            completed_qty: 0.0,
            priority: 5,
            is_urgent: false,
            allow_mix_batch: false,
            earliest_start: None,
            latest_end: Some(now + Duration::hours(48)),
            material_status: MaterialStatus::Ready,
            mold_id: None,
            assigned_line_id: None,
            pre_wait_minutes: 0,
            post_wait_minutes: 0,
            status: OrderStatus::Pending,
            batch_no: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_remaining_qty() {
        let mut order = create_test_order();
        order.completed_qty = 30.0;
        assert_eq!(order.remaining_qty(), 70.0);
    }

    #[test]
    fn test_hours_to_deadline() {
        let order = create_test_order();
        let h = order.hours_to_deadline(Utc::now()).unwrap();
        // 48 小时交期,允许秒级误差
        assert!((h - 48.0).abs() < 0.1);
    }

    #[test]
    fn test_validate_rejects_overflow_completed() {
        let mut order = create_test_order();
        order.completed_qty = 150.0;
        assert!(order.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_priority() {
        let mut order = create_test_order();
        order.priority = 11;
        assert!(order.validate().is_err());
        order.priority = 0;
        assert!(order.validate().is_err());
    }
}
