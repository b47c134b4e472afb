// ==========================================
// 产线排产系统 - 特征与工时估算引擎
// ==========================================
// 职责: 订单/产线/匹配特征构建 + 生产工时估算
// 红线: 估算永不失败,输入缺失一律降级到安全默认值
// 输入: 订单 + 产线主数据
// 输出: 工时估算（分钟）与归一化特征向量
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::line::ProductionLine;
use crate::domain::order::ProductionOrder;
use crate::domain::types::MaterialStatus;

/// 产能缺失时的兜底产能（件/小时）
pub const DEFAULT_CAPACITY_PER_HOUR: f64 = 50.0;
/// 工时计算异常时的兜底工时（分钟）
pub const FALLBACK_DURATION_MINUTES: i64 = 60;
/// 单任务工时下限（分钟）
pub const MIN_DURATION_MINUTES: i64 = 15;
/// 单任务工时上限（24 小时,分钟）
pub const MAX_DURATION_MINUTES: i64 = 1440;

/// 订单特征向量宽度
pub const ORDER_FEATURE_WIDTH: usize = 6;
/// 产线特征向量宽度
pub const LINE_FEATURE_WIDTH: usize = 5;
/// 订单-产线匹配特征向量宽度
pub const MATCH_FEATURE_WIDTH: usize = 4;

// 特征归一化基准,超出按 1.0 截断
const QTY_SCALE: f64 = 5000.0;
const CAPACITY_SCALE: f64 = 200.0;
const EFFICIENCY_SCALE: f64 = 2.0;
const CATEGORY_SCALE: f64 = 10.0;

/// 归一化到 [0,1],NaN/Inf 一律置 0
fn clamp01(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// 人员效率曲线
///
/// - 无人上岗: 0.8（降效运转）
/// - 标准人数未维护: 1.0
/// - 其余: min(1.2, 当前人数 / 标准人数)
pub fn worker_efficiency_ratio(current_workers: i32, standard_workers: i32) -> f64 {
    if current_workers <= 0 {
        return 0.8;
    }
    if standard_workers <= 0 {
        return 1.0;
    }
    (current_workers as f64 / standard_workers as f64).min(1.2)
}

// ==========================================
// DurationEstimate - 工时估算结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurationEstimate {
    pub duration_minutes: i64,   // 估算工时（含订单前后等待,已截断到 [15, 1440]）
    pub effective_capacity: f64, // 有效产能（件/小时）
    pub degraded: bool,          // 是否发生过输入降级
}

// ==========================================
// DurationEstimator - 特征与工时估算引擎
// ==========================================
pub struct DurationEstimator {
    // 无状态引擎,不需要注入依赖
}

impl DurationEstimator {
    pub fn new() -> Self {
        Self {}
    }

    // ==========================================
    // 工时估算
    // ==========================================

    /// 估算订单在产线上的生产工时
    ///
    /// 公式: durationHours = plannedQty / effectiveCapacity,
    /// effectiveCapacity = standardCapacity * efficiencyFactor * workerEfficiency。
    /// 加上订单前后等待分钟数,截断到 [15, 1440]。
    ///
    /// # 降级
    /// - 产能缺失或非正 -> 50 件/小时
    /// - 效率系数非正 -> 1.0
    /// - 计算结果非有限数 -> 60 分钟
    pub fn estimate(&self, order: &ProductionOrder, line: &ProductionLine) -> DurationEstimate {
        self.estimate_for_qty(
            order.planned_qty,
            order.pre_wait_minutes,
            order.post_wait_minutes,
            line,
        )
    }

    /// 按数量估算工时（合批任务按合计数量调用）
    pub fn estimate_for_qty(
        &self,
        qty: f64,
        pre_wait_minutes: i64,
        post_wait_minutes: i64,
        line: &ProductionLine,
    ) -> DurationEstimate {
        let mut degraded = false;

        let capacity = match line.standard_capacity {
            Some(c) if c > 0.0 && c.is_finite() => c,
            _ => {
                degraded = true;
                tracing::warn!(
                    line_id = %line.line_id,
                    "产线标准产能缺失或非法,降级使用默认产能"
                );
                DEFAULT_CAPACITY_PER_HOUR
            }
        };

        let efficiency = if line.efficiency_factor > 0.0 && line.efficiency_factor.is_finite() {
            line.efficiency_factor
        } else {
            degraded = true;
            tracing::warn!(
                line_id = %line.line_id,
                efficiency_factor = line.efficiency_factor,
                "产线效率系数非法,降级为 1.0"
            );
            1.0
        };

        let effective_capacity = capacity * efficiency * self.worker_efficiency(line);

        let raw_minutes = qty / effective_capacity * 60.0;
        let production_minutes = if raw_minutes.is_finite() && raw_minutes > 0.0 {
            raw_minutes.round() as i64
        } else {
            degraded = true;
            tracing::warn!(
                line_id = %line.line_id,
                qty = qty,
                "工时计算异常,降级使用默认工时"
            );
            FALLBACK_DURATION_MINUTES
        };

        let total = production_minutes + pre_wait_minutes + post_wait_minutes;
        DurationEstimate {
            duration_minutes: total.clamp(MIN_DURATION_MINUTES, MAX_DURATION_MINUTES),
            effective_capacity,
            degraded,
        }
    }

    /// 产线当前的人员效率系数
    pub fn worker_efficiency(&self, line: &ProductionLine) -> f64 {
        worker_efficiency_ratio(line.current_workers, line.standard_workers)
    }

    // ==========================================
    // 特征向量构建（诊断/扩展输入,不参与排产决策）
    // ==========================================

    /// 订单特征向量
    ///
    /// [数量规模, 优先级, 紧急标志, 物料就绪度, 交期紧迫度, 合批标志]
    pub fn order_features(
        &self,
        order: &ProductionOrder,
        now: DateTime<Utc>,
    ) -> [f64; ORDER_FEATURE_WIDTH] {
        let deadline_pressure = match order.hours_to_deadline(now) {
            Some(h) => (-h / 48.0).exp().min(1.0),
            None => 0.5,
        };
        let material = match order.material_status {
            MaterialStatus::Ready => 1.0,
            MaterialStatus::Partial => 0.5,
            MaterialStatus::Waiting => 0.1,
        };

        [
            clamp01(order.planned_qty / QTY_SCALE),
            clamp01(order.priority as f64 / 10.0),
            if order.is_urgent { 1.0 } else { 0.0 },
            clamp01(material),
            clamp01(deadline_pressure),
            if order.allow_mix_batch { 1.0 } else { 0.0 },
        ]
    }

    /// 产线特征向量
    ///
    /// [产能规模, 效率系数, 人员到位率, 可排产标志, 品类覆盖度]
    pub fn line_features(&self, line: &ProductionLine) -> [f64; LINE_FEATURE_WIDTH] {
        let capacity = line.standard_capacity.unwrap_or(DEFAULT_CAPACITY_PER_HOUR);
        let staffing = if line.standard_workers > 0 {
            line.current_workers as f64 / line.standard_workers as f64
        } else {
            1.0
        };

        [
            clamp01(capacity / CAPACITY_SCALE),
            clamp01(line.efficiency_factor / EFFICIENCY_SCALE),
            clamp01(staffing),
            if line.is_schedulable() { 1.0 } else { 0.0 },
            clamp01(line.producible_categories.len() as f64 / CATEGORY_SCALE),
        ]
    }

    /// 订单-产线匹配特征向量
    ///
    /// [产能匹配度, 换型代价等级, 人员匹配度, 时间窗匹配度]
    pub fn match_features(
        &self,
        order: &ProductionOrder,
        line: &ProductionLine,
        changeover_minutes: i64,
        now: DateTime<Utc>,
    ) -> [f64; MATCH_FEATURE_WIDTH] {
        let estimate = self.estimate(order, line);
        let hours_needed = estimate.duration_minutes as f64 / 60.0;

        let capacity_fit = if hours_needed <= 8.0 {
            1.0
        } else {
            (-(hours_needed - 8.0) / 4.0).exp()
        };
        let changeover_class = (-(changeover_minutes as f64) / 60.0).exp();
        let staffing_fit = self.worker_efficiency(line).min(1.0);
        let time_fit = match order.hours_to_deadline(now) {
            Some(h) if h <= 0.0 => 0.0,
            Some(h) => (h - hours_needed) / h,
            None => 0.5,
        };

        [
            clamp01(capacity_fit),
            clamp01(changeover_class),
            clamp01(staffing_fit),
            clamp01(time_fit),
        ]
    }
}

impl Default for DurationEstimator {
    fn default() -> Self {
        Self::new()
    }
}
