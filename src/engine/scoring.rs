// ==========================================
// 产线排产系统 - 策略打分引擎
// ==========================================
// 职责: 订单-产线组合的六维策略打分与加权合成
// 输入: 订单 + 工时估算 + 换型成本 + 策略权重
// 输出: 六维分值明细与综合得分
// 红线: 打分只读,不修改任何领域对象
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::strategy_weights::StrategyWeights;
use crate::domain::order::ProductionOrder;
use crate::domain::types::MaterialStatus;

// ==========================================
// ScoreBreakdown - 六维分值明细
// ==========================================
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub earliest_deadline: f64, // 交期最早优先得分
    pub shortest_process: f64,  // 加工时长最短优先得分
    pub min_changeover: f64,    // 换型成本最小优先得分
    pub capacity_match: f64,    // 产能匹配优先得分
    pub material_ready: f64,    // 物料齐备优先得分
    pub urgency_first: f64,     // 紧急程度优先得分
}

impl ScoreBreakdown {
    /// 按权重加权合成综合得分
    pub fn weighted_total(&self, weights: &StrategyWeights) -> f64 {
        self.earliest_deadline * weights.earliest_deadline
            + self.shortest_process * weights.shortest_process
            + self.min_changeover * weights.min_changeover
            + self.capacity_match * weights.capacity_match
            + self.material_ready * weights.material_ready
            + self.urgency_first * weights.urgency_first
    }
}

// ==========================================
// StrategyScorer - 策略打分引擎
// ==========================================
pub struct StrategyScorer {
    // 无状态引擎,不需要注入依赖
}

impl StrategyScorer {
    pub fn new() -> Self {
        Self {}
    }

    /// 六维策略打分
    ///
    /// 交期/时长/换型三维采用指数衰减,衰减基准分别为 48 小时、
    /// 480 分钟、60 分钟。紧急订单的紧急维得分可超过 1,
    /// 保证紧急单在加权合成中压过普通单。
    pub fn score(
        &self,
        order: &ProductionOrder,
        duration_minutes: i64,
        changeover_minutes: i64,
        now: DateTime<Utc>,
    ) -> ScoreBreakdown {
        let hours_needed = duration_minutes as f64 / 60.0;

        let earliest_deadline = match order.hours_to_deadline(now) {
            // 已超期订单按满分处理,越早越该排
            Some(h) => (-h / 48.0).exp().min(1.0),
            None => 0.5,
        };

        let shortest_process = (-(duration_minutes as f64) / 480.0).exp();

        let min_changeover = (-(changeover_minutes as f64) / 60.0).exp();

        let capacity_match = if hours_needed <= 8.0 {
            1.0
        } else {
            (-(hours_needed - 8.0) / 4.0).exp()
        };

        let material_ready = match order.material_status {
            MaterialStatus::Ready => 1.0,
            MaterialStatus::Partial => 0.5,
            MaterialStatus::Waiting => 0.1,
        };

        let urgency_first = if order.is_urgent {
            order.priority as f64 / 10.0 + 0.5
        } else {
            order.priority as f64 / 10.0
        };

        ScoreBreakdown {
            earliest_deadline,
            shortest_process,
            min_changeover,
            capacity_match,
            material_ready,
            urgency_first,
        }
    }
}

impl Default for StrategyScorer {
    fn default() -> Self {
        Self::new()
    }
}

// ==========================================
// 测试模块
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::OrderStatus;
    use chrono::Duration;

    fn create_test_order() -> ProductionOrder {
        let now = Utc::now();
        ProductionOrder {
            order_id: "ORD-001".to_string(),
            order_no: "PO001".to_string(),
            product_category: "CAT-A".to_string(),
            product_spec: None,
            planned_qty: 500.0,
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
    fn test_deadline_score_decays_with_hours() {
        let scorer = StrategyScorer::new();
        let now = Utc::now();

        let mut near = create_test_order();
        near.latest_end = Some(now + Duration::hours(12));
        let mut far = create_test_order();
        far.latest_end = Some(now + Duration::hours(96));

        let near_score = scorer.score(&near, 120, 0, now).earliest_deadline;
        let far_score = scorer.score(&far, 120, 0, now).earliest_deadline;
        assert!(near_score > far_score);
        // 48 小时交期: exp(-1) ≈ 0.368
        let base = scorer.score(&create_test_order(), 120, 0, now).earliest_deadline;
        assert!((base - (-1.0f64).exp()).abs() < 0.01);
    }

    #[test]
    fn test_overdue_deadline_capped_at_one() {
        let scorer = StrategyScorer::new();
        let now = Utc::now();
        let mut order = create_test_order();
        order.latest_end = Some(now - Duration::hours(24));

        let score = scorer.score(&order, 120, 0, now);
        assert_eq!(score.earliest_deadline, 1.0);
    }

    #[test]
    fn test_no_deadline_gets_neutral_score() {
        let scorer = StrategyScorer::new();
        let now = Utc::now();
        let mut order = create_test_order();
        order.latest_end = None;

        let score = scorer.score(&order, 120, 0, now);
        assert_eq!(score.earliest_deadline, 0.5);
    }

    #[test]
    fn test_zero_changeover_scores_full() {
        let scorer = StrategyScorer::new();
        let now = Utc::now();
        let order = create_test_order();

        let score = scorer.score(&order, 120, 0, now);
        assert_eq!(score.min_changeover, 1.0);
        // 60 分钟换型: exp(-1)
        let with_changeover = scorer.score(&order, 120, 60, now);
        assert!((with_changeover.min_changeover - (-1.0f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn test_capacity_match_breaks_at_eight_hours() {
        let scorer = StrategyScorer::new();
        let now = Utc::now();
        let order = create_test_order();

        // 8 小时以内满分
        assert_eq!(scorer.score(&order, 480, 0, now).capacity_match, 1.0);
        // 12 小时: exp(-1)
        let over = scorer.score(&order, 720, 0, now);
        assert!((over.capacity_match - (-1.0f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn test_material_status_tiers() {
        let scorer = StrategyScorer::new();
        let now = Utc::now();
        let mut order = create_test_order();

        assert_eq!(scorer.score(&order, 120, 0, now).material_ready, 1.0);
        order.material_status = MaterialStatus::Partial;
        assert_eq!(scorer.score(&order, 120, 0, now).material_ready, 0.5);
        order.material_status = MaterialStatus::Waiting;
        assert_eq!(scorer.score(&order, 120, 0, now).material_ready, 0.1);
    }

    #[test]
    fn test_urgent_bonus_exceeds_one() {
        // 紧急加成不封顶,优先级 10 的紧急单得 1.5
        let scorer = StrategyScorer::new();
        let now = Utc::now();
        let mut order = create_test_order();
        order.is_urgent = true;
        order.priority = 10;

        let score = scorer.score(&order, 120, 0, now);
        assert!((score.urgency_first - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_total_with_default_weights() {
        let breakdown = ScoreBreakdown {
            earliest_deadline: 1.0,
            shortest_process: 1.0,
            min_changeover: 1.0,
            capacity_match: 1.0,
            material_ready: 1.0,
            urgency_first: 1.0,
        };
        let total = breakdown.weighted_total(&StrategyWeights::default());
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_total_respects_weight_shift() {
        let now = Utc::now();
        let scorer = StrategyScorer::new();
        let mut urgent = create_test_order();
        urgent.is_urgent = true;
        urgent.priority = 10;
        let normal = create_test_order();

        // 紧急维权重拉满后,紧急单综合得分领先扩大
        let heavy_urgency = StrategyWeights {
            earliest_deadline: 0.1,
            shortest_process: 0.1,
            min_changeover: 0.1,
            capacity_match: 0.1,
            material_ready: 0.1,
            urgency_first: 0.5,
        };
        let urgent_score = scorer.score(&urgent, 120, 0, now);
        let normal_score = scorer.score(&normal, 120, 0, now);
        let gap_heavy = urgent_score.weighted_total(&heavy_urgency)
            - normal_score.weighted_total(&heavy_urgency);
        let gap_default = urgent_score.weighted_total(&StrategyWeights::default())
            - normal_score.weighted_total(&StrategyWeights::default());
        assert!(gap_heavy > gap_default);
    }
}
