// ==========================================
// 产线排产系统 - 候选产线推荐引擎
// ==========================================
// 职责: 单订单的候选产线筛选、打分与排序
// 输入: 订单 + 产线列表 + 批次运行态 + 换型矩阵 + 策略权重
// 输出: 按综合得分降序的候选产线列表
// 红线: 无候选返回空列表,不视为错误
// ==========================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::strategy_weights::StrategyWeights;
use crate::domain::line::{LineScheduleState, ProductionLine};
use crate::domain::order::ProductionOrder;
use crate::engine::changeover::ChangeoverMatrix;
use crate::engine::estimator::DurationEstimator;
use crate::engine::scoring::{ScoreBreakdown, StrategyScorer};

// ==========================================
// LineCandidate - 候选产线
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineCandidate {
    pub line_id: String,                 // 候选产线
    pub line_name: String,               // 产线名称
    pub composite_score: f64,            // 加权综合得分
    pub breakdown: ScoreBreakdown,       // 六维分值明细
    pub estimated_duration_minutes: i64, // 估算工时（分钟）
    pub changeover_minutes: i64,         // 换型成本（分钟）
    pub available_workers: i32,          // 可用人数
}

// ==========================================
// CandidateRanker - 候选产线推荐引擎
// ==========================================
pub struct CandidateRanker {
    estimator: DurationEstimator,
    scorer: StrategyScorer,
}

impl CandidateRanker {
    pub fn new() -> Self {
        Self {
            estimator: DurationEstimator::new(),
            scorer: StrategyScorer::new(),
        }
    }

    /// 为订单生成候选产线排序
    ///
    /// 筛选规则:
    /// - 产线状态可排产（可用/运行中）
    /// - 订单指定产线时只考察该产线,否则要求品类可生产
    ///
    /// 换型起点优先取批次运行态中的最近品类,无运行态时
    /// 退回产线主数据的当前在产品类。
    #[instrument(skip_all, fields(order_id = %order.order_id, line_count = lines.len()))]
    pub fn rank(
        &self,
        order: &ProductionOrder,
        lines: &[ProductionLine],
        line_states: &HashMap<String, LineScheduleState>,
        matrix: &ChangeoverMatrix,
        weights: &StrategyWeights,
        worker_counts: &HashMap<String, i32>,
        now: DateTime<Utc>,
    ) -> Vec<LineCandidate> {
        let weights = weights.normalized();

        let mut candidates: Vec<LineCandidate> = lines
            .iter()
            .filter(|line| self.is_eligible(order, line))
            .map(|line| {
                let last_category = line_states
                    .get(&line.line_id)
                    .map(|state| state.last_category.clone())
                    .unwrap_or_else(|| line.current_category.clone());

                let changeover_minutes = matrix.minutes(
                    last_category.as_deref(),
                    &order.product_category,
                    Some(&line.line_id),
                );
                let estimate = self.estimator.estimate(order, line);
                let breakdown =
                    self.scorer
                        .score(order, estimate.duration_minutes, changeover_minutes, now);
                let available_workers = worker_counts
                    .get(&line.line_id)
                    .copied()
                    .unwrap_or(line.current_workers);

                LineCandidate {
                    line_id: line.line_id.clone(),
                    line_name: line.line_name.clone(),
                    composite_score: breakdown.weighted_total(&weights),
                    breakdown,
                    estimated_duration_minutes: estimate.duration_minutes,
                    changeover_minutes,
                    available_workers,
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.composite_score
                .partial_cmp(&a.composite_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if candidates.is_empty() {
            tracing::info!(order_id = %order.order_id, "订单无可用候选产线");
        }
        candidates
    }

    fn is_eligible(&self, order: &ProductionOrder, line: &ProductionLine) -> bool {
        if !line.is_schedulable() {
            return false;
        }
        match &order.assigned_line_id {
            // 指定产线的订单不做品类校验,以指定为准
            Some(pinned) => &line.line_id == pinned,
            None => line.can_produce(&order.product_category),
        }
    }
}

impl Default for CandidateRanker {
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
    use crate::domain::changeover::ChangeoverRule;
    use crate::domain::types::{LineStatus, MaterialStatus, OrderStatus};
    use chrono::Duration;

    fn create_test_order() -> ProductionOrder {
        let now = Utc::now();
        ProductionOrder {
            order_id: "ORD-001".to_string(),
            order_no: "PO001".to_string(),
            product_category: "CAT-A".to_string(),
            product_spec: None,
            planned_qty: 400.0,
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

    fn create_test_line(line_id: &str, status: LineStatus) -> ProductionLine {
        let now = Utc::now();
        ProductionLine {
            line_id: line_id.to_string(),
            line_name: format!("{} 线", line_id),
            status,
            producible_categories: vec!["CAT-A".to_string(), "CAT-B".to_string()],
            standard_capacity: Some(100.0),
            efficiency_factor: 1.0,
            standard_workers: 4,
            current_workers: 4,
            max_workers: 6,
            current_category: None,
            next_available_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn create_test_rule(from: &str, to: &str, minutes: i64) -> ChangeoverRule {
        ChangeoverRule {
            rule_id: format!("CR-{}-{}", from, to),
            from_category: from.to_string(),
            to_category: to.to_string(),
            line_id: None,
            changeover_minutes: minutes,
            requires_cleaning: false,
            cleaning_minutes: 0,
            requires_mold_change: false,
            mold_change_minutes: 0,
            requires_calibration: false,
            calibration_minutes: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_rank_sorts_by_composite_score_desc() {
        let ranker = CandidateRanker::new();
        let order = create_test_order();
        let now = Utc::now();

        // 二号线需要换型,得分应落后
        let line_a = create_test_line("LINE-01", LineStatus::Available);
        let mut line_b = create_test_line("LINE-02", LineStatus::Available);
        line_b.current_category = Some("CAT-B".to_string());

        let matrix = ChangeoverMatrix::from_rules(&[create_test_rule("CAT-B", "CAT-A", 90)]);

        let candidates = ranker.rank(
            &order,
            &[line_b, line_a],
            &HashMap::new(),
            &matrix,
            &StrategyWeights::default(),
            &HashMap::new(),
            now,
        );
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].line_id, "LINE-01");
        assert_eq!(candidates[0].changeover_minutes, 0);
        assert_eq!(candidates[1].changeover_minutes, 90);
        assert!(candidates[0].composite_score > candidates[1].composite_score);
    }

    #[test]
    fn test_rank_filters_unschedulable_and_wrong_category() {
        let ranker = CandidateRanker::new();
        let mut order = create_test_order();
        order.product_category = "CAT-C".to_string();
        let now = Utc::now();

        let maintenance = create_test_line("LINE-01", LineStatus::Maintenance);
        let wrong_category = create_test_line("LINE-02", LineStatus::Available);

        let candidates = ranker.rank(
            &order,
            &[maintenance, wrong_category],
            &HashMap::new(),
            &ChangeoverMatrix::empty(),
            &StrategyWeights::default(),
            &HashMap::new(),
            now,
        );
        // 无候选返回空列表
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_pinned_order_only_considers_assigned_line() {
        let ranker = CandidateRanker::new();
        let mut order = create_test_order();
        order.assigned_line_id = Some("LINE-02".to_string());
        let now = Utc::now();

        let line_a = create_test_line("LINE-01", LineStatus::Available);
        let line_b = create_test_line("LINE-02", LineStatus::Running);

        let candidates = ranker.rank(
            &order,
            &[line_a, line_b],
            &HashMap::new(),
            &ChangeoverMatrix::empty(),
            &StrategyWeights::default(),
            &HashMap::new(),
            now,
        );
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].line_id, "LINE-02");
    }

    #[test]
    fn test_rank_uses_batch_state_category() {
        // 批次运行态的最近品类优先于产线主数据
        let ranker = CandidateRanker::new();
        let order = create_test_order();
        let now = Utc::now();

        let mut line = create_test_line("LINE-01", LineStatus::Available);
        line.current_category = Some("CAT-A".to_string());

        let mut state = LineScheduleState::from_line(&line, now);
        state.push_task(now + Duration::minutes(60), 60, "CAT-B");
        let mut states = HashMap::new();
        states.insert("LINE-01".to_string(), state);

        let matrix = ChangeoverMatrix::from_rules(&[create_test_rule("CAT-B", "CAT-A", 45)]);

        let candidates = ranker.rank(
            &order,
            &[line],
            &states,
            &matrix,
            &StrategyWeights::default(),
            &HashMap::new(),
            now,
        );
        // 主数据品类是 CAT-A（换型 0）,但批次内最近品类是 CAT-B
        assert_eq!(candidates[0].changeover_minutes, 45);
    }

    #[test]
    fn test_worker_counts_override_line_snapshot() {
        let ranker = CandidateRanker::new();
        let order = create_test_order();
        let now = Utc::now();
        let line = create_test_line("LINE-01", LineStatus::Available);

        let mut worker_counts = HashMap::new();
        worker_counts.insert("LINE-01".to_string(), 2);

        let candidates = ranker.rank(
            &order,
            &[line],
            &HashMap::new(),
            &ChangeoverMatrix::empty(),
            &StrategyWeights::default(),
            &worker_counts,
            now,
        );
        assert_eq!(candidates[0].available_workers, 2);
    }
}
