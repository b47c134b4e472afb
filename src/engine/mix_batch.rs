// ==========================================
// 产线排产系统 - 合批分析引擎
// ==========================================
// 职责: 识别可合并生产的同品类订单组,省去组内换型
// 输入: 待排产订单列表
// 输出: 合批建议组（组内 >= 2 单才成立）
// 红线: 只做建议,不修改订单,是否采纳由批量排产决定
// ==========================================

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::order::ProductionOrder;

/// 默认合批交期窗口（小时）
pub const DEFAULT_MIX_WINDOW_HOURS: i64 = 24;
/// 每合并一单节省的换型分钟数
pub const DEFAULT_SAVED_MINUTES_PER_ORDER: i64 = 30;

// ==========================================
// MixBatchGroup - 合批建议组
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixBatchGroup {
    pub group_id: String,                        // 组标识（UUID）
    pub product_category: String,                // 合批品类
    pub order_ids: Vec<String>,                  // 成员订单（按交期升序）
    pub total_qty: f64,                          // 合计计划数量
    pub latest_deadline: Option<DateTime<Utc>>,  // 组内最晚交期（全员无交期为 NULL）
    pub saved_changeover_minutes: i64,           // 预计节省的换型分钟数
    pub preferred_line_id: Option<String>,       // 成员指定产线（取首个指定,无则 NULL）
}

impl MixBatchGroup {
    pub fn size(&self) -> usize {
        self.order_ids.len()
    }
}

// ==========================================
// MixBatchAnalyzer - 合批分析引擎
// ==========================================
pub struct MixBatchAnalyzer {
    window_hours: i64,
    saved_minutes_per_order: i64,
}

impl MixBatchAnalyzer {
    pub fn new() -> Self {
        Self {
            window_hours: DEFAULT_MIX_WINDOW_HOURS,
            saved_minutes_per_order: DEFAULT_SAVED_MINUTES_PER_ORDER,
        }
    }

    pub fn with_config(window_hours: i64, saved_minutes_per_order: i64) -> Self {
        Self {
            window_hours,
            saved_minutes_per_order,
        }
    }

    /// 分析可合批订单
    ///
    /// 流程:
    /// 1. 只保留允许合批的订单,按品类分组
    /// 2. 组内按交期升序（无交期排最后）
    /// 3. 从头链式合并: 下一单交期距当前组最晚交期不超过窗口则并入,
    ///    否则另起新组;无交期单只与无交期单互并
    /// 4. 仅保留成员数 >= 2 的组,节省换型 = (成员数 - 1) * 单次节省
    #[instrument(skip_all, fields(order_count = orders.len()))]
    pub fn analyze(&self, orders: &[ProductionOrder]) -> Vec<MixBatchGroup> {
        let mut by_category: BTreeMap<&str, Vec<&ProductionOrder>> = BTreeMap::new();
        for order in orders.iter().filter(|o| o.allow_mix_batch) {
            by_category
                .entry(order.product_category.as_str())
                .or_default()
                .push(order);
        }

        let mut groups = Vec::new();
        for (category, mut members) in by_category {
            members.sort_by_key(|o| (o.latest_end.is_none(), o.latest_end));

            let mut chain: Vec<&ProductionOrder> = Vec::new();
            let mut chain_latest: Option<DateTime<Utc>> = None;
            for order in members {
                let joins = match (chain_latest, order.latest_end) {
                    _ if chain.is_empty() => true,
                    (Some(latest), Some(deadline)) => {
                        deadline - latest <= Duration::hours(self.window_hours)
                    }
                    (None, None) => true,
                    // 有交期与无交期不混入同组
                    _ => false,
                };

                if joins {
                    if order.latest_end.is_some() {
                        chain_latest = order.latest_end;
                    }
                    chain.push(order);
                } else {
                    self.close_chain(category, &mut chain, chain_latest, &mut groups);
                    chain_latest = order.latest_end;
                    chain.push(order);
                }
            }
            self.close_chain(category, &mut chain, chain_latest, &mut groups);
        }

        tracing::info!(group_count = groups.len(), "合批分析完成");
        groups
    }

    fn close_chain(
        &self,
        category: &str,
        chain: &mut Vec<&ProductionOrder>,
        chain_latest: Option<DateTime<Utc>>,
        groups: &mut Vec<MixBatchGroup>,
    ) {
        if chain.len() >= 2 {
            let preferred_line_id = chain
                .iter()
                .find_map(|o| o.assigned_line_id.clone());
            groups.push(MixBatchGroup {
                group_id: Uuid::new_v4().to_string(),
                product_category: category.to_string(),
                order_ids: chain.iter().map(|o| o.order_id.clone()).collect(),
                total_qty: chain.iter().map(|o| o.planned_qty).sum(),
                latest_deadline: chain_latest,
                saved_changeover_minutes: (chain.len() as i64 - 1) * self.saved_minutes_per_order,
                preferred_line_id,
            });
        }
        chain.clear();
    }
}

impl Default for MixBatchAnalyzer {
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
    use crate::domain::types::{MaterialStatus, OrderStatus};

    fn create_test_order(
        order_id: &str,
        category: &str,
        deadline: Option<DateTime<Utc>>,
        allow_mix: bool,
    ) -> ProductionOrder {
        let now = Utc::now();
        ProductionOrder {
            order_id: order_id.to_string(),
            order_no: format!("PO-{}", order_id),
            product_category: category.to_string(),
            product_spec: None,
            planned_qty: 100.0,
            completed_qty: 0.0,
            priority: 5,
            is_urgent: false,
            allow_mix_batch: allow_mix,
            earliest_start: None,
            latest_end: deadline,
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
    fn test_close_deadlines_merge_into_one_group() {
        // 场景: 同品类两单交期相差 3 小时,应合成一组省 30 分钟
        let analyzer = MixBatchAnalyzer::new();
        let base = Utc::now();
        let orders = vec![
            create_test_order("ORD-001", "CAT-A", Some(base + Duration::hours(10)), true),
            create_test_order("ORD-002", "CAT-A", Some(base + Duration::hours(13)), true),
        ];

        let groups = analyzer.analyze(&orders);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].size(), 2);
        assert_eq!(groups[0].saved_changeover_minutes, 30);
        assert_eq!(groups[0].total_qty, 200.0);
        assert_eq!(groups[0].latest_deadline, Some(base + Duration::hours(13)));
    }

    #[test]
    fn test_disallowed_orders_excluded() {
        let analyzer = MixBatchAnalyzer::new();
        let base = Utc::now();
        let orders = vec![
            create_test_order("ORD-001", "CAT-A", Some(base + Duration::hours(10)), true),
            create_test_order("ORD-002", "CAT-A", Some(base + Duration::hours(11)), false),
        ];

        // 不允许合批的订单不参与,组不成立
        assert!(analyzer.analyze(&orders).is_empty());
    }

    #[test]
    fn test_categories_never_mix() {
        let analyzer = MixBatchAnalyzer::new();
        let base = Utc::now();
        let orders = vec![
            create_test_order("ORD-001", "CAT-A", Some(base + Duration::hours(10)), true),
            create_test_order("ORD-002", "CAT-B", Some(base + Duration::hours(10)), true),
        ];

        assert!(analyzer.analyze(&orders).is_empty());
    }

    #[test]
    fn test_wide_deadline_gap_splits_chain() {
        let analyzer = MixBatchAnalyzer::new();
        let base = Utc::now();
        let orders = vec![
            create_test_order("ORD-001", "CAT-A", Some(base + Duration::hours(10)), true),
            create_test_order("ORD-002", "CAT-A", Some(base + Duration::hours(12)), true),
            // 距组内最晚交期 62 小时,断链
            create_test_order("ORD-003", "CAT-A", Some(base + Duration::hours(74)), true),
            create_test_order("ORD-004", "CAT-A", Some(base + Duration::hours(75)), true),
        ];

        let groups = analyzer.analyze(&orders);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].order_ids, vec!["ORD-001", "ORD-002"]);
        assert_eq!(groups[1].order_ids, vec!["ORD-003", "ORD-004"]);
    }

    #[test]
    fn test_chain_window_is_anchored_to_group_latest() {
        // 链式判断相对组内最晚交期,而非首单交期
        let analyzer = MixBatchAnalyzer::new();
        let base = Utc::now();
        let orders = vec![
            create_test_order("ORD-001", "CAT-A", Some(base), true),
            create_test_order("ORD-002", "CAT-A", Some(base + Duration::hours(20)), true),
            // 距首单 40 小时,但距 ORD-002 只有 20 小时
            create_test_order("ORD-003", "CAT-A", Some(base + Duration::hours(40)), true),
        ];

        let groups = analyzer.analyze(&orders);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].size(), 3);
        assert_eq!(groups[0].saved_changeover_minutes, 60);
    }

    #[test]
    fn test_no_deadline_orders_group_together() {
        let analyzer = MixBatchAnalyzer::new();
        let base = Utc::now();
        let orders = vec![
            create_test_order("ORD-001", "CAT-A", Some(base + Duration::hours(10)), true),
            create_test_order("ORD-002", "CAT-A", None, true),
            create_test_order("ORD-003", "CAT-A", None, true),
        ];

        // 有交期单独一单不成组;两张无交期单互并
        let groups = analyzer.analyze(&orders);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].order_ids, vec!["ORD-002", "ORD-003"]);
        assert_eq!(groups[0].latest_deadline, None);
    }

    #[test]
    fn test_preferred_line_taken_from_pinned_member() {
        let analyzer = MixBatchAnalyzer::new();
        let base = Utc::now();
        let mut first = create_test_order("ORD-001", "CAT-A", Some(base + Duration::hours(5)), true);
        first.assigned_line_id = None;
        let mut second = create_test_order("ORD-002", "CAT-A", Some(base + Duration::hours(6)), true);
        second.assigned_line_id = Some("LINE-02".to_string());

        let groups = analyzer.analyze(&[first, second]);
        assert_eq!(groups[0].preferred_line_id.as_deref(), Some("LINE-02"));
    }
}
