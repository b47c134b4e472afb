// ==========================================
// 产线排产系统 - 冲突检测与修复引擎
// ==========================================
// 职责: 排产结果的三类冲突检测 + 可自动修复冲突的处置
// 输入: 任务列表 + 订单索引（检测）/ 单条冲突记录（修复）
// 输出: 冲突记录列表 / 修复是否成功
// 红线: 未解决冲突是合法结果,修复失败不升级为错误
// ==========================================

use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::conflict::ScheduleConflict;
use crate::domain::order::ProductionOrder;
use crate::domain::task::ScheduleTask;
use crate::domain::types::{ConflictSeverity, ConflictType, MoldStatus};
use crate::repository::conflict_repo::ScheduleConflictRepository;
use crate::repository::mold_repo::MoldRepository;
use crate::repository::task_repo::ScheduleTaskRepository;

/// 交期超出此小时数升级为严重冲突
pub const CRITICAL_OVERRUN_HOURS: i64 = 8;
/// 顺延修复时在前序任务之后留出的间隔（分钟）
pub const DEFAULT_RESOLVE_GAP_MINUTES: i64 = 5;
/// 交期窗口冲突的固定处置建议
pub const TIME_WINDOW_SUGGESTION: &str = "增派人手 / 拆分订单 / 与客户重新协商交期";

// ==========================================
// ConflictDetector - 冲突检测引擎
// ==========================================
pub struct ConflictDetector {
    // 无状态引擎,不需要注入依赖
}

impl ConflictDetector {
    pub fn new() -> Self {
        Self {}
    }

    /// 三类冲突全量检测
    ///
    /// 1. 同线相邻任务时间重叠（高）
    /// 2. 跨线共用模具时段争用（严重）
    /// 3. 任务完工晚于订单最晚交期（超 8 小时为严重,否则高）
    ///
    /// 检测只读,结果是否落库由调用方决定。
    #[instrument(skip_all, fields(task_count = tasks.len()))]
    pub fn detect(
        &self,
        tasks: &[ScheduleTask],
        orders_by_id: &HashMap<String, ProductionOrder>,
        now: DateTime<Utc>,
    ) -> Vec<ScheduleConflict> {
        let mut conflicts = Vec::new();
        self.detect_time_overlaps(tasks, now, &mut conflicts);
        self.detect_mold_contention(tasks, now, &mut conflicts);
        self.detect_deadline_violations(tasks, orders_by_id, now, &mut conflicts);

        if !conflicts.is_empty() {
            tracing::warn!(conflict_count = conflicts.len(), "检测到排产冲突");
        }
        conflicts
    }

    /// 同线相邻任务时间重叠
    fn detect_time_overlaps(
        &self,
        tasks: &[ScheduleTask],
        now: DateTime<Utc>,
        conflicts: &mut Vec<ScheduleConflict>,
    ) {
        let mut by_line: HashMap<&str, Vec<&ScheduleTask>> = HashMap::new();
        for task in tasks {
            by_line.entry(task.line_id.as_str()).or_default().push(task);
        }

        for (line_id, mut line_tasks) in by_line {
            line_tasks.sort_by_key(|t| t.start_time);
            for pair in line_tasks.windows(2) {
                let (cur, next) = (pair[0], pair[1]);
                if cur.end_time > next.start_time {
                    conflicts.push(ScheduleConflict {
                        conflict_id: Uuid::new_v4().to_string(),
                        conflict_type: ConflictType::TimeOverlap,
                        severity: ConflictSeverity::High,
                        line_id: Some(line_id.to_string()),
                        task_ids: vec![cur.task_id.clone(), next.task_id.clone()],
                        mold_id: None,
                        window_start: Some(next.start_time),
                        window_end: Some(cur.end_time),
                        description: format!(
                            "产线 {} 任务 {} 与 {} 时间重叠 {} 分钟",
                            line_id,
                            cur.task_id,
                            next.task_id,
                            (cur.end_time - next.start_time).num_minutes()
                        ),
                        suggestion: None,
                        resolved: false,
                        resolution_method: None,
                        resolved_at: None,
                        created_at: now,
                    });
                }
            }
        }
    }

    /// 跨线共用模具时段争用
    fn detect_mold_contention(
        &self,
        tasks: &[ScheduleTask],
        now: DateTime<Utc>,
        conflicts: &mut Vec<ScheduleConflict>,
    ) {
        let mut by_mold: HashMap<&str, Vec<&ScheduleTask>> = HashMap::new();
        for task in tasks {
            if let Some(mold_id) = &task.mold_id {
                by_mold.entry(mold_id.as_str()).or_default().push(task);
            }
        }

        for (mold_id, mold_tasks) in by_mold {
            for i in 0..mold_tasks.len() {
                for j in (i + 1)..mold_tasks.len() {
                    let (a, b) = (mold_tasks[i], mold_tasks[j]);
                    // 同线争用已由时间重叠检测覆盖
                    if a.line_id == b.line_id || !a.overlaps(b) {
                        continue;
                    }
                    conflicts.push(ScheduleConflict {
                        conflict_id: Uuid::new_v4().to_string(),
                        conflict_type: ConflictType::Mold,
                        severity: ConflictSeverity::Critical,
                        line_id: Some(a.line_id.clone()),
                        task_ids: vec![a.task_id.clone(), b.task_id.clone()],
                        mold_id: Some(mold_id.to_string()),
                        window_start: Some(a.start_time.max(b.start_time)),
                        window_end: Some(a.end_time.min(b.end_time)),
                        description: format!(
                            "模具 {} 被产线 {} 与 {} 同时段占用",
                            mold_id, a.line_id, b.line_id
                        ),
                        suggestion: None,
                        resolved: false,
                        resolution_method: None,
                        resolved_at: None,
                        created_at: now,
                    });
                }
            }
        }
    }

    /// 任务完工晚于订单最晚交期
    fn detect_deadline_violations(
        &self,
        tasks: &[ScheduleTask],
        orders_by_id: &HashMap<String, ProductionOrder>,
        now: DateTime<Utc>,
        conflicts: &mut Vec<ScheduleConflict>,
    ) {
        for task in tasks {
            for order_id in self.served_order_ids(task) {
                let Some(order) = orders_by_id.get(order_id) else {
                    continue;
                };
                let Some(deadline) = order.latest_end else {
                    continue;
                };
                if task.end_time <= deadline {
                    continue;
                }

                let overrun = task.end_time - deadline;
                let severity = if overrun > Duration::hours(CRITICAL_OVERRUN_HOURS) {
                    ConflictSeverity::Critical
                } else {
                    ConflictSeverity::High
                };
                conflicts.push(ScheduleConflict {
                    conflict_id: Uuid::new_v4().to_string(),
                    conflict_type: ConflictType::TimeWindow,
                    severity,
                    line_id: Some(task.line_id.clone()),
                    task_ids: vec![task.task_id.clone()],
                    mold_id: None,
                    window_start: Some(deadline),
                    window_end: Some(task.end_time),
                    description: format!(
                        "订单 {} 预计完工超出交期 {} 分钟",
                        order.order_no,
                        overrun.num_minutes()
                    ),
                    suggestion: Some(TIME_WINDOW_SUGGESTION.to_string()),
                    resolved: false,
                    resolution_method: None,
                    resolved_at: None,
                    created_at: now,
                });
            }
        }
    }

    /// 任务服务的订单集合（合批任务展开到全部成员）
    fn served_order_ids<'a>(&self, task: &'a ScheduleTask) -> Vec<&'a str> {
        match &task.merged_order_ids {
            Some(ids) if !ids.is_empty() => ids.iter().map(|s| s.as_str()).collect(),
            _ => vec![task.order_id.as_str()],
        }
    }
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new()
    }
}

// ==========================================
// ConflictResolver - 冲突修复引擎
// ==========================================
pub struct ConflictResolver {
    task_repo: Arc<ScheduleTaskRepository>,
    mold_repo: Arc<MoldRepository>,
    conflict_repo: Arc<ScheduleConflictRepository>,
    gap_minutes: i64,
}

impl ConflictResolver {
    pub fn new(
        task_repo: Arc<ScheduleTaskRepository>,
        mold_repo: Arc<MoldRepository>,
        conflict_repo: Arc<ScheduleConflictRepository>,
    ) -> Self {
        Self {
            task_repo,
            mold_repo,
            conflict_repo,
            gap_minutes: DEFAULT_RESOLVE_GAP_MINUTES,
        }
    }

    /// 覆盖顺延安全间隔（分钟）
    pub fn with_gap_minutes(mut self, gap_minutes: i64) -> Self {
        self.gap_minutes = gap_minutes.max(0);
        self
    }

    /// 尝试自动修复单条冲突
    ///
    /// - 时间重叠: 后序任务顺延到前序完工之后
    /// - 模具争用: 为后序任务改派同品类备用模具
    /// - 交期窗口: 不自动修复,保留人工处置建议
    ///
    /// 返回 Ok(false) 表示本条冲突无法自动修复,不视为错误。
    #[instrument(skip(self, conflict), fields(conflict_id = %conflict.conflict_id, conflict_type = %conflict.conflict_type))]
    pub fn resolve(&self, conflict: &ScheduleConflict) -> Result<bool, Box<dyn Error>> {
        if conflict.resolved {
            tracing::debug!(conflict_id = %conflict.conflict_id, "冲突已解决,跳过");
            return Ok(true);
        }

        match conflict.conflict_type {
            ConflictType::TimeOverlap => self.resolve_time_overlap(conflict),
            ConflictType::Mold => self.resolve_mold_contention(conflict),
            ConflictType::TimeWindow => {
                tracing::info!(
                    conflict_id = %conflict.conflict_id,
                    "交期窗口冲突不自动修复,等待人工处置"
                );
                Ok(false)
            }
        }
    }

    /// 时间重叠: 把后开工的任务顺延到先开工任务完工后
    fn resolve_time_overlap(&self, conflict: &ScheduleConflict) -> Result<bool, Box<dyn Error>> {
        let Some((earlier, later)) = self.load_task_pair(conflict)? else {
            return Ok(false);
        };

        let duration = later.duration_minutes();
        let new_start = earlier.end_time + Duration::minutes(self.gap_minutes);
        let new_end = new_start + Duration::minutes(duration);

        self.task_repo.shift_time(&later.task_id, new_start, new_end)?;
        self.conflict_repo
            .mark_resolved(&conflict.conflict_id, "顺延后序任务", Utc::now())?;
        tracing::info!(
            task_id = %later.task_id,
            new_start = %new_start,
            "时间重叠冲突已通过顺延修复"
        );
        Ok(true)
    }

    /// 模具争用: 为后开工任务改派备用模具
    fn resolve_mold_contention(&self, conflict: &ScheduleConflict) -> Result<bool, Box<dyn Error>> {
        let Some(mold_id) = &conflict.mold_id else {
            tracing::warn!(conflict_id = %conflict.conflict_id, "模具冲突缺少模具标识,无法修复");
            return Ok(false);
        };
        let Some((_, later)) = self.load_task_pair(conflict)? else {
            return Ok(false);
        };

        let category = self
            .mold_repo
            .find_by_id(mold_id)?
            .and_then(|m| m.category);
        let Some(alternate) = self
            .mold_repo
            .find_alternate(mold_id, category.as_deref())?
        else {
            tracing::info!(mold_id = %mold_id, "无可用备用模具,冲突保留");
            return Ok(false);
        };

        self.task_repo.update_mold(&later.task_id, &alternate.mold_id)?;
        self.mold_repo
            .update_status(&alternate.mold_id, MoldStatus::InUse)?;
        self.conflict_repo.mark_resolved(
            &conflict.conflict_id,
            &format!("改派备用模具 {}", alternate.mold_id),
            Utc::now(),
        )?;
        tracing::info!(
            task_id = %later.task_id,
            alternate_mold = %alternate.mold_id,
            "模具争用冲突已通过改派修复"
        );
        Ok(true)
    }

    /// 加载冲突涉及的两个任务,按开工时间排序返回（早, 晚）
    fn load_task_pair(
        &self,
        conflict: &ScheduleConflict,
    ) -> Result<Option<(ScheduleTask, ScheduleTask)>, Box<dyn Error>> {
        if conflict.task_ids.len() != 2 {
            tracing::warn!(
                conflict_id = %conflict.conflict_id,
                task_count = conflict.task_ids.len(),
                "冲突涉及任务数异常,无法自动修复"
            );
            return Ok(None);
        }

        let mut tasks = Vec::with_capacity(2);
        for task_id in &conflict.task_ids {
            match self.task_repo.find_by_id(task_id)? {
                Some(task) => tasks.push(task),
                None => {
                    tracing::warn!(task_id = %task_id, "冲突涉及任务已不存在,无法自动修复");
                    return Ok(None);
                }
            }
        }

        let second = tasks.pop();
        let first = tasks.pop();
        match (first, second) {
            (Some(a), Some(b)) => {
                if a.start_time <= b.start_time {
                    Ok(Some((a, b)))
                } else {
                    Ok(Some((b, a)))
                }
            }
            _ => Ok(None),
        }
    }
}

// ==========================================
// 测试模块
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::TaskStatus;

    fn create_test_task(
        task_id: &str,
        line_id: &str,
        start_offset_min: i64,
        duration_min: i64,
    ) -> ScheduleTask {
        let base = Utc::now();
        let start = base + Duration::minutes(start_offset_min);
        ScheduleTask {
            task_id: task_id.to_string(),
            order_id: format!("ORD-{}", task_id),
            line_id: line_id.to_string(),
            batch_no: Some("B-TEST".to_string()),
            sequence_no: 1,
            start_time: start,
            end_time: start + Duration::minutes(duration_min),
            changeover_minutes: 0,
            planned_qty: 100.0,
            product_category: "CAT-A".to_string(),
            mold_id: None,
            is_mix_batch: false,
            merged_order_ids: None,
            deadline_gap_minutes: None,
            meets_deadline: true,
            status: TaskStatus::Planned,
            created_at: base,
            updated_at: base,
        }
    }

    fn create_test_order(order_id: &str, deadline: Option<DateTime<Utc>>) -> ProductionOrder {
        use crate::domain::types::{MaterialStatus, OrderStatus};
        let now = Utc::now();
        ProductionOrder {
            order_id: order_id.to_string(),
            order_no: format!("PO-{}", order_id),
            product_category: "CAT-A".to_string(),
            product_spec: None,
            planned_qty: 100.0,
            completed_qty: 0.0,
            priority: 5,
            is_urgent: false,
            allow_mix_batch: false,
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
    fn test_detect_adjacent_overlap_on_same_line() {
        let detector = ConflictDetector::new();
        let tasks = vec![
            create_test_task("T1", "LINE-01", 0, 120),
            create_test_task("T2", "LINE-01", 90, 60), // 与 T1 重叠 30 分钟
        ];

        let conflicts = detector.detect(&tasks, &HashMap::new(), Utc::now());
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::TimeOverlap);
        assert_eq!(conflicts[0].severity, ConflictSeverity::High);
        assert_eq!(conflicts[0].task_ids, vec!["T1", "T2"]);
    }

    #[test]
    fn test_back_to_back_tasks_do_not_conflict() {
        // 首尾相接不算重叠
        let detector = ConflictDetector::new();
        let tasks = vec![
            create_test_task("T1", "LINE-01", 0, 60),
            create_test_task("T2", "LINE-01", 60, 60),
        ];

        assert!(detector.detect(&tasks, &HashMap::new(), Utc::now()).is_empty());
    }

    #[test]
    fn test_detect_cross_line_mold_contention() {
        let detector = ConflictDetector::new();
        let mut a = create_test_task("T1", "LINE-01", 0, 120);
        let mut b = create_test_task("T2", "LINE-02", 60, 120);
        a.mold_id = Some("MOLD-01".to_string());
        b.mold_id = Some("MOLD-01".to_string());

        let conflicts = detector.detect(&[a, b], &HashMap::new(), Utc::now());
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::Mold);
        assert_eq!(conflicts[0].severity, ConflictSeverity::Critical);
        assert_eq!(conflicts[0].mold_id.as_deref(), Some("MOLD-01"));
    }

    #[test]
    fn test_same_mold_different_window_no_conflict() {
        let detector = ConflictDetector::new();
        let mut a = create_test_task("T1", "LINE-01", 0, 60);
        let mut b = create_test_task("T2", "LINE-02", 120, 60);
        a.mold_id = Some("MOLD-01".to_string());
        b.mold_id = Some("MOLD-01".to_string());

        assert!(detector.detect(&[a, b], &HashMap::new(), Utc::now()).is_empty());
    }

    #[test]
    fn test_deadline_violation_severity_by_overrun() {
        let detector = ConflictDetector::new();
        let now = Utc::now();

        // 完工超交期 2 小时: 高
        let task_small = create_test_task("T1", "LINE-01", 0, 240);
        let order_small =
            create_test_order("ORD-T1", Some(task_small.end_time - Duration::hours(2)));

        // 完工超交期 10 小时: 严重
        let task_big = create_test_task("T2", "LINE-02", 0, 720);
        let order_big = create_test_order("ORD-T2", Some(task_big.end_time - Duration::hours(10)));

        let mut orders = HashMap::new();
        orders.insert(order_small.order_id.clone(), order_small);
        orders.insert(order_big.order_id.clone(), order_big);

        let conflicts = detector.detect(&[task_small, task_big], &orders, now);
        assert_eq!(conflicts.len(), 2);
        let small = conflicts.iter().find(|c| c.task_ids == vec!["T1"]).unwrap();
        let big = conflicts.iter().find(|c| c.task_ids == vec!["T2"]).unwrap();
        assert_eq!(small.severity, ConflictSeverity::High);
        assert_eq!(big.severity, ConflictSeverity::Critical);
        // 交期冲突必须带人工处置建议
        assert!(small.suggestion.is_some());
    }

    #[test]
    fn test_mix_batch_task_checks_all_member_orders() {
        let detector = ConflictDetector::new();
        let mut task = create_test_task("T1", "LINE-01", 0, 300);
        task.is_mix_batch = true;
        task.merged_order_ids = Some(vec!["ORD-A".to_string(), "ORD-B".to_string()]);

        // 成员 A 交期充裕,成员 B 超期
        let order_a = create_test_order("ORD-A", Some(task.end_time + Duration::hours(10)));
        let order_b = create_test_order("ORD-B", Some(task.end_time - Duration::hours(1)));
        let mut orders = HashMap::new();
        orders.insert(order_a.order_id.clone(), order_a);
        orders.insert(order_b.order_id.clone(), order_b);

        let conflicts = detector.detect(&[task], &orders, Utc::now());
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::TimeWindow);
    }

    #[test]
    fn test_missing_order_reference_skipped() {
        // 订单索引缺失时跳过该任务,不产生冲突也不报错
        let detector = ConflictDetector::new();
        let task = create_test_task("T1", "LINE-01", 0, 120);
        assert!(detector.detect(&[task], &HashMap::new(), Utc::now()).is_empty());
    }
}
