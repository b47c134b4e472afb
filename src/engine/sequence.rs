// ==========================================
// 产线排产系统 - 线内顺序优化引擎
// ==========================================
// 职责: 单条产线任务序列的换型成本优化
// 输入: 该产线任务列表 + 订单索引 + 换型矩阵
// 输出: 重排后的任务列表（顺序号已按 1 起重编）
// 红线: 只调整顺序号,不移动任务时间
// ==========================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::domain::order::ProductionOrder;
use crate::domain::task::ScheduleTask;
use crate::engine::changeover::ChangeoverMatrix;

// ==========================================
// SequenceOptimizer - 线内顺序优化引擎
// ==========================================
pub struct SequenceOptimizer {
    // 无状态引擎,不需要注入依赖
}

impl SequenceOptimizer {
    pub fn new() -> Self {
        Self {}
    }

    /// 最近邻贪心优化线内任务顺序
    ///
    /// 1. 首位取交期最早的任务（合批任务取成员最早交期,无交期排最后）
    /// 2. 其后每步从剩余任务中取换型成本最小者,
    ///    成本相同按交期早者优先
    /// 3. 重编顺序号 1..N
    #[instrument(skip_all, fields(line_id = %line_id, task_count = tasks.len()))]
    pub fn optimize(
        &self,
        tasks: Vec<ScheduleTask>,
        orders_by_id: &HashMap<String, ProductionOrder>,
        matrix: &ChangeoverMatrix,
        line_id: &str,
    ) -> Vec<ScheduleTask> {
        if tasks.len() <= 1 {
            return self.renumber(tasks);
        }

        let mut remaining = tasks;
        let mut ordered = Vec::with_capacity(remaining.len());

        // 种子: 交期最早的任务
        let seed_idx = self.pick_seed(&remaining, orders_by_id);
        let seed = remaining.swap_remove(seed_idx);
        let mut last_category = seed.product_category.clone();
        ordered.push(seed);

        while !remaining.is_empty() {
            let next_idx = self.pick_nearest(&remaining, orders_by_id, matrix, &last_category, line_id);
            let next = remaining.swap_remove(next_idx);
            last_category = next.product_category.clone();
            ordered.push(next);
        }

        self.renumber(ordered)
    }

    fn pick_seed(
        &self,
        tasks: &[ScheduleTask],
        orders_by_id: &HashMap<String, ProductionOrder>,
    ) -> usize {
        let mut best = 0;
        let mut best_key = self.deadline_key(&tasks[0], orders_by_id);
        for (idx, task) in tasks.iter().enumerate().skip(1) {
            let key = self.deadline_key(task, orders_by_id);
            if key < best_key {
                best = idx;
                best_key = key;
            }
        }
        best
    }

    fn pick_nearest(
        &self,
        tasks: &[ScheduleTask],
        orders_by_id: &HashMap<String, ProductionOrder>,
        matrix: &ChangeoverMatrix,
        last_category: &str,
        line_id: &str,
    ) -> usize {
        let mut best = 0;
        let mut best_key = (
            matrix.minutes(Some(last_category), &tasks[0].product_category, Some(line_id)),
            self.deadline_key(&tasks[0], orders_by_id),
        );
        for (idx, task) in tasks.iter().enumerate().skip(1) {
            let key = (
                matrix.minutes(Some(last_category), &task.product_category, Some(line_id)),
                self.deadline_key(task, orders_by_id),
            );
            if key < best_key {
                best = idx;
                best_key = key;
            }
        }
        best
    }

    /// 任务交期排序键: 无交期排最后,同档按开工时间
    fn deadline_key(
        &self,
        task: &ScheduleTask,
        orders_by_id: &HashMap<String, ProductionOrder>,
    ) -> (bool, Option<DateTime<Utc>>, DateTime<Utc>) {
        let deadline = self.task_deadline(task, orders_by_id);
        (deadline.is_none(), deadline, task.start_time)
    }

    /// 任务交期: 合批任务取成员订单的最早交期
    fn task_deadline(
        &self,
        task: &ScheduleTask,
        orders_by_id: &HashMap<String, ProductionOrder>,
    ) -> Option<DateTime<Utc>> {
        let order_ids: Vec<&str> = match &task.merged_order_ids {
            Some(ids) if !ids.is_empty() => ids.iter().map(|s| s.as_str()).collect(),
            _ => vec![task.order_id.as_str()],
        };
        order_ids
            .iter()
            .filter_map(|id| orders_by_id.get(*id).and_then(|o| o.latest_end))
            .min()
    }

    fn renumber(&self, mut tasks: Vec<ScheduleTask>) -> Vec<ScheduleTask> {
        for (idx, task) in tasks.iter_mut().enumerate() {
            task.sequence_no = idx as i32 + 1;
        }
        tasks
    }
}

impl Default for SequenceOptimizer {
    fn default() -> Self {
        Self::new()
    }
}
