// ==========================================
// 产线排产系统 - 批量排产引擎
// ==========================================
// 职责: 窗口内待排订单的全流程批量排产
// 输入: 排产基准时间 + 窗口天数
// 输出: SchedulingResult（任务/冲突/配员/指标）
// 红线:
// 1) 同一时刻只允许一个批次运行,靠运行锁串行化
// 2) 全部写入经单事务落库,失败整体回滚
// 3) 配置缺失降级到默认值,绝不中断批次
// ==========================================

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

use crate::config::scheduler_config_trait::SchedulerConfigReader;
use crate::config::strategy_weights::StrategyWeights;
use crate::domain::conflict::ScheduleConflict;
use crate::domain::line::{LineScheduleState, ProductionLine};
use crate::domain::order::ProductionOrder;
use crate::domain::resource::{Worker, WorkerAssignment};
use crate::domain::task::ScheduleTask;
use crate::domain::types::TaskStatus;
use crate::engine::candidate::CandidateRanker;
use crate::engine::changeover::ChangeoverMatrix;
use crate::engine::conflict::ConflictDetector;
use crate::engine::estimator::{DurationEstimator, MIN_DURATION_MINUTES};
use crate::engine::mix_batch::{MixBatchAnalyzer, MixBatchGroup};
use crate::engine::repositories::SchedulerRepositories;
use crate::engine::worker::WorkerAssigner;
use crate::repository::{LineSnapshotUpdate, OrderScheduleUpdate};

// ==========================================
// SchedulingResult - 批量排产结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingResult {
    pub batch_no: String,                   // 排产批次号
    pub total_orders: usize,                // 窗口内待排订单数
    pub scheduled_orders: usize,            // 成功排入订单数
    pub unscheduled_orders: usize,          // 未能排入订单数
    pub tasks: Vec<ScheduleTask>,           // 生成的排产任务
    pub conflicts: Vec<ScheduleConflict>,   // 检出的冲突
    pub assignments: Vec<WorkerAssignment>, // 人员分配记录
    pub total_changeover_minutes: i64,      // 合计换型耗时（分钟）
    pub line_utilization_pct: f64,          // 产线利用率（%）
    pub worker_utilization_pct: f64,        // 人员利用率（%）
    pub on_time_rate: f64,                  // 按期完工率（0-1）
    pub degraded_estimates: usize,          // 工时估算降级次数
    pub elapsed_ms: i64,                    // 排产耗时（毫秒）
    pub message: String,                    // 结果说明（人读）
}

/// 批次运行期配置快照
struct RuntimeConfig {
    weights: StrategyWeights,
    mix_window_hours: i64,
    mix_saved_minutes: i64,
    shift_hours: i64,
}

// ==========================================
// BatchScheduler - 批量排产引擎
// ==========================================
pub struct BatchScheduler<C>
where
    C: SchedulerConfigReader,
{
    repos: SchedulerRepositories,
    config: Arc<C>,
    run_lock: Mutex<()>,
    estimator: DurationEstimator,
    ranker: CandidateRanker,
    detector: ConflictDetector,
    assigner: WorkerAssigner,
}

impl<C> BatchScheduler<C>
where
    C: SchedulerConfigReader,
{
    pub fn new(repos: SchedulerRepositories, config: Arc<C>) -> Self {
        Self {
            repos,
            config,
            run_lock: Mutex::new(()),
            estimator: DurationEstimator::new(),
            ranker: CandidateRanker::new(),
            detector: ConflictDetector::new(),
            assigner: WorkerAssigner::new(),
        }
    }

    /// 批量排产
    ///
    /// 合批建议优先落位,剩余订单按优先级逐单贪心。
    /// 无订单/无产线返回空结果,不视为错误。
    #[instrument(skip(self), fields(base_time = %base_time, window_days = window_days))]
    pub async fn batch_schedule(
        &self,
        base_time: DateTime<Utc>,
        window_days: i64,
    ) -> Result<SchedulingResult, Box<dyn Error>> {
        let _guard = self.run_lock.lock().await;
        self.run_window(base_time, window_days).await
    }

    /// 从指定时点起重排
    ///
    /// 清场（取消未确认任务并回退订单）与重新排产共用运行锁,
    /// 中途不会有其他批次插入。已确认任务不动。
    #[instrument(skip(self), fields(from_time = %from_time))]
    pub async fn reschedule(
        &self,
        from_time: DateTime<Utc>,
    ) -> Result<SchedulingResult, Box<dyn Error>> {
        let _guard = self.run_lock.lock().await;

        // 1. 清场: 取消时点之后的未确认任务,回退其订单
        let planned = self.repos.task_repo.find_planned_from(from_time)?;
        let task_ids: Vec<String> = planned.iter().map(|t| t.task_id.clone()).collect();
        let mut order_ids = Vec::new();
        let mut seen = HashSet::new();
        for task in &planned {
            for order_id in Self::served_order_ids(task) {
                if seen.insert(order_id.to_string()) {
                    order_ids.push(order_id.to_string());
                }
            }
        }
        self.repos
            .run_repo
            .cancel_tasks_and_revert_orders(&task_ids, &order_ids)?;

        // 2. 产线快照回收: 下一可用时间退回到剩余已确认任务之后
        let lines = self.repos.line_repo.find_schedulable()?;
        for line in &lines {
            let remaining = self.repos.task_repo.find_active_by_line(&line.line_id)?;
            let (category, next_available) = match remaining.last() {
                Some(last) => (Some(last.product_category.clone()), last.end_time),
                None => (line.current_category.clone(), from_time),
            };
            self.repos.line_repo.update_runtime_snapshot(
                &line.line_id,
                category.as_deref(),
                next_available,
            )?;
        }
        tracing::info!(
            cancelled_tasks = task_ids.len(),
            reverted_orders = order_ids.len(),
            "重排清场完成"
        );

        // 3. 以重排时点为基准重新批量排产
        let horizon = match self.config.get_reschedule_horizon_days().await {
            Ok(days) => days,
            Err(e) => {
                tracing::warn!(error = %e, "重排窗口配置读取失败,使用默认 7 天");
                7
            }
        };
        self.run_window(from_time, horizon).await
    }

    /// 运行一个排产批次（调用方必须已持有运行锁）
    async fn run_window(
        &self,
        base_time: DateTime<Utc>,
        window_days: i64,
    ) -> Result<SchedulingResult, Box<dyn Error>> {
        let started = Instant::now();

        // 1. 配置快照,批次内不再刷新
        let cfg = self.load_runtime_config().await;
        let batch_no = Self::next_batch_no(base_time);

        // 2. 加载窗口内待排订单
        let window_end = base_time + Duration::days(window_days);
        let orders = self.repos.order_repo.find_pending_in_window(window_end)?;
        if orders.is_empty() {
            tracing::info!(batch_no = %batch_no, "窗口内无待排产订单");
            return Ok(Self::empty_result(
                batch_no,
                0,
                started,
                "窗口内无待排产订单".to_string(),
            ));
        }

        // 3. 加载可排产产线
        let lines = self.repos.line_repo.find_schedulable()?;
        if lines.is_empty() {
            tracing::warn!(batch_no = %batch_no, order_count = orders.len(), "无可排产产线");
            return Ok(Self::empty_result(
                batch_no,
                orders.len(),
                started,
                "无可排产产线,全部订单未能排入".to_string(),
            ));
        }

        // 4. 换型矩阵、产线运行态与人员快照
        let rules = self.repos.changeover_repo.list_all()?;
        let matrix = ChangeoverMatrix::from_rules(&rules);

        let line_index: HashMap<String, usize> = lines
            .iter()
            .enumerate()
            .map(|(idx, l)| (l.line_id.clone(), idx))
            .collect();
        let mut line_states: HashMap<String, LineScheduleState> = lines
            .iter()
            .map(|l| (l.line_id.clone(), LineScheduleState::from_line(l, base_time)))
            .collect();

        let mut workers_by_line: HashMap<String, Vec<Worker>> = HashMap::new();
        for line in &lines {
            let workers = self.repos.worker_repo.find_available_by_line(&line.line_id)?;
            workers_by_line.insert(line.line_id.clone(), workers);
        }
        let worker_counts: HashMap<String, i32> = workers_by_line
            .iter()
            .map(|(line_id, workers)| (line_id.clone(), workers.len() as i32))
            .collect();

        let orders_by_id: HashMap<String, ProductionOrder> = orders
            .iter()
            .map(|o| (o.order_id.clone(), o.clone()))
            .collect();

        // 5. 合批建议优先落位
        let analyzer = MixBatchAnalyzer::with_config(cfg.mix_window_hours, cfg.mix_saved_minutes);
        let groups = analyzer.analyze(&orders);
        let group_count = groups.len();

        let mut tasks: Vec<ScheduleTask> = Vec::new();
        let mut order_updates: Vec<OrderScheduleUpdate> = Vec::new();
        let mut scheduled_ids: HashSet<String> = HashSet::new();
        let mut degraded_estimates = 0usize;

        for group in &groups {
            match self.place_mix_group(
                group,
                &orders_by_id,
                &lines,
                &line_index,
                &mut line_states,
                &matrix,
                &batch_no,
                base_time,
            ) {
                Some((task, updates, degraded)) => {
                    if degraded {
                        degraded_estimates += 1;
                    }
                    scheduled_ids.extend(group.order_ids.iter().cloned());
                    tasks.push(task);
                    order_updates.extend(updates);
                }
                None => {
                    // 组级落位失败,成员回到单订单流程
                    tracing::info!(
                        group_id = %group.group_id,
                        category = %group.product_category,
                        "合批组无可落位产线,成员转入单订单排产"
                    );
                }
            }
        }

        // 6. 剩余订单按优先级逐单贪心
        let mut unscheduled_nos: Vec<String> = Vec::new();
        for order in &orders {
            if scheduled_ids.contains(&order.order_id) {
                continue;
            }
            let candidates = self.ranker.rank(
                order,
                &lines,
                &line_states,
                &matrix,
                &cfg.weights,
                &worker_counts,
                base_time,
            );
            let Some(top) = candidates.first() else {
                unscheduled_nos.push(order.order_no.clone());
                continue;
            };

            let line = &lines[line_index[&top.line_id]];
            let estimate = self.estimator.estimate(order, line);
            if estimate.degraded {
                degraded_estimates += 1;
            }

            let state = line_states
                .get_mut(&top.line_id)
                .ok_or_else(|| format!("产线运行态缺失: {}", top.line_id))?;
            let start_time = state.next_free_time + Duration::minutes(top.changeover_minutes);
            let end_time = start_time + Duration::minutes(estimate.duration_minutes);

            let mut task = ScheduleTask {
                task_id: Uuid::new_v4().to_string(),
                order_id: order.order_id.clone(),
                line_id: top.line_id.clone(),
                batch_no: Some(batch_no.clone()),
                sequence_no: state.task_count + 1,
                start_time,
                end_time,
                changeover_minutes: top.changeover_minutes,
                planned_qty: order.planned_qty,
                product_category: order.product_category.clone(),
                mold_id: order.mold_id.clone(),
                is_mix_batch: false,
                merged_order_ids: None,
                deadline_gap_minutes: None,
                meets_deadline: true,
                status: TaskStatus::Planned,
                created_at: base_time,
                updated_at: base_time,
            };
            task.evaluate_deadline(order.latest_end);
            state.push_task(
                end_time,
                top.changeover_minutes + estimate.duration_minutes,
                &order.product_category,
            );

            order_updates.push(OrderScheduleUpdate {
                order_id: order.order_id.clone(),
                line_id: top.line_id.clone(),
                batch_no: batch_no.clone(),
            });
            scheduled_ids.insert(order.order_id.clone());
            tasks.push(task);
        }

        if !unscheduled_nos.is_empty() {
            tracing::warn!(
                batch_no = %batch_no,
                unscheduled = ?unscheduled_nos,
                "部分订单未能排入"
            );
        }

        // 7. 冲突检测与人员分配
        let conflicts = self.detector.detect(&tasks, &orders_by_id, base_time);
        let assignments = self
            .assigner
            .assign(&tasks, &workers_by_line, &batch_no, base_time);

        // 8. 单事务落库（含产线快照回写）
        let line_updates: Vec<LineSnapshotUpdate> = line_states
            .values()
            .filter(|s| s.task_count > 0)
            .map(|s| LineSnapshotUpdate {
                line_id: s.line_id.clone(),
                current_category: s.last_category.clone(),
                next_available_time: s.next_free_time,
            })
            .collect();
        if !tasks.is_empty() {
            self.repos.run_repo.persist_batch_run(
                &tasks,
                &conflicts,
                &assignments,
                &order_updates,
                &line_updates,
            )?;
        }

        // 9. 指标汇总
        let total_changeover_minutes: i64 = tasks.iter().map(|t| t.changeover_minutes).sum();
        let used_minutes: i64 = line_states.values().map(|s| s.used_minutes).sum();
        let capacity_minutes = lines.len() as i64 * cfg.shift_hours * 60;
        let line_utilization_pct = if capacity_minutes > 0 {
            used_minutes as f64 / capacity_minutes as f64 * 100.0
        } else {
            0.0
        };
        let on_time_rate = if tasks.is_empty() {
            0.0
        } else {
            tasks.iter().filter(|t| t.meets_deadline).count() as f64 / tasks.len() as f64
        };
        let assigned_workers: HashSet<&str> =
            assignments.iter().map(|a| a.worker_id.as_str()).collect();
        let total_available_workers = self.repos.worker_repo.count_available()?;
        let worker_utilization_pct = if total_available_workers > 0 {
            assigned_workers.len() as f64 / total_available_workers as f64 * 100.0
        } else {
            0.0
        };

        let scheduled_orders = scheduled_ids.len();
        let unscheduled_orders = orders.len() - scheduled_orders;
        let mut message = format!(
            "排产完成: 待排 {} 单,排入 {} 单,未排 {} 单,合批 {} 组,检出冲突 {} 条",
            orders.len(),
            scheduled_orders,
            unscheduled_orders,
            group_count,
            conflicts.len()
        );
        if degraded_estimates > 0 {
            message.push_str(&format!(",工时估算降级 {} 次", degraded_estimates));
        }

        let elapsed_ms = started.elapsed().as_millis() as i64;
        tracing::info!(
            batch_no = %batch_no,
            scheduled = scheduled_orders,
            unscheduled = unscheduled_orders,
            conflict_count = conflicts.len(),
            elapsed_ms = elapsed_ms,
            "批量排产完成"
        );

        Ok(SchedulingResult {
            batch_no,
            total_orders: orders.len(),
            scheduled_orders,
            unscheduled_orders,
            tasks,
            conflicts,
            assignments,
            total_changeover_minutes,
            line_utilization_pct,
            worker_utilization_pct,
            on_time_rate,
            degraded_estimates,
            elapsed_ms,
            message,
        })
    }

    /// 合批组落位: 生成合并任务并占用产线
    ///
    /// 返回 None 表示无产线可承接该组,成员留给单订单流程。
    #[allow(clippy::too_many_arguments)]
    fn place_mix_group(
        &self,
        group: &MixBatchGroup,
        orders_by_id: &HashMap<String, ProductionOrder>,
        lines: &[ProductionLine],
        line_index: &HashMap<String, usize>,
        line_states: &mut HashMap<String, LineScheduleState>,
        matrix: &ChangeoverMatrix,
        batch_no: &str,
        now: DateTime<Utc>,
    ) -> Option<(ScheduleTask, Vec<OrderScheduleUpdate>, bool)> {
        let line = Self::pick_group_line(group, lines, line_index, line_states, matrix, now)?;
        let state = line_states.get_mut(&line.line_id)?;

        let changeover_minutes = matrix.minutes(
            state.last_category.as_deref(),
            &group.product_category,
            Some(&line.line_id),
        );
        let estimate = self.estimator.estimate_for_qty(group.total_qty, 0, 0, line);
        // 组内省去的换型直接从合并工时中扣除
        let duration_minutes = (estimate.duration_minutes - group.saved_changeover_minutes)
            .max(MIN_DURATION_MINUTES);

        let start_time = state.next_free_time + Duration::minutes(changeover_minutes);
        let end_time = start_time + Duration::minutes(duration_minutes);

        // 交期评估取成员中最紧的一个
        let strictest_deadline = group
            .order_ids
            .iter()
            .filter_map(|id| orders_by_id.get(id).and_then(|o| o.latest_end))
            .min();
        let mold_id = group
            .order_ids
            .iter()
            .find_map(|id| orders_by_id.get(id).and_then(|o| o.mold_id.clone()));

        let mut task = ScheduleTask {
            task_id: Uuid::new_v4().to_string(),
            order_id: group.order_ids[0].clone(),
            line_id: line.line_id.clone(),
            batch_no: Some(batch_no.to_string()),
            sequence_no: state.task_count + 1,
            start_time,
            end_time,
            changeover_minutes,
            planned_qty: group.total_qty,
            product_category: group.product_category.clone(),
            mold_id,
            is_mix_batch: true,
            merged_order_ids: Some(group.order_ids.clone()),
            deadline_gap_minutes: None,
            meets_deadline: true,
            status: TaskStatus::Planned,
            created_at: now,
            updated_at: now,
        };
        task.evaluate_deadline(strictest_deadline);
        state.push_task(
            end_time,
            changeover_minutes + duration_minutes,
            &group.product_category,
        );

        let updates = group
            .order_ids
            .iter()
            .map(|order_id| OrderScheduleUpdate {
                order_id: order_id.clone(),
                line_id: line.line_id.clone(),
                batch_no: batch_no.to_string(),
            })
            .collect();
        Some((task, updates, estimate.degraded))
    }

    /// 合批组选线: 成员指定产线优先,否则换型成本最小的可产产线
    fn pick_group_line<'a>(
        group: &MixBatchGroup,
        lines: &'a [ProductionLine],
        line_index: &HashMap<String, usize>,
        line_states: &HashMap<String, LineScheduleState>,
        matrix: &ChangeoverMatrix,
        now: DateTime<Utc>,
    ) -> Option<&'a ProductionLine> {
        if let Some(preferred) = &group.preferred_line_id {
            if let Some(&idx) = line_index.get(preferred) {
                return Some(&lines[idx]);
            }
        }

        lines
            .iter()
            .filter(|l| l.can_produce(&group.product_category))
            .min_by_key(|l| {
                let state = line_states.get(&l.line_id);
                let last_category = state.and_then(|s| s.last_category.as_deref());
                let changeover =
                    matrix.minutes(last_category, &group.product_category, Some(&l.line_id));
                let next_free = state.map(|s| s.next_free_time).unwrap_or(now);
                (changeover, next_free, l.line_id.clone())
            })
    }

    /// 配置快照,任何一项读取失败降级到默认值
    async fn load_runtime_config(&self) -> RuntimeConfig {
        let weights = match self.config.get_strategy_weights().await {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(error = %e, "策略权重读取失败,使用默认权重");
                StrategyWeights::default()
            }
        };
        let mix_window_hours = match self.config.get_mix_batch_window_hours().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "合批窗口配置读取失败,使用默认 24 小时");
                24
            }
        };
        let mix_saved_minutes = match self.config.get_mix_batch_saved_minutes().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "合批节省配置读取失败,使用默认 30 分钟");
                30
            }
        };
        let shift_hours = match self.config.get_shift_hours().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "班次时长配置读取失败,使用默认 8 小时");
                8
            }
        };
        RuntimeConfig {
            weights,
            mix_window_hours,
            mix_saved_minutes,
            shift_hours,
        }
    }

    /// 任务服务的订单集合（合批任务展开到全部成员）
    fn served_order_ids(task: &ScheduleTask) -> Vec<&str> {
        match &task.merged_order_ids {
            Some(ids) if !ids.is_empty() => ids.iter().map(String::as_str).collect(),
            _ => vec![task.order_id.as_str()],
        }
    }

    fn next_batch_no(base_time: DateTime<Utc>) -> String {
        let uuid = Uuid::new_v4().to_string();
        format!("B{}-{}", base_time.format("%Y%m%d%H%M%S"), &uuid[..8])
    }

    fn empty_result(
        batch_no: String,
        total_orders: usize,
        started: Instant,
        message: String,
    ) -> SchedulingResult {
        SchedulingResult {
            batch_no,
            total_orders,
            scheduled_orders: 0,
            unscheduled_orders: total_orders,
            tasks: Vec::new(),
            conflicts: Vec::new(),
            assignments: Vec::new(),
            total_changeover_minutes: 0,
            line_utilization_pct: 0.0,
            worker_utilization_pct: 0.0,
            on_time_rate: 0.0,
            degraded_estimates: 0,
            elapsed_ms: started.elapsed().as_millis() as i64,
            message,
        }
    }
}

// 注: 批量排产依赖数据库与配置,正确性由 tests/ 下的
// 集成测试按完整场景验证。
