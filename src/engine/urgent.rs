// ==========================================
// 产线排产系统 - 加急插单引擎
// ==========================================
// 职责: 紧急订单立即插入最优产线,后序任务级联顺延
// 输入: 订单标识 + 插单时点
// 输出: UrgentInsertResult（插入任务/顺延清单/冲突）
// 红线:
// 1) 进行中的任务不拆不动,插单点取其完工时间
// 2) 顺延只平移时间,不改任务内部时长
// 3) 插入与顺延经单事务落库
// ==========================================

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

use crate::config::scheduler_config_trait::SchedulerConfigReader;
use crate::config::strategy_weights::StrategyWeights;
use crate::domain::conflict::ScheduleConflict;
use crate::domain::line::LineScheduleState;
use crate::domain::order::ProductionOrder;
use crate::domain::task::ScheduleTask;
use crate::domain::types::{OrderStatus, TaskStatus};
use crate::engine::candidate::CandidateRanker;
use crate::engine::changeover::ChangeoverMatrix;
use crate::engine::conflict::ConflictDetector;
use crate::engine::estimator::DurationEstimator;
use crate::engine::repositories::SchedulerRepositories;
use crate::engine::worker::WorkerAssigner;
use crate::repository::{LineSnapshotUpdate, OrderScheduleUpdate, TaskTimeShift};

/// 加急订单固定提升到的优先级
const URGENT_PRIORITY: i32 = 10;

// ==========================================
// UrgentInsertResult - 插单结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrgentInsertResult {
    pub inserted_task: ScheduleTask,      // 插入的加急任务
    pub shifted_tasks: Vec<ScheduleTask>, // 被顺延的任务（已是新时间）
    pub conflicts: Vec<ScheduleConflict>, // 插单后重新检出的冲突
    pub line_id: String,                  // 落位产线
    pub message: String,                  // 结果说明（人读）
}

// ==========================================
// UrgentInsertionEngine - 加急插单引擎
// ==========================================
pub struct UrgentInsertionEngine<C>
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

impl<C> UrgentInsertionEngine<C>
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

    /// 加急插单
    ///
    /// 订单提升为最高优先级后选线,插单点为当前运行任务的
    /// 完工时间（产线空闲则立即开工）,插入位置之后的任务整体顺延。
    #[instrument(skip(self), fields(order_id = %order_id, now = %now))]
    pub async fn insert(
        &self,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UrgentInsertResult, Box<dyn Error>> {
        let _guard = self.run_lock.lock().await;

        // 1. 加载订单并提级
        let mut order = self
            .repos
            .order_repo
            .find_by_id(order_id)?
            .ok_or_else(|| format!("订单不存在: {}", order_id))?;
        if order.status != OrderStatus::Pending {
            return Err(format!(
                "订单 {} 当前状态 {} 不允许插单,仅待排产订单可加急",
                order.order_no, order.status
            )
            .into());
        }
        self.repos.order_repo.mark_urgent(order_id)?;
        order.is_urgent = true;
        order.priority = URGENT_PRIORITY;

        // 2. 产线与换型矩阵
        let lines = self.repos.line_repo.find_schedulable()?;
        if lines.is_empty() {
            return Err(format!("无可排产产线,订单 {} 插单失败", order.order_no).into());
        }
        let rules = self.repos.changeover_repo.list_all()?;
        let matrix = ChangeoverMatrix::from_rules(&rules);

        // 3. 按活动任务队列重建各产线运行态
        let mut occupancy: HashMap<String, Vec<ScheduleTask>> = HashMap::new();
        let mut line_states: HashMap<String, LineScheduleState> = HashMap::new();
        let mut workers_by_line = HashMap::new();
        let mut worker_counts: HashMap<String, i32> = HashMap::new();
        for line in &lines {
            let tasks = self.repos.task_repo.find_active_by_line(&line.line_id)?;
            let state = match tasks.last() {
                Some(last) => LineScheduleState {
                    line_id: line.line_id.clone(),
                    next_free_time: if last.end_time > now { last.end_time } else { now },
                    last_category: Some(last.product_category.clone()),
                    task_count: tasks.len() as i32,
                    used_minutes: tasks.iter().map(|t| t.occupied_minutes()).sum(),
                },
                None => LineScheduleState::from_line(line, now),
            };
            occupancy.insert(line.line_id.clone(), tasks);
            line_states.insert(line.line_id.clone(), state);

            let workers = self.repos.worker_repo.find_available_by_line(&line.line_id)?;
            worker_counts.insert(line.line_id.clone(), workers.len() as i32);
            workers_by_line.insert(line.line_id.clone(), workers);
        }

        // 4. 选线: 与批量排产同一套打分
        let weights = match self.config.get_strategy_weights().await {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(error = %e, "策略权重读取失败,使用默认权重");
                StrategyWeights::default()
            }
        };
        let candidates = self.ranker.rank(
            &order,
            &lines,
            &line_states,
            &matrix,
            &weights,
            &worker_counts,
            now,
        );
        let top = candidates
            .first()
            .ok_or_else(|| format!("无产线可承接加急订单: {}", order.order_no))?;
        let line = lines
            .iter()
            .find(|l| l.line_id == top.line_id)
            .ok_or_else(|| format!("产线数据缺失: {}", top.line_id))?;
        let line_tasks = occupancy.remove(&line.line_id).unwrap_or_default();

        // 5. 定插单点: 运行中任务完工即插,空闲立即插
        let running = line_tasks
            .iter()
            .find(|t| t.start_time <= now && now < t.end_time);
        let free_time = running.map(|t| t.end_time).unwrap_or(now);
        let category_at_insert = running
            .map(|t| t.product_category.as_str())
            .or(line.current_category.as_deref());
        let changeover_minutes =
            matrix.minutes(category_at_insert, &order.product_category, Some(&line.line_id));

        let estimate = self.estimator.estimate(&order, line);
        let start_time = free_time + Duration::minutes(changeover_minutes);
        let end_time = start_time + Duration::minutes(estimate.duration_minutes);
        let delta = Duration::minutes(changeover_minutes + estimate.duration_minutes);

        // 6. 级联顺延: 插单点之后开工的任务整体平移
        let mut shifts: Vec<TaskTimeShift> = Vec::new();
        let mut shifted_tasks: Vec<ScheduleTask> = Vec::new();
        let mut untouched_count = 0i32;
        for task in &line_tasks {
            if task.start_time < free_time {
                untouched_count += 1;
                continue;
            }
            let mut shifted = task.clone();
            shifted.start_time = task.start_time + delta;
            shifted.end_time = task.end_time + delta;
            shifted.updated_at = now;
            shifts.push(TaskTimeShift {
                task_id: task.task_id.clone(),
                new_start: shifted.start_time,
                new_end: shifted.end_time,
            });
            shifted_tasks.push(shifted);
        }

        let batch_no = Self::next_batch_no(now);
        let mut inserted = ScheduleTask {
            task_id: Uuid::new_v4().to_string(),
            order_id: order.order_id.clone(),
            line_id: line.line_id.clone(),
            batch_no: Some(batch_no.clone()),
            sequence_no: untouched_count + 1,
            start_time,
            end_time,
            changeover_minutes,
            planned_qty: order.planned_qty,
            product_category: order.product_category.clone(),
            mold_id: order.mold_id.clone(),
            is_mix_batch: false,
            merged_order_ids: None,
            deadline_gap_minutes: None,
            meets_deadline: true,
            status: TaskStatus::Planned,
            created_at: now,
            updated_at: now,
        };
        inserted.evaluate_deadline(order.latest_end);

        // 7. 全量重检冲突（顺延后的时间参与检测）
        let conflicts = self.redetect_conflicts(&inserted, &shifted_tasks, &order, now)?;

        // 8. 配员与产线快照回写
        let assignments = self
            .assigner
            .assign(std::slice::from_ref(&inserted), &workers_by_line, &batch_no, now);

        let line_update = Self::build_line_update(&line.line_id, &inserted, &shifted_tasks, &line_tasks, free_time);
        let order_update = OrderScheduleUpdate {
            order_id: order.order_id.clone(),
            line_id: line.line_id.clone(),
            batch_no: batch_no.clone(),
        };

        // 9. 单事务落库
        self.repos.run_repo.persist_urgent_insertion(
            &inserted,
            &shifts,
            &conflicts,
            &assignments,
            &order_update,
            &line_update,
        )?;

        let message = format!(
            "加急插单成功: 订单 {} 排入产线 {},{} 开工,顺延 {} 个任务,检出冲突 {} 条",
            order.order_no,
            line.line_name,
            start_time.format("%Y-%m-%d %H:%M"),
            shifted_tasks.len(),
            conflicts.len()
        );
        tracing::info!(
            order_no = %order.order_no,
            line_id = %line.line_id,
            shifted = shifted_tasks.len(),
            conflict_count = conflicts.len(),
            "加急插单完成"
        );

        Ok(UrgentInsertResult {
            inserted_task: inserted,
            shifted_tasks,
            conflicts,
            line_id: line.line_id.clone(),
            message,
        })
    }

    /// 插单后的全网冲突重检
    ///
    /// 取全部活动任务,换入顺延后的新时间,再叠加插入任务。
    fn redetect_conflicts(
        &self,
        inserted: &ScheduleTask,
        shifted_tasks: &[ScheduleTask],
        urgent_order: &ProductionOrder,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduleConflict>, Box<dyn Error>> {
        let shifted_by_id: HashMap<&str, &ScheduleTask> = shifted_tasks
            .iter()
            .map(|t| (t.task_id.as_str(), t))
            .collect();

        let mut scope: Vec<ScheduleTask> = self
            .repos
            .task_repo
            .find_all_active()?
            .into_iter()
            .map(|t| match shifted_by_id.get(t.task_id.as_str()) {
                Some(shifted) => (*shifted).clone(),
                None => t,
            })
            .collect();
        scope.push(inserted.clone());

        // 检测需要订单交期,按任务引用收齐订单
        let mut order_ids: HashSet<String> = HashSet::new();
        for task in &scope {
            match &task.merged_order_ids {
                Some(ids) if !ids.is_empty() => order_ids.extend(ids.iter().cloned()),
                _ => {
                    order_ids.insert(task.order_id.clone());
                }
            }
        }
        let mut orders_by_id: HashMap<String, ProductionOrder> = HashMap::new();
        for order_id in &order_ids {
            if let Some(order) = self.repos.order_repo.find_by_id(order_id)? {
                orders_by_id.insert(order.order_id.clone(), order);
            }
        }
        // 本单的提级发生在内存中,覆盖库里的旧快照
        orders_by_id.insert(urgent_order.order_id.clone(), urgent_order.clone());

        Ok(self.detector.detect(&scope, &orders_by_id, now))
    }

    /// 插单后的产线快照: 下一可用时间与在产品类取队尾任务
    fn build_line_update(
        line_id: &str,
        inserted: &ScheduleTask,
        shifted_tasks: &[ScheduleTask],
        line_tasks: &[ScheduleTask],
        free_time: DateTime<Utc>,
    ) -> LineSnapshotUpdate {
        let mut tail = inserted;
        for task in shifted_tasks {
            if task.end_time > tail.end_time {
                tail = task;
            }
        }
        // 未顺延的任务都在插单点之前完工,只有空队列场景会落到 inserted
        for task in line_tasks {
            if task.start_time < free_time && task.end_time > tail.end_time {
                tail = task;
            }
        }
        LineSnapshotUpdate {
            line_id: line_id.to_string(),
            current_category: Some(tail.product_category.clone()),
            next_available_time: tail.end_time,
        }
    }

    fn next_batch_no(now: DateTime<Utc>) -> String {
        let uuid = Uuid::new_v4().to_string();
        format!("U{}-{}", now.format("%Y%m%d%H%M%S"), &uuid[..8])
    }
}

// 注: 插单链路依赖数据库,正确性由 tests/ 下的集成测试
// 按级联顺延场景验证。
