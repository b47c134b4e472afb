// ==========================================
// 产线排产系统 - 排产 API
// ==========================================
// 职责: 排产全链路对外入口（推荐/批排/插单/重排/冲突/顺序/权重）
// 红线: API 层不做排产决策,只做校验、编排与错误转换
// ==========================================

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::api::error::{ApiError, ApiResult};
use crate::config::config_manager::ConfigManager;
use crate::config::scheduler_config_trait::SchedulerConfigReader;
use crate::config::strategy_weights::StrategyWeights;
use crate::domain::conflict::ScheduleConflict;
use crate::domain::line::LineScheduleState;
use crate::domain::order::ProductionOrder;
use crate::domain::task::ScheduleTask;
use crate::domain::types::OrderStatus;
use crate::engine::batch::{BatchScheduler, SchedulingResult};
use crate::engine::candidate::{CandidateRanker, LineCandidate};
use crate::engine::changeover::ChangeoverMatrix;
use crate::engine::conflict::{ConflictDetector, ConflictResolver, DEFAULT_RESOLVE_GAP_MINUTES};
use crate::engine::mix_batch::{MixBatchAnalyzer, MixBatchGroup};
use crate::engine::repositories::SchedulerRepositories;
use crate::engine::sequence::SequenceOptimizer;
use crate::engine::urgent::{UrgentInsertResult, UrgentInsertionEngine};
use crate::engine::worker::{TransferAdvisor, TransferSuggestion};

// ==========================================
// SchedulerApi - 排产 API
// ==========================================

/// 排产API
///
/// 职责：
/// 1. 单订单产线推荐（只读预览）
/// 2. 批量排产 / 重排 / 加急插单
/// 3. 冲突检测与自动修复
/// 4. 合批分析与线内顺序优化
/// 5. 策略权重读写
pub struct SchedulerApi {
    repos: SchedulerRepositories,
    config: Arc<ConfigManager>,
    batch_scheduler: BatchScheduler<ConfigManager>,
    urgent_engine: UrgentInsertionEngine<ConfigManager>,
    ranker: CandidateRanker,
    detector: ConflictDetector,
    optimizer: SequenceOptimizer,
    advisor: TransferAdvisor,
}

impl SchedulerApi {
    /// 基于共享数据库连接创建排产API
    pub fn new(conn: Arc<Mutex<Connection>>) -> ApiResult<Self> {
        let repos = SchedulerRepositories::from_connection(conn.clone());
        let config = Arc::new(
            ConfigManager::from_connection(conn)
                .map_err(|e| ApiError::ConfigError(e.to_string()))?,
        );
        let batch_scheduler = BatchScheduler::new(repos.clone(), config.clone());
        let urgent_engine = UrgentInsertionEngine::new(repos.clone(), config.clone());
        Ok(Self {
            repos,
            config,
            batch_scheduler,
            urgent_engine,
            ranker: CandidateRanker::new(),
            detector: ConflictDetector::new(),
            optimizer: SequenceOptimizer::new(),
            advisor: TransferAdvisor::new(),
        })
    }

    // ==========================================
    // 单订单产线推荐
    // ==========================================

    /// 为单个订单推荐产线（只读,不落位）
    ///
    /// # 参数
    /// - order_id: 订单ID
    /// - now: 评估时点
    ///
    /// # 返回
    /// - Ok(Vec<LineCandidate>): 按综合得分降序的候选产线
    /// - Err(ApiError): 订单不存在或数据访问失败
    pub fn recommend_lines(
        &self,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<Vec<LineCandidate>> {
        let order = self
            .repos
            .order_repo
            .find_by_id(order_id)?
            .ok_or_else(|| ApiError::NotFound(format!("订单(id={})不存在", order_id)))?;

        let lines = self.repos.line_repo.find_schedulable()?;
        let rules = self.repos.changeover_repo.list_all()?;
        let matrix = ChangeoverMatrix::from_rules(&rules);

        let line_states: HashMap<String, LineScheduleState> = lines
            .iter()
            .map(|l| (l.line_id.clone(), LineScheduleState::from_line(l, now)))
            .collect();
        let mut worker_counts: HashMap<String, i32> = HashMap::new();
        for line in &lines {
            let workers = self.repos.worker_repo.find_available_by_line(&line.line_id)?;
            worker_counts.insert(line.line_id.clone(), workers.len() as i32);
        }

        let weights = self
            .config
            .load_strategy_weights()
            .map_err(|e| ApiError::ConfigError(e.to_string()))?;

        Ok(self.ranker.rank(
            &order,
            &lines,
            &line_states,
            &matrix,
            &weights,
            &worker_counts,
            now,
        ))
    }

    // ==========================================
    // 批量排产 / 重排 / 加急插单
    // ==========================================

    /// 批量排产
    ///
    /// # 参数
    /// - base_time: 排产基准时间
    /// - window_days: 订单窗口天数（>0）
    ///
    /// # 返回
    /// - Ok(SchedulingResult): 批次结果（任务/冲突/配员/指标）
    /// - Err(ApiError): 参数非法或排产链路失败
    pub async fn batch_schedule(
        &self,
        base_time: DateTime<Utc>,
        window_days: i64,
    ) -> ApiResult<SchedulingResult> {
        if window_days <= 0 {
            return Err(ApiError::InvalidInput(
                "排产窗口天数必须大于0".to_string(),
            ));
        }
        self.batch_scheduler
            .batch_schedule(base_time, window_days)
            .await
            .map_err(|e| ApiError::SchedulingFailed(e.to_string()))
    }

    /// 从指定时点起重排
    ///
    /// 时点之后的未确认任务全部取消并回退订单,再重新批量排产。
    pub async fn reschedule(&self, from_time: DateTime<Utc>) -> ApiResult<SchedulingResult> {
        self.batch_scheduler
            .reschedule(from_time)
            .await
            .map_err(|e| ApiError::SchedulingFailed(e.to_string()))
    }

    /// 加急插单
    ///
    /// # 参数
    /// - order_id: 待加急的待排产订单ID
    /// - now: 插单时点
    ///
    /// # 返回
    /// - Ok(UrgentInsertResult): 插入任务与顺延清单
    /// - Err(ApiError): 订单不可插单或链路失败
    pub async fn insert_urgent_order(
        &self,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<UrgentInsertResult> {
        if order_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("订单ID不能为空".to_string()));
        }
        self.urgent_engine
            .insert(order_id, now)
            .await
            .map_err(|e| ApiError::SchedulingFailed(e.to_string()))
    }

    // ==========================================
    // 冲突检测与修复
    // ==========================================

    /// 对当前活动任务做一次冲突检测（只读,不落库）
    pub fn detect_conflicts(&self, now: DateTime<Utc>) -> ApiResult<Vec<ScheduleConflict>> {
        let tasks = self.repos.task_repo.find_all_active()?;
        let orders_by_id = self.load_orders_for(&tasks)?;
        Ok(self.detector.detect(&tasks, &orders_by_id, now))
    }

    /// 查询未解决冲突
    pub fn list_open_conflicts(&self) -> ApiResult<Vec<ScheduleConflict>> {
        Ok(self.repos.conflict_repo.list_open()?)
    }

    /// 尝试自动修复单条冲突
    ///
    /// # 返回
    /// - Ok(true): 已修复并落库
    /// - Ok(false): 本条冲突无法自动修复（如交期窗口类）
    /// - Err(ApiError): 冲突不存在或修复链路失败
    pub async fn resolve_conflict(&self, conflict_id: &str) -> ApiResult<bool> {
        let conflict = self
            .repos
            .conflict_repo
            .find_by_id(conflict_id)?
            .ok_or_else(|| ApiError::NotFound(format!("冲突(id={})不存在", conflict_id)))?;

        let gap_minutes = match self.config.get_resolver_gap_minutes().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "顺延间隔配置读取失败,使用默认值");
                DEFAULT_RESOLVE_GAP_MINUTES
            }
        };
        let resolver = ConflictResolver::new(
            self.repos.task_repo.clone(),
            self.repos.mold_repo.clone(),
            self.repos.conflict_repo.clone(),
        )
        .with_gap_minutes(gap_minutes);

        resolver
            .resolve(&conflict)
            .map_err(|e| ApiError::SchedulingFailed(e.to_string()))
    }

    // ==========================================
    // 合批分析与顺序优化
    // ==========================================

    /// 分析待排产订单的合批机会（只读）
    pub async fn analyze_mix_batch(&self) -> ApiResult<Vec<MixBatchGroup>> {
        let orders = self
            .repos
            .order_repo
            .find_by_status(OrderStatus::Pending)?;

        let window_hours = match self.config.get_mix_batch_window_hours().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "合批窗口配置读取失败,使用默认 24 小时");
                24
            }
        };
        let saved_minutes = match self.config.get_mix_batch_saved_minutes().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "合批节省配置读取失败,使用默认 30 分钟");
                30
            }
        };

        Ok(MixBatchAnalyzer::with_config(window_hours, saved_minutes).analyze(&orders))
    }

    /// 优化单条产线的任务加工顺序并持久化顺序号
    ///
    /// 只重排 sequence_no,不移动任务时间。
    ///
    /// # 返回
    /// - Ok(Vec<ScheduleTask>): 优化后的任务序列（空产线返回空）
    pub fn optimize_line_sequence(&self, line_id: &str) -> ApiResult<Vec<ScheduleTask>> {
        if line_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("产线ID不能为空".to_string()));
        }
        let tasks = self.repos.task_repo.find_active_by_line(line_id)?;
        if tasks.is_empty() {
            return Ok(Vec::new());
        }
        let orders_by_id = self.load_orders_for(&tasks)?;
        let rules = self.repos.changeover_repo.list_all()?;
        let matrix = ChangeoverMatrix::from_rules(&rules);

        let optimized = self.optimizer.optimize(tasks, &orders_by_id, &matrix, line_id);
        let sequence: Vec<(String, i32)> = optimized
            .iter()
            .map(|t| (t.task_id.clone(), t.sequence_no))
            .collect();
        self.repos.task_repo.batch_update_sequence(&sequence)?;
        Ok(optimized)
    }

    // ==========================================
    // 人员调度建议
    // ==========================================

    /// 给定可调人数,输出各产线的增员建议（只读）
    pub fn suggest_worker_transfers(
        &self,
        extra_workers: i32,
    ) -> ApiResult<Vec<TransferSuggestion>> {
        let lines = self.repos.line_repo.find_all()?;
        Ok(self.advisor.suggest(&lines, extra_workers))
    }

    // ==========================================
    // 策略权重
    // ==========================================

    /// 读取当前策略权重
    pub fn get_strategy_weights(&self) -> ApiResult<StrategyWeights> {
        self.config
            .load_strategy_weights()
            .map_err(|e| ApiError::ConfigError(e.to_string()))
    }

    /// 更新策略权重（增量合并,校验通过后落库）
    ///
    /// # 参数
    /// - updates: 维度名 -> 新权重,未出现的维度保持不变
    ///
    /// # 返回
    /// - Ok(StrategyWeights): 更新后的完整权重
    /// - Err(ApiError): 维度名未知或权重值非法
    pub fn update_strategy_weights(
        &self,
        updates: &HashMap<String, f64>,
    ) -> ApiResult<StrategyWeights> {
        if updates.is_empty() {
            return Err(ApiError::InvalidInput("权重更新不能为空".to_string()));
        }
        let current = self
            .config
            .load_strategy_weights()
            .map_err(|e| ApiError::ConfigError(e.to_string()))?;
        let next = current.apply_updates(updates).map_err(ApiError::InvalidInput)?;
        self.config
            .save_strategy_weights(&next)
            .map_err(|e| ApiError::ConfigError(e.to_string()))?;
        Ok(next)
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    /// 收齐任务引用的订单（合批任务展开到全部成员）
    fn load_orders_for(
        &self,
        tasks: &[ScheduleTask],
    ) -> ApiResult<HashMap<String, ProductionOrder>> {
        let mut order_ids: HashSet<String> = HashSet::new();
        for task in tasks {
            match &task.merged_order_ids {
                Some(ids) if !ids.is_empty() => order_ids.extend(ids.iter().cloned()),
                _ => {
                    order_ids.insert(task.order_id.clone());
                }
            }
        }
        let mut orders_by_id = HashMap::new();
        for order_id in &order_ids {
            if let Some(order) = self.repos.order_repo.find_by_id(order_id)? {
                orders_by_id.insert(order.order_id.clone(), order);
            }
        }
        Ok(orders_by_id)
    }
}
