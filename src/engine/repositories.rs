// ==========================================
// 产线排产系统 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合排产引擎所需的全部 Repository
// 目标: 减少引擎构造函数参数数量
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::repository::{
    ChangeoverRuleRepository, MoldRepository, ProductionLineRepository, ProductionOrderRepository,
    ScheduleConflictRepository, ScheduleRunRepository, ScheduleTaskRepository, WorkerRepository,
};

/// 排产引擎仓储集合
///
/// 各仓储共享同一个连接,批量落库经由 `run_repo` 的事务接口。
#[derive(Clone)]
pub struct SchedulerRepositories {
    /// 订单仓储
    pub order_repo: Arc<ProductionOrderRepository>,
    /// 产线仓储
    pub line_repo: Arc<ProductionLineRepository>,
    /// 换型规则仓储
    pub changeover_repo: Arc<ChangeoverRuleRepository>,
    /// 任务仓储
    pub task_repo: Arc<ScheduleTaskRepository>,
    /// 冲突仓储
    pub conflict_repo: Arc<ScheduleConflictRepository>,
    /// 工人仓储
    pub worker_repo: Arc<WorkerRepository>,
    /// 模具仓储
    pub mold_repo: Arc<MoldRepository>,
    /// 排产批次事务仓储
    pub run_repo: Arc<ScheduleRunRepository>,
}

impl SchedulerRepositories {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_repo: Arc<ProductionOrderRepository>,
        line_repo: Arc<ProductionLineRepository>,
        changeover_repo: Arc<ChangeoverRuleRepository>,
        task_repo: Arc<ScheduleTaskRepository>,
        conflict_repo: Arc<ScheduleConflictRepository>,
        worker_repo: Arc<WorkerRepository>,
        mold_repo: Arc<MoldRepository>,
        run_repo: Arc<ScheduleRunRepository>,
    ) -> Self {
        Self {
            order_repo,
            line_repo,
            changeover_repo,
            task_repo,
            conflict_repo,
            worker_repo,
            mold_repo,
            run_repo,
        }
    }

    /// 基于共享连接一次性构建全部仓储
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self::new(
            Arc::new(ProductionOrderRepository::new(conn.clone())),
            Arc::new(ProductionLineRepository::new(conn.clone())),
            Arc::new(ChangeoverRuleRepository::new(conn.clone())),
            Arc::new(ScheduleTaskRepository::new(conn.clone())),
            Arc::new(ScheduleConflictRepository::new(conn.clone())),
            Arc::new(WorkerRepository::new(conn.clone())),
            Arc::new(MoldRepository::new(conn.clone())),
            Arc::new(ScheduleRunRepository::new(conn)),
        )
    }
}

// 注: 各 Repository 的构造需要数据库连接,该聚合结构体的正确性
// 由集成测试与批量排产引擎的测试一并验证。
