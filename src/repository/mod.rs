// ==========================================
// 产线排产系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod changeover_repo;
pub mod conflict_repo;
pub mod error;
pub mod line_repo;
pub mod mold_repo;
pub mod order_repo;
pub mod schedule_run_repo;
pub mod task_repo;
pub mod worker_repo;

// 重导出核心仓储
pub use changeover_repo::ChangeoverRuleRepository;
pub use conflict_repo::ScheduleConflictRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use line_repo::ProductionLineRepository;
pub use mold_repo::MoldRepository;
pub use order_repo::ProductionOrderRepository;
pub use schedule_run_repo::{
    LineSnapshotUpdate, OrderScheduleUpdate, ScheduleRunRepository, TaskTimeShift,
};
pub use task_repo::ScheduleTaskRepository;
pub use worker_repo::WorkerRepository;
