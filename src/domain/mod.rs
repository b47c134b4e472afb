// ==========================================
// 产线排产系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、基础校验
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod changeover;
pub mod conflict;
pub mod line;
pub mod order;
pub mod resource;
pub mod task;
pub mod types;

// 重导出核心类型
pub use changeover::ChangeoverRule;
pub use conflict::ScheduleConflict;
pub use line::{LineScheduleState, ProductionLine};
pub use order::ProductionOrder;
pub use resource::{Mold, Worker, WorkerAssignment};
pub use task::ScheduleTask;
pub use types::{
    ConflictSeverity, ConflictType, LineStatus, MaterialStatus, MoldStatus, OrderStatus,
    TaskStatus, WorkerStatus,
};
