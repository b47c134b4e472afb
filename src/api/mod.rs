// ==========================================
// 产线排产系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供上层命令调用
// ==========================================

pub mod error;
pub mod scheduler_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use scheduler_api::SchedulerApi;
