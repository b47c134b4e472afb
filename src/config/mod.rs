// ==========================================
// 产线排产系统 - 配置层
// ==========================================
// 职责: 系统配置管理,策略权重快照
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod scheduler_config_trait;
pub mod strategy_weights;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use scheduler_config_trait::SchedulerConfigReader;
pub use strategy_weights::StrategyWeights;
