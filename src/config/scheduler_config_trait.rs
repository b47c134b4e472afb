// ==========================================
// 产线排产系统 - 排产配置读取 Trait
// ==========================================
// 职责: 定义排产引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use std::error::Error;

use crate::config::strategy_weights::StrategyWeights;

// ==========================================
// SchedulerConfigReader Trait
// ==========================================
// 用途: 排产引擎所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait SchedulerConfigReader: Send + Sync {
    /// 获取策略权重
    ///
    /// # 默认值
    /// - 交期 0.25 / 时长 0.20 / 换型 0.20 / 产能 0.15 / 物料 0.10 / 紧急 0.10
    async fn get_strategy_weights(&self) -> Result<StrategyWeights, Box<dyn Error>>;

    /// 获取合批交期链接窗口（小时）
    ///
    /// # 默认值
    /// - 24
    async fn get_mix_batch_window_hours(&self) -> Result<i64, Box<dyn Error>>;

    /// 获取合批每单节省换型分钟数
    ///
    /// # 默认值
    /// - 30
    async fn get_mix_batch_saved_minutes(&self) -> Result<i64, Box<dyn Error>>;

    /// 获取班次时长（小时,产线利用率分母口径）
    ///
    /// # 默认值
    /// - 8
    async fn get_shift_hours(&self) -> Result<i64, Box<dyn Error>>;

    /// 获取冲突消解顺延间隙（分钟）
    ///
    /// # 默认值
    /// - 5
    async fn get_resolver_gap_minutes(&self) -> Result<i64, Box<dyn Error>>;

    /// 获取重排窗口长度（天）
    ///
    /// # 默认值
    /// - 7
    async fn get_reschedule_horizon_days(&self) -> Result<i64, Box<dyn Error>>;
}
