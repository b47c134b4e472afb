// ==========================================
// 产线排产系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::scheduler_config_trait::SchedulerConfigReader;
use crate::config::strategy_weights::StrategyWeights;
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 从 config_kv 表读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self
            .get_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 写入配置值（UPSERT,scope_id='global'）
    pub fn set_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取策略权重（同步口径,API 层查询用）
    ///
    /// 配置缺失或格式错误时回退默认权重并告警。
    pub fn load_strategy_weights(&self) -> Result<StrategyWeights, Box<dyn Error>> {
        let raw = self.get_config_value(config_keys::STRATEGY_WEIGHTS)?;
        let weights = match raw {
            Some(json) => serde_json::from_str::<StrategyWeights>(&json).unwrap_or_else(|e| {
                tracing::warn!(
                    config_key = config_keys::STRATEGY_WEIGHTS,
                    error = %e,
                    "策略权重配置格式错误，使用默认权重"
                );
                StrategyWeights::default()
            }),
            None => StrategyWeights::default(),
        };
        Ok(weights.normalized())
    }

    /// 持久化策略权重快照
    pub fn save_strategy_weights(&self, weights: &StrategyWeights) -> Result<(), Box<dyn Error>> {
        let json = serde_json::to_string(weights)?;
        self.set_config_value(config_keys::STRATEGY_WEIGHTS, &json)?;
        Ok(())
    }

    /// 读取 i64 配置,解析失败回退默认值并告警
    fn get_i64_or_default(&self, key: &str, default: i64) -> Result<i64, Box<dyn Error>> {
        let value = self.get_config_or_default(key, &default.to_string())?;
        Ok(value.parse::<i64>().unwrap_or_else(|_| {
            tracing::warn!(
                config_key = key,
                raw_value = %value,
                default = default,
                "配置值解析失败，使用默认值"
            );
            default
        }))
    }
}

// ==========================================
// SchedulerConfigReader Trait 实现
// ==========================================
#[async_trait]
impl SchedulerConfigReader for ConfigManager {
    async fn get_strategy_weights(&self) -> Result<StrategyWeights, Box<dyn Error>> {
        self.load_strategy_weights()
    }

    async fn get_mix_batch_window_hours(&self) -> Result<i64, Box<dyn Error>> {
        self.get_i64_or_default(config_keys::MIX_BATCH_WINDOW_HOURS, 24)
    }

    async fn get_mix_batch_saved_minutes(&self) -> Result<i64, Box<dyn Error>> {
        self.get_i64_or_default(config_keys::MIX_BATCH_SAVED_MINUTES, 30)
    }

    async fn get_shift_hours(&self) -> Result<i64, Box<dyn Error>> {
        self.get_i64_or_default(config_keys::SHIFT_HOURS, 8)
    }

    async fn get_resolver_gap_minutes(&self) -> Result<i64, Box<dyn Error>> {
        self.get_i64_or_default(config_keys::RESOLVER_GAP_MINUTES, 5)
    }

    async fn get_reschedule_horizon_days(&self) -> Result<i64, Box<dyn Error>> {
        self.get_i64_or_default(config_keys::RESCHEDULE_HORIZON_DAYS, 7)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 策略权重
    pub const STRATEGY_WEIGHTS: &str = "strategy_weights";

    // 合批
    pub const MIX_BATCH_WINDOW_HOURS: &str = "mix_batch_window_hours";
    pub const MIX_BATCH_SAVED_MINUTES: &str = "mix_batch_saved_minutes";

    // 排产
    pub const SHIFT_HOURS: &str = "shift_hours";
    pub const RESOLVER_GAP_MINUTES: &str = "resolver_gap_minutes";
    pub const RESCHEDULE_HORIZON_DAYS: &str = "reschedule_horizon_days";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn create_manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        db::configure_sqlite_connection(&conn).unwrap();
        db::init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_missing_weights_fall_back_to_default() {
        let manager = create_manager();
        let weights = manager.load_strategy_weights().unwrap();
        assert_eq!(weights, StrategyWeights::default());
    }

    #[test]
    fn test_save_and_reload_weights() {
        let manager = create_manager();
        let weights = StrategyWeights {
            earliest_deadline: 0.4,
            shortest_process: 0.2,
            min_changeover: 0.1,
            capacity_match: 0.1,
            material_ready: 0.1,
            urgency_first: 0.1,
        };
        manager.save_strategy_weights(&weights).unwrap();

        let reloaded = manager.load_strategy_weights().unwrap();
        assert!((reloaded.earliest_deadline - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_corrupt_weights_json_falls_back() {
        let manager = create_manager();
        manager
            .set_config_value(config_keys::STRATEGY_WEIGHTS, "not-json")
            .unwrap();
        let weights = manager.load_strategy_weights().unwrap();
        assert_eq!(weights, StrategyWeights::default());
    }

    #[tokio::test]
    async fn test_i64_config_defaults() {
        let manager = create_manager();
        assert_eq!(manager.get_mix_batch_window_hours().await.unwrap(), 24);
        assert_eq!(manager.get_mix_batch_saved_minutes().await.unwrap(), 30);
        assert_eq!(manager.get_shift_hours().await.unwrap(), 8);
        assert_eq!(manager.get_resolver_gap_minutes().await.unwrap(), 5);

        manager.set_config_value(config_keys::SHIFT_HOURS, "12").unwrap();
        assert_eq!(manager.get_shift_hours().await.unwrap(), 12);
    }
}
