// ==========================================
// 产线排产系统 - 策略权重值对象
// ==========================================
// 存储位置: config_kv（scope_id='global', key='strategy_weights'）
// 红线: 不可变值对象,更新产生新值,批次内不漂移
// ==========================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_earliest_deadline() -> f64 {
    0.25
}
fn default_shortest_process() -> f64 {
    0.20
}
fn default_min_changeover() -> f64 {
    0.20
}
fn default_capacity_match() -> f64 {
    0.15
}
fn default_material_ready() -> f64 {
    0.10
}
fn default_urgency_first() -> f64 {
    0.10
}

/// 六维策略权重
///
/// 各维权重之和应为 1,更新后偏差超过 0.01 时自动归一化。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyWeights {
    /// 交期最早优先
    #[serde(default = "default_earliest_deadline")]
    pub earliest_deadline: f64,

    /// 加工时长最短优先
    #[serde(default = "default_shortest_process")]
    pub shortest_process: f64,

    /// 换型成本最小优先
    #[serde(default = "default_min_changeover")]
    pub min_changeover: f64,

    /// 产能匹配优先
    #[serde(default = "default_capacity_match")]
    pub capacity_match: f64,

    /// 物料齐备优先
    #[serde(default = "default_material_ready")]
    pub material_ready: f64,

    /// 紧急程度优先
    #[serde(default = "default_urgency_first")]
    pub urgency_first: f64,
}

impl Default for StrategyWeights {
    fn default() -> Self {
        Self {
            earliest_deadline: default_earliest_deadline(),
            shortest_process: default_shortest_process(),
            min_changeover: default_min_changeover(),
            capacity_match: default_capacity_match(),
            material_ready: default_material_ready(),
            urgency_first: default_urgency_first(),
        }
    }
}

impl StrategyWeights {
    /// 权重之和
    pub fn sum(&self) -> f64 {
        self.earliest_deadline
            + self.shortest_process
            + self.min_changeover
            + self.capacity_match
            + self.material_ready
            + self.urgency_first
    }

    /// 校验权重合法性
    ///
    /// 规则: 各维非负且有限,总和大于 0。
    pub fn validate(&self) -> Result<(), String> {
        let entries = [
            ("earliest_deadline", self.earliest_deadline),
            ("shortest_process", self.shortest_process),
            ("min_changeover", self.min_changeover),
            ("capacity_match", self.capacity_match),
            ("material_ready", self.material_ready),
            ("urgency_first", self.urgency_first),
        ];
        for (name, value) in entries {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("权重 {} 取值非法: {}", name, value));
            }
        }
        if self.sum() <= 0.0 {
            return Err("权重总和必须大于 0".to_string());
        }
        Ok(())
    }

    /// 按需归一化: 总和偏离 1 超过 0.01 时等比缩放,否则原样返回
    pub fn normalized(&self) -> StrategyWeights {
        let sum = self.sum();
        if (sum - 1.0).abs() <= 0.01 {
            return *self;
        }
        StrategyWeights {
            earliest_deadline: self.earliest_deadline / sum,
            shortest_process: self.shortest_process / sum,
            min_changeover: self.min_changeover / sum,
            capacity_match: self.capacity_match / sum,
            material_ready: self.material_ready / sum,
            urgency_first: self.urgency_first / sum,
        }
    }

    /// 应用权重覆写,返回归一化后的新值
    ///
    /// # 参数
    /// - `updates`: 策略名 → 新权重,未出现的维度保持原值
    ///
    /// # 错误
    /// - 未知策略名或非法取值
    pub fn apply_updates(
        &self,
        updates: &HashMap<String, f64>,
    ) -> Result<StrategyWeights, String> {
        let mut next = *self;
        for (name, value) in updates {
            match name.as_str() {
                "earliest_deadline" => next.earliest_deadline = *value,
                "shortest_process" => next.shortest_process = *value,
                "min_changeover" => next.min_changeover = *value,
                "capacity_match" => next.capacity_match = *value,
                "material_ready" => next.material_ready = *value,
                "urgency_first" => next.urgency_first = *value,
                _ => return Err(format!("未知策略名: {}", name)),
            }
        }
        next.validate()?;
        Ok(next.normalized())
    }

    /// 转换为策略名 → 权重映射（对外查询接口用）
    pub fn to_map(&self) -> HashMap<String, f64> {
        let mut map = HashMap::new();
        map.insert("earliest_deadline".to_string(), self.earliest_deadline);
        map.insert("shortest_process".to_string(), self.shortest_process);
        map.insert("min_changeover".to_string(), self.min_changeover);
        map.insert("capacity_match".to_string(), self.capacity_match);
        map.insert("material_ready".to_string(), self.material_ready);
        map.insert("urgency_first".to_string(), self.urgency_first);
        map
    }
}
