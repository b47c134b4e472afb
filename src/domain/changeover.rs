// ==========================================
// 产线排产系统 - 换型规则领域模型
// ==========================================
// 用途: 品类切换成本的配置实体
// 对齐: changeover_rule 表
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// ChangeoverRule - 换型规则
// ==========================================
// line_id 为 None 表示通用规则,产线专属规则优先于通用规则
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeoverRule {
    // ===== 主键 =====
    pub rule_id: String, // 规则唯一标识（UUID）

    // ===== 匹配维度 =====
    pub from_category: String,   // 源品类
    pub to_category: String,     // 目标品类
    pub line_id: Option<String>, // 适用产线（NULL=通用）

    // ===== 基础耗时 =====
    pub changeover_minutes: i64, // 基础换型耗时（分钟）

    // ===== 附加工序 =====
    pub requires_cleaning: bool,    // 需要清洗
    pub cleaning_minutes: i64,      // 清洗耗时
    pub requires_mold_change: bool, // 需要换模
    pub mold_change_minutes: i64,   // 换模耗时
    pub requires_calibration: bool, // 需要校准
    pub calibration_minutes: i64,   // 校准耗时

    // ===== 审计字段 =====
    pub created_at: DateTime<Utc>, // 记录创建时间
}

impl ChangeoverRule {
    /// 规则总耗时（基础耗时 + 各附加工序耗时）
    pub fn total_minutes(&self) -> i64 {
        let mut total = self.changeover_minutes;
        if self.requires_cleaning {
            total += self.cleaning_minutes;
        }
        if self.requires_mold_change {
            total += self.mold_change_minutes;
        }
        if self.requires_calibration {
            total += self.calibration_minutes;
        }
        total
    }
}
