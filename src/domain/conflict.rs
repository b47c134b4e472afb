// ==========================================
// 产线排产系统 - 排产冲突领域模型
// ==========================================
// 用途: 冲突检测输出,未解决冲突是合法结果而非错误
// 对齐: schedule_conflict 表
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::types::{ConflictSeverity, ConflictType};

// ==========================================
// ScheduleConflict - 排产冲突
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConflict {
    // ===== 主键 =====
    pub conflict_id: String, // 冲突唯一标识（UUID）

    // ===== 分类 =====
    pub conflict_type: ConflictType,  // 冲突类型
    pub severity: ConflictSeverity,   // 严重度

    // ===== 关联对象 =====
    pub line_id: Option<String>, // 所在产线（跨线模具冲突记录首个产线）
    pub task_ids: Vec<String>,   // 涉及任务（JSON 列存储）
    pub mold_id: Option<String>, // 争用的共享模具（仅模具冲突）

    // ===== 冲突时间窗 =====
    pub window_start: Option<DateTime<Utc>>, // 冲突区间起点
    pub window_end: Option<DateTime<Utc>>,   // 冲突区间终点

    // ===== 说明 =====
    pub description: String,        // 冲突描述（人读）
    pub suggestion: Option<String>, // 处置建议（时间窗口冲突必填）

    // ===== 处置结果 =====
    pub resolved: bool,                     // 是否已解决
    pub resolution_method: Option<String>,  // 解决方式
    pub resolved_at: Option<DateTime<Utc>>, // 解决时间

    // ===== 审计字段 =====
    pub created_at: DateTime<Utc>, // 记录创建时间
}

impl ScheduleConflict {
    /// 记录解决结果
    pub fn mark_resolved(&mut self, method: &str, at: DateTime<Utc>) {
        self.resolved = true;
        self.resolution_method = Some(method.to_string());
        self.resolved_at = Some(at);
    }
}
