// ==========================================
// 产线排产系统 - 人员与模具领域模型
// ==========================================
// 用途: 排产资源约束实体
// 对齐: worker / worker_assignment / mold 表
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::types::{MoldStatus, WorkerStatus};

// ==========================================
// Worker - 工人
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    // ===== 主键 =====
    pub worker_id: String, // 工人唯一标识

    // ===== 基础信息 =====
    pub worker_name: String, // 姓名
    pub skill_level: i32,    // 技能等级（1-5）

    // ===== 岗位 =====
    pub default_line_id: Option<String>, // 默认产线
    pub status: WorkerStatus,            // 在岗状态

    // ===== 审计字段 =====
    pub created_at: DateTime<Utc>, // 记录创建时间
}

impl Worker {
    /// 是否可分配到指定产线
    pub fn is_assignable_to(&self, line_id: &str) -> bool {
        self.status == WorkerStatus::Available
            && self.default_line_id.as_deref() == Some(line_id)
    }
}

// ==========================================
// WorkerAssignment - 工人任务分配记录
// ==========================================
// 一条记录 = 一个工人在一个任务上的在岗安排
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerAssignment {
    pub assignment_id: String,        // 分配记录 ID（UUID）
    pub task_id: String,              // 关联任务
    pub worker_id: String,            // 关联工人
    pub line_id: String,              // 所在产线
    pub batch_no: Option<String>,     // 排产批次号
    pub assigned_at: DateTime<Utc>,   // 分配时间
}

// ==========================================
// Mold - 模具
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mold {
    // ===== 主键 =====
    pub mold_id: String, // 模具唯一标识

    // ===== 基础信息 =====
    pub mold_name: String,        // 模具名称
    pub category: Option<String>, // 适配品类

    // ===== 状态 =====
    pub status: MoldStatus,      // 模具状态
    pub line_id: Option<String>, // 当前所在产线

    // ===== 审计字段 =====
    pub created_at: DateTime<Utc>, // 记录创建时间
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_assignable() {
        let worker = Worker {
            worker_id: "W-001".to_string(),
            worker_name: "张三".to_string(),
            skill_level: 3,
            default_line_id: Some("LINE-01".to_string()),
            status: WorkerStatus::Available,
            created_at: Utc::now(),
        };
        assert!(worker.is_assignable_to("LINE-01"));
        assert!(!worker.is_assignable_to("LINE-02"));

        let off_worker = Worker {
            status: WorkerStatus::Off,
            ..worker
        };
        assert!(!off_worker.is_assignable_to("LINE-01"));
    }
}
