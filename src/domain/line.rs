// ==========================================
// 产线排产系统 - 生产线领域模型
// ==========================================
// 用途: 排产候选资源,引擎只读主数据 + 批次内运行态
// 对齐: production_line 表
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::types::LineStatus;

// ==========================================
// ProductionLine - 生产线主数据
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionLine {
    // ===== 主键 =====
    pub line_id: String, // 产线唯一标识

    // ===== 基础信息 =====
    pub line_name: String,  // 产线名称
    pub status: LineStatus, // 产线状态

    // ===== 生产能力 =====
    pub producible_categories: Vec<String>, // 可生产品类（JSON 列存储）
    pub standard_capacity: Option<f64>,     // 标准产能（件/小时,NULL=未维护）
    pub efficiency_factor: f64,             // 产线效率系数（默认 1.0）

    // ===== 人员配置 =====
    pub standard_workers: i32, // 标准人数
    pub current_workers: i32,  // 当前人数
    pub max_workers: i32,      // 人数上限

    // ===== 运行快照 =====
    pub current_category: Option<String>,          // 当前在产品类（换型成本起点）
    pub next_available_time: Option<DateTime<Utc>>, // 下一可用时间（NULL=立即可用）

    // ===== 审计字段 =====
    pub created_at: DateTime<Utc>, // 记录创建时间
    pub updated_at: DateTime<Utc>, // 记录更新时间
}

impl ProductionLine {
    /// 是否能生产指定品类
    pub fn can_produce(&self, category: &str) -> bool {
        self.producible_categories.iter().any(|c| c == category)
    }

    /// 是否可接收新排产任务
    pub fn is_schedulable(&self) -> bool {
        self.status.is_schedulable()
    }
}

// ==========================================
// LineScheduleState - 批次内产线运行态
// ==========================================
// 用途: 单次批量排产过程中跟踪每条产线的占用推进
// 生命周期: 每次批量排产开始时按产线快照重建,批次结束即丢弃
// 红线: 不跨批次共享,不落库
#[derive(Debug, Clone)]
pub struct LineScheduleState {
    pub line_id: String,                  // 关联产线
    pub next_free_time: DateTime<Utc>,    // 下一空闲时间
    pub last_category: Option<String>,    // 最近一次排入的品类
    pub task_count: i32,                  // 本批次已排任务数
    pub used_minutes: i64,                // 本批次累计占用分钟（含换型）
}

impl LineScheduleState {
    /// 从产线快照初始化运行态
    ///
    /// 下一空闲时间取 max(产线下一可用时间, now),避免把任务排进过去。
    pub fn from_line(line: &ProductionLine, now: DateTime<Utc>) -> Self {
        let next_free = match line.next_available_time {
            Some(t) if t > now => t,
            _ => now,
        };
        Self {
            line_id: line.line_id.clone(),
            next_free_time: next_free,
            last_category: line.current_category.clone(),
            task_count: 0,
            used_minutes: 0,
        }
    }

    /// 记录一个新任务对产线的占用
    pub fn push_task(
        &mut self,
        end_time: DateTime<Utc>,
        busy_minutes: i64,
        category: &str,
    ) {
        self.next_free_time = end_time;
        self.last_category = Some(category.to_string());
        self.task_count += 1;
        self.used_minutes += busy_minutes;
    }
}
