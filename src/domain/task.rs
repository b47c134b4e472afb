// ==========================================
// 产线排产系统 - 排产任务领域模型
// ==========================================
// 用途: 批量排产输出,一个任务 = 一个订单(或合批组)在一条产线上的时间占用
// 对齐: schedule_task 表
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::types::TaskStatus;

// ==========================================
// ScheduleTask - 排产任务
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleTask {
    // ===== 主键与关联 =====
    pub task_id: String,  // 任务唯一标识（UUID）
    pub order_id: String, // 关联订单（合批任务为主订单）
    pub line_id: String,  // 落位产线

    // ===== 批次信息 =====
    pub batch_no: Option<String>, // 排产批次号
    pub sequence_no: i32,         // 线内顺序号（1 起）

    // ===== 时间占用 =====
    pub start_time: DateTime<Utc>, // 开工时间（换型完成后）
    pub end_time: DateTime<Utc>,   // 完工时间
    pub changeover_minutes: i64,   // 开工前换型耗时（分钟）

    // ===== 生产内容 =====
    pub planned_qty: f64,         // 任务数量（合批任务为合计值）
    pub product_category: String, // 产品品类
    pub mold_id: Option<String>,  // 占用模具

    // ===== 合批信息 =====
    pub is_mix_batch: bool,                   // 是否合批任务
    pub merged_order_ids: Option<Vec<String>>, // 合批成员订单（JSON 列存储）

    // ===== 交期评估 =====
    pub deadline_gap_minutes: Option<i64>, // 完工距交期分钟数（正=提前,负=超期,无交期为 NULL）
    pub meets_deadline: bool,              // 是否满足订单时间窗口（无交期视为满足）

    // ===== 状态 =====
    pub status: TaskStatus, // 任务状态

    // ===== 审计字段 =====
    pub created_at: DateTime<Utc>, // 记录创建时间
    pub updated_at: DateTime<Utc>, // 记录更新时间
}

impl ScheduleTask {
    /// 生产时长（分钟,不含换型）
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }

    /// 产线占用时长（分钟,含换型）
    pub fn occupied_minutes(&self) -> i64 {
        self.changeover_minutes + self.duration_minutes()
    }

    /// 与另一任务的时间区间是否重叠（调用方保证同一产线）
    pub fn overlaps(&self, other: &ScheduleTask) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }

    /// 根据订单交期刷新交期评估字段
    pub fn evaluate_deadline(&mut self, latest_end: Option<DateTime<Utc>>) {
        match latest_end {
            Some(deadline) => {
                let gap = (deadline - self.end_time).num_minutes();
                self.deadline_gap_minutes = Some(gap);
                self.meets_deadline = gap >= 0;
            }
            None => {
                self.deadline_gap_minutes = None;
                self.meets_deadline = true;
            }
        }
    }
}
