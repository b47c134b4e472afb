// ==========================================
// 产线排产系统 - 人员排班引擎
// ==========================================
// 职责: 批次任务的人员分配 + 跨线调人建议
// 输入: 任务列表 + 各线可用工人 / 产线列表 + 可调人数
// 输出: 人员分配记录 / 按预期收益降序的调人建议
// 红线: 建议只读,不改动工人主数据
// ==========================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::line::ProductionLine;
use crate::domain::resource::{Worker, WorkerAssignment};
use crate::domain::task::ScheduleTask;
use crate::domain::types::LineStatus;
use crate::engine::estimator::worker_efficiency_ratio;

// ==========================================
// WorkerAssigner - 人员分配引擎
// ==========================================
pub struct WorkerAssigner {
    // 无状态引擎,不需要注入依赖
}

impl WorkerAssigner {
    pub fn new() -> Self {
        Self {}
    }

    /// 为批次任务生成人员分配记录
    ///
    /// 规则: 产线上每个在岗且默认归属该线的工人,跟产线上每个任务,
    /// 各生成一条分配记录。无人可用的产线留空,不视为错误。
    #[instrument(skip_all, fields(task_count = tasks.len(), batch_no = %batch_no))]
    pub fn assign(
        &self,
        tasks: &[ScheduleTask],
        workers_by_line: &HashMap<String, Vec<Worker>>,
        batch_no: &str,
        now: DateTime<Utc>,
    ) -> Vec<WorkerAssignment> {
        let mut assignments = Vec::new();
        for task in tasks {
            let Some(workers) = workers_by_line.get(&task.line_id) else {
                tracing::debug!(line_id = %task.line_id, "产线无可用工人,任务暂不配员");
                continue;
            };
            for worker in workers.iter().filter(|w| w.is_assignable_to(&task.line_id)) {
                assignments.push(WorkerAssignment {
                    assignment_id: Uuid::new_v4().to_string(),
                    task_id: task.task_id.clone(),
                    worker_id: worker.worker_id.clone(),
                    line_id: task.line_id.clone(),
                    batch_no: Some(batch_no.to_string()),
                    assigned_at: now,
                });
            }
        }
        assignments
    }
}

impl Default for WorkerAssigner {
    fn default() -> Self {
        Self::new()
    }
}

// ==========================================
// TransferSuggestion - 跨线调人建议
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSuggestion {
    pub line_id: String,        // 建议补人的产线
    pub line_name: String,      // 产线名称
    pub current_workers: i32,   // 当前人数
    pub max_workers: i32,       // 人数上限
    pub suggested_workers: i32, // 建议补充人数
    pub expected_gain: f64,     // 预期人效系数提升
    pub reason: String,         // 建议说明（人读）
}

// ==========================================
// TransferAdvisor - 调人建议引擎
// ==========================================
pub struct TransferAdvisor {
    // 无状态引擎,不需要注入依赖
}

impl TransferAdvisor {
    pub fn new() -> Self {
        Self {}
    }

    /// 生成跨线调人建议
    ///
    /// 只考察生产中且人数未达上限的产线,按补人后的人效系数
    /// 提升降序排列。可调人数不足以补满时按可调人数截断。
    #[instrument(skip_all, fields(line_count = lines.len(), extra_workers = extra_workers))]
    pub fn suggest(&self, lines: &[ProductionLine], extra_workers: i32) -> Vec<TransferSuggestion> {
        if extra_workers <= 0 {
            return Vec::new();
        }

        let mut suggestions: Vec<TransferSuggestion> = lines
            .iter()
            .filter(|line| line.status == LineStatus::Running)
            .filter_map(|line| {
                let headroom = line.max_workers - line.current_workers;
                if headroom <= 0 {
                    return None;
                }
                let suggested = extra_workers.min(headroom);
                let before = worker_efficiency_ratio(line.current_workers, line.standard_workers);
                let after = worker_efficiency_ratio(
                    line.current_workers + suggested,
                    line.standard_workers,
                );
                let gain = after - before;
                if gain <= 0.0 {
                    return None;
                }
                Some(TransferSuggestion {
                    line_id: line.line_id.clone(),
                    line_name: line.line_name.clone(),
                    current_workers: line.current_workers,
                    max_workers: line.max_workers,
                    suggested_workers: suggested,
                    expected_gain: gain,
                    reason: format!(
                        "增派 {} 人后人效系数从 {:.2} 提升至 {:.2}",
                        suggested, before, after
                    ),
                })
            })
            .collect();

        suggestions.sort_by(|a, b| {
            b.expected_gain
                .partial_cmp(&a.expected_gain)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        suggestions
    }
}

impl Default for TransferAdvisor {
    fn default() -> Self {
        Self::new()
    }
}

// ==========================================
// 测试模块
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{TaskStatus, WorkerStatus};
    use chrono::Duration;

    fn create_test_task(task_id: &str, line_id: &str) -> ScheduleTask {
        let now = Utc::now();
        ScheduleTask {
            task_id: task_id.to_string(),
            order_id: format!("ORD-{}", task_id),
            line_id: line_id.to_string(),
            batch_no: Some("B-TEST".to_string()),
            sequence_no: 1,
            start_time: now,
            end_time: now + Duration::minutes(60),
            changeover_minutes: 0,
            planned_qty: 100.0,
            product_category: "CAT-A".to_string(),
            mold_id: None,
            is_mix_batch: false,
            merged_order_ids: None,
            deadline_gap_minutes: None,
            meets_deadline: true,
            status: TaskStatus::Planned,
            created_at: now,
            updated_at: now,
        }
    }

    fn create_test_worker(worker_id: &str, line_id: &str, status: WorkerStatus) -> Worker {
        Worker {
            worker_id: worker_id.to_string(),
            worker_name: format!("工人{}", worker_id),
            skill_level: 3,
            default_line_id: Some(line_id.to_string()),
            status,
            created_at: Utc::now(),
        }
    }

    fn create_test_line(
        line_id: &str,
        status: LineStatus,
        current: i32,
        standard: i32,
        max: i32,
    ) -> ProductionLine {
        let now = Utc::now();
        ProductionLine {
            line_id: line_id.to_string(),
            line_name: format!("{} 线", line_id),
            status,
            producible_categories: vec!["CAT-A".to_string()],
            standard_capacity: Some(100.0),
            efficiency_factor: 1.0,
            standard_workers: standard,
            current_workers: current,
            max_workers: max,
            current_category: None,
            next_available_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_assign_every_worker_to_every_line_task() {
        let assigner = WorkerAssigner::new();
        let now = Utc::now();
        let tasks = vec![
            create_test_task("T1", "LINE-01"),
            create_test_task("T2", "LINE-01"),
            create_test_task("T3", "LINE-02"),
        ];
        let mut workers = HashMap::new();
        workers.insert(
            "LINE-01".to_string(),
            vec![
                create_test_worker("W1", "LINE-01", WorkerStatus::Available),
                create_test_worker("W2", "LINE-01", WorkerStatus::Available),
            ],
        );

        let assignments = assigner.assign(&tasks, &workers, "B-TEST", now);
        // LINE-01: 2 工人 x 2 任务 = 4 条;LINE-02 无工人
        assert_eq!(assignments.len(), 4);
        assert!(assignments.iter().all(|a| a.line_id == "LINE-01"));
        assert!(assignments.iter().all(|a| a.batch_no.as_deref() == Some("B-TEST")));
    }

    #[test]
    fn test_assign_skips_off_duty_workers() {
        let assigner = WorkerAssigner::new();
        let now = Utc::now();
        let tasks = vec![create_test_task("T1", "LINE-01")];
        let mut workers = HashMap::new();
        workers.insert(
            "LINE-01".to_string(),
            vec![
                create_test_worker("W1", "LINE-01", WorkerStatus::Available),
                create_test_worker("W2", "LINE-01", WorkerStatus::Off),
                create_test_worker("W3", "LINE-01", WorkerStatus::Busy),
            ],
        );

        let assignments = assigner.assign(&tasks, &workers, "B-TEST", now);
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].worker_id, "W1");
    }

    #[test]
    fn test_suggest_sorted_by_gain_desc() {
        let advisor = TransferAdvisor::new();
        let lines = vec![
            // 2/4 人补 1: 0.50 -> 0.75,收益 0.25
            create_test_line("LINE-01", LineStatus::Running, 2, 4, 6),
            // 1/5 人补 1: 0.20 -> 0.40,收益 0.20
            create_test_line("LINE-02", LineStatus::Running, 1, 5, 6),
            // 3/4 人补 1: 0.75 -> 1.00,收益 0.25
            create_test_line("LINE-03", LineStatus::Running, 3, 4, 4),
        ];

        let suggestions = advisor.suggest(&lines, 1);
        assert_eq!(suggestions.len(), 3);
        // 收益 0.25 的两条在前,0.2 的最后
        assert_eq!(suggestions[2].line_id, "LINE-02");
        assert!(suggestions[0].expected_gain >= suggestions[1].expected_gain);
    }

    #[test]
    fn test_suggest_only_running_lines_with_headroom() {
        let advisor = TransferAdvisor::new();
        let lines = vec![
            // 空闲线不参与
            create_test_line("LINE-01", LineStatus::Available, 2, 4, 6),
            // 已到上限不参与
            create_test_line("LINE-02", LineStatus::Running, 6, 4, 6),
            // 合格
            create_test_line("LINE-03", LineStatus::Running, 2, 4, 6),
        ];

        let suggestions = advisor.suggest(&lines, 2);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].line_id, "LINE-03");
        assert_eq!(suggestions[0].suggested_workers, 2);
    }

    #[test]
    fn test_suggest_truncates_to_available_headcount() {
        let advisor = TransferAdvisor::new();
        // 缺口 4 人,但只有 1 人可调
        let lines = vec![create_test_line("LINE-01", LineStatus::Running, 2, 6, 6)];

        let suggestions = advisor.suggest(&lines, 1);
        assert_eq!(suggestions[0].suggested_workers, 1);

        // 无人可调返回空
        assert!(advisor.suggest(&lines, 0).is_empty());
    }

    #[test]
    fn test_suggest_skips_saturated_efficiency() {
        let advisor = TransferAdvisor::new();
        // 已超配到效率封顶（5/4 = 1.25 截到 1.2）,再补人无收益
        let lines = vec![create_test_line("LINE-01", LineStatus::Running, 5, 4, 8)];
        assert!(advisor.suggest(&lines, 2).is_empty());
    }
}
