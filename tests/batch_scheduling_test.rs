// ==========================================
// 批量排产集成测试
// ==========================================
// 测试目标: 验证批量排产全链路（订单加载 → 合批 → 落位 → 冲突 → 落库）
// ==========================================


use std::sync::Arc;

use chrono::{Duration, Utc};
use prodline_aps::config::ConfigManager;
use prodline_aps::domain::types::{ConflictSeverity, ConflictType, OrderStatus, TaskStatus};
use prodline_aps::engine::{BatchScheduler, SchedulerRepositories};
use prodline_aps::logging;

/// 创建批量排产引擎与配套仓储
fn build_scheduler(db_path: &str) -> (SchedulerRepositories, BatchScheduler<ConfigManager>) {
    let conn = test_helpers::open_shared_connection(db_path).expect("打开测试连接失败");
    let repos = SchedulerRepositories::from_connection(conn.clone());
    let config = Arc::new(ConfigManager::from_connection(conn).expect("创建配置管理器失败"));
    let scheduler = BatchScheduler::new(repos.clone(), config);
    (repos, scheduler)
}

// ==========================================
// 测试1: 单订单完整链路
// ==========================================
#[tokio::test]
async fn test_batch_schedule_single_order_full_flow() {
    logging::init_test();
    let (_tmp, db_path) = test_helpers::create_test_db().expect("创建测试库失败");
    let (repos, scheduler) = build_scheduler(&db_path);
    let now = Utc::now();

    // 产线 100 件/时,效率 1.0,满配 → 1000 件应估 600 分钟
    let line = test_helpers::create_test_line("LINE-01", &["CAT-A"], Some(100.0));
    repos.line_repo.insert(&line).expect("插入产线失败");
    let order = test_helpers::create_test_order(
        "ORD-001",
        "CAT-A",
        1000.0,
        5,
        Some(now + Duration::hours(1)),
    );
    repos.order_repo.insert(&order).expect("插入订单失败");
    for worker_id in ["W1", "W2"] {
        let worker = test_helpers::create_test_worker(worker_id, "LINE-01");
        repos.worker_repo.insert(&worker).expect("插入工人失败");
    }

    let result = scheduler
        .batch_schedule(now, 7)
        .await
        .expect("批量排产失败");

    // 排产结果
    assert_eq!(result.total_orders, 1);
    assert_eq!(result.scheduled_orders, 1);
    assert_eq!(result.unscheduled_orders, 0);
    assert_eq!(result.tasks.len(), 1);

    let task = &result.tasks[0];
    assert_eq!(task.line_id, "LINE-01");
    assert_eq!(task.changeover_minutes, 0, "空产线首任务不应有换型");
    assert_eq!(task.duration_minutes(), 600);
    assert_eq!(task.sequence_no, 1);
    assert_eq!(task.status, TaskStatus::Planned);
    assert!(!task.meets_deadline, "600分钟远超1小时交期");
    assert!(task.deadline_gap_minutes.expect("应有交期差") < 0);

    // 交期超 8 小时 → Critical 交期窗口冲突,且带处置建议
    assert_eq!(result.conflicts.len(), 1);
    let conflict = &result.conflicts[0];
    assert_eq!(conflict.conflict_type, ConflictType::TimeWindow);
    assert_eq!(conflict.severity, ConflictSeverity::Critical);
    assert!(conflict.suggestion.is_some());

    // 配员: 产线两名在岗工人全部上岗
    assert_eq!(result.assignments.len(), 2);

    // 指标
    assert!((result.on_time_rate - 0.0).abs() < f64::EPSILON);
    assert!((result.worker_utilization_pct - 100.0).abs() < 0.01);
    assert!((result.line_utilization_pct - 125.0).abs() < 0.01, "600分钟 / 480分钟班次");
    assert_eq!(result.total_changeover_minutes, 0);
    assert_eq!(result.degraded_estimates, 0);

    // 落库: 订单流转 + 产线快照 + 任务持久化
    let saved_order = repos
        .order_repo
        .find_by_id("ORD-001")
        .expect("查询订单失败")
        .expect("订单应存在");
    assert_eq!(saved_order.status, OrderStatus::Scheduled);
    assert_eq!(saved_order.batch_no.as_deref(), Some(result.batch_no.as_str()));
    assert_eq!(saved_order.assigned_line_id.as_deref(), Some("LINE-01"));

    let saved_line = repos
        .line_repo
        .find_by_id("LINE-01")
        .expect("查询产线失败")
        .expect("产线应存在");
    assert_eq!(saved_line.current_category.as_deref(), Some("CAT-A"));
    assert_eq!(saved_line.next_available_time, Some(task.end_time));

    let active = repos
        .task_repo
        .find_active_by_line("LINE-01")
        .expect("查询任务失败");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].task_id, task.task_id);
}

// ==========================================
// 测试2: 同品类合批 + 跨品类换型
// ==========================================
#[tokio::test]
async fn test_batch_schedule_mix_batch_grouping() {
    logging::init_test();
    let (_tmp, db_path) = test_helpers::create_test_db().expect("创建测试库失败");
    let (repos, scheduler) = build_scheduler(&db_path);
    let now = Utc::now();

    let line = test_helpers::create_test_line("LINE-01", &["CAT-A", "CAT-B"], Some(100.0));
    repos.line_repo.insert(&line).expect("插入产线失败");
    let rule = test_helpers::create_test_changeover_rule("CAT-A", "CAT-B", 45);
    repos.changeover_repo.insert(&rule).expect("插入换型规则失败");

    // 三笔 CAT-A 交期相近（3小时间隔,24小时合批窗口内）,一笔 CAT-B
    let orders = [
        ("ORD-A1", "CAT-A", 100.0, 5, 10),
        ("ORD-A2", "CAT-A", 50.0, 5, 13),
        ("ORD-A3", "CAT-A", 50.0, 4, 16),
        ("ORD-B1", "CAT-B", 200.0, 5, 20),
    ];
    for (order_id, category, qty, priority, deadline_hours) in orders {
        let order = test_helpers::create_test_order(
            order_id,
            category,
            qty,
            priority,
            Some(now + Duration::hours(deadline_hours)),
        );
        repos.order_repo.insert(&order).expect("插入订单失败");
    }

    let result = scheduler
        .batch_schedule(now, 7)
        .await
        .expect("批量排产失败");

    assert_eq!(result.total_orders, 4);
    assert_eq!(result.scheduled_orders, 4);
    assert_eq!(result.tasks.len(), 2, "三笔CAT-A合并为一个任务");

    // 合批任务: 合计数量 200,省 2×30 分钟换型,估时 120-60=60 分钟
    let mix_task = result
        .tasks
        .iter()
        .find(|t| t.is_mix_batch)
        .expect("应有合批任务");
    assert_eq!(mix_task.planned_qty, 200.0);
    assert_eq!(
        mix_task.merged_order_ids.as_ref().map(|ids| ids.len()),
        Some(3)
    );
    assert_eq!(mix_task.duration_minutes(), 60);
    assert_eq!(mix_task.sequence_no, 1);
    assert!(mix_task.meets_deadline);

    // CAT-B 任务排在合批之后,承担 45 分钟换型
    let b_task = result
        .tasks
        .iter()
        .find(|t| !t.is_mix_batch)
        .expect("应有CAT-B任务");
    assert_eq!(b_task.changeover_minutes, 45);
    assert_eq!(b_task.sequence_no, 2);
    assert_eq!(b_task.start_time, mix_task.end_time + Duration::minutes(45));
    assert!(b_task.meets_deadline);

    assert_eq!(result.total_changeover_minutes, 45);
    assert!(result.conflicts.is_empty());
    assert!((result.on_time_rate - 1.0).abs() < f64::EPSILON);

    // 合批成员全部回写同一批次号
    for order_id in ["ORD-A1", "ORD-A2", "ORD-A3", "ORD-B1"] {
        let saved = repos
            .order_repo
            .find_by_id(order_id)
            .expect("查询订单失败")
            .expect("订单应存在");
        assert_eq!(saved.status, OrderStatus::Scheduled);
        assert_eq!(saved.batch_no.as_deref(), Some(result.batch_no.as_str()));
    }
}

// ==========================================
// 测试3: 空输入场景
// ==========================================
#[tokio::test]
async fn test_batch_schedule_without_pending_orders() {
    logging::init_test();
    let (_tmp, db_path) = test_helpers::create_test_db().expect("创建测试库失败");
    let (repos, scheduler) = build_scheduler(&db_path);

    let line = test_helpers::create_test_line("LINE-01", &["CAT-A"], Some(100.0));
    repos.line_repo.insert(&line).expect("插入产线失败");

    let result = scheduler
        .batch_schedule(Utc::now(), 7)
        .await
        .expect("空批次不应报错");

    assert_eq!(result.total_orders, 0);
    assert!(result.tasks.is_empty());
    assert!(result.message.contains("窗口内无待排产订单"));
}

#[tokio::test]
async fn test_batch_schedule_without_schedulable_lines() {
    logging::init_test();
    let (_tmp, db_path) = test_helpers::create_test_db().expect("创建测试库失败");
    let (repos, scheduler) = build_scheduler(&db_path);
    let now = Utc::now();

    let order = test_helpers::create_test_order("ORD-001", "CAT-A", 100.0, 5, None);
    repos.order_repo.insert(&order).expect("插入订单失败");

    let result = scheduler
        .batch_schedule(now, 7)
        .await
        .expect("无产线不应报错");

    assert_eq!(result.total_orders, 1);
    assert_eq!(result.unscheduled_orders, 1);
    assert!(result.tasks.is_empty());
    assert!(result.message.contains("无可排产产线"));

    // 不应有任何落库副作用
    let saved = repos
        .order_repo
        .find_by_id("ORD-001")
        .expect("查询订单失败")
        .expect("订单应存在");
    assert_eq!(saved.status, OrderStatus::Pending);
}

// ==========================================
// 测试4: 重排（清场 + 快照回收 + 重新落位）
// ==========================================
#[tokio::test]
async fn test_reschedule_cancels_planned_and_replans() {
    logging::init_test();
    let (_tmp, db_path) = test_helpers::create_test_db().expect("创建测试库失败");
    let (repos, scheduler) = build_scheduler(&db_path);
    let now = Utc::now();

    let line = test_helpers::create_test_line("LINE-01", &["CAT-A"], Some(100.0));
    repos.line_repo.insert(&line).expect("插入产线失败");

    // 两笔不允许合批的订单,首批排出先后两个任务
    let mut o1 = test_helpers::create_test_order(
        "ORD-001",
        "CAT-A",
        500.0,
        8,
        Some(now + Duration::hours(48)),
    );
    o1.allow_mix_batch = false;
    let mut o2 = test_helpers::create_test_order(
        "ORD-002",
        "CAT-A",
        200.0,
        5,
        Some(now + Duration::hours(50)),
    );
    o2.allow_mix_batch = false;
    repos.order_repo.insert(&o1).expect("插入订单失败");
    repos.order_repo.insert(&o2).expect("插入订单失败");

    let first = scheduler
        .batch_schedule(now, 7)
        .await
        .expect("首次排产失败");
    assert_eq!(first.tasks.len(), 2);
    let first_batch_no = first.batch_no.clone();
    let second_task_id = first
        .tasks
        .iter()
        .find(|t| t.order_id == "ORD-002")
        .expect("应有ORD-002任务")
        .task_id
        .clone();
    let first_task_end = first
        .tasks
        .iter()
        .find(|t| t.order_id == "ORD-001")
        .expect("应有ORD-001任务")
        .end_time;

    // 从 1 小时后重排: ORD-001 任务已开工(开工时间在重排点之前)保留,ORD-002 任务取消重排
    let second = scheduler
        .reschedule(now + Duration::hours(1))
        .await
        .expect("重排失败");

    assert_eq!(second.total_orders, 1, "只有ORD-002被回退重排");
    assert_eq!(second.scheduled_orders, 1);
    assert_eq!(second.tasks.len(), 1);
    assert_ne!(second.batch_no, first_batch_no);

    // 旧任务已取消,新任务紧跟保留任务之后(同品类无换型)
    let cancelled = repos
        .task_repo
        .find_by_id(&second_task_id)
        .expect("查询任务失败")
        .expect("任务应存在");
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    assert_eq!(second.tasks[0].start_time, first_task_end);
    assert_eq!(second.tasks[0].changeover_minutes, 0);

    let saved_o2 = repos
        .order_repo
        .find_by_id("ORD-002")
        .expect("查询订单失败")
        .expect("订单应存在");
    assert_eq!(saved_o2.status, OrderStatus::Scheduled);
    assert_eq!(
        saved_o2.batch_no.as_deref(),
        Some(second.batch_no.as_str())
    );

    // 产线上活动任务 = 保留任务 + 新任务
    let active = repos
        .task_repo
        .find_active_by_line("LINE-01")
        .expect("查询任务失败");
    assert_eq!(active.len(), 2);
}

// ==========================================
// 测试5: 锁线订单跳过品类校验
// ==========================================
#[tokio::test]
async fn test_batch_schedule_honors_pinned_line() {
    logging::init_test();
    let (_tmp, db_path) = test_helpers::create_test_db().expect("创建测试库失败");
    let (repos, scheduler) = build_scheduler(&db_path);
    let now = Utc::now();

    // LINE-01 可产 CAT-A,LINE-02 名义上只产 CAT-X
    let line_a = test_helpers::create_test_line("LINE-01", &["CAT-A"], Some(100.0));
    let line_x = test_helpers::create_test_line("LINE-02", &["CAT-X"], Some(100.0));
    repos.line_repo.insert(&line_a).expect("插入产线失败");
    repos.line_repo.insert(&line_x).expect("插入产线失败");

    let mut order = test_helpers::create_test_order(
        "ORD-001",
        "CAT-A",
        100.0,
        5,
        Some(now + Duration::hours(24)),
    );
    order.assigned_line_id = Some("LINE-02".to_string());
    repos.order_repo.insert(&order).expect("插入订单失败");

    let result = scheduler
        .batch_schedule(now, 7)
        .await
        .expect("批量排产失败");

    assert_eq!(result.tasks.len(), 1);
    assert_eq!(result.tasks[0].line_id, "LINE-02", "人工锁线优先于品类能力");
}

// ==========================================
// 测试6: 无可落位产线的订单保持待排
// ==========================================
#[tokio::test]
async fn test_batch_schedule_leaves_unplaceable_order_pending() {
    logging::init_test();
    let (_tmp, db_path) = test_helpers::create_test_db().expect("创建测试库失败");
    let (repos, scheduler) = build_scheduler(&db_path);
    let now = Utc::now();

    let line = test_helpers::create_test_line("LINE-01", &["CAT-A"], Some(100.0));
    repos.line_repo.insert(&line).expect("插入产线失败");

    let placeable = test_helpers::create_test_order("ORD-001", "CAT-A", 100.0, 5, None);
    let unplaceable = test_helpers::create_test_order("ORD-002", "CAT-Z", 100.0, 9, None);
    repos.order_repo.insert(&placeable).expect("插入订单失败");
    repos.order_repo.insert(&unplaceable).expect("插入订单失败");

    let result = scheduler
        .batch_schedule(now, 7)
        .await
        .expect("批量排产失败");

    assert_eq!(result.scheduled_orders, 1);
    assert_eq!(result.unscheduled_orders, 1);

    let saved = repos
        .order_repo
        .find_by_id("ORD-002")
        .expect("查询订单失败")
        .expect("订单应存在");
    assert_eq!(saved.status, OrderStatus::Pending, "未落位订单不应流转状态");
    assert!(saved.batch_no.is_none());
}
