// ==========================================
// 加急插单集成测试
// ==========================================
// 测试目标: 验证插单点选取、级联顺延、插单落库的完整链路
// ==========================================


use std::sync::Arc;

use chrono::{Duration, Utc};
use prodline_aps::config::ConfigManager;
use prodline_aps::domain::types::{ConflictType, OrderStatus};
use prodline_aps::engine::{BatchScheduler, SchedulerRepositories, UrgentInsertionEngine};
use prodline_aps::logging;

fn build_engines(
    db_path: &str,
) -> (
    SchedulerRepositories,
    BatchScheduler<ConfigManager>,
    UrgentInsertionEngine<ConfigManager>,
) {
    let conn = test_helpers::open_shared_connection(db_path).expect("打开测试连接失败");
    let repos = SchedulerRepositories::from_connection(conn.clone());
    let config = Arc::new(ConfigManager::from_connection(conn).expect("创建配置管理器失败"));
    let scheduler = BatchScheduler::new(repos.clone(), config.clone());
    let urgent = UrgentInsertionEngine::new(repos.clone(), config);
    (repos, scheduler, urgent)
}

// ==========================================
// 测试1: 运行中产线插单,后序任务级联顺延
// ==========================================
#[tokio::test]
async fn test_urgent_insert_shifts_following_tasks() {
    logging::init_test();
    let (_tmp, db_path) = test_helpers::create_test_db().expect("创建测试库失败");
    let (repos, scheduler, urgent) = build_engines(&db_path);
    let now = Utc::now();

    let line = test_helpers::create_test_line("LINE-01", &["CAT-A", "CAT-B"], Some(100.0));
    repos.line_repo.insert(&line).expect("插入产线失败");
    let rule = test_helpers::create_test_changeover_rule("CAT-A", "CAT-B", 45);
    repos.changeover_repo.insert(&rule).expect("插入换型规则失败");
    let worker = test_helpers::create_test_worker("W1", "LINE-01");
    repos.worker_repo.insert(&worker).expect("插入工人失败");

    // 先排出两个 CAT-A 任务: [now, now+120) 与 [now+120, now+180)
    let mut o1 = test_helpers::create_test_order(
        "ORD-001",
        "CAT-A",
        200.0,
        5,
        Some(now + Duration::hours(24)),
    );
    o1.allow_mix_batch = false;
    let mut o2 = test_helpers::create_test_order(
        "ORD-002",
        "CAT-A",
        100.0,
        5,
        Some(now + Duration::hours(30)),
    );
    o2.allow_mix_batch = false;
    repos.order_repo.insert(&o1).expect("插入订单失败");
    repos.order_repo.insert(&o2).expect("插入订单失败");
    let first = scheduler.batch_schedule(now, 7).await.expect("批量排产失败");
    assert_eq!(first.tasks.len(), 2);
    let running_end = first
        .tasks
        .iter()
        .find(|t| t.order_id == "ORD-001")
        .expect("应有ORD-001任务")
        .end_time;

    // 加急 CAT-B 订单: 50 件 → 30 分钟,换型 45 分钟
    let urgent_order = test_helpers::create_test_order(
        "ORD-URG",
        "CAT-B",
        50.0,
        5,
        Some(now + Duration::hours(6)),
    );
    repos.order_repo.insert(&urgent_order).expect("插入订单失败");

    let result = urgent.insert("ORD-URG", now).await.expect("加急插单失败");

    // 插单点 = 运行中任务(ORD-001)完工时间 + 换型
    assert_eq!(result.line_id, "LINE-01");
    let inserted = &result.inserted_task;
    assert_eq!(inserted.start_time, running_end + Duration::minutes(45));
    assert_eq!(inserted.changeover_minutes, 45);
    assert_eq!(inserted.duration_minutes(), 30);
    assert_eq!(inserted.sequence_no, 2, "排在运行中任务之后");
    assert!(inserted.meets_deadline);

    // 级联顺延: 尚未开工的 ORD-002 任务整体平移 75 分钟
    assert_eq!(result.shifted_tasks.len(), 1);
    let shifted = &result.shifted_tasks[0];
    assert_eq!(shifted.order_id, "ORD-002");
    assert_eq!(shifted.start_time, inserted.end_time, "顺延后紧贴加急任务");
    assert_eq!(shifted.duration_minutes(), 60, "顺延不改变任务时长");

    // 顺延后的时间线不应产生新的时间重叠
    assert!(
        !result
            .conflicts
            .iter()
            .any(|c| c.conflict_type == ConflictType::TimeOverlap),
        "插单不应制造时间重叠"
    );

    // 落库: 订单提级 + 顺延时间持久化 + 配员
    let saved_order = repos
        .order_repo
        .find_by_id("ORD-URG")
        .expect("查询订单失败")
        .expect("订单应存在");
    assert!(saved_order.is_urgent);
    assert_eq!(saved_order.priority, 10);
    assert_eq!(saved_order.status, OrderStatus::Scheduled);
    assert!(saved_order.batch_no.is_some());

    let persisted_shifted = repos
        .task_repo
        .find_by_id(&shifted.task_id)
        .expect("查询任务失败")
        .expect("任务应存在");
    assert_eq!(persisted_shifted.start_time, shifted.start_time);
    assert_eq!(persisted_shifted.end_time, shifted.end_time);

    let assignments = repos
        .worker_repo
        .find_assignments_by_task(&inserted.task_id)
        .expect("查询配员失败");
    assert_eq!(assignments.len(), 1);

    // 产线快照: 队尾仍是顺延后的 CAT-A 任务
    let saved_line = repos
        .line_repo
        .find_by_id("LINE-01")
        .expect("查询产线失败")
        .expect("产线应存在");
    assert_eq!(saved_line.next_available_time, Some(shifted.end_time));
    assert_eq!(saved_line.current_category.as_deref(), Some("CAT-A"));
}

// ==========================================
// 测试2: 空闲产线插单立即开工
// ==========================================
#[tokio::test]
async fn test_urgent_insert_on_idle_line_starts_immediately() {
    logging::init_test();
    let (_tmp, db_path) = test_helpers::create_test_db().expect("创建测试库失败");
    let (repos, _scheduler, urgent) = build_engines(&db_path);
    let now = Utc::now();

    // 空产线且无在产品类 → 无换型,立即开工
    let line = test_helpers::create_test_line("LINE-01", &["CAT-B"], Some(100.0));
    repos.line_repo.insert(&line).expect("插入产线失败");
    let order = test_helpers::create_test_order(
        "ORD-URG",
        "CAT-B",
        100.0,
        5,
        Some(now + Duration::hours(6)),
    );
    repos.order_repo.insert(&order).expect("插入订单失败");

    let result = urgent.insert("ORD-URG", now).await.expect("加急插单失败");

    let inserted = &result.inserted_task;
    assert_eq!(inserted.start_time, now);
    assert_eq!(inserted.changeover_minutes, 0);
    assert_eq!(inserted.duration_minutes(), 60);
    assert_eq!(inserted.sequence_no, 1);
    assert!(result.shifted_tasks.is_empty());
    assert!(result.conflicts.is_empty());

    let saved_line = repos
        .line_repo
        .find_by_id("LINE-01")
        .expect("查询产线失败")
        .expect("产线应存在");
    assert_eq!(saved_line.current_category.as_deref(), Some("CAT-B"));
    assert_eq!(saved_line.next_available_time, Some(inserted.end_time));
}

// ==========================================
// 测试3: 非待排产订单拒绝插单
// ==========================================
#[tokio::test]
async fn test_urgent_insert_rejects_non_pending_order() {
    logging::init_test();
    let (_tmp, db_path) = test_helpers::create_test_db().expect("创建测试库失败");
    let (repos, _scheduler, urgent) = build_engines(&db_path);
    let now = Utc::now();

    let line = test_helpers::create_test_line("LINE-01", &["CAT-A"], Some(100.0));
    repos.line_repo.insert(&line).expect("插入产线失败");
    let mut order = test_helpers::create_test_order("ORD-001", "CAT-A", 100.0, 5, None);
    order.status = OrderStatus::Scheduled;
    repos.order_repo.insert(&order).expect("插入订单失败");

    let err = urgent
        .insert("ORD-001", now)
        .await
        .expect_err("已排产订单不应允许插单");
    assert!(err.to_string().contains("不允许插单"));

    // 订单不存在同样报错
    let err = urgent
        .insert("ORD-MISSING", now)
        .await
        .expect_err("不存在的订单应报错");
    assert!(err.to_string().contains("订单不存在"));
}
