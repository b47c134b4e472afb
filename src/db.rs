// ==========================================
// 产线排产系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为，避免“部分模块外键开启/部分不开启”
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 提供幂等建表入口，测试与嵌入场景共用同一份 DDL
// ==========================================

use rusqlite::Connection;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 幂等初始化全部业务表
///
/// 所有表采用 CREATE TABLE IF NOT EXISTS，重复调用安全。
/// 时间列统一存 TEXT（UTC, RFC3339 或 datetime('now')），JSON 列表存 TEXT。
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- 生产订单
        CREATE TABLE IF NOT EXISTS production_order (
            order_id TEXT PRIMARY KEY,
            order_no TEXT NOT NULL,
            product_category TEXT NOT NULL,
            product_spec TEXT,
            planned_qty REAL NOT NULL,
            completed_qty REAL NOT NULL DEFAULT 0,
            priority INTEGER NOT NULL DEFAULT 5,
            is_urgent INTEGER NOT NULL DEFAULT 0,
            allow_mix_batch INTEGER NOT NULL DEFAULT 0,
            earliest_start TEXT,
            latest_end TEXT,
            material_status TEXT NOT NULL DEFAULT 'READY',
            mold_id TEXT,
            assigned_line_id TEXT,
            pre_wait_minutes INTEGER NOT NULL DEFAULT 0,
            post_wait_minutes INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'PENDING',
            batch_no TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_order_status_deadline
            ON production_order(status, latest_end);

        -- 生产线
        CREATE TABLE IF NOT EXISTS production_line (
            line_id TEXT PRIMARY KEY,
            line_name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'AVAILABLE',
            producible_categories TEXT NOT NULL DEFAULT '[]',
            standard_capacity REAL,
            efficiency_factor REAL NOT NULL DEFAULT 1.0,
            standard_workers INTEGER NOT NULL DEFAULT 0,
            current_workers INTEGER NOT NULL DEFAULT 0,
            max_workers INTEGER NOT NULL DEFAULT 0,
            current_category TEXT,
            next_available_time TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- 换型规则（line_id 为 NULL 表示通用规则）
        CREATE TABLE IF NOT EXISTS changeover_rule (
            rule_id TEXT PRIMARY KEY,
            from_category TEXT NOT NULL,
            to_category TEXT NOT NULL,
            line_id TEXT,
            changeover_minutes INTEGER NOT NULL,
            requires_cleaning INTEGER NOT NULL DEFAULT 0,
            cleaning_minutes INTEGER NOT NULL DEFAULT 0,
            requires_mold_change INTEGER NOT NULL DEFAULT 0,
            mold_change_minutes INTEGER NOT NULL DEFAULT 0,
            requires_calibration INTEGER NOT NULL DEFAULT 0,
            calibration_minutes INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_changeover_pair
            ON changeover_rule(from_category, to_category);

        -- 排产任务
        CREATE TABLE IF NOT EXISTS schedule_task (
            task_id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL,
            line_id TEXT NOT NULL REFERENCES production_line(line_id),
            batch_no TEXT,
            sequence_no INTEGER NOT NULL DEFAULT 0,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            changeover_minutes INTEGER NOT NULL DEFAULT 0,
            planned_qty REAL NOT NULL,
            product_category TEXT NOT NULL,
            mold_id TEXT,
            is_mix_batch INTEGER NOT NULL DEFAULT 0,
            merged_order_ids TEXT,
            deadline_gap_minutes INTEGER,
            meets_deadline INTEGER NOT NULL DEFAULT 1,
            status TEXT NOT NULL DEFAULT 'PLANNED',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_task_line_start
            ON schedule_task(line_id, start_time);
        CREATE INDEX IF NOT EXISTS idx_task_batch
            ON schedule_task(batch_no);

        -- 排产冲突
        CREATE TABLE IF NOT EXISTS schedule_conflict (
            conflict_id TEXT PRIMARY KEY,
            conflict_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            line_id TEXT,
            task_ids TEXT NOT NULL,
            mold_id TEXT,
            window_start TEXT,
            window_end TEXT,
            description TEXT NOT NULL,
            suggestion TEXT,
            resolved INTEGER NOT NULL DEFAULT 0,
            resolution_method TEXT,
            resolved_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_conflict_open
            ON schedule_conflict(resolved, conflict_type);

        -- 工人
        CREATE TABLE IF NOT EXISTS worker (
            worker_id TEXT PRIMARY KEY,
            worker_name TEXT NOT NULL,
            skill_level INTEGER NOT NULL DEFAULT 1,
            default_line_id TEXT,
            status TEXT NOT NULL DEFAULT 'AVAILABLE',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_worker_line
            ON worker(default_line_id, status);

        -- 工人任务分配
        CREATE TABLE IF NOT EXISTS worker_assignment (
            assignment_id TEXT PRIMARY KEY,
            task_id TEXT NOT NULL REFERENCES schedule_task(task_id) ON DELETE CASCADE,
            worker_id TEXT NOT NULL REFERENCES worker(worker_id),
            line_id TEXT NOT NULL,
            batch_no TEXT,
            assigned_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_assignment_task
            ON worker_assignment(task_id);

        -- 模具
        CREATE TABLE IF NOT EXISTS mold (
            mold_id TEXT PRIMARY KEY,
            mold_name TEXT NOT NULL,
            category TEXT,
            status TEXT NOT NULL DEFAULT 'AVAILABLE',
            line_id TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- 配置作用域与键值
        CREATE TABLE IF NOT EXISTS config_scope (
            scope_id TEXT PRIMARY KEY,
            scope_type TEXT NOT NULL,
            scope_key TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(scope_type, scope_key)
        );
        INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
        VALUES ('global', 'GLOBAL', 'global');

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );
        "#,
    )?;
    Ok(())
}
