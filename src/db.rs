// ==========================================
// 农场生产分组系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键约束每个连接单独开启）
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 提供建表脚本（测试与命令行工具共用）
// ==========================================

use rusqlite::Connection;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 配置 SQLite 连接的统一 PRAGMA
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

/// 建表（幂等）
///
/// 说明：
/// - plot_cultivation 保存地块在某季某年的计划品种与播种日期
/// - group_plot 的 UNIQUE(plot_id, season_id, year) 保证一个地块每季最多属于一个分组，
///   并发运行争用同一地块时第二个提交会因唯一约束失败
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS farmer (
            farmer_id TEXT PRIMARY KEY,
            farmer_name TEXT,
            status TEXT NOT NULL DEFAULT 'NORMAL'
        );

        CREATE TABLE IF NOT EXISTS supervisor (
            supervisor_id TEXT PRIMARY KEY,
            cluster_id TEXT NOT NULL,
            supervisor_name TEXT,
            is_active INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS plot (
            plot_id TEXT PRIMARY KEY,
            farmer_id TEXT NOT NULL REFERENCES farmer(farmer_id),
            cluster_id TEXT NOT NULL,
            area_ha REAL NOT NULL,
            soil_type TEXT,
            status TEXT NOT NULL DEFAULT 'ACTIVE',
            centroid_lon REAL,
            centroid_lat REAL,
            boundary_json TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_plot_cluster ON plot(cluster_id);

        CREATE TABLE IF NOT EXISTS plot_cultivation (
            plot_id TEXT NOT NULL REFERENCES plot(plot_id),
            season_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            rice_variety_id TEXT,
            planting_date TEXT,
            PRIMARY KEY (plot_id, season_id, year)
        );

        CREATE TABLE IF NOT EXISTS grouping_group (
            group_id TEXT PRIMARY KEY,
            group_name TEXT NOT NULL,
            cluster_id TEXT NOT NULL,
            season_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            status TEXT NOT NULL,
            total_area_ha REAL NOT NULL,
            planting_date TEXT NOT NULL,
            rice_variety_id TEXT NOT NULL,
            supervisor_id TEXT,
            is_exception INTEGER NOT NULL DEFAULT 0,
            exception_reason TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_group_scope ON grouping_group(cluster_id, season_id, year);

        CREATE TABLE IF NOT EXISTS group_plot (
            group_id TEXT NOT NULL REFERENCES grouping_group(group_id),
            plot_id TEXT NOT NULL REFERENCES plot(plot_id),
            season_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            seq_no INTEGER NOT NULL,
            PRIMARY KEY (group_id, plot_id),
            UNIQUE (plot_id, season_id, year)
        );
        "#,
    )
}
