// ==========================================
// 发酵批次与罐位分配引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为 (外键 / busy_timeout)
// - 统一建表脚本 (幂等), 记录 schema_version
// - 统一时间戳的存储格式
// ==========================================

use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use std::path::PathBuf;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
///
/// 并发分配请求使用 BEGIN IMMEDIATE 串行化写锁, 等待方依赖该超时排队
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 时间戳存储格式 (保留小数秒, 字典序与时间序一致)
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

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

/// 格式化时间戳
pub fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// 解析时间戳（兼容 ISO 的 T 分隔写法）
pub fn parse_ts(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
}

/// 读取时间戳列
///
/// 损坏的文本作为 FromSqlConversionFailure 返回, 由仓储层映射为 FieldValueError
pub fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// 读取可空时间戳列
pub fn opt_ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse_ts(&raw)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

/// 初始化全部表结构（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        -- 资源登记: 发酵罐
        CREATE TABLE IF NOT EXISTS tank (
            tank_id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            name TEXT NOT NULL,
            capacity REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'AVAILABLE',
            current_volume REAL NOT NULL DEFAULT 0,
            current_lot_code TEXT,
            current_batch_label TEXT,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS batch (
            batch_id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            batch_number TEXT NOT NULL,
            recipe_name TEXT,
            style_family TEXT,
            status TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS lot (
            lot_id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            lot_code TEXT NOT NULL,
            phase TEXT NOT NULL,
            status TEXT NOT NULL,
            planned_volume REAL NOT NULL,
            parent_lot_id TEXT REFERENCES lot(lot_id),
            is_blend_result INTEGER NOT NULL DEFAULT 0,
            is_blend_target INTEGER NOT NULL DEFAULT 0,
            blended_at TEXT,
            notes TEXT,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (tenant_id, lot_code)
        );

        CREATE TABLE IF NOT EXISTS lot_batch (
            lot_batch_id TEXT PRIMARY KEY,
            lot_id TEXT NOT NULL REFERENCES lot(lot_id),
            batch_id TEXT NOT NULL REFERENCES batch(batch_id),
            volume_contribution REAL NOT NULL,
            batch_percentage REAL NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tank_assignment (
            assignment_id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            tank_id TEXT NOT NULL REFERENCES tank(tank_id),
            lot_id TEXT NOT NULL REFERENCES lot(lot_id),
            planned_start TEXT NOT NULL,
            planned_end TEXT NOT NULL,
            planned_volume REAL NOT NULL,
            actual_volume REAL,
            phase TEXT NOT NULL,
            status TEXT NOT NULL,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tank_assignment_tank_status
            ON tank_assignment (tank_id, status);

        CREATE TABLE IF NOT EXISTS transfer (
            transfer_id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            transfer_type TEXT NOT NULL,
            source_tank_id TEXT,
            destination_tank_id TEXT NOT NULL,
            source_lot_id TEXT,
            destination_lot_id TEXT NOT NULL REFERENCES lot(lot_id),
            batch_id TEXT,
            volume REAL NOT NULL,
            status TEXT NOT NULL,
            executed_by TEXT NOT NULL,
            executed_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS gravity_reading (
            reading_id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL REFERENCES batch(batch_id),
            specific_gravity REAL NOT NULL,
            temperature REAL,
            recorded_at TEXT NOT NULL,
            recorded_by TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS batch_event (
            event_id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL REFERENCES batch(batch_id),
            event_type TEXT NOT NULL,
            message TEXT NOT NULL,
            metadata_json TEXT,
            created_at TEXT NOT NULL,
            created_by TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS allocation_log (
            action_id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            actor TEXT NOT NULL,
            scenario TEXT NOT NULL,
            lot_id TEXT NOT NULL,
            action_ts TEXT NOT NULL,
            payload_json TEXT,
            detail TEXT
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "BREW_ALLOC_DB_PATH";

/// 默认数据库路径
///
/// 优先使用环境变量 BREW_ALLOC_DB_PATH, 否则落在用户数据目录下
pub fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./brew_lot_allocation.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("brew-lot-allocation");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("brew_lot_allocation.db");
        }
    }
    path.to_string_lossy().to_string()
}
