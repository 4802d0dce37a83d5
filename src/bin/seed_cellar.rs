// ==========================================
// 发酵批次与罐位分配引擎 - 酒窖种子数据导入
// ==========================================
// 用法:
//   seed_cellar <tenant_id> <tanks.csv> [batches.csv] [db_path]
//
// tanks.csv 表头:   tank_id,name,capacity[,status]
// batches.csv 表头: batch_id,batch_number[,recipe_name,style_family,status]
// ==========================================
// 说明: 开发 / 演示用的夹具加载器, 已存在的罐与批次按主键跳过
// ==========================================

use anyhow::{bail, Context, Result};
use brew_lot_allocation::db::{get_default_db_path, init_schema, open_sqlite_connection};
use brew_lot_allocation::domain::types::{BatchStatus, TankStatus};
use brew_lot_allocation::domain::{Batch, Tank};
use brew_lot_allocation::logging;
use brew_lot_allocation::repository::{BatchRepository, RepositoryError, TankRepository};
use chrono::Utc;
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// 读取 CSV 为 (行号, 表头 → 值) 列表
fn read_csv_records(path: &Path) -> Result<Vec<(usize, HashMap<String, String>)>> {
    let file = File::open(path).with_context(|| format!("打开 {} 失败", path.display()))?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let mut records = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result?;
        let mut row_map = HashMap::new();
        for (col_idx, value) in record.iter().enumerate() {
            if let Some(header) = headers.get(col_idx) {
                row_map.insert(header.clone(), value.trim().to_string());
            }
        }
        // 跳过完全空白的行
        if row_map.values().all(|v| v.is_empty()) {
            continue;
        }
        // 表头占第 1 行
        records.push((row_idx + 2, row_map));
    }
    Ok(records)
}

fn required(row: &HashMap<String, String>, field: &str, line: usize) -> Result<String> {
    match row.get(field).filter(|v| !v.is_empty()) {
        Some(v) => Ok(v.clone()),
        None => bail!("第 {} 行缺少字段 {}", line, field),
    }
}

fn optional(row: &HashMap<String, String>, field: &str) -> Option<String> {
    row.get(field).filter(|v| !v.is_empty()).cloned()
}

fn parse_tank(tenant_id: &str, line: usize, row: &HashMap<String, String>) -> Result<Tank> {
    let raw_capacity = required(row, "capacity", line)?;
    let capacity: f64 = raw_capacity
        .parse()
        .with_context(|| format!("第 {} 行容量无效: {}", line, raw_capacity))?;
    if !capacity.is_finite() || capacity <= 0.0 {
        bail!("第 {} 行容量必须大于 0: {}", line, raw_capacity);
    }
    let status = optional(row, "status")
        .map(|s| TankStatus::from_str(&s.to_uppercase()))
        .unwrap_or(TankStatus::Available);

    Ok(Tank {
        tank_id: required(row, "tank_id", line)?,
        tenant_id: tenant_id.to_string(),
        name: required(row, "name", line)?,
        capacity,
        status,
        current_volume: 0.0,
        current_lot_code: None,
        current_batch_label: None,
        updated_at: Utc::now().naive_utc(),
    })
}

fn parse_batch(tenant_id: &str, line: usize, row: &HashMap<String, String>) -> Result<Batch> {
    let status = match optional(row, "status") {
        Some(raw) => BatchStatus::from_str(&raw.to_uppercase())
            .with_context(|| format!("第 {} 行批次状态无效: {}", line, raw))?,
        None => BatchStatus::Brewing,
    };

    Ok(Batch {
        batch_id: required(row, "batch_id", line)?,
        tenant_id: tenant_id.to_string(),
        batch_number: required(row, "batch_number", line)?,
        recipe_name: optional(row, "recipe_name"),
        style_family: optional(row, "style_family"),
        status,
        updated_at: Utc::now().naive_utc(),
    })
}

fn main() -> Result<()> {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("用法: seed_cellar <tenant_id> <tanks.csv> [batches.csv] [db_path]");
        bail!("参数不足");
    }
    let tenant_id = args[0].trim().to_string();
    if tenant_id.is_empty() {
        bail!("租户标识不能为空");
    }
    let db_path = args.get(3).cloned().unwrap_or_else(get_default_db_path);

    let mut conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;
    let tx = conn.transaction()?;

    let mut tanks_inserted = 0usize;
    let mut skipped = 0usize;
    for (line, row) in read_csv_records(Path::new(&args[1]))? {
        let tank = parse_tank(&tenant_id, line, &row)?;
        match TankRepository::insert(&tx, &tank) {
            Ok(()) => tanks_inserted += 1,
            Err(RepositoryError::UniqueConstraintViolation(_)) => {
                tracing::warn!(tank_id = %tank.tank_id, "罐已存在, 跳过");
                skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    let mut batches_inserted = 0usize;
    if let Some(batches_csv) = args.get(2) {
        for (line, row) in read_csv_records(Path::new(batches_csv))? {
            let batch = parse_batch(&tenant_id, line, &row)?;
            match BatchRepository::insert(&tx, &batch) {
                Ok(()) => batches_inserted += 1,
                Err(RepositoryError::UniqueConstraintViolation(_)) => {
                    tracing::warn!(batch_id = %batch.batch_id, "批次已存在, 跳过");
                    skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    tx.commit()?;
    tracing::info!(
        db_path = %db_path,
        tenant_id = %tenant_id,
        tanks = tanks_inserted,
        batches = batches_inserted,
        skipped,
        "种子数据导入完成"
    );
    println!(
        "导入完成: 罐 {} / 批次 {} / 跳过 {}",
        tanks_inserted, batches_inserted, skipped
    );
    Ok(())
}
