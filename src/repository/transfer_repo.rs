// ==========================================
// 发酵批次与罐位分配引擎 - 转移记录数据仓储
// ==========================================
// 红线: 转移记录只插入, 不提供更新/删除
// ==========================================

use crate::db::{format_ts, ts_column};
use crate::domain::transfer::Transfer;
use crate::domain::types::{TransferStatus, TransferType};
use crate::repository::error::RepositoryResult;
use rusqlite::{params, Connection, Result as SqliteResult};

/// 转移记录仓储
pub struct TransferRepository;

impl TransferRepository {
    /// 插入转移记录
    pub fn insert(conn: &Connection, t: &Transfer) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO transfer (
                transfer_id, tenant_id, transfer_type, source_tank_id, destination_tank_id,
                source_lot_id, destination_lot_id, batch_id, volume, status,
                executed_by, executed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                t.transfer_id,
                t.tenant_id,
                t.transfer_type.to_db_str(),
                t.source_tank_id,
                t.destination_tank_id,
                t.source_lot_id,
                t.destination_lot_id,
                t.batch_id,
                t.volume,
                t.status.to_db_str(),
                t.executed_by,
                format_ts(&t.executed_at),
            ],
        )?;
        Ok(())
    }

    /// 查询与酒批相关的转移（作为来源或目的）
    pub fn find_by_lot(conn: &Connection, lot_id: &str) -> RepositoryResult<Vec<Transfer>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT transfer_id, tenant_id, transfer_type, source_tank_id, destination_tank_id,
                   source_lot_id, destination_lot_id, batch_id, volume, status,
                   executed_by, executed_at
            FROM transfer
            WHERE source_lot_id = ?1 OR destination_lot_id = ?1
            ORDER BY executed_at, rowid
            "#,
        )?;
        let rows = stmt
            .query_map(params![lot_id], |row| {
                Ok(Transfer {
                    transfer_id: row.get(0)?,
                    tenant_id: row.get(1)?,
                    transfer_type: TransferType::from_str(&row.get::<_, String>(2)?),
                    source_tank_id: row.get(3)?,
                    destination_tank_id: row.get(4)?,
                    source_lot_id: row.get(5)?,
                    destination_lot_id: row.get(6)?,
                    batch_id: row.get(7)?,
                    volume: row.get(8)?,
                    status: TransferStatus::from_str(&row.get::<_, String>(9)?),
                    executed_by: row.get(10)?,
                    executed_at: ts_column(row, 11)?,
                })
            })?
            .collect::<SqliteResult<Vec<Transfer>>>()?;
        Ok(rows)
    }
}
