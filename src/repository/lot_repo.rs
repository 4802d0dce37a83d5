// ==========================================
// 发酵批次与罐位分配引擎 - 酒批数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 覆盖: lot / lot_batch 两张表
// ==========================================

use crate::db::{format_ts, opt_ts_column, ts_column};
use crate::domain::lot::{Lot, LotBatch};
use crate::domain::types::{LotPhase, LotStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};

const LOT_COLUMNS: &str = r#"
    lot_id, tenant_id, lot_code, phase, status, planned_volume, parent_lot_id,
    is_blend_result, is_blend_target, blended_at, notes, created_by, created_at, updated_at
"#;

/// 酒批仓储
pub struct LotRepository;

impl LotRepository {
    fn map_row(row: &Row<'_>) -> SqliteResult<Lot> {
        Ok(Lot {
            lot_id: row.get(0)?,
            tenant_id: row.get(1)?,
            lot_code: row.get(2)?,
            phase: LotPhase::from_str(&row.get::<_, String>(3)?).unwrap_or(LotPhase::Primary),
            status: LotStatus::from_str(&row.get::<_, String>(4)?),
            planned_volume: row.get(5)?,
            parent_lot_id: row.get(6)?,
            is_blend_result: row.get::<_, i64>(7)? != 0,
            is_blend_target: row.get::<_, i64>(8)? != 0,
            blended_at: opt_ts_column(row, 9)?,
            notes: row.get(10)?,
            created_by: row.get(11)?,
            created_at: ts_column(row, 12)?,
            updated_at: ts_column(row, 13)?,
        })
    }

    // ==========================================
    // lot
    // ==========================================

    /// 插入酒批
    pub fn insert(conn: &Connection, lot: &Lot) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO lot (
                lot_id, tenant_id, lot_code, phase, status, planned_volume, parent_lot_id,
                is_blend_result, is_blend_target, blended_at, notes, created_by, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                lot.lot_id,
                lot.tenant_id,
                lot.lot_code,
                lot.phase.to_db_str(),
                lot.status.to_db_str(),
                lot.planned_volume,
                lot.parent_lot_id,
                lot.is_blend_result as i64,
                lot.is_blend_target as i64,
                lot.blended_at.as_ref().map(format_ts),
                lot.notes,
                lot.created_by,
                format_ts(&lot.created_at),
                format_ts(&lot.updated_at),
            ],
        )?;
        Ok(())
    }

    /// 按租户查询酒批
    pub fn find_by_id(
        conn: &Connection,
        tenant_id: &str,
        lot_id: &str,
    ) -> RepositoryResult<Option<Lot>> {
        let sql = format!(
            "SELECT {} FROM lot WHERE tenant_id = ?1 AND lot_id = ?2",
            LOT_COLUMNS
        );
        let lot = conn
            .query_row(&sql, params![tenant_id, lot_id], Self::map_row)
            .optional()?;
        Ok(lot)
    }

    /// 查询分罐子批（按编码排序）
    pub fn find_children(conn: &Connection, parent_lot_id: &str) -> RepositoryResult<Vec<Lot>> {
        let sql = format!(
            "SELECT {} FROM lot WHERE parent_lot_id = ?1 ORDER BY lot_code",
            LOT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let lots = stmt
            .query_map(params![parent_lot_id], Self::map_row)?
            .collect::<SqliteResult<Vec<Lot>>>()?;
        Ok(lots)
    }

    /// 查询租户下以指定前缀开头的全部编码（编码序号生成用）
    pub fn list_codes_with_prefix(
        conn: &Connection,
        tenant_id: &str,
        prefix: &str,
    ) -> RepositoryResult<Vec<String>> {
        let pattern = format!(
            "{}%",
            prefix
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_")
        );
        let mut stmt = conn.prepare(
            "SELECT lot_code FROM lot WHERE tenant_id = ?1 AND lot_code LIKE ?2 ESCAPE '\\' ORDER BY lot_code",
        )?;
        let codes = stmt
            .query_map(params![tenant_id, pattern], |row| row.get::<_, String>(0))?
            .collect::<SqliteResult<Vec<String>>>()?;
        Ok(codes)
    }

    /// 编码是否已被占用
    pub fn code_exists(conn: &Connection, tenant_id: &str, lot_code: &str) -> RepositoryResult<bool> {
        let exists = conn
            .query_row(
                "SELECT 1 FROM lot WHERE tenant_id = ?1 AND lot_code = ?2 LIMIT 1",
                params![tenant_id, lot_code],
                |_row| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(exists)
    }

    /// 增加计划体积
    pub fn add_planned_volume(
        conn: &Connection,
        lot_id: &str,
        delta: f64,
        updated_at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let rows = conn.execute(
            "UPDATE lot SET planned_volume = planned_volume + ?2, updated_at = ?3 WHERE lot_id = ?1",
            params![lot_id, delta, format_ts(&updated_at)],
        )?;
        Self::ensure_updated(rows, lot_id)
    }

    /// 标记为混酿结果（同时置混酿目标标记）
    ///
    /// `new_code` 为 None 时保留原编码
    pub fn mark_blend_result(
        conn: &Connection,
        lot_id: &str,
        blended_at: NaiveDateTime,
        new_code: Option<&str>,
    ) -> RepositoryResult<()> {
        let ts = format_ts(&blended_at);
        let rows = conn.execute(
            r#"
            UPDATE lot
            SET is_blend_result = 1,
                is_blend_target = 1,
                blended_at = ?2,
                lot_code = COALESCE(?3, lot_code),
                updated_at = ?2
            WHERE lot_id = ?1
            "#,
            params![lot_id, ts, new_code],
        )?;
        Self::ensure_updated(rows, lot_id)
    }

    fn ensure_updated(rows: usize, lot_id: &str) -> RepositoryResult<()> {
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Lot".to_string(),
                id: lot_id.to_string(),
            });
        }
        Ok(())
    }

    // ==========================================
    // lot_batch
    // ==========================================

    /// 插入批次贡献
    pub fn insert_lot_batch(conn: &Connection, row: &LotBatch) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO lot_batch (
                lot_batch_id, lot_id, batch_id, volume_contribution, batch_percentage, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                row.lot_batch_id,
                row.lot_id,
                row.batch_id,
                row.volume_contribution,
                row.batch_percentage,
                format_ts(&row.created_at),
            ],
        )?;
        Ok(())
    }

    /// 查询酒批的批次贡献
    pub fn list_lot_batches(conn: &Connection, lot_id: &str) -> RepositoryResult<Vec<LotBatch>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT lot_batch_id, lot_id, batch_id, volume_contribution, batch_percentage, created_at
            FROM lot_batch WHERE lot_id = ?1
            ORDER BY created_at, rowid
            "#,
        )?;
        let rows = stmt
            .query_map(params![lot_id], |row| {
                Ok(LotBatch {
                    lot_batch_id: row.get(0)?,
                    lot_id: row.get(1)?,
                    batch_id: row.get(2)?,
                    volume_contribution: row.get(3)?,
                    batch_percentage: row.get(4)?,
                    created_at: ts_column(row, 5)?,
                })
            })?
            .collect::<SqliteResult<Vec<LotBatch>>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn setup_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        conn
    }

    fn make_lot(lot_id: &str, code: &str) -> Lot {
        let now = Utc::now().naive_utc();
        Lot {
            lot_id: lot_id.to_string(),
            tenant_id: "brewery-a".to_string(),
            lot_code: code.to_string(),
            phase: LotPhase::Primary,
            status: LotStatus::Active,
            planned_volume: 100.0,
            parent_lot_id: None,
            is_blend_result: false,
            is_blend_target: false,
            blended_at: None,
            notes: None,
            created_by: "brewer".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_code_unique_per_tenant() {
        let conn = setup_test_db();
        LotRepository::insert(&conn, &make_lot("L1", "LOT-20260301-001")).unwrap();

        let err = LotRepository::insert(&conn, &make_lot("L2", "LOT-20260301-001")).unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));

        let mut other_tenant = make_lot("L3", "LOT-20260301-001");
        other_tenant.tenant_id = "brewery-b".to_string();
        LotRepository::insert(&conn, &other_tenant).unwrap();
    }

    #[test]
    fn test_list_codes_with_prefix() {
        let conn = setup_test_db();
        LotRepository::insert(&conn, &make_lot("L1", "LOT-20260301-001")).unwrap();
        LotRepository::insert(&conn, &make_lot("L2", "LOT-20260301-002")).unwrap();
        LotRepository::insert(&conn, &make_lot("L3", "BLEND-20260301-001")).unwrap();
        LotRepository::insert(&conn, &make_lot("L4", "LOTX20260301-009")).unwrap();

        assert_eq!(
            LotRepository::list_codes_with_prefix(&conn, "brewery-a", "LOT-20260301-").unwrap(),
            vec!["LOT-20260301-001".to_string(), "LOT-20260301-002".to_string()]
        );
        assert!(LotRepository::list_codes_with_prefix(&conn, "brewery-b", "LOT-20260301-")
            .unwrap()
            .is_empty());
        assert!(LotRepository::code_exists(&conn, "brewery-a", "BLEND-20260301-001").unwrap());
    }

    #[test]
    fn test_mark_blend_result_keeps_code_when_none() {
        let conn = setup_test_db();
        LotRepository::insert(&conn, &make_lot("L1", "LOT-20260301-001")).unwrap();

        let now = Utc::now().naive_utc();
        LotRepository::mark_blend_result(&conn, "L1", now, None).unwrap();
        let lot = LotRepository::find_by_id(&conn, "brewery-a", "L1").unwrap().unwrap();
        assert!(lot.is_blend_result);
        assert!(lot.is_blend_target);
        assert_eq!(lot.lot_code, "LOT-20260301-001");
        assert_eq!(lot.blended_at, Some(now));

        LotRepository::mark_blend_result(&conn, "L1", now, Some("BLEND-20260301-001")).unwrap();
        let lot = LotRepository::find_by_id(&conn, "brewery-a", "L1").unwrap().unwrap();
        assert_eq!(lot.lot_code, "BLEND-20260301-001");
    }

    #[test]
    fn test_add_planned_volume_and_children() {
        let conn = setup_test_db();
        LotRepository::insert(&conn, &make_lot("P1", "LOT-20260301-001")).unwrap();
        let mut child = make_lot("C1", "LOT-20260301-001-1");
        child.parent_lot_id = Some("P1".to_string());
        LotRepository::insert(&conn, &child).unwrap();

        LotRepository::add_planned_volume(&conn, "P1", 50.0, Utc::now().naive_utc()).unwrap();
        let parent = LotRepository::find_by_id(&conn, "brewery-a", "P1").unwrap().unwrap();
        assert_eq!(parent.planned_volume, 150.0);

        let children = LotRepository::find_children(&conn, "P1").unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].lot_id, "C1");

        assert!(LotRepository::add_planned_volume(&conn, "nope", 1.0, Utc::now().naive_utc()).is_err());
    }
}
