// ==========================================
// 发酵批次与罐位分配引擎 - 罐占用数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑 (重叠/容量判定在 engine 层)
// ==========================================

use crate::db::{format_ts, ts_column};
use crate::domain::assignment::TankAssignment;
use crate::domain::types::{AssignmentStatus, LotPhase};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};

const ASSIGNMENT_COLUMNS: &str = r#"
    assignment_id, tenant_id, tank_id, lot_id, planned_start, planned_end,
    planned_volume, actual_volume, phase, status, created_by, created_at, updated_at
"#;

/// 罐占用仓储
pub struct AssignmentRepository;

impl AssignmentRepository {
    fn map_row(row: &Row<'_>) -> SqliteResult<TankAssignment> {
        Ok(TankAssignment {
            assignment_id: row.get(0)?,
            tenant_id: row.get(1)?,
            tank_id: row.get(2)?,
            lot_id: row.get(3)?,
            planned_start: ts_column(row, 4)?,
            planned_end: ts_column(row, 5)?,
            planned_volume: row.get(6)?,
            actual_volume: row.get(7)?,
            phase: LotPhase::from_str(&row.get::<_, String>(8)?).unwrap_or(LotPhase::Primary),
            status: AssignmentStatus::from_str(&row.get::<_, String>(9)?),
            created_by: row.get(10)?,
            created_at: ts_column(row, 11)?,
            updated_at: ts_column(row, 12)?,
        })
    }

    /// 插入罐占用
    pub fn insert(conn: &Connection, a: &TankAssignment) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO tank_assignment (
                assignment_id, tenant_id, tank_id, lot_id, planned_start, planned_end,
                planned_volume, actual_volume, phase, status, created_by, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                a.assignment_id,
                a.tenant_id,
                a.tank_id,
                a.lot_id,
                format_ts(&a.planned_start),
                format_ts(&a.planned_end),
                a.planned_volume,
                a.actual_volume,
                a.phase.to_db_str(),
                a.status.to_db_str(),
                a.created_by,
                format_ts(&a.created_at),
                format_ts(&a.updated_at),
            ],
        )?;
        Ok(())
    }

    /// 按ID查询
    pub fn find_by_id(
        conn: &Connection,
        assignment_id: &str,
    ) -> RepositoryResult<Option<TankAssignment>> {
        let sql = format!(
            "SELECT {} FROM tank_assignment WHERE assignment_id = ?1",
            ASSIGNMENT_COLUMNS
        );
        let a = conn
            .query_row(&sql, params![assignment_id], Self::map_row)
            .optional()?;
        Ok(a)
    }

    /// 查询罐上所有 ACTIVE 占用（按计划开始时间排序）
    pub fn find_active_by_tank(
        conn: &Connection,
        tank_id: &str,
    ) -> RepositoryResult<Vec<TankAssignment>> {
        let sql = format!(
            r#"
            SELECT {} FROM tank_assignment
            WHERE tank_id = ?1 AND status = 'ACTIVE'
            ORDER BY planned_start, assignment_id
            "#,
            ASSIGNMENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![tank_id], Self::map_row)?
            .collect::<SqliteResult<Vec<TankAssignment>>>()?;
        Ok(rows)
    }

    /// 查询酒批当前占用（ACTIVE 或 PLANNED, 取最新一条）
    pub fn find_current_for_lot(
        conn: &Connection,
        lot_id: &str,
    ) -> RepositoryResult<Option<TankAssignment>> {
        let sql = format!(
            r#"
            SELECT {} FROM tank_assignment
            WHERE lot_id = ?1 AND status IN ('ACTIVE', 'PLANNED')
            ORDER BY CASE status WHEN 'ACTIVE' THEN 0 ELSE 1 END, created_at DESC
            LIMIT 1
            "#,
            ASSIGNMENT_COLUMNS
        );
        let a = conn
            .query_row(&sql, params![lot_id], Self::map_row)
            .optional()?;
        Ok(a)
    }

    /// 查询酒批的全部占用
    pub fn find_by_lot(conn: &Connection, lot_id: &str) -> RepositoryResult<Vec<TankAssignment>> {
        let sql = format!(
            "SELECT {} FROM tank_assignment WHERE lot_id = ?1 ORDER BY created_at, assignment_id",
            ASSIGNMENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![lot_id], Self::map_row)?
            .collect::<SqliteResult<Vec<TankAssignment>>>()?;
        Ok(rows)
    }

    /// 增加计划体积（混酿并入时原地更新）
    pub fn add_planned_volume(
        conn: &Connection,
        assignment_id: &str,
        delta: f64,
        updated_at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let rows = conn.execute(
            r#"
            UPDATE tank_assignment
            SET planned_volume = planned_volume + ?2, updated_at = ?3
            WHERE assignment_id = ?1
            "#,
            params![assignment_id, delta, format_ts(&updated_at)],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "TankAssignment".to_string(),
                id: assignment_id.to_string(),
            });
        }
        Ok(())
    }
}
