// ==========================================
// 发酵批次与罐位分配引擎 - 发酵罐数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 无状态仓储, 所有函数接收 &Connection,
//       以便在编排器的事务内直接复用 (避免嵌套加锁)
// ==========================================

use crate::db::{format_ts, ts_column};
use crate::domain::tank::Tank;
use crate::domain::types::TankStatus;
use crate::repository::error::RepositoryResult;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};

const TANK_COLUMNS: &str = r#"
    tank_id, tenant_id, name, capacity, status,
    current_volume, current_lot_code, current_batch_label, updated_at
"#;

/// 发酵罐仓储 (资源登记表)
pub struct TankRepository;

impl TankRepository {
    fn map_row(row: &Row<'_>) -> SqliteResult<Tank> {
        Ok(Tank {
            tank_id: row.get(0)?,
            tenant_id: row.get(1)?,
            name: row.get(2)?,
            capacity: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
            status: TankStatus::from_str(&row.get::<_, String>(4)?),
            current_volume: row.get(5)?,
            current_lot_code: row.get(6)?,
            current_batch_label: row.get(7)?,
            updated_at: ts_column(row, 8)?,
        })
    }

    /// 登记发酵罐
    pub fn insert(conn: &Connection, tank: &Tank) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO tank (
                tank_id, tenant_id, name, capacity, status,
                current_volume, current_lot_code, current_batch_label, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                tank.tank_id,
                tank.tenant_id,
                tank.name,
                tank.capacity,
                tank.status.to_db_str(),
                tank.current_volume,
                tank.current_lot_code,
                tank.current_batch_label,
                format_ts(&tank.updated_at),
            ],
        )?;
        Ok(())
    }

    /// 按租户 + 罐ID查询
    ///
    /// 其他租户的罐视为不存在
    pub fn find_by_id(
        conn: &Connection,
        tenant_id: &str,
        tank_id: &str,
    ) -> RepositoryResult<Option<Tank>> {
        let sql = format!(
            "SELECT {} FROM tank WHERE tenant_id = ?1 AND tank_id = ?2",
            TANK_COLUMNS
        );
        let tank = conn
            .query_row(&sql, params![tenant_id, tank_id], Self::map_row)
            .optional()?;
        Ok(tank)
    }

    /// 查询租户下所有罐（按名称排序）
    pub fn list_by_tenant(conn: &Connection, tenant_id: &str) -> RepositoryResult<Vec<Tank>> {
        let sql = format!(
            "SELECT {} FROM tank WHERE tenant_id = ?1 ORDER BY name",
            TANK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let tanks = stmt
            .query_map(params![tenant_id], Self::map_row)?
            .collect::<SqliteResult<Vec<Tank>>>()?;
        Ok(tanks)
    }

    /// 刷新展示冗余字段（状态 / 当前体积 / 当前酒批 / 当前批次）
    ///
    /// # 返回
    /// - Ok(rows): 被更新的行数（0 表示罐不存在）
    pub fn update_display(
        conn: &Connection,
        tank_id: &str,
        status: TankStatus,
        current_volume: f64,
        current_lot_code: Option<&str>,
        current_batch_label: Option<&str>,
        updated_at: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            r#"
            UPDATE tank
            SET status = ?2, current_volume = ?3, current_lot_code = ?4,
                current_batch_label = ?5, updated_at = ?6
            WHERE tank_id = ?1
            "#,
            params![
                tank_id,
                status.to_db_str(),
                current_volume,
                current_lot_code,
                current_batch_label,
                format_ts(&updated_at),
            ],
        )?;
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

    fn make_tank(tank_id: &str, tenant_id: &str, name: &str) -> Tank {
        Tank {
            tank_id: tank_id.to_string(),
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
            capacity: 1000.0,
            status: TankStatus::Available,
            current_volume: 0.0,
            current_lot_code: None,
            current_batch_label: None,
            updated_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn test_find_by_id_is_tenant_scoped() {
        let conn = setup_test_db();
        TankRepository::insert(&conn, &make_tank("T1", "brewery-a", "FV-01")).unwrap();

        assert!(TankRepository::find_by_id(&conn, "brewery-a", "T1")
            .unwrap()
            .is_some());
        assert!(TankRepository::find_by_id(&conn, "brewery-b", "T1")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_update_display() {
        let conn = setup_test_db();
        TankRepository::insert(&conn, &make_tank("T1", "brewery-a", "FV-01")).unwrap();

        let rows = TankRepository::update_display(
            &conn,
            "T1",
            TankStatus::Occupied,
            450.0,
            Some("LOT-20260301-001"),
            Some("#42"),
            Utc::now().naive_utc(),
        )
        .unwrap();
        assert_eq!(rows, 1);

        let tank = TankRepository::find_by_id(&conn, "brewery-a", "T1")
            .unwrap()
            .unwrap();
        assert_eq!(tank.status, TankStatus::Occupied);
        assert_eq!(tank.current_volume, 450.0);
        assert_eq!(tank.current_lot_code.as_deref(), Some("LOT-20260301-001"));

        let missing = TankRepository::update_display(
            &conn,
            "T404",
            TankStatus::Occupied,
            1.0,
            None,
            None,
            Utc::now().naive_utc(),
        )
        .unwrap();
        assert_eq!(missing, 0);
    }

    #[test]
    fn test_list_by_tenant_sorted() {
        let conn = setup_test_db();
        TankRepository::insert(&conn, &make_tank("T2", "brewery-a", "FV-02")).unwrap();
        TankRepository::insert(&conn, &make_tank("T1", "brewery-a", "FV-01")).unwrap();
        TankRepository::insert(&conn, &make_tank("T3", "brewery-b", "FV-01")).unwrap();

        let tanks = TankRepository::list_by_tenant(&conn, "brewery-a").unwrap();
        let names: Vec<&str> = tanks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["FV-01", "FV-02"]);
    }
}
