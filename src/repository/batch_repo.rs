// ==========================================
// 发酵批次与罐位分配引擎 - 批次数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 覆盖: batch / gravity_reading / batch_event 三张表
// ==========================================

use crate::db::{format_ts, parse_ts, ts_column};
use crate::domain::batch::{Batch, BatchEvent, GravityReading};
use crate::domain::types::{BatchEventType, BatchStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result as SqliteResult, Row};

/// 批次仓储
pub struct BatchRepository;

impl BatchRepository {
    fn map_batch(row: &Row<'_>) -> SqliteResult<(Batch, String)> {
        let raw_status: String = row.get(5)?;
        Ok((
            Batch {
                batch_id: row.get(0)?,
                tenant_id: row.get(1)?,
                batch_number: row.get(2)?,
                recipe_name: row.get(3)?,
                style_family: row.get(4)?,
                status: BatchStatus::from_str(&raw_status).unwrap_or(BatchStatus::Planned),
                updated_at: ts_column(row, 6)?,
            },
            raw_status,
        ))
    }

    // ==========================================
    // batch
    // ==========================================

    /// 插入批次（上游登记 / 测试数据）
    pub fn insert(conn: &Connection, batch: &Batch) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO batch (
                batch_id, tenant_id, batch_number, recipe_name, style_family, status, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                batch.batch_id,
                batch.tenant_id,
                batch.batch_number,
                batch.recipe_name,
                batch.style_family,
                batch.status.to_db_str(),
                format_ts(&batch.updated_at),
            ],
        )?;
        Ok(())
    }

    /// 按租户查询单个批次
    pub fn find_by_id(
        conn: &Connection,
        tenant_id: &str,
        batch_id: &str,
    ) -> RepositoryResult<Option<Batch>> {
        let batch = conn
            .query_row(
                r#"
                SELECT batch_id, tenant_id, batch_number, recipe_name, style_family, status, updated_at
                FROM batch WHERE tenant_id = ?1 AND batch_id = ?2
                "#,
                params![tenant_id, batch_id],
                Self::map_batch,
            )
            .optional()?;
        Ok(batch.map(|(b, _)| b))
    }

    /// 按租户批量查询批次
    ///
    /// 不属于该租户的批次不会出现在结果中; 结果按传入顺序排列
    pub fn find_by_ids(
        conn: &Connection,
        tenant_id: &str,
        batch_ids: &[String],
    ) -> RepositoryResult<Vec<Batch>> {
        if batch_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders: Vec<String> = (0..batch_ids.len()).map(|i| format!("?{}", i + 2)).collect();
        let sql = format!(
            r#"
            SELECT batch_id, tenant_id, batch_number, recipe_name, style_family, status, updated_at
            FROM batch WHERE tenant_id = ?1 AND batch_id IN ({})
            "#,
            placeholders.join(", ")
        );

        let mut values: Vec<&str> = Vec::with_capacity(batch_ids.len() + 1);
        values.push(tenant_id);
        values.extend(batch_ids.iter().map(|s| s.as_str()));

        let mut stmt = conn.prepare(&sql)?;
        let mut found = stmt
            .query_map(params_from_iter(values), Self::map_batch)?
            .collect::<SqliteResult<Vec<(Batch, String)>>>()?;

        for (batch, raw) in &found {
            if BatchStatus::from_str(raw).is_none() {
                tracing::warn!(batch_id = %batch.batch_id, status = %raw, "未知批次状态, 按 PLANNED 处理");
            }
        }

        found.sort_by_key(|(b, _)| {
            batch_ids
                .iter()
                .position(|id| id == &b.batch_id)
                .unwrap_or(usize::MAX)
        });
        Ok(found.into_iter().map(|(b, _)| b).collect())
    }

    /// 更新批次状态
    pub fn update_status(
        conn: &Connection,
        batch_id: &str,
        status: BatchStatus,
        updated_at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let rows = conn.execute(
            "UPDATE batch SET status = ?2, updated_at = ?3 WHERE batch_id = ?1",
            params![batch_id, status.to_db_str(), format_ts(&updated_at)],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Batch".to_string(),
                id: batch_id.to_string(),
            });
        }
        Ok(())
    }

    // ==========================================
    // gravity_reading
    // ==========================================

    /// 追加比重读数
    pub fn insert_gravity_reading(
        conn: &Connection,
        reading: &GravityReading,
    ) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO gravity_reading (
                reading_id, batch_id, specific_gravity, temperature, recorded_at, recorded_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                reading.reading_id,
                reading.batch_id,
                reading.specific_gravity,
                reading.temperature,
                format_ts(&reading.recorded_at),
                reading.recorded_by,
            ],
        )?;
        Ok(())
    }

    /// 查询批次的比重读数（按时间升序）
    pub fn list_gravity_readings(
        conn: &Connection,
        batch_id: &str,
    ) -> RepositoryResult<Vec<GravityReading>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT reading_id, batch_id, specific_gravity, temperature, recorded_at, recorded_by
            FROM gravity_reading WHERE batch_id = ?1
            ORDER BY recorded_at, reading_id
            "#,
        )?;
        let readings = stmt
            .query_map(params![batch_id], |row| {
                Ok(GravityReading {
                    reading_id: row.get(0)?,
                    batch_id: row.get(1)?,
                    specific_gravity: row.get(2)?,
                    temperature: row.get(3)?,
                    recorded_at: ts_column(row, 4)?,
                    recorded_by: row.get(5)?,
                })
            })?
            .collect::<SqliteResult<Vec<GravityReading>>>()?;
        Ok(readings)
    }

    // ==========================================
    // batch_event
    // ==========================================

    /// 追加时间线事件
    pub fn insert_event(conn: &Connection, event: &BatchEvent) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO batch_event (
                event_id, batch_id, event_type, message, metadata_json, created_at, created_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                event.event_id,
                event.batch_id,
                event.event_type.to_db_str(),
                event.message,
                event.metadata_json.as_ref().map(|v| v.to_string()),
                format_ts(&event.created_at),
                event.created_by,
            ],
        )?;
        Ok(())
    }

    /// 查询批次时间线（按时间升序）
    pub fn list_events(conn: &Connection, batch_id: &str) -> RepositoryResult<Vec<BatchEvent>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT event_id, batch_id, event_type, message, metadata_json, created_at, created_by
            FROM batch_event WHERE batch_id = ?1
            ORDER BY created_at, rowid
            "#,
        )?;
        let rows = stmt
            .query_map(params![batch_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        let mut events = Vec::with_capacity(rows.len());
        for (event_id, batch_id, event_type, message, metadata, created_at, created_by) in rows {
            let event_type = BatchEventType::from_str(&event_type).ok_or_else(|| {
                RepositoryError::FieldValueError {
                    field: "event_type".to_string(),
                    message: format!("未知事件类型: {}", event_type),
                }
            })?;
            let metadata_json = match metadata {
                Some(raw) => Some(serde_json::from_str(&raw)?),
                None => None,
            };
            events.push(BatchEvent {
                event_id,
                batch_id,
                event_type,
                message,
                metadata_json,
                created_at: parse_ts(&created_at).map_err(|e| RepositoryError::FieldValueError {
                    field: "created_at".to_string(),
                    message: e.to_string(),
                })?,
                created_by,
            });
        }
        Ok(events)
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

    fn make_batch(batch_id: &str, tenant_id: &str) -> Batch {
        Batch {
            batch_id: batch_id.to_string(),
            tenant_id: tenant_id.to_string(),
            batch_number: format!("#{}", batch_id),
            recipe_name: Some("House IPA".to_string()),
            style_family: Some("IPA".to_string()),
            status: BatchStatus::Brewing,
            updated_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn test_find_by_ids_filters_tenant_and_keeps_order() {
        let conn = setup_test_db();
        BatchRepository::insert(&conn, &make_batch("B1", "brewery-a")).unwrap();
        BatchRepository::insert(&conn, &make_batch("B2", "brewery-a")).unwrap();
        BatchRepository::insert(&conn, &make_batch("B3", "brewery-b")).unwrap();

        let ids = vec!["B2".to_string(), "B3".to_string(), "B1".to_string()];
        let found = BatchRepository::find_by_ids(&conn, "brewery-a", &ids).unwrap();
        let found_ids: Vec<&str> = found.iter().map(|b| b.batch_id.as_str()).collect();
        assert_eq!(found_ids, vec!["B2", "B1"]);
    }

    #[test]
    fn test_update_status_missing_batch() {
        let conn = setup_test_db();
        let err = BatchRepository::update_status(
            &conn,
            "B404",
            BatchStatus::Fermenting,
            Utc::now().naive_utc(),
        )
        .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[test]
    fn test_events_and_readings_append() {
        let conn = setup_test_db();
        BatchRepository::insert(&conn, &make_batch("B1", "brewery-a")).unwrap();

        let now = Utc::now().naive_utc();
        BatchRepository::insert_event(
            &conn,
            &BatchEvent {
                event_id: "E1".to_string(),
                batch_id: "B1".to_string(),
                event_type: BatchEventType::FermentationStarted,
                message: "入罐 FV-01".to_string(),
                metadata_json: Some(serde_json::json!({ "tank": "FV-01" })),
                created_at: now,
                created_by: "brewer".to_string(),
            },
        )
        .unwrap();
        BatchRepository::insert_gravity_reading(
            &conn,
            &GravityReading {
                reading_id: "R1".to_string(),
                batch_id: "B1".to_string(),
                specific_gravity: 1.048,
                temperature: Some(19.0),
                recorded_at: now,
                recorded_by: "brewer".to_string(),
            },
        )
        .unwrap();

        let events = BatchRepository::list_events(&conn, "B1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, BatchEventType::FermentationStarted);
        assert_eq!(events[0].metadata_json.as_ref().unwrap()["tank"], "FV-01");

        let readings = BatchRepository::list_gravity_readings(&conn, "B1").unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].specific_gravity, 1.048);
    }
}
