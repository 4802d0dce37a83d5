// ==========================================
// 发酵批次与罐位分配引擎 - 分配审计日志仓储
// ==========================================
// 红线: 所有分配写入必须记录
// ==========================================

use crate::db::{format_ts, parse_ts};
use crate::domain::action_log::AllocationLog;
use crate::domain::types::AllocationScenario;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult};

/// 分配审计日志仓储
pub struct AllocationLogRepository;

impl AllocationLogRepository {
    /// 插入审计日志
    ///
    /// # 返回
    /// - `Ok(action_id)`: 成功插入
    pub fn insert(conn: &Connection, log: &AllocationLog) -> RepositoryResult<String> {
        conn.execute(
            r#"
            INSERT INTO allocation_log (
                action_id, tenant_id, actor, scenario, lot_id, action_ts, payload_json, detail
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                log.action_id,
                log.tenant_id,
                log.actor,
                log.scenario.as_str(),
                log.lot_id,
                format_ts(&log.action_ts),
                log.payload_json.as_ref().map(|v| v.to_string()),
                log.detail,
            ],
        )?;
        Ok(log.action_id.clone())
    }

    /// 查询租户最近的审计日志
    pub fn find_recent_by_tenant(
        conn: &Connection,
        tenant_id: &str,
        limit: i64,
    ) -> RepositoryResult<Vec<AllocationLog>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT action_id, tenant_id, actor, scenario, lot_id, action_ts, payload_json, detail
            FROM allocation_log WHERE tenant_id = ?1
            ORDER BY action_ts DESC, rowid DESC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt
            .query_map(params![tenant_id, limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                ))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        let mut logs = Vec::with_capacity(rows.len());
        for (action_id, tenant_id, actor, scenario, lot_id, action_ts, payload, detail) in rows {
            let scenario = match scenario.as_str() {
                "SIMPLE" => AllocationScenario::Simple,
                "SPLIT" => AllocationScenario::Split,
                "BLEND" => AllocationScenario::Blend,
                other => {
                    return Err(RepositoryError::FieldValueError {
                        field: "scenario".to_string(),
                        message: format!("未知场景: {}", other),
                    })
                }
            };
            let payload_json = match payload {
                Some(raw) => Some(serde_json::from_str(&raw)?),
                None => None,
            };
            logs.push(AllocationLog {
                action_id,
                tenant_id,
                actor,
                scenario,
                lot_id,
                action_ts: parse_ts(&action_ts).map_err(|e| RepositoryError::FieldValueError {
                    field: "action_ts".to_string(),
                    message: e.to_string(),
                })?,
                payload_json,
                detail,
            });
        }
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_insert_and_find_recent() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();

        for (i, scenario) in [AllocationScenario::Simple, AllocationScenario::Blend]
            .into_iter()
            .enumerate()
        {
            AllocationLogRepository::insert(
                &conn,
                &AllocationLog {
                    action_id: format!("log{}", i),
                    tenant_id: "brewery-a".to_string(),
                    actor: "brewer".to_string(),
                    scenario,
                    lot_id: format!("L{}", i),
                    action_ts: Utc::now().naive_utc(),
                    payload_json: Some(serde_json::json!({ "i": i })),
                    detail: None,
                },
            )
            .unwrap();
        }

        let logs = AllocationLogRepository::find_recent_by_tenant(&conn, "brewery-a", 10).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].action_id, "log1");
        assert_eq!(logs[0].scenario, AllocationScenario::Blend);
        assert!(AllocationLogRepository::find_recent_by_tenant(&conn, "brewery-b", 10)
            .unwrap()
            .is_empty());
    }
}
