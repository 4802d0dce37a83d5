// ==========================================
// 发酵批次与罐位分配引擎 - 酒批编码生成
// ==========================================
// 格式: {PREFIX}-{YYYYMMDD}-{NNN}
// 分罐子批: {父批编码}-{序号}
// 说明: 序号在事务内按租户 + 日期取当前最大值 + 1
// ==========================================

use crate::repository::error::RepositoryResult;
use crate::repository::LotRepository;
use chrono::NaiveDateTime;
use rusqlite::Connection;

/// 酒批编码生成器
pub trait LotCodeGenerator: Send + Sync {
    /// 生成租户内唯一的编码
    fn next_code(
        &self,
        conn: &Connection,
        tenant_id: &str,
        prefix: &str,
        at: NaiveDateTime,
    ) -> RepositoryResult<String>;
}

/// 默认实现: 按日顺序号
#[derive(Debug, Clone, Default)]
pub struct SequentialLotCodeGenerator;

impl LotCodeGenerator for SequentialLotCodeGenerator {
    fn next_code(
        &self,
        conn: &Connection,
        tenant_id: &str,
        prefix: &str,
        at: NaiveDateTime,
    ) -> RepositoryResult<String> {
        let stem = format!("{}-{}-", prefix, at.format("%Y%m%d"));
        let existing = LotRepository::list_codes_with_prefix(conn, tenant_id, &stem)?;

        // 只统计 stem 后紧跟纯数字的编码, 分罐子批 (…-001-1) 不参与
        let max_seq = existing
            .iter()
            .filter_map(|code| code.strip_prefix(&stem))
            .filter(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
            .filter_map(|rest| rest.parse::<u32>().ok())
            .max()
            .unwrap_or(0);

        let mut seq = max_seq + 1;
        loop {
            let code = format!("{}{:03}", stem, seq);
            if !LotRepository::code_exists(conn, tenant_id, &code)? {
                return Ok(code);
            }
            seq += 1;
        }
    }
}

/// 分罐子批编码
pub fn child_code(parent_code: &str, index: usize) -> String {
    format!("{}-{}", parent_code, index)
}

/// 是否已是混酿编码格式: {blend_prefix}-{8位日期}-{序号}
pub fn is_blend_code(code: &str, blend_prefix: &str) -> bool {
    let Some(rest) = code.strip_prefix(blend_prefix) else {
        return false;
    };
    let Some(rest) = rest.strip_prefix('-') else {
        return false;
    };
    let mut parts = rest.splitn(2, '-');
    let date = parts.next().unwrap_or("");
    let seq = parts.next().unwrap_or("");
    date.len() == 8
        && date.chars().all(|c| c.is_ascii_digit())
        && !seq.is_empty()
        && seq.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lot::Lot;
    use crate::domain::types::{LotPhase, LotStatus};
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn insert_lot(conn: &Connection, id: &str, code: &str) {
        LotRepository::insert(
            conn,
            &Lot {
                lot_id: id.to_string(),
                tenant_id: "brewery-a".to_string(),
                lot_code: code.to_string(),
                phase: LotPhase::Primary,
                status: LotStatus::Active,
                planned_volume: 0.0,
                parent_lot_id: None,
                is_blend_result: false,
                is_blend_target: false,
                blended_at: None,
                notes: None,
                created_by: "brewer".to_string(),
                created_at: at(),
                updated_at: at(),
            },
        )
        .unwrap();
    }

    fn setup_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_sequence_starts_at_one() {
        let conn = setup_test_db();
        let code = SequentialLotCodeGenerator
            .next_code(&conn, "brewery-a", "LOT", at())
            .unwrap();
        assert_eq!(code, "LOT-20260301-001");
    }

    #[test]
    fn test_children_do_not_advance_sequence() {
        let conn = setup_test_db();
        insert_lot(&conn, "P", "LOT-20260301-001");
        insert_lot(&conn, "C1", "LOT-20260301-001-1");
        insert_lot(&conn, "C2", "LOT-20260301-001-2");

        let code = SequentialLotCodeGenerator
            .next_code(&conn, "brewery-a", "LOT", at())
            .unwrap();
        assert_eq!(code, "LOT-20260301-002");

        // 其他租户独立计数
        let code = SequentialLotCodeGenerator
            .next_code(&conn, "brewery-b", "LOT", at())
            .unwrap();
        assert_eq!(code, "LOT-20260301-001");
    }

    #[test]
    fn test_blend_code_format() {
        assert!(is_blend_code("BLEND-20260301-001", "BLEND"));
        assert!(is_blend_code("BLEND-20260301-12", "BLEND"));
        assert!(!is_blend_code("LOT-20260301-001", "BLEND"));
        assert!(!is_blend_code("BLEND-2026031-001", "BLEND"));
        assert!(!is_blend_code("BLEND-20260301-001-1", "BLEND"));
        assert!(!is_blend_code("BLENDX-20260301-001", "BLEND"));
        assert_eq!(child_code("LOT-20260301-001", 2), "LOT-20260301-001-2");
    }
}
