// ==========================================
// 分配原子性测试
// ==========================================
// 职责: 在写入步骤中注入失败 (SQLite 触发器),
//       验证整笔请求不留下任何谱系记录
// ==========================================


#[cfg(test)]
mod atomicity_test {
    use brew_lot_allocation::domain::types::BatchStatus;
    use rusqlite::Connection;

    use crate::test_helpers::*;

    /// 在指定表的 INSERT 上挂一个失败触发器
    fn inject_insert_failure(conn: &Connection, table: &str, condition: Option<&str>) {
        let when = condition
            .map(|c| format!("WHEN {}", c))
            .unwrap_or_default();
        conn.execute_batch(&format!(
            r#"
            CREATE TRIGGER inject_{table}_failure BEFORE INSERT ON {table}
            {when}
            BEGIN
                SELECT RAISE(ABORT, 'injected failure on {table}');
            END;
            "#
        ))
        .unwrap();
    }

    fn assert_nothing_persisted(conn: &Connection) {
        assert_eq!(lineage_counts(conn), (0, 0, 0, 0));
        assert_eq!(count_rows(conn, "allocation_log"), 0);
        assert_eq!(count_rows(conn, "batch_event"), 0);
        assert_eq!(count_rows(conn, "gravity_reading"), 0);
    }

    #[tokio::test]
    async fn test_split_transfer_failure_rolls_back_everything() {
        let (_tmp, db_path) = create_test_db().unwrap();
        seed_cellar(&db_path);
        let conn = open_conn(&db_path);
        // 第二条转移记录失败: 前面的父批 / 子批 / 占用都已写入事务
        inject_insert_failure(&conn, "transfer", Some("NEW.destination_tank_id = 'TB'"));

        let api = open_api(&db_path);
        let mut req = request(&["B1"], &[("TA", 300.0), ("TB", 200.0)], false);
        req.initial_gravity = Some(1.050);
        let err = api.allocate(&ctx(), &req).await.unwrap_err();

        assert_eq!(err.code(), "PERSISTENCE_FAILURE");
        assert_eq!(err.status(), 500);
        assert!(err.to_string().contains("injected failure on transfer"));
        assert_nothing_persisted(&conn);
        assert_eq!(batch_status(&conn, "B1"), BatchStatus::Brewing);
    }

    #[tokio::test]
    async fn test_blend_link_failure_rolls_back_everything() {
        let (_tmp, db_path) = create_test_db().unwrap();
        seed_cellar(&db_path);
        let conn = open_conn(&db_path);
        inject_insert_failure(&conn, "lot_batch", Some("NEW.batch_id = 'B3'"));

        let api = open_api(&db_path);
        let err = api
            .allocate(&ctx(), &request(&["B1", "B2", "B3"], &[("TC", 300.0)], true))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "PERSISTENCE_FAILURE");
        assert_nothing_persisted(&conn);
        for batch_id in ["B1", "B2", "B3"] {
            assert_eq!(batch_status(&conn, batch_id), BatchStatus::Brewing);
        }
    }

    #[tokio::test]
    async fn test_blend_into_lot_failure_keeps_target_untouched() {
        let (_tmp, db_path) = create_test_db().unwrap();
        seed_cellar(&db_path);
        let api = open_api(&db_path);
        let simple = api
            .allocate(&ctx(), &request(&["B1"], &[("TA", 200.0)], false))
            .await
            .unwrap();

        let conn = open_conn(&db_path);
        let before = lineage_counts(&conn);
        inject_insert_failure(&conn, "transfer", None);

        let mut req = request(&["B2"], &[("TA", 100.0)], true);
        req.target_lot_id = Some(simple.lot.lot_id.clone());
        let err = api.allocate(&ctx(), &req).await.unwrap_err();
        assert_eq!(err.code(), "PERSISTENCE_FAILURE");

        assert_eq!(lineage_counts(&conn), before);
        let lineage = api.lot_lineage(&ctx(), &simple.lot.lot_id).unwrap();
        assert_eq!(lineage.lot.lot_code, simple.lot.lot_code);
        assert_eq!(lineage.lot.planned_volume, 200.0);
        assert_eq!(lineage.assignments[0].planned_volume, 200.0);
        assert_eq!(batch_status(&conn, "B2"), BatchStatus::Brewing);
    }

    #[tokio::test]
    async fn test_audit_log_failure_rolls_back_simple() {
        let (_tmp, db_path) = create_test_db().unwrap();
        seed_cellar(&db_path);
        let conn = open_conn(&db_path);
        inject_insert_failure(&conn, "allocation_log", None);

        let api = open_api(&db_path);
        let err = api
            .allocate(&ctx(), &request(&["B1"], &[("TA", 100.0)], false))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "PERSISTENCE_FAILURE");
        assert_nothing_persisted(&conn);
        assert_eq!(batch_status(&conn, "B1"), BatchStatus::Brewing);
    }
}
