// ==========================================
// 并发分配测试
// ==========================================
// 职责: 独立连接上的并发请求争用同一个罐,
//       验证 check-then-act 在事务内串行化
// ==========================================


#[cfg(test)]
mod concurrent_allocation_test {
    use brew_lot_allocation::domain::types::AssignmentStatus;
    use brew_lot_allocation::repository::AssignmentRepository;
    use futures::future::join_all;
    use std::sync::Arc;

    use crate::test_helpers::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_for_same_tank() {
        let (_tmp, db_path) = create_test_db().unwrap();
        seed_cellar(&db_path);

        // 每个请求使用独立连接, 协调完全依赖 SQLite 写锁
        let handles: Vec<_> = ["B1", "B2", "B3", "B4"]
            .into_iter()
            .map(|batch_id| {
                let api = Arc::new(open_api(&db_path));
                let req = request(&[batch_id], &[("TA", 400.0)], false);
                tokio::spawn(async move { api.allocate(&ctx(), &req).await })
            })
            .collect();

        let results: Vec<_> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            // 同一时间窗的 ACTIVE 占用先被可用性检查拦下
            assert_eq!(err.code(), "TANKS_UNAVAILABLE");
        }

        let conn = open_conn(&db_path);
        let active = AssignmentRepository::find_active_by_tank(&conn, "TA").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].status, AssignmentStatus::Active);
        assert_eq!(lineage_counts(&conn), (1, 1, 1, 0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_blends_never_overflow() {
        let (_tmp, db_path) = create_test_db().unwrap();
        seed_cellar(&db_path);

        let api = open_api(&db_path);
        let base = api
            .allocate(&ctx(), &request(&["B1"], &[("TA", 200.0)], false))
            .await
            .unwrap();

        // 200 + 3 × 150 并入容量 500 的罐: 只能放下两笔
        let handles: Vec<_> = ["B2", "B3", "B4"]
            .into_iter()
            .map(|batch_id| {
                let api = Arc::new(open_api(&db_path));
                let mut req = request(&[batch_id], &[("TA", 150.0)], true);
                req.target_lot_id = Some(base.lot.lot_id.clone());
                tokio::spawn(async move { api.allocate(&ctx(), &req).await })
            })
            .collect();

        let results: Vec<_> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(err.code(), "TANK_OVERFLOW");
        }

        let conn = open_conn(&db_path);
        let active = AssignmentRepository::find_active_by_tank(&conn, "TA").unwrap();
        let total: f64 = active.iter().map(|a| a.occupied_volume()).sum();
        assert_eq!(active.len(), 1);
        assert!(total <= 500.0);
        assert_eq!(total, 500.0);
    }
}
