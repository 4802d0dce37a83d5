// ==========================================
// 发酵批次与罐位分配引擎 - 谱系存储事务边界
// ==========================================
// 职责: 持有共享连接, 提供只读访问与原子事务
// 红线: 分配请求的校验读与全部写入必须在同一个事务内
// ==========================================
// 隔离: BEGIN IMMEDIATE 在事务开始即获取写锁,
//       并发请求在 busy_timeout 内排队, 读到的是串行化后的快照
// ==========================================

use crate::db::open_sqlite_connection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{Connection, TransactionBehavior};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

pub struct LineageStore {
    conn: Arc<Mutex<Connection>>,
}

impl LineageStore {
    /// 打开数据库文件创建存储
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建存储
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 共享连接句柄
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 只读访问（不开启事务）
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let conn = self.get_conn()?;
        f(&conn)
    }

    /// 在单个 IMMEDIATE 事务内执行闭包
    ///
    /// - 闭包返回 Ok: 提交
    /// - 闭包返回 Err: 回滚, 原样返回错误
    /// - 提交失败: 回滚, 返回 DatabaseTransactionError
    pub fn in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        match f(&tx) {
            Ok(value) => {
                tx.commit()
                    .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
                debug!("事务已提交");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(error = %rollback_err, "事务回滚失败");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_store() -> LineageStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        conn.execute("CREATE TABLE t (k TEXT PRIMARY KEY)", []).unwrap();
        LineageStore::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn count(store: &LineageStore) -> i64 {
        store
            .read(|conn| -> RepositoryResult<i64> {
                Ok(conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))?)
            })
            .unwrap()
    }

    #[test]
    fn test_commit_on_ok() {
        let store = setup_store();
        store
            .in_transaction(|conn| -> RepositoryResult<()> {
                conn.execute("INSERT INTO t VALUES ('a')", [])?;
                conn.execute("INSERT INTO t VALUES ('b')", [])?;
                Ok(())
            })
            .unwrap();
        assert_eq!(count(&store), 2);
    }

    #[test]
    fn test_rollback_on_err() {
        let store = setup_store();
        let result = store.in_transaction(|conn| -> RepositoryResult<()> {
            conn.execute("INSERT INTO t VALUES ('a')", [])?;
            // 主键冲突 → 整个事务回滚
            conn.execute("INSERT INTO t VALUES ('a')", [])?;
            Ok(())
        });
        assert!(matches!(
            result,
            Err(RepositoryError::UniqueConstraintViolation(_))
        ));
        assert_eq!(count(&store), 0);
    }
}
