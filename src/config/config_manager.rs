// ==========================================
// 发酵批次与罐位分配引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::allocation_config_trait::{AllocationConfigReader, ConfigError};
use crate::db::open_sqlite_connection;
use crate::domain::types::{LotPhase, SplitPercentageMode};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// 全局配置作用域
pub const GLOBAL_SCOPE: &str = "global";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, ConfigError> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
            params![GLOBAL_SCOPE, key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 从 config_kv 表读取配置值，带默认值（空白值视为未配置）
    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, ConfigError> {
        Ok(self
            .get_config_value(key)?
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default.to_string()))
    }

    /// 写入 global scope 配置（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT(scope_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![GLOBAL_SCOPE, key, value],
        )?;
        Ok(())
    }

    /// 获取 global scope 全部配置
    pub fn list_global_config(&self) -> Result<HashMap<String, String>, ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let mut stmt = conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1")?;
        let rows = stmt
            .query_map(params![GLOBAL_SCOPE], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<HashMap<String, String>>>()?;
        Ok(rows)
    }
}

// ==========================================
// AllocationConfigReader 实现
// ==========================================
#[async_trait]
impl AllocationConfigReader for ConfigManager {
    async fn get_lot_code_prefix(&self) -> Result<String, ConfigError> {
        let value = self.get_config_or_default(config_keys::LOT_CODE_PREFIX, "LOT")?;
        Ok(value.trim().to_uppercase())
    }

    async fn get_blend_code_prefix(&self) -> Result<String, ConfigError> {
        let value = self.get_config_or_default(config_keys::BLEND_CODE_PREFIX, "BLEND")?;
        Ok(value.trim().to_uppercase())
    }

    async fn get_split_percentage_mode(&self) -> Result<SplitPercentageMode, ConfigError> {
        let value =
            self.get_config_or_default(config_keys::SPLIT_PERCENTAGE_MODE, "NORMALIZE_LAST")?;
        match SplitPercentageMode::from_str(&value) {
            Some(mode) => Ok(mode),
            None => {
                tracing::warn!(value = %value, "未知的分罐百分比模式, 回退 NORMALIZE_LAST");
                Ok(SplitPercentageMode::NormalizeLast)
            }
        }
    }

    async fn get_default_lot_phase(&self) -> Result<LotPhase, ConfigError> {
        let value = self.get_config_or_default(config_keys::DEFAULT_LOT_PHASE, "PRIMARY")?;
        Ok(LotPhase::from_str(&value).unwrap_or(LotPhase::Primary))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 编码
    pub const LOT_CODE_PREFIX: &str = "lot_code_prefix";
    pub const BLEND_CODE_PREFIX: &str = "blend_code_prefix";

    // 分罐
    pub const SPLIT_PERCENTAGE_MODE: &str = "split_percentage_mode";

    // 酒批
    pub const DEFAULT_LOT_PHASE: &str = "default_lot_phase";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::allocation_config_trait::AllocationSettings;

    fn setup_manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn)))
    }

    #[tokio::test]
    async fn test_defaults_when_unset() {
        let manager = setup_manager();
        let settings = AllocationSettings::load(&manager).await.unwrap();
        assert_eq!(settings, AllocationSettings::default());
    }

    #[tokio::test]
    async fn test_overrides_and_fallbacks() {
        let manager = setup_manager();
        manager
            .set_global_config_value(config_keys::BLEND_CODE_PREFIX, " bl ")
            .unwrap();
        manager
            .set_global_config_value(config_keys::SPLIT_PERCENTAGE_MODE, "ROUND")
            .unwrap();
        manager
            .set_global_config_value(config_keys::DEFAULT_LOT_PHASE, "nonsense")
            .unwrap();

        assert_eq!(manager.get_blend_code_prefix().await.unwrap(), "BL");
        assert_eq!(
            manager.get_split_percentage_mode().await.unwrap(),
            SplitPercentageMode::Round
        );
        assert_eq!(manager.get_default_lot_phase().await.unwrap(), LotPhase::Primary);

        // 覆盖写
        manager
            .set_global_config_value(config_keys::SPLIT_PERCENTAGE_MODE, "NORMALIZE_LAST")
            .unwrap();
        assert_eq!(
            manager.get_split_percentage_mode().await.unwrap(),
            SplitPercentageMode::NormalizeLast
        );
        assert_eq!(manager.list_global_config().unwrap().len(), 3);
    }
}
