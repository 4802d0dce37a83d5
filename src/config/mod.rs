// ==========================================
// 发酵批次与罐位分配引擎 - 配置层
// ==========================================
// 职责: 分配引擎配置管理
// 存储: config_kv 表
// ==========================================

pub mod allocation_config_trait;
pub mod config_manager;

// 重导出核心配置管理器
pub use allocation_config_trait::{AllocationConfigReader, AllocationSettings, ConfigError};
pub use config_manager::{config_keys, ConfigManager};
