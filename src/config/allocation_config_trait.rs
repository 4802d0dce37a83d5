// ==========================================
// 发酵批次与罐位分配引擎 - 分配配置读取 Trait
// ==========================================
// 职责: 定义分配引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::types::{LotPhase, SplitPercentageMode};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;

/// 配置读取错误
pub type ConfigError = Box<dyn Error + Send + Sync>;

// ==========================================
// AllocationConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）, AllocationSettings（固定值）
#[async_trait]
pub trait AllocationConfigReader: Send + Sync {
    /// 普通酒批编码前缀
    ///
    /// # 默认值
    /// - LOT
    async fn get_lot_code_prefix(&self) -> Result<String, ConfigError>;

    /// 混酿酒批编码前缀
    ///
    /// # 默认值
    /// - BLEND
    async fn get_blend_code_prefix(&self) -> Result<String, ConfigError>;

    /// 分罐百分比取整模式
    ///
    /// # 默认值
    /// - NORMALIZE_LAST
    async fn get_split_percentage_mode(&self) -> Result<SplitPercentageMode, ConfigError>;

    /// 新建酒批的默认发酵阶段
    ///
    /// # 默认值
    /// - PRIMARY
    async fn get_default_lot_phase(&self) -> Result<LotPhase, ConfigError>;
}

// ==========================================
// AllocationSettings - 配置快照
// ==========================================
// 单次请求开始时读取一次, 事务内只使用快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSettings {
    pub lot_code_prefix: String,
    pub blend_code_prefix: String,
    pub split_percentage_mode: SplitPercentageMode,
    pub default_lot_phase: LotPhase,
}

impl Default for AllocationSettings {
    fn default() -> Self {
        Self {
            lot_code_prefix: "LOT".to_string(),
            blend_code_prefix: "BLEND".to_string(),
            split_percentage_mode: SplitPercentageMode::NormalizeLast,
            default_lot_phase: LotPhase::Primary,
        }
    }
}

impl AllocationSettings {
    /// 从配置读取器加载快照
    pub async fn load<C: AllocationConfigReader + ?Sized>(reader: &C) -> Result<Self, ConfigError> {
        Ok(Self {
            lot_code_prefix: reader.get_lot_code_prefix().await?,
            blend_code_prefix: reader.get_blend_code_prefix().await?,
            split_percentage_mode: reader.get_split_percentage_mode().await?,
            default_lot_phase: reader.get_default_lot_phase().await?,
        })
    }
}

#[async_trait]
impl AllocationConfigReader for AllocationSettings {
    async fn get_lot_code_prefix(&self) -> Result<String, ConfigError> {
        Ok(self.lot_code_prefix.clone())
    }

    async fn get_blend_code_prefix(&self) -> Result<String, ConfigError> {
        Ok(self.blend_code_prefix.clone())
    }

    async fn get_split_percentage_mode(&self) -> Result<SplitPercentageMode, ConfigError> {
        Ok(self.split_percentage_mode)
    }

    async fn get_default_lot_phase(&self) -> Result<LotPhase, ConfigError> {
        Ok(self.default_lot_phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_settings_snapshot_from_static_reader() {
        let custom = AllocationSettings {
            lot_code_prefix: "FV".to_string(),
            split_percentage_mode: SplitPercentageMode::Round,
            ..AllocationSettings::default()
        };
        let loaded = AllocationSettings::load(&custom).await.unwrap();
        assert_eq!(loaded, custom);
        assert_eq!(loaded.blend_code_prefix, "BLEND");
    }
}
