// ==========================================
// 发酵批次与罐位分配引擎 - 领域类型定义
// ==========================================
// 职责: 罐/批次/酒批/占用/转移的状态枚举
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 罐状态 (Tank Status)
// ==========================================
// 仅为展示冗余字段, 占用的权威来源是 ACTIVE 的 tank_assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TankStatus {
    Available,   // 空闲
    Occupied,    // 占用
    Maintenance, // 维护/清洗
}

impl fmt::Display for TankStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

impl TankStatus {
    /// 从字符串解析罐状态
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "OCCUPIED" => TankStatus::Occupied,
            "MAINTENANCE" => TankStatus::Maintenance,
            _ => TankStatus::Available, // 默认值
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            TankStatus::Available => "AVAILABLE",
            TankStatus::Occupied => "OCCUPIED",
            TankStatus::Maintenance => "MAINTENANCE",
        }
    }
}

// ==========================================
// 批次状态 (Batch Status)
// ==========================================
// 批次由上游糖化创建, 本引擎只负责迁移到 FERMENTING
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Planned,
    Brewing,
    Fermenting,
    Conditioning,
    Completed,
    Cancelled,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

impl BatchStatus {
    /// 从字符串解析批次状态
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PLANNED" => Some(BatchStatus::Planned),
            "BREWING" => Some(BatchStatus::Brewing),
            "FERMENTING" => Some(BatchStatus::Fermenting),
            "CONDITIONING" => Some(BatchStatus::Conditioning),
            "COMPLETED" => Some(BatchStatus::Completed),
            "CANCELLED" => Some(BatchStatus::Cancelled),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            BatchStatus::Planned => "PLANNED",
            BatchStatus::Brewing => "BREWING",
            BatchStatus::Fermenting => "FERMENTING",
            BatchStatus::Conditioning => "CONDITIONING",
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::Cancelled => "CANCELLED",
        }
    }
}

// ==========================================
// 酒批状态 (Lot Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LotStatus {
    Planned,
    Active,
    Completed,
    Cancelled,
}

impl fmt::Display for LotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

impl LotStatus {
    /// 从字符串解析酒批状态
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "PLANNED" => LotStatus::Planned,
            "COMPLETED" => LotStatus::Completed,
            "CANCELLED" => LotStatus::Cancelled,
            _ => LotStatus::Active, // 默认值
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            LotStatus::Planned => "PLANNED",
            LotStatus::Active => "ACTIVE",
            LotStatus::Completed => "COMPLETED",
            LotStatus::Cancelled => "CANCELLED",
        }
    }
}

// ==========================================
// 发酵阶段 (Lot Phase)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LotPhase {
    Primary,      // 主发酵
    Secondary,    // 后发酵
    Conditioning, // 熟化
}

impl fmt::Display for LotPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

impl LotPhase {
    /// 从字符串解析发酵阶段
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PRIMARY" => Some(LotPhase::Primary),
            "SECONDARY" => Some(LotPhase::Secondary),
            "CONDITIONING" => Some(LotPhase::Conditioning),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            LotPhase::Primary => "PRIMARY",
            LotPhase::Secondary => "SECONDARY",
            LotPhase::Conditioning => "CONDITIONING",
        }
    }
}

// ==========================================
// 罐占用状态 (Assignment Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Planned,
    Active,
    Completed,
    Cancelled,
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

impl AssignmentStatus {
    /// 从字符串解析占用状态
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "PLANNED" => AssignmentStatus::Planned,
            "COMPLETED" => AssignmentStatus::Completed,
            "CANCELLED" => AssignmentStatus::Cancelled,
            _ => AssignmentStatus::Active,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Planned => "PLANNED",
            AssignmentStatus::Active => "ACTIVE",
            AssignmentStatus::Completed => "COMPLETED",
            AssignmentStatus::Cancelled => "CANCELLED",
        }
    }
}

// ==========================================
// 转移类型 / 转移状态 (Transfer)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferType {
    Split, // 分罐
    Blend, // 混酿
}

impl TransferType {
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "BLEND" => TransferType::Blend,
            _ => TransferType::Split,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            TransferType::Split => "SPLIT",
            TransferType::Blend => "BLEND",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Pending,
    Completed,
}

impl TransferStatus {
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "PENDING" => TransferStatus::Pending,
            _ => TransferStatus::Completed,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Completed => "COMPLETED",
        }
    }
}

// ==========================================
// 分配场景 (Allocation Scenario)
// ==========================================
// 封闭集合, 由 engine::scenario 判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationScenario {
    Simple, // 单批次 → 单罐
    Split,  // 单批次 → 多罐
    Blend,  // 多批次 → 单罐
}

impl fmt::Display for AllocationScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AllocationScenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationScenario::Simple => "SIMPLE",
            AllocationScenario::Split => "SPLIT",
            AllocationScenario::Blend => "BLEND",
        }
    }
}

// ==========================================
// 分罐百分比取整模式 (Split Percentage Mode)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SplitPercentageMode {
    /// 每个子批独立 round(v / total * 100), 合计可能偏离 100
    Round,
    /// 最后一个子批吸收取整余数, 合计恒为 100
    NormalizeLast,
}

impl SplitPercentageMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "ROUND" => Some(SplitPercentageMode::Round),
            "NORMALIZE_LAST" => Some(SplitPercentageMode::NormalizeLast),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            SplitPercentageMode::Round => "ROUND",
            SplitPercentageMode::NormalizeLast => "NORMALIZE_LAST",
        }
    }
}

// ==========================================
// 批次时间线事件类型 (Batch Event Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchEventType {
    FermentationStarted, // 入罐开始发酵
    SplitToTanks,        // 分罐
    BlendedIntoLot,      // 并入混酿
}

impl BatchEventType {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            BatchEventType::FermentationStarted => "FERMENTATION_STARTED",
            BatchEventType::SplitToTanks => "SPLIT_TO_TANKS",
            BatchEventType::BlendedIntoLot => "BLENDED_INTO_LOT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "FERMENTATION_STARTED" => Some(BatchEventType::FermentationStarted),
            "SPLIT_TO_TANKS" => Some(BatchEventType::SplitToTanks),
            "BLENDED_INTO_LOT" => Some(BatchEventType::BlendedIntoLot),
            _ => None,
        }
    }
}
