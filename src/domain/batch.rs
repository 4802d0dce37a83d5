// ==========================================
// 发酵批次与罐位分配引擎 - 批次领域模型
// ==========================================
// 职责: 批次 / 比重读数 / 批次时间线事件
// 说明: 批次由上游创建, 本引擎只迁移状态并追加事件
// ==========================================

use crate::domain::types::{BatchEventType, BatchStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// Batch - 生产批次
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: String,
    pub tenant_id: String,
    pub batch_number: String,          // 显示编号
    pub recipe_name: Option<String>,   // 配方名称
    pub style_family: Option<String>,  // 风格大类 (混酿兼容性依据)
    pub status: BatchStatus,
    pub updated_at: NaiveDateTime,
}

// ==========================================
// GravityReading - 比重读数 (只追加)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GravityReading {
    pub reading_id: String,
    pub batch_id: String,
    pub specific_gravity: f64,
    pub temperature: Option<f64>,
    pub recorded_at: NaiveDateTime,
    pub recorded_by: String,
}

// ==========================================
// BatchEvent - 批次时间线事件 (只追加)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEvent {
    pub event_id: String,
    pub batch_id: String,
    pub event_type: BatchEventType,
    pub message: String,
    pub metadata_json: Option<JsonValue>,
    pub created_at: NaiveDateTime,
    pub created_by: String,
}
