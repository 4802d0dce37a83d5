// ==========================================
// 发酵批次与罐位分配引擎 - 分配审计日志
// ==========================================
// 红线: 每个提交的分配请求必须留下一条审计记录
// 对齐: allocation_log 表
// ==========================================

use crate::domain::types::AllocationScenario;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationLog {
    pub action_id: String,
    pub tenant_id: String,
    pub actor: String,
    pub scenario: AllocationScenario,
    pub lot_id: String,
    pub action_ts: NaiveDateTime,
    pub payload_json: Option<JsonValue>, // 原始请求 (JSON)
    pub detail: Option<String>,
}
