// ==========================================
// 发酵批次与罐位分配引擎 - 转移记录领域模型
// ==========================================
// 红线: 转移记录创建后不可变 (审计轨迹)
// ==========================================

use crate::domain::types::{TransferStatus, TransferType};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub transfer_id: String,
    pub tenant_id: String,
    pub transfer_type: TransferType,
    pub source_tank_id: Option<String>,
    pub destination_tank_id: String,
    pub source_lot_id: Option<String>,
    pub destination_lot_id: String,
    pub batch_id: Option<String>,
    pub volume: f64,
    pub status: TransferStatus,
    pub executed_by: String,
    pub executed_at: NaiveDateTime,
}
