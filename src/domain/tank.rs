// ==========================================
// 发酵批次与罐位分配引擎 - 发酵罐领域模型
// ==========================================
// 职责: 资源登记表 (Resource Registry) 的只读视图
// 红线: 罐由工厂拥有, 占用记录只引用不拥有
// ==========================================

use crate::domain::types::TankStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Tank - 发酵罐
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tank {
    // ===== 主键 =====
    pub tank_id: String,
    pub tenant_id: String,

    // ===== 基础属性 =====
    pub name: String,      // 显示名称
    pub capacity: f64,     // 容量 (体积单位, 0 表示未登记)

    // ===== 展示冗余字段 (提交后刷新, 非权威) =====
    pub status: TankStatus,
    pub current_volume: f64,
    pub current_lot_code: Option<String>,
    pub current_batch_label: Option<String>,

    pub updated_at: NaiveDateTime,
}

impl Tank {
    /// 有效容量: 缺失/非正容量按 0 处理
    pub fn effective_capacity(&self) -> f64 {
        if self.capacity.is_finite() && self.capacity > 0.0 {
            self.capacity
        } else {
            0.0
        }
    }
}
