// ==========================================
// 发酵批次与罐位分配引擎 - 提交后副作用
// ==========================================
// 职责: 刷新罐的展示冗余字段 (status / current_volume / 当前酒批 / 当前批次)
// 红线:
// - 只在分配事务提交之后执行, 不属于权威写入
// - 失败不回滚分配, 以 warning 形式返回给调用方
// ==========================================

use crate::domain::types::TankStatus;
use crate::repository::{LineageStore, TankRepository};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// 单罐展示字段刷新
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankDisplayUpdate {
    pub tank_id: String,
    pub current_volume: f64,
    pub lot_code: String,
    pub batch_label: String,
}

/// 罐展示字段刷新器
pub struct TankDisplayUpdater {
    store: Arc<LineageStore>,
}

impl TankDisplayUpdater {
    pub fn new(store: Arc<LineageStore>) -> Self {
        Self { store }
    }

    /// 逐罐刷新, 返回失败说明（空表示全部成功）
    pub fn apply(&self, updates: &[TankDisplayUpdate], now: NaiveDateTime) -> Vec<String> {
        let mut warnings = Vec::new();
        for update in updates {
            let result = self.store.in_transaction(|conn| {
                TankRepository::update_display(
                    conn,
                    &update.tank_id,
                    TankStatus::Occupied,
                    update.current_volume,
                    Some(&update.lot_code),
                    Some(&update.batch_label),
                    now,
                )
            });
            match result {
                Ok(0) => {
                    let msg = format!("罐 {} 展示信息未更新: 记录不存在", update.tank_id);
                    warn!(tank_id = %update.tank_id, "{}", msg);
                    warnings.push(msg);
                }
                Ok(_) => debug!(
                    tank_id = %update.tank_id,
                    lot_code = %update.lot_code,
                    "罐展示信息已刷新"
                ),
                Err(err) => {
                    let msg = format!("罐 {} 展示信息更新失败: {}", update.tank_id, err);
                    warn!(tank_id = %update.tank_id, error = %err, "罐展示信息更新失败");
                    warnings.push(msg);
                }
            }
        }
        warnings
    }
}
