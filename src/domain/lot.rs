// ==========================================
// 发酵批次与罐位分配引擎 - 酒批领域模型
// ==========================================
// 职责: 谱系核心实体 Lot 与批次贡献 LotBatch
// 红线: lot_code 在租户内唯一; 混酿编码一经赋予不再重新生成
// ==========================================

use crate::domain::types::{LotPhase, LotStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Lot - 酒批
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    // ===== 主键 =====
    pub lot_id: String,
    pub tenant_id: String,
    pub lot_code: String,

    // ===== 状态 =====
    pub phase: LotPhase,
    pub status: LotStatus,
    pub planned_volume: f64,

    // ===== 谱系 =====
    pub parent_lot_id: Option<String>, // 分罐子批指向父批
    pub is_blend_result: bool,
    pub is_blend_target: bool,
    pub blended_at: Option<NaiveDateTime>,

    // ===== 元数据 =====
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

// ==========================================
// LotBatch - 批次对酒批的贡献
// ==========================================
// 不变式: 酒批组成完整时, batch_percentage 之和 ≈ 100
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotBatch {
    pub lot_batch_id: String,
    pub lot_id: String,
    pub batch_id: String,
    pub volume_contribution: f64,
    pub batch_percentage: f64,
    pub created_at: NaiveDateTime,
}

/// 汇总一组贡献行的百分比
pub fn total_percentage(rows: &[LotBatch]) -> f64 {
    rows.iter().map(|r| r.batch_percentage).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_percentage() {
        let now = chrono::Utc::now().naive_utc();
        let rows: Vec<LotBatch> = [60.0, 40.0]
            .iter()
            .enumerate()
            .map(|(i, pct)| LotBatch {
                lot_batch_id: format!("lb{}", i),
                lot_id: "L1".to_string(),
                batch_id: "B1".to_string(),
                volume_contribution: 0.0,
                batch_percentage: *pct,
                created_at: now,
            })
            .collect();
        assert_eq!(total_percentage(&rows), 100.0);
        assert_eq!(total_percentage(&[]), 0.0);
    }
}
