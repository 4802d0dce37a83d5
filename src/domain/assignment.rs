// ==========================================
// 发酵批次与罐位分配引擎 - 罐占用领域模型
// ==========================================
// 红线: 同一罐上 ACTIVE 占用的时间窗不得重叠 (由可用性检查保证)
// ==========================================

use crate::domain::types::{AssignmentStatus, LotPhase};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// TankAssignment - 罐占用
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TankAssignment {
    pub assignment_id: String,
    pub tenant_id: String,
    pub tank_id: String,
    pub lot_id: String,

    // ===== 计划窗口 [start, end) =====
    pub planned_start: NaiveDateTime,
    pub planned_end: NaiveDateTime,

    // ===== 体积 =====
    pub planned_volume: f64,
    pub actual_volume: Option<f64>,

    pub phase: LotPhase,
    pub status: AssignmentStatus,
    pub created_by: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TankAssignment {
    /// 计入容量的体积: 优先实际体积, 缺失时回退计划体积
    pub fn occupied_volume(&self) -> f64 {
        self.actual_volume.unwrap_or(self.planned_volume)
    }

    /// 半开区间重叠判断
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        start < self.planned_end && end > self.planned_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn make_assignment(start: u32, end: u32) -> TankAssignment {
        TankAssignment {
            assignment_id: "A1".to_string(),
            tenant_id: "tenant".to_string(),
            tank_id: "T1".to_string(),
            lot_id: "L1".to_string(),
            planned_start: at(start),
            planned_end: at(end),
            planned_volume: 300.0,
            actual_volume: None,
            phase: LotPhase::Primary,
            status: AssignmentStatus::Active,
            created_by: "u".to_string(),
            created_at: at(1),
            updated_at: at(1),
        }
    }

    #[test]
    fn test_overlap_is_half_open() {
        let a = make_assignment(10, 20);
        assert!(a.overlaps(at(15), at(25)));
        assert!(a.overlaps(at(5), at(11)));
        assert!(a.overlaps(at(11), at(12)));
        // 首尾相接不算重叠
        assert!(!a.overlaps(at(20), at(25)));
        assert!(!a.overlaps(at(5), at(10)));
    }

    #[test]
    fn test_occupied_volume_prefers_actual() {
        let mut a = make_assignment(10, 20);
        assert_eq!(a.occupied_volume(), 300.0);
        a.actual_volume = Some(280.0);
        assert_eq!(a.occupied_volume(), 280.0);
    }
}
