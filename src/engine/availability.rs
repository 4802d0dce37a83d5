// ==========================================
// 发酵批次与罐位分配引擎 - 罐可用性检查
// ==========================================
// 职责: 检查请求的 (罐, 时间窗) 是否与 ACTIVE 占用冲突
// 输入: 罐时间窗请求 + 各罐的 ACTIVE 占用
// 输出: AvailabilityReport (逐罐冲突明细, 不抛错)
// 规则: 半开区间重叠 requested_start < existing_end AND requested_end > existing_start
// ==========================================

use crate::domain::assignment::TankAssignment;
use crate::domain::tank::Tank;
use crate::domain::types::TankStatus;
use crate::repository::error::RepositoryResult;
use crate::repository::AssignmentRepository;
use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// 单罐时间窗请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankWindowRequest {
    pub tank_id: String,
    pub planned_start: NaiveDateTime,
    pub planned_end: NaiveDateTime,
}

/// 冲突的占用摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictingAssignment {
    pub assignment_id: String,
    pub lot_id: String,
    pub planned_start: NaiveDateTime,
    pub planned_end: NaiveDateTime,
    pub planned_volume: f64,
}

impl From<&TankAssignment> for ConflictingAssignment {
    fn from(a: &TankAssignment) -> Self {
        Self {
            assignment_id: a.assignment_id.clone(),
            lot_id: a.lot_id.clone(),
            planned_start: a.planned_start,
            planned_end: a.planned_end,
            planned_volume: a.planned_volume,
        }
    }
}

/// 单罐可用性
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankAvailability {
    pub available: bool,
    pub conflicting_assignment: Option<ConflictingAssignment>,
    /// 非占用原因导致的不可用（如维护中）
    pub reason: Option<String>,
}

/// 可用性报告
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub all_available: bool,
    pub per_tank: BTreeMap<String, TankAvailability>,
}

impl AvailabilityReport {
    /// 不可用的罐ID列表
    pub fn unavailable_tanks(&self) -> Vec<&str> {
        self.per_tank
            .iter()
            .filter(|(_, a)| !a.available)
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

// ==========================================
// AvailabilityChecker
// ==========================================
pub struct AvailabilityChecker;

impl AvailabilityChecker {
    /// 评估单罐（纯函数）
    ///
    /// 维护中的罐直接判为不可用; 否则取第一条时间窗重叠的 ACTIVE 占用作为冲突
    pub fn evaluate_tank(
        tank: Option<&Tank>,
        request: &TankWindowRequest,
        active: &[TankAssignment],
    ) -> TankAvailability {
        if let Some(tank) = tank {
            if tank.status == TankStatus::Maintenance {
                return TankAvailability {
                    available: false,
                    conflicting_assignment: None,
                    reason: Some(format!("罐 {} 维护中", tank.name)),
                };
            }
        }

        let conflict = active
            .iter()
            .find(|a| a.overlaps(request.planned_start, request.planned_end));

        TankAvailability {
            available: conflict.is_none(),
            conflicting_assignment: conflict.map(ConflictingAssignment::from),
            reason: conflict.map(|a| format!("时间窗与酒批 {} 的占用重叠", a.lot_id)),
        }
    }

    /// 从数据库读取各罐 ACTIVE 占用并生成报告（只读）
    ///
    /// `tanks` 为已按租户加载的罐, 用于识别维护状态
    #[instrument(skip(conn, requests, tanks), fields(tank_count = requests.len()))]
    pub fn check(
        conn: &Connection,
        requests: &[TankWindowRequest],
        tanks: &BTreeMap<String, Tank>,
    ) -> RepositoryResult<AvailabilityReport> {
        let mut per_tank = BTreeMap::new();
        for request in requests {
            let active = AssignmentRepository::find_active_by_tank(conn, &request.tank_id)?;
            let availability =
                Self::evaluate_tank(tanks.get(&request.tank_id), request, &active);
            debug!(
                tank_id = %request.tank_id,
                available = availability.available,
                active_count = active.len(),
                "罐可用性"
            );
            per_tank.insert(request.tank_id.clone(), availability);
        }

        let all_available = per_tank.values().all(|a| a.available);
        Ok(AvailabilityReport {
            all_available,
            per_tank,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{AssignmentStatus, LotPhase};
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn window(start: u32, end: u32) -> TankWindowRequest {
        TankWindowRequest {
            tank_id: "T1".to_string(),
            planned_start: at(start),
            planned_end: at(end),
        }
    }

    fn existing(start: u32, end: u32) -> TankAssignment {
        TankAssignment {
            assignment_id: "A1".to_string(),
            tenant_id: "brewery-a".to_string(),
            tank_id: "T1".to_string(),
            lot_id: "L1".to_string(),
            planned_start: at(start),
            planned_end: at(end),
            planned_volume: 200.0,
            actual_volume: None,
            phase: LotPhase::Primary,
            status: AssignmentStatus::Active,
            created_by: "brewer".to_string(),
            created_at: at(1),
            updated_at: at(1),
        }
    }

    fn tank(status: TankStatus) -> Tank {
        Tank {
            tank_id: "T1".to_string(),
            tenant_id: "brewery-a".to_string(),
            name: "FV-01".to_string(),
            capacity: 500.0,
            status,
            current_volume: 0.0,
            current_lot_code: None,
            current_batch_label: None,
            updated_at: at(1),
        }
    }

    #[test]
    fn test_overlap_is_conflict() {
        let result = AvailabilityChecker::evaluate_tank(None, &window(5, 12), &[existing(1, 10)]);
        assert!(!result.available);
        assert_eq!(
            result.conflicting_assignment.unwrap().assignment_id,
            "A1"
        );
    }

    #[test]
    fn test_touching_windows_do_not_conflict() {
        // 半开区间: 前一占用结束时刻即可开始
        let result = AvailabilityChecker::evaluate_tank(None, &window(10, 20), &[existing(1, 10)]);
        assert!(result.available);
        assert!(result.conflicting_assignment.is_none());

        let result = AvailabilityChecker::evaluate_tank(None, &window(1, 5), &[existing(5, 9)]);
        assert!(result.available);
    }

    #[test]
    fn test_maintenance_tank_unavailable() {
        let t = tank(TankStatus::Maintenance);
        let result = AvailabilityChecker::evaluate_tank(Some(&t), &window(1, 5), &[]);
        assert!(!result.available);
        assert!(result.reason.unwrap().contains("FV-01"));

        let t = tank(TankStatus::Occupied);
        assert!(AvailabilityChecker::evaluate_tank(Some(&t), &window(1, 5), &[]).available);
    }

    #[test]
    fn test_report_lists_unavailable_tanks() {
        let mut per_tank = BTreeMap::new();
        per_tank.insert(
            "T1".to_string(),
            AvailabilityChecker::evaluate_tank(None, &window(2, 3), &[existing(1, 10)]),
        );
        per_tank.insert(
            "T2".to_string(),
            AvailabilityChecker::evaluate_tank(None, &window(2, 3), &[]),
        );
        let report = AvailabilityReport {
            all_available: false,
            per_tank,
        };
        assert_eq!(report.unavailable_tanks(), vec!["T1"]);
    }
}
