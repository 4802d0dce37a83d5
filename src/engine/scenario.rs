// ==========================================
// 发酵批次与罐位分配引擎 - 场景判定
// ==========================================
// 职责:
// 1. classify: (批次数, 罐分配数, 混酿标记) → 分配场景 (纯函数)
// 2. build_plan: 请求形状校验 + 转换为强类型 AllocationPlan
// 红线: 本模块不访问数据库
// ==========================================

use crate::domain::request::{
    AllocationPlan, AllocationRequest, BlendPlan, BlendTarget, PlanCommon, SimplePlan, SplitPlan,
};
use crate::domain::types::AllocationScenario;
use crate::engine::error::{AllocationError, AllocationResult};
use std::collections::HashSet;

/// 场景判定
///
/// 规则（按优先级）:
/// 1) 声明混酿 → BLEND（无论数量）
/// 2) 1 批次 + 1 罐 → SIMPLE
/// 3) 1 批次 + 多罐 → SPLIT
/// 4) 多批次 + 1 罐 → BLEND
///
/// # 返回
/// - None: 多批次 + 多罐（拆分与混酿同时发生）或数量为 0, 须在判定前拒绝
pub fn classify(
    batch_count: usize,
    allocation_count: usize,
    blend_requested: bool,
) -> Option<AllocationScenario> {
    if blend_requested {
        return Some(AllocationScenario::Blend);
    }
    match (batch_count, allocation_count) {
        (1, 1) => Some(AllocationScenario::Simple),
        (1, n) if n > 1 => Some(AllocationScenario::Split),
        (m, 1) if m > 1 => Some(AllocationScenario::Blend),
        _ => None,
    }
}

/// 校验请求形状并构造强类型分配计划
///
/// 校验顺序:
/// 批次非空 → 罐分配非空 → 总体积 > 0（且每罐 > 0）→ start < end
/// → 多批次 + 多罐 → 目标酒批需声明混酿 → 罐不重复 → 批次不重复
pub fn build_plan(request: &AllocationRequest) -> AllocationResult<AllocationPlan> {
    if request.batch_ids.is_empty() {
        return Err(AllocationError::NoBatches);
    }
    if request.allocations.is_empty() {
        return Err(AllocationError::NoAllocations);
    }

    let total = request.total_volume();
    if !total.is_finite() || total <= 0.0 {
        return Err(AllocationError::InvalidVolume(format!(
            "请求总体积必须大于 0, 实际 {}",
            total
        )));
    }
    if let Some(bad) = request
        .allocations
        .iter()
        .find(|a| !a.volume.is_finite() || a.volume <= 0.0)
    {
        return Err(AllocationError::InvalidVolume(format!(
            "罐 {} 的分配体积必须大于 0, 实际 {}",
            bad.tank_id, bad.volume
        )));
    }

    if request.planned_start >= request.planned_end {
        return Err(AllocationError::InvalidDateRange {
            start: request.planned_start.to_string(),
            end: request.planned_end.to_string(),
        });
    }

    let batch_count = request.batch_ids.len();
    let allocation_count = request.allocations.len();
    if batch_count > 1 && allocation_count > 1 {
        return Err(AllocationError::InvalidCombination(format!(
            "不支持同时拆分与混酿: {} 个批次 → {} 个罐",
            batch_count, allocation_count
        )));
    }

    if let Some(target_lot_id) = &request.target_lot_id {
        if !request.blend {
            return Err(AllocationError::TargetLotWithoutBlend {
                target_lot_id: target_lot_id.clone(),
            });
        }
    }

    let mut seen_tanks = HashSet::new();
    for allocation in &request.allocations {
        if !seen_tanks.insert(allocation.tank_id.as_str()) {
            return Err(AllocationError::DuplicateTank {
                tank_id: allocation.tank_id.clone(),
            });
        }
    }

    let mut seen_batches = HashSet::new();
    for batch_id in &request.batch_ids {
        if !seen_batches.insert(batch_id.as_str()) {
            return Err(AllocationError::InvalidCombination(format!(
                "批次重复出现: {}",
                batch_id
            )));
        }
    }

    let scenario = classify(batch_count, allocation_count, request.blend).ok_or_else(|| {
        AllocationError::InvalidCombination(format!(
            "无法判定场景: {} 个批次 → {} 个罐",
            batch_count, allocation_count
        ))
    })?;

    let common = PlanCommon {
        planned_start: request.planned_start,
        planned_end: request.planned_end,
        notes: request
            .notes
            .as_ref()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        initial_reading: request.initial_reading(),
    };

    let plan = match scenario {
        AllocationScenario::Simple => AllocationPlan::Simple(SimplePlan {
            batch_id: request.batch_ids[0].clone(),
            allocation: request.allocations[0].clone(),
            common,
        }),
        AllocationScenario::Split => AllocationPlan::Split(SplitPlan {
            batch_id: request.batch_ids[0].clone(),
            allocations: request.allocations.clone(),
            common,
        }),
        AllocationScenario::Blend => {
            // 混酿只面向一个罐
            if allocation_count != 1 {
                return Err(AllocationError::InvalidCombination(format!(
                    "混酿只能指定一个目标罐, 实际 {} 个",
                    allocation_count
                )));
            }
            let target = match &request.target_lot_id {
                Some(lot_id) => BlendTarget::ExistingLot(lot_id.clone()),
                None => BlendTarget::NewLot,
            };
            AllocationPlan::Blend(BlendPlan {
                batch_ids: request.batch_ids.clone(),
                allocation: request.allocations[0].clone(),
                target,
                common,
            })
        }
    };

    Ok(plan)
}

/// 计划对应的场景
pub fn scenario_of(plan: &AllocationPlan) -> AllocationScenario {
    match plan {
        AllocationPlan::Simple(_) => AllocationScenario::Simple,
        AllocationPlan::Split(_) => AllocationScenario::Split,
        AllocationPlan::Blend(_) => AllocationScenario::Blend,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::request::TankAllocation;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn make_request(batches: &[&str], allocations: &[(&str, f64)], blend: bool) -> AllocationRequest {
        AllocationRequest {
            batch_ids: batches.iter().map(|s| s.to_string()).collect(),
            allocations: allocations
                .iter()
                .map(|(t, v)| TankAllocation::new(*t, *v))
                .collect(),
            planned_start: at(1),
            planned_end: at(15),
            blend,
            target_lot_id: None,
            notes: None,
            initial_gravity: None,
            initial_temperature: None,
        }
    }

    #[test]
    fn test_classify_rules() {
        assert_eq!(classify(1, 1, false), Some(AllocationScenario::Simple));
        assert_eq!(classify(1, 3, false), Some(AllocationScenario::Split));
        assert_eq!(classify(2, 1, false), Some(AllocationScenario::Blend));
        assert_eq!(classify(2, 2, false), None);
        assert_eq!(classify(0, 1, false), None);
    }

    #[test]
    fn test_blend_flag_always_wins() {
        for (b, a) in [(1, 1), (1, 4), (3, 1), (3, 3), (0, 0)] {
            assert_eq!(classify(b, a, true), Some(AllocationScenario::Blend));
        }
    }

    #[test]
    fn test_build_plan_validation_order() {
        let mut req = make_request(&[], &[], false);
        assert_eq!(build_plan(&req).unwrap_err().code(), "NO_BATCHES");

        req.batch_ids.push("B1".to_string());
        assert_eq!(build_plan(&req).unwrap_err().code(), "NO_ALLOCATIONS");

        req.allocations.push(TankAllocation::new("T1", 0.0));
        assert_eq!(build_plan(&req).unwrap_err().code(), "INVALID_VOLUME");

        req.allocations[0].volume = 100.0;
        req.planned_end = req.planned_start;
        assert_eq!(build_plan(&req).unwrap_err().code(), "INVALID_DATE_RANGE");
    }

    #[test]
    fn test_negative_allocation_rejected_even_if_total_positive() {
        let req = make_request(&["B1"], &[("T1", 300.0), ("T2", -100.0)], false);
        assert_eq!(build_plan(&req).unwrap_err().code(), "INVALID_VOLUME");
    }

    #[test]
    fn test_split_and_blend_together_rejected() {
        let req = make_request(&["B1", "B2"], &[("T1", 300.0), ("T2", 200.0)], false);
        assert_eq!(build_plan(&req).unwrap_err().code(), "INVALID_COMBINATION");

        let req = make_request(&["B1", "B2"], &[("T1", 300.0), ("T2", 200.0)], true);
        assert_eq!(build_plan(&req).unwrap_err().code(), "INVALID_COMBINATION");
    }

    #[test]
    fn test_target_lot_requires_blend_flag() {
        let mut req = make_request(&["B1", "B2"], &[("T1", 300.0)], false);
        req.target_lot_id = Some("L1".to_string());
        assert_eq!(
            build_plan(&req).unwrap_err().code(),
            "TARGET_LOT_WITHOUT_BLEND"
        );

        req.blend = true;
        match build_plan(&req).unwrap() {
            AllocationPlan::Blend(p) => {
                assert_eq!(p.target, BlendTarget::ExistingLot("L1".to_string()));
                assert!(p.is_into_existing());
            }
            other => panic!("unexpected plan: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_tank_rejected() {
        let req = make_request(&["B1"], &[("T1", 300.0), ("T1", 200.0)], false);
        assert_eq!(build_plan(&req).unwrap_err().code(), "DUPLICATE_TANK");
    }

    #[test]
    fn test_blend_with_multiple_tanks_rejected() {
        let req = make_request(&["B1"], &[("T1", 300.0), ("T2", 200.0)], true);
        assert_eq!(build_plan(&req).unwrap_err().code(), "INVALID_COMBINATION");
    }

    #[test]
    fn test_build_plan_variants() {
        let plan = build_plan(&make_request(&["B1"], &[("T1", 500.0)], false)).unwrap();
        assert_eq!(scenario_of(&plan), AllocationScenario::Simple);

        let plan =
            build_plan(&make_request(&["B1"], &[("T1", 300.0), ("T2", 200.0)], false)).unwrap();
        assert_eq!(scenario_of(&plan), AllocationScenario::Split);
        assert_eq!(plan.allocations().len(), 2);

        let plan = build_plan(&make_request(&["B1", "B2"], &[("T1", 400.0)], false)).unwrap();
        assert_eq!(scenario_of(&plan), AllocationScenario::Blend);
        assert_eq!(plan.batch_ids(), vec!["B1", "B2"]);
    }

    #[test]
    fn test_blank_notes_dropped() {
        let mut req = make_request(&["B1"], &[("T1", 500.0)], false);
        req.notes = Some("   ".to_string());
        let plan = build_plan(&req).unwrap();
        assert!(plan.common().notes.is_none());
    }
}
