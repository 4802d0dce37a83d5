// ==========================================
// 发酵批次与罐位分配引擎 - 罐容量校验
// ==========================================
// 职责: 计算追加体积后的罐内总体积, 超出容量即拒绝
// 规则:
// - 现有体积 = Σ ACTIVE 占用的 actual_volume（缺省取 planned_volume）
// - 容量为 0 / 缺失 / 非法时按 0 处理（任何正体积都会失败）
// ==========================================

use crate::domain::assignment::TankAssignment;
use crate::domain::tank::Tank;
use crate::engine::error::AllocationError;
use crate::repository::error::RepositoryResult;
use crate::repository::AssignmentRepository;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// 浮点比较容差（体积单位）
pub const VOLUME_EPSILON: f64 = 1e-6;

/// 容量校验结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityCheck {
    pub tank_id: String,
    pub ok: bool,
    pub current_volume: f64,
    pub added_volume: f64,
    pub total_after: f64,
    pub capacity: f64,
}

impl CapacityCheck {
    /// 失败时转换为 TANK_OVERFLOW
    pub fn ensure_fits(&self, tank: &Tank) -> Result<(), AllocationError> {
        if self.ok {
            return Ok(());
        }
        Err(AllocationError::TankOverflow {
            tank_id: tank.tank_id.clone(),
            tank_name: tank.name.clone(),
            current_volume: self.current_volume,
            added_volume: self.added_volume,
            total_after: self.total_after,
            capacity: self.capacity,
        })
    }
}

// ==========================================
// CapacityValidator
// ==========================================
pub struct CapacityValidator;

impl CapacityValidator {
    /// 评估追加体积（纯函数）
    ///
    /// `active` 只应包含该罐的 ACTIVE 占用
    pub fn evaluate(tank: &Tank, active: &[TankAssignment], added_volume: f64) -> CapacityCheck {
        let current_volume: f64 = active.iter().map(|a| a.occupied_volume()).sum();
        Self::build(tank, current_volume, added_volume)
    }

    /// 评估并入目标占用的追加体积（纯函数）
    ///
    /// 目标占用按其当前体积计入一次（不论状态为 ACTIVE 还是 PLANNED）,
    /// 罐上其他 ACTIVE 占用照常累加
    pub fn evaluate_for_target(
        tank: &Tank,
        active: &[TankAssignment],
        target: &TankAssignment,
        added_volume: f64,
    ) -> CapacityCheck {
        let others: f64 = active
            .iter()
            .filter(|a| a.assignment_id != target.assignment_id)
            .map(|a| a.occupied_volume())
            .sum();
        Self::build(tank, others + target.occupied_volume(), added_volume)
    }

    fn build(tank: &Tank, current_volume: f64, added_volume: f64) -> CapacityCheck {
        let capacity = tank.effective_capacity();
        let total_after = current_volume + added_volume;
        CapacityCheck {
            tank_id: tank.tank_id.clone(),
            ok: total_after <= capacity + VOLUME_EPSILON,
            current_volume,
            added_volume,
            total_after,
            capacity,
        }
    }

    /// 从数据库读取罐的 ACTIVE 占用后校验
    #[instrument(skip(conn, tank), fields(tank_id = %tank.tank_id, added_volume = added_volume))]
    pub fn validate(
        conn: &Connection,
        tank: &Tank,
        added_volume: f64,
    ) -> RepositoryResult<CapacityCheck> {
        let active = AssignmentRepository::find_active_by_tank(conn, &tank.tank_id)?;
        let check = Self::evaluate(tank, &active, added_volume);
        debug!(
            ok = check.ok,
            total_after = check.total_after,
            capacity = check.capacity,
            "容量校验"
        );
        Ok(check)
    }

    /// 混酿并入目标占用时的容量校验（读取实时占用）
    #[instrument(skip(conn, tank, target), fields(tank_id = %tank.tank_id, target = %target.assignment_id))]
    pub fn validate_for_target(
        conn: &Connection,
        tank: &Tank,
        target: &TankAssignment,
        added_volume: f64,
    ) -> RepositoryResult<CapacityCheck> {
        let active = AssignmentRepository::find_active_by_tank(conn, &tank.tank_id)?;
        let check = Self::evaluate_for_target(tank, &active, target, added_volume);
        debug!(
            ok = check.ok,
            total_after = check.total_after,
            capacity = check.capacity,
            "目标占用容量校验"
        );
        Ok(check)
    }
}
