// ==========================================
// 发酵批次与罐位分配引擎 - 引擎层错误类型
// ==========================================
// 职责: 分配请求的结构化失败 (稳定错误码 + 分类)
// 分类:
// - Malformed: 请求形状错误, 在任何资源检查之前拒绝
// - ResourceConflict: 罐不可用 / 已占用 / 超容
// - Referential: 罐 / 批次 / 目标酒批不存在
// - Compatibility: 混酿批次不兼容
// - Persistence: 持久层意外失败 (触发整笔回滚)
// ==========================================

use crate::engine::availability::AvailabilityReport;
use crate::repository::error::RepositoryError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Malformed,
    ResourceConflict,
    Referential,
    Compatibility,
    Persistence,
}

/// 分配错误
#[derive(Error, Debug)]
pub enum AllocationError {
    // ==========================================
    // 请求形状错误
    // ==========================================
    #[error("批次列表不能为空")]
    NoBatches,

    #[error("罐分配列表不能为空")]
    NoAllocations,

    #[error("体积无效: {0}")]
    InvalidVolume(String),

    #[error("计划时间窗无效: start={start} 必须早于 end={end}")]
    InvalidDateRange { start: String, end: String },

    #[error("无效的分配组合: {0}")]
    InvalidCombination(String),

    #[error("同一请求中罐重复出现: tank_id={tank_id}")]
    DuplicateTank { tank_id: String },

    #[error("指定了目标酒批但未声明混酿: target_lot_id={target_lot_id}")]
    TargetLotWithoutBlend { target_lot_id: String },

    // ==========================================
    // 资源冲突
    // ==========================================
    #[error("罐在计划时间窗内不可用: {}", .0.unavailable_tanks().join(", "))]
    TanksUnavailable(AvailabilityReport),

    #[error("罐容量不足: tank={tank_name}, 现有={current_volume}, 新增={added_volume}, 合计={total_after}, 容量={capacity}")]
    TankOverflow {
        tank_id: String,
        tank_name: String,
        current_volume: f64,
        added_volume: f64,
        total_after: f64,
        capacity: f64,
    },

    #[error("罐已被占用: tank={tank_name}, lot_id={occupying_lot_id}")]
    TankOccupied {
        tank_id: String,
        tank_name: String,
        occupying_lot_id: String,
    },

    // ==========================================
    // 引用错误
    // ==========================================
    #[error("罐不存在: tank_id={tank_id}")]
    TankNotFound { tank_id: String },

    #[error("批次不存在或不属于当前租户: {}", .missing.join(", "))]
    BatchesNotFound { missing: Vec<String> },

    #[error("目标酒批不存在: lot_id={lot_id}")]
    TargetLotNotFound { lot_id: String },

    #[error("目标酒批没有有效的罐占用: lot_id={lot_id}")]
    TargetAssignmentNotFound { lot_id: String },

    // ==========================================
    // 兼容性
    // ==========================================
    #[error("混酿批次不兼容: {}", .errors.join("; "))]
    BlendIncompatible {
        errors: Vec<String>,
        warnings: Vec<String>,
    },

    // ==========================================
    // 持久层 / 配置
    // ==========================================
    #[error("持久层失败: {0}")]
    Persistence(#[from] RepositoryError),

    #[error("配置读取失败: {0}")]
    Config(String),
}

impl AllocationError {
    /// 稳定的机器可读错误码
    pub fn code(&self) -> &'static str {
        match self {
            AllocationError::NoBatches => "NO_BATCHES",
            AllocationError::NoAllocations => "NO_ALLOCATIONS",
            AllocationError::InvalidVolume(_) => "INVALID_VOLUME",
            AllocationError::InvalidDateRange { .. } => "INVALID_DATE_RANGE",
            AllocationError::InvalidCombination(_) => "INVALID_COMBINATION",
            AllocationError::DuplicateTank { .. } => "DUPLICATE_TANK",
            AllocationError::TargetLotWithoutBlend { .. } => "TARGET_LOT_WITHOUT_BLEND",
            AllocationError::TanksUnavailable(_) => "TANKS_UNAVAILABLE",
            AllocationError::TankOverflow { .. } => "TANK_OVERFLOW",
            AllocationError::TankOccupied { .. } => "TANK_OCCUPIED",
            AllocationError::TankNotFound { .. } => "TANK_NOT_FOUND",
            AllocationError::BatchesNotFound { .. } => "BATCHES_NOT_FOUND",
            AllocationError::TargetLotNotFound { .. } => "TARGET_LOT_NOT_FOUND",
            AllocationError::TargetAssignmentNotFound { .. } => "TARGET_ASSIGNMENT_NOT_FOUND",
            AllocationError::BlendIncompatible { .. } => "BLEND_INCOMPATIBLE",
            AllocationError::Persistence(_) => "PERSISTENCE_FAILURE",
            AllocationError::Config(_) => "CONFIG_ERROR",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            AllocationError::NoBatches
            | AllocationError::NoAllocations
            | AllocationError::InvalidVolume(_)
            | AllocationError::InvalidDateRange { .. }
            | AllocationError::InvalidCombination(_)
            | AllocationError::DuplicateTank { .. }
            | AllocationError::TargetLotWithoutBlend { .. } => ErrorCategory::Malformed,
            AllocationError::TanksUnavailable(_)
            | AllocationError::TankOverflow { .. }
            | AllocationError::TankOccupied { .. } => ErrorCategory::ResourceConflict,
            AllocationError::TankNotFound { .. }
            | AllocationError::BatchesNotFound { .. }
            | AllocationError::TargetLotNotFound { .. }
            | AllocationError::TargetAssignmentNotFound { .. } => ErrorCategory::Referential,
            AllocationError::BlendIncompatible { .. } => ErrorCategory::Compatibility,
            AllocationError::Persistence(_) | AllocationError::Config(_) => {
                ErrorCategory::Persistence
            }
        }
    }

    /// 结构化详情 (随错误响应返回)
    pub fn details(&self) -> Option<JsonValue> {
        match self {
            AllocationError::TanksUnavailable(report) => serde_json::to_value(report).ok(),
            AllocationError::TankOverflow {
                tank_id,
                tank_name,
                current_volume,
                added_volume,
                total_after,
                capacity,
            } => Some(json!({
                "tank_id": tank_id,
                "tank_name": tank_name,
                "current_volume": current_volume,
                "added_volume": added_volume,
                "total_after": total_after,
                "capacity": capacity,
            })),
            AllocationError::TankOccupied {
                tank_id,
                occupying_lot_id,
                ..
            } => Some(json!({ "tank_id": tank_id, "occupying_lot_id": occupying_lot_id })),
            AllocationError::DuplicateTank { tank_id } | AllocationError::TankNotFound { tank_id } => {
                Some(json!({ "tank_id": tank_id }))
            }
            AllocationError::BatchesNotFound { missing } => Some(json!({ "missing": missing })),
            AllocationError::BlendIncompatible { errors, warnings } => {
                Some(json!({ "errors": errors, "warnings": warnings }))
            }
            AllocationError::TargetLotNotFound { lot_id }
            | AllocationError::TargetAssignmentNotFound { lot_id } => {
                Some(json!({ "lot_id": lot_id }))
            }
            _ => None,
        }
    }
}

/// Result 类型别名
pub type AllocationResult<T> = Result<T, AllocationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_categories() {
        let err = AllocationError::TankOverflow {
            tank_id: "T1".to_string(),
            tank_name: "FV-01".to_string(),
            current_volume: 200.0,
            added_volume: 400.0,
            total_after: 600.0,
            capacity: 500.0,
        };
        assert_eq!(err.code(), "TANK_OVERFLOW");
        assert_eq!(err.category(), ErrorCategory::ResourceConflict);
        assert_eq!(err.details().unwrap()["total_after"], 600.0);

        let err = AllocationError::BatchesNotFound {
            missing: vec!["B9".to_string()],
        };
        assert_eq!(err.category(), ErrorCategory::Referential);
        assert!(err.to_string().contains("B9"));
    }

    #[test]
    fn test_repository_error_is_persistence_failure() {
        let err: AllocationError = RepositoryError::LockError("poisoned".to_string()).into();
        assert_eq!(err.code(), "PERSISTENCE_FAILURE");
        assert_eq!(err.category(), ErrorCategory::Persistence);
        assert!(err.details().is_none());
    }
}
