// ==========================================
// 发酵批次与罐位分配引擎 - API层错误类型
// ==========================================
// 职责: 统一对外错误形态 (稳定错误码 + 状态类别 + 结构化详情)
// 状态映射:
// - 400: 请求形状错误
// - 404: 罐 / 批次 / 酒批不存在
// - 409: 罐不可用 / 已占用 / 超容
// - 422: 混酿不兼容
// - 500: 持久层意外失败
// ==========================================

use crate::engine::error::{AllocationError, ErrorCategory};
use crate::repository::error::RepositoryError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 边界错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    // ==========================================
    // 分配错误
    // ==========================================
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("内部错误: {0}")]
    InternalError(String),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InternalError(format!("字段{}数据错误: {}", field, message))
            }
            other => ApiError::DatabaseError(other.to_string()),
        }
    }
}

impl ApiError {
    /// 稳定错误码
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Allocation(e) => e.code(),
            ApiError::DatabaseError(_) => "PERSISTENCE_FAILURE",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP 风格状态码
    pub fn status(&self) -> u16 {
        match self {
            ApiError::InvalidInput(_) => 400,
            ApiError::NotFound(_) => 404,
            ApiError::Allocation(e) => match e.category() {
                ErrorCategory::Malformed => 400,
                ErrorCategory::Referential => 404,
                ErrorCategory::ResourceConflict => 409,
                ErrorCategory::Compatibility => 422,
                ErrorCategory::Persistence => 500,
            },
            ApiError::DatabaseError(_) | ApiError::InternalError(_) => 500,
        }
    }

    pub fn details(&self) -> Option<JsonValue> {
        match self {
            ApiError::Allocation(e) => e.details(),
            _ => None,
        }
    }

    /// 转换为对外错误响应
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
            status: self.status(),
            details: self.details(),
        }
    }
}

/// 对外错误响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::availability::AvailabilityReport;

    #[test]
    fn test_status_mapping_by_category() {
        assert_eq!(ApiError::from(AllocationError::NoBatches).status(), 400);
        assert_eq!(
            ApiError::from(AllocationError::TankNotFound {
                tank_id: "T1".to_string()
            })
            .status(),
            404
        );
        assert_eq!(
            ApiError::from(AllocationError::TanksUnavailable(AvailabilityReport::default()))
                .status(),
            409
        );
        assert_eq!(
            ApiError::from(AllocationError::BlendIncompatible {
                errors: vec!["x".to_string()],
                warnings: vec![],
            })
            .status(),
            422
        );
        assert_eq!(
            ApiError::from(AllocationError::Persistence(RepositoryError::LockError(
                "x".to_string()
            )))
            .status(),
            500
        );
    }

    #[test]
    fn test_error_response_shape() {
        let err = ApiError::from(AllocationError::TankOccupied {
            tank_id: "T1".to_string(),
            tank_name: "FV-01".to_string(),
            occupying_lot_id: "L9".to_string(),
        });
        let response = err.to_response();
        assert_eq!(response.code, "TANK_OCCUPIED");
        assert_eq!(response.status, 409);
        assert_eq!(response.details.unwrap()["occupying_lot_id"], "L9");

        let json = serde_json::to_value(ApiError::InvalidInput("bad".to_string()).to_response())
            .unwrap();
        assert!(json.get("details").is_none());
        assert_eq!(json["code"], "INVALID_INPUT");
    }

    #[test]
    fn test_repository_not_found_maps_to_404() {
        let err: ApiError = RepositoryError::NotFound {
            entity: "Lot".to_string(),
            id: "L1".to_string(),
        }
        .into();
        assert_eq!(err.status(), 404);
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
