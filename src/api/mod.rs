// ==========================================
// 发酵批次与罐位分配引擎 - API 层
// ==========================================
// 职责: 对外业务接口, 供命令行 / 服务层调用
// ==========================================

pub mod allocation_api;
pub mod error;

// 重导出核心类型
pub use allocation_api::{
    AllocationApi, AllocationDetails, AllocationResponse, LotContribution, LotLineage,
};
pub use error::{ApiError, ApiResult, ErrorResponse};
