// ==========================================
// 发酵批次与罐位分配引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 批次入罐 / 分罐 / 混酿的事务化分配与谱系追踪
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 校验与工作流
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    AllocationScenario, AssignmentStatus, BatchStatus, LotPhase, LotStatus, TankStatus,
    TransferType,
};

// 领域实体
pub use domain::{
    AllocationLog, AllocationRequest, Batch, Lot, LotBatch, RequestContext, Tank,
    TankAllocation, TankAssignment, Transfer,
};

// 引擎
pub use engine::{
    AllocationCommit, AllocationError, AllocationOrchestrator, AllocationPreview,
    AvailabilityChecker, CapacityValidator, CompatibilityValidator, WorkflowOutcome,
};

// API
pub use api::{AllocationApi, AllocationResponse, ApiError, LotLineage};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "发酵批次与罐位分配引擎";
