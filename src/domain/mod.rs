// ==========================================
// 发酵批次与罐位分配引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、请求模型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod assignment;
pub mod batch;
pub mod lot;
pub mod request;
pub mod tank;
pub mod transfer;
pub mod types;

// 重导出核心类型
pub use action_log::AllocationLog;
pub use assignment::TankAssignment;
pub use batch::{Batch, BatchEvent, GravityReading};
pub use lot::{Lot, LotBatch};
pub use request::{
    AllocationPlan, AllocationRequest, BlendPlan, BlendTarget, InitialReading, PlanCommon,
    RequestContext, SimplePlan, SplitPlan, TankAllocation,
};
pub use tank::Tank;
pub use transfer::Transfer;
pub use types::{
    AllocationScenario, AssignmentStatus, BatchEventType, BatchStatus, LotPhase, LotStatus,
    SplitPercentageMode, TankStatus, TransferStatus, TransferType,
};
