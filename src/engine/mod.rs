// ==========================================
// 发酵批次与罐位分配引擎 - 引擎层
// ==========================================
// 职责: 场景判定 / 可用性 / 容量 / 兼容性校验 / 工作流编排
// 红线: 引擎不拼业务 SQL, 数据访问全部经由 repository
// ==========================================

pub mod availability;
pub mod capacity;
pub mod compatibility;
pub mod error;
pub mod events;
pub mod lot_code;
pub mod orchestrator;
pub mod scenario;
pub mod side_effects;
pub mod workflow;

// 重导出核心引擎
pub use availability::{
    AvailabilityChecker, AvailabilityReport, ConflictingAssignment, TankAvailability,
    TankWindowRequest,
};
pub use capacity::{CapacityCheck, CapacityValidator};
pub use compatibility::{
    BlendCompatibilityPolicy, CompatibilityReport, CompatibilityValidator, StyleFamilyPolicy,
};
pub use error::{AllocationError, AllocationResult, ErrorCategory};
pub use events::{
    LineageEvent, LineageEventPublisher, LineageEventType, NoOpEventPublisher,
    OptionalEventPublisher,
};
pub use lot_code::{is_blend_code, LotCodeGenerator, SequentialLotCodeGenerator};
pub use orchestrator::{AllocationCommit, AllocationOrchestrator, AllocationPreview};
pub use scenario::{build_plan, classify};
pub use side_effects::{TankDisplayUpdate, TankDisplayUpdater};
pub use workflow::{BlendOutcome, SimpleOutcome, SplitOutcome, WorkflowOutcome};
