// ==========================================
// 发酵批次与罐位分配引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约定: 仓储无状态, 函数接收 &Connection,
//       由 LineageStore 统一持有连接并划定事务边界
// ==========================================

pub mod allocation_log_repo;
pub mod assignment_repo;
pub mod batch_repo;
pub mod error;
pub mod lot_repo;
pub mod store;
pub mod tank_repo;
pub mod transfer_repo;

// 重导出核心仓储
pub use allocation_log_repo::AllocationLogRepository;
pub use assignment_repo::AssignmentRepository;
pub use batch_repo::BatchRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use lot_repo::LotRepository;
pub use store::LineageStore;
pub use tank_repo::TankRepository;
pub use transfer_repo::TransferRepository;
