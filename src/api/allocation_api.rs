// ==========================================
// 发酵批次与罐位分配引擎 - 分配 API
// ==========================================
// 职责:
// 1. 分配入口（强类型请求 / JSON 请求）
// 2. 只读预检（可用性 / 容量 / 占用）
// 3. 酒批谱系查询、分配审计查询
// ==========================================

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::error::{ApiError, ApiResult};
use crate::config::{AllocationConfigReader, ConfigManager};
use crate::domain::action_log::AllocationLog;
use crate::domain::assignment::TankAssignment;
use crate::domain::batch::Batch;
use crate::domain::lot::{Lot, LotBatch};
use crate::domain::request::{AllocationRequest, RequestContext};
use crate::domain::transfer::Transfer;
use crate::domain::types::AllocationScenario;
use crate::engine::orchestrator::{AllocationCommit, AllocationOrchestrator, AllocationPreview};
use crate::engine::workflow::WorkflowOutcome;
use crate::repository::{
    AllocationLogRepository, AssignmentRepository, BatchRepository, LineageStore, LotRepository,
    TransferRepository,
};

// ==========================================
// 响应类型
// ==========================================

/// 分配成功响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationResponse {
    pub action_id: String,
    pub scenario: AllocationScenario,
    /// SIMPLE 的酒批 / SPLIT 的父批 / BLEND 的目标酒批
    pub lot: Lot,
    pub details: AllocationDetails,
    pub warnings: Vec<String>,
    pub side_effect_warnings: Vec<String>,
}

/// 按场景区分的响应明细
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationDetails {
    Simple {
        assignment: TankAssignment,
        tank_name: String,
    },
    Split {
        child_lots: Vec<Lot>,
        assignments: Vec<TankAssignment>,
        transfers: Vec<Transfer>,
    },
    Blend {
        batch_count: usize,
        tank_name: String,
        assignment: TankAssignment,
        created_new_lot: bool,
        blend_code_assigned: Option<String>,
    },
}

impl From<AllocationCommit> for AllocationResponse {
    fn from(commit: AllocationCommit) -> Self {
        let scenario = commit.scenario();
        let (lot, details) = match commit.outcome {
            WorkflowOutcome::Simple(o) => (
                o.lot,
                AllocationDetails::Simple {
                    assignment: o.assignment,
                    tank_name: o.tank.name,
                },
            ),
            WorkflowOutcome::Split(o) => (
                o.parent_lot,
                AllocationDetails::Split {
                    child_lots: o.child_lots,
                    assignments: o.assignments,
                    transfers: o.transfers,
                },
            ),
            WorkflowOutcome::Blend(o) => (
                o.lot,
                AllocationDetails::Blend {
                    batch_count: o.batches.len(),
                    tank_name: o.tank.name,
                    assignment: o.assignment,
                    created_new_lot: o.created_new_lot,
                    blend_code_assigned: o.blend_code_assigned,
                },
            ),
        };
        Self {
            action_id: commit.action_id,
            scenario,
            lot,
            details,
            warnings: commit.warnings,
            side_effect_warnings: commit.side_effect_warnings,
        }
    }
}

/// 批次贡献（含批次信息）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotContribution {
    pub lot_batch: LotBatch,
    pub batch: Option<Batch>,
}

/// 酒批谱系
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotLineage {
    pub lot: Lot,
    pub parent: Option<Lot>,
    pub children: Vec<Lot>,
    pub contributions: Vec<LotContribution>,
    pub assignments: Vec<TankAssignment>,
    pub transfers: Vec<Transfer>,
}

// ==========================================
// AllocationApi
// ==========================================
pub struct AllocationApi<C>
where
    C: AllocationConfigReader,
{
    orchestrator: Arc<AllocationOrchestrator<C>>,
}

impl AllocationApi<ConfigManager> {
    /// 打开数据库（不存在则建表）, 使用 config_kv 中的配置
    pub fn open(db_path: &str) -> ApiResult<Self> {
        let store = Arc::new(LineageStore::new(db_path)?);
        store.read(|conn| {
            crate::db::init_schema(conn).map_err(|e| ApiError::DatabaseError(e.to_string()))
        })?;
        let config = Arc::new(ConfigManager::from_connection(store.connection()));
        Ok(Self::new(Arc::new(AllocationOrchestrator::new(store, config))))
    }
}

impl<C> AllocationApi<C>
where
    C: AllocationConfigReader,
{
    pub fn new(orchestrator: Arc<AllocationOrchestrator<C>>) -> Self {
        Self { orchestrator }
    }

    fn validate_context(ctx: &RequestContext) -> ApiResult<()> {
        if ctx.tenant_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("租户标识不能为空".to_string()));
        }
        if ctx.user_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("操作人不能为空".to_string()));
        }
        Ok(())
    }

    // ==========================================
    // 分配接口
    // ==========================================

    /// 执行分配
    ///
    /// # 返回
    /// - Ok(AllocationResponse): 已提交
    /// - Err(ApiError): 带稳定错误码的失败（未写入任何谱系记录）
    pub async fn allocate(
        &self,
        ctx: &RequestContext,
        request: &AllocationRequest,
    ) -> ApiResult<AllocationResponse> {
        Self::validate_context(ctx)?;
        let commit = self.orchestrator.allocate(ctx, request).await?;
        Ok(AllocationResponse::from(commit))
    }

    /// 从 JSON 请求体执行分配
    pub async fn allocate_json(
        &self,
        ctx: &RequestContext,
        body: &str,
    ) -> ApiResult<AllocationResponse> {
        let request: AllocationRequest = serde_json::from_str(body)
            .map_err(|e| ApiError::InvalidInput(format!("请求体解析失败: {}", e)))?;
        self.allocate(ctx, &request).await
    }

    /// 只读预检
    pub fn check_availability(
        &self,
        ctx: &RequestContext,
        request: &AllocationRequest,
    ) -> ApiResult<AllocationPreview> {
        Self::validate_context(ctx)?;
        let preview = self.orchestrator.preview(ctx, request)?;
        debug!(feasible = preview.is_feasible(), "预检完成");
        Ok(preview)
    }

    // ==========================================
    // 查询接口
    // ==========================================

    /// 查询酒批谱系
    pub fn lot_lineage(&self, ctx: &RequestContext, lot_id: &str) -> ApiResult<LotLineage> {
        Self::validate_context(ctx)?;
        if lot_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("酒批ID不能为空".to_string()));
        }

        self.orchestrator.store().read(|conn| {
            let lot = LotRepository::find_by_id(conn, &ctx.tenant_id, lot_id)?
                .ok_or_else(|| ApiError::NotFound(format!("Lot(id={})不存在", lot_id)))?;

            let parent = match &lot.parent_lot_id {
                Some(parent_id) => LotRepository::find_by_id(conn, &ctx.tenant_id, parent_id)?,
                None => None,
            };
            let children = LotRepository::find_children(conn, &lot.lot_id)?;

            let lot_batches = LotRepository::list_lot_batches(conn, &lot.lot_id)?;
            let mut seen = HashSet::new();
            let batch_ids: Vec<String> = lot_batches
                .iter()
                .map(|lb| lb.batch_id.clone())
                .filter(|id| seen.insert(id.clone()))
                .collect();
            let batches = BatchRepository::find_by_ids(conn, &ctx.tenant_id, &batch_ids)?;
            let contributions = lot_batches
                .into_iter()
                .map(|lot_batch| {
                    let batch = batches
                        .iter()
                        .find(|b| b.batch_id == lot_batch.batch_id)
                        .cloned();
                    LotContribution { lot_batch, batch }
                })
                .collect();

            let assignments = AssignmentRepository::find_by_lot(conn, &lot.lot_id)?;
            let transfers = TransferRepository::find_by_lot(conn, &lot.lot_id)?;

            info!(lot_code = %lot.lot_code, children = children.len(), "谱系查询");
            Ok(LotLineage {
                lot,
                parent,
                children,
                contributions,
                assignments,
                transfers,
            })
        })
    }

    /// 最近的分配审计记录
    pub fn recent_allocations(
        &self,
        ctx: &RequestContext,
        limit: i64,
    ) -> ApiResult<Vec<AllocationLog>> {
        Self::validate_context(ctx)?;
        if limit <= 0 {
            return Err(ApiError::InvalidInput(format!("limit 必须大于 0: {}", limit)));
        }
        self.orchestrator.store().read(|conn| {
            Ok(AllocationLogRepository::find_recent_by_tenant(
                conn,
                &ctx.tenant_id,
                limit,
            )?)
        })
    }
}
