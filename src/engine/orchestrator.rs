// ==========================================
// 发酵批次与罐位分配引擎 - 分配编排器
// ==========================================
// 职责: 单笔分配请求的完整流程
// 状态: VALIDATING → { SIMPLE | SPLIT | BLEND } → COMMITTED | ABORTED
// ==========================================
// 流程:
// 1. 请求形状校验 (事务外, 纯函数)
// 2. 读取配置快照
// 3. BEGIN IMMEDIATE 事务内:
//    目标酒批 → 罐 → 可用性 → 容量 → 占用 → 批次归属 → 混酿兼容性
//    → 场景工作流 → 审计日志
// 4. 提交后: 罐展示字段刷新 + 谱系事件发布 (失败只产生警告)
// ==========================================
// 红线: 校验读与全部写入在同一事务内, 任何失败整笔回滚
// ==========================================

use crate::config::{AllocationConfigReader, AllocationSettings};
use crate::domain::action_log::AllocationLog;
use crate::domain::batch::Batch;
use crate::domain::request::{
    AllocationPlan, AllocationRequest, BlendPlan, BlendTarget, RequestContext,
};
use crate::domain::tank::Tank;
use crate::domain::types::AllocationScenario;
use crate::engine::availability::{AvailabilityChecker, AvailabilityReport, TankWindowRequest};
use crate::engine::capacity::{CapacityCheck, CapacityValidator};
use crate::engine::compatibility::{BlendCompatibilityPolicy, CompatibilityValidator};
use crate::engine::error::{AllocationError, AllocationResult};
use crate::engine::events::{
    LineageEvent, LineageEventPublisher, OptionalEventPublisher,
};
use crate::engine::lot_code::{LotCodeGenerator, SequentialLotCodeGenerator};
use crate::engine::scenario::{build_plan, scenario_of};
use crate::engine::side_effects::TankDisplayUpdater;
use crate::engine::workflow::{
    blend, simple, split, BlendTargetContext, WorkflowContext, WorkflowOutcome,
};
use crate::repository::{
    AllocationLogRepository, AssignmentRepository, BatchRepository, LineageStore, LotRepository,
    TankRepository,
};
use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// 已提交的分配结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationCommit {
    pub action_id: String,
    pub outcome: WorkflowOutcome,
    /// 校验警告（兼容性近似匹配、目标罐替换等）
    pub warnings: Vec<String>,
    /// 提交后副作用失败说明
    pub side_effect_warnings: Vec<String>,
}

impl AllocationCommit {
    pub fn scenario(&self) -> AllocationScenario {
        self.outcome.scenario()
    }
}

/// 只读预检结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationPreview {
    pub scenario: AllocationScenario,
    /// 并入已有酒批时不做可用性检查, 为 None
    pub availability: Option<AvailabilityReport>,
    pub capacity: Vec<CapacityCheck>,
    /// 已有 ACTIVE 占用的罐（并入已有酒批时为空）
    pub occupied_tanks: Vec<String>,
    pub warnings: Vec<String>,
}

impl AllocationPreview {
    /// 按当前数据是否可以提交
    pub fn is_feasible(&self) -> bool {
        self.availability
            .as_ref()
            .map(|r| r.all_available)
            .unwrap_or(true)
            && self.capacity.iter().all(|c| c.ok)
            && self.occupied_tanks.is_empty()
    }
}

/// 事务内解析出的资源
struct ResolvedResources {
    /// 与计划中的罐分配同序
    tanks: Vec<Tank>,
    target: Option<BlendTargetContext>,
    warnings: Vec<String>,
}

// ==========================================
// AllocationOrchestrator
// ==========================================
pub struct AllocationOrchestrator<C>
where
    C: AllocationConfigReader,
{
    store: Arc<LineageStore>,
    config: Arc<C>,
    compatibility: CompatibilityValidator,
    codes: Arc<dyn LotCodeGenerator>,
    events: OptionalEventPublisher,
    display: TankDisplayUpdater,
}

impl<C> AllocationOrchestrator<C>
where
    C: AllocationConfigReader,
{
    /// 创建编排器（默认: 风格大类兼容策略 / 按日顺序编码 / 不发布事件）
    pub fn new(store: Arc<LineageStore>, config: Arc<C>) -> Self {
        Self {
            display: TankDisplayUpdater::new(store.clone()),
            store,
            config,
            compatibility: CompatibilityValidator::default(),
            codes: Arc::new(SequentialLotCodeGenerator),
            events: OptionalEventPublisher::none(),
        }
    }

    pub fn with_compatibility_policy(mut self, policy: Arc<dyn BlendCompatibilityPolicy>) -> Self {
        self.compatibility = CompatibilityValidator::new(policy);
        self
    }

    pub fn with_code_generator(mut self, codes: Arc<dyn LotCodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    pub fn with_event_publisher(mut self, publisher: Arc<dyn LineageEventPublisher>) -> Self {
        self.events = OptionalEventPublisher::with_publisher(publisher);
        self
    }

    pub fn store(&self) -> &Arc<LineageStore> {
        &self.store
    }

    // ==========================================
    // 分配入口
    // ==========================================

    /// 执行一笔分配请求
    ///
    /// # 返回
    /// - Ok(AllocationCommit): 已提交
    /// - Err(AllocationError): 已回滚（或未开始写入）
    #[instrument(skip(self, request), fields(
        tenant_id = %ctx.tenant_id,
        user_id = %ctx.user_id,
        batch_count = request.batch_ids.len(),
        allocation_count = request.allocations.len(),
        blend = request.blend
    ))]
    pub async fn allocate(
        &self,
        ctx: &RequestContext,
        request: &AllocationRequest,
    ) -> AllocationResult<AllocationCommit> {
        let plan = build_plan(request).map_err(|e| {
            warn!(code = e.code(), error = %e, "请求校验失败");
            e
        })?;
        let scenario = scenario_of(&plan);
        debug!(scenario = %scenario, "场景判定");

        let settings = AllocationSettings::load(self.config.as_ref())
            .await
            .map_err(|e| AllocationError::Config(e.to_string()))?;

        let payload = serde_json::to_value(request).ok();
        let now = Utc::now().naive_utc();

        let (outcome, warnings, action_id) = self
            .store
            .in_transaction(|conn| self.execute(conn, ctx, &plan, &settings, now, payload))
            .map_err(|e| {
                warn!(scenario = %scenario, code = e.code(), error = %e, "分配失败, 事务已回滚");
                e
            })?;

        info!(
            scenario = %scenario,
            lot_code = %outcome.primary_lot().lot_code,
            action_id = %action_id,
            warnings = warnings.len(),
            "分配已提交"
        );

        // ===== 提交后副作用 =====
        let mut side_effect_warnings = self.display.apply(&outcome.display_updates(), now);

        let event = LineageEvent::from_outcome(&outcome, &ctx.tenant_id, &ctx.user_id, now);
        if let Err(e) = self.events.publish(event) {
            warn!(error = %e, "谱系事件发布失败");
            side_effect_warnings.push(format!("谱系事件发布失败: {}", e));
        }

        Ok(AllocationCommit {
            action_id,
            outcome,
            warnings,
            side_effect_warnings,
        })
    }

    /// 只读预检: 可用性 / 容量 / 占用（不写库, 冲突不报错）
    #[instrument(skip(self, request), fields(tenant_id = %ctx.tenant_id))]
    pub fn preview(
        &self,
        ctx: &RequestContext,
        request: &AllocationRequest,
    ) -> AllocationResult<AllocationPreview> {
        let plan = build_plan(request)?;
        let scenario = scenario_of(&plan);

        self.store.read(|conn| {
            let resolved = Self::resolve_resources(conn, ctx, &plan)?;
            let into_existing = resolved.target.is_some();

            let availability = if into_existing {
                None
            } else {
                Some(Self::check_availability(conn, &plan, &resolved.tanks)?)
            };
            let capacity = Self::check_capacity(conn, &plan, &resolved)?;
            let occupied_tanks = if into_existing {
                Vec::new()
            } else {
                let mut occupied = Vec::new();
                for tank in &resolved.tanks {
                    if !AssignmentRepository::find_active_by_tank(conn, &tank.tank_id)?.is_empty() {
                        occupied.push(tank.tank_id.clone());
                    }
                }
                occupied
            };

            Ok(AllocationPreview {
                scenario,
                availability,
                capacity,
                occupied_tanks,
                warnings: resolved.warnings,
            })
        })
    }

    // ==========================================
    // 事务内流程
    // ==========================================

    fn execute(
        &self,
        conn: &Connection,
        ctx: &RequestContext,
        plan: &AllocationPlan,
        settings: &AllocationSettings,
        now: NaiveDateTime,
        payload: Option<JsonValue>,
    ) -> AllocationResult<(WorkflowOutcome, Vec<String>, String)> {
        let resolved = Self::resolve_resources(conn, ctx, plan)?;
        let into_existing = resolved.target.is_some();

        // 可用性（并入已有酒批时跳过）
        if !into_existing {
            let report = Self::check_availability(conn, plan, &resolved.tanks)?;
            if !report.all_available {
                return Err(AllocationError::TanksUnavailable(report));
            }
        }

        // 容量
        for (check, tank) in Self::check_capacity(conn, plan, &resolved)?
            .iter()
            .zip(resolved.tanks.iter())
        {
            check.ensure_fits(tank)?;
        }

        // 占用（并入已有酒批时跳过）
        if !into_existing {
            for tank in &resolved.tanks {
                let active = AssignmentRepository::find_active_by_tank(conn, &tank.tank_id)?;
                if let Some(existing) = active.first() {
                    return Err(AllocationError::TankOccupied {
                        tank_id: tank.tank_id.clone(),
                        tank_name: tank.name.clone(),
                        occupying_lot_id: existing.lot_id.clone(),
                    });
                }
            }
        }

        // 批次存在且归属当前租户
        let batches = Self::load_batches(conn, ctx, plan)?;

        // 混酿兼容性（写入之前）
        let mut warnings = resolved.warnings;
        if let AllocationPlan::Blend(_) = plan {
            let existing = match &resolved.target {
                Some(target) => Self::load_contributors(conn, ctx, &target.lot.lot_id)?,
                None => Vec::new(),
            };
            let report = self.compatibility.validate(&batches, &existing);
            if !report.compatible {
                return Err(AllocationError::BlendIncompatible {
                    errors: report.errors,
                    warnings: report.warnings,
                });
            }
            warnings.extend(report.warnings);
        }

        // 场景工作流
        let wf = WorkflowContext {
            conn,
            request: ctx,
            settings,
            codes: self.codes.as_ref(),
            now,
        };
        let outcome = match plan {
            AllocationPlan::Simple(p) => {
                WorkflowOutcome::Simple(simple::run(&wf, p, &resolved.tanks[0], &batches[0])?)
            }
            AllocationPlan::Split(p) => {
                WorkflowOutcome::Split(split::run(&wf, p, &resolved.tanks, &batches[0])?)
            }
            AllocationPlan::Blend(p) => WorkflowOutcome::Blend(blend::run(
                &wf,
                p,
                &resolved.tanks[0],
                &batches,
                resolved.target,
            )?),
        };

        // 审计日志
        let action_id = AllocationLogRepository::insert(
            conn,
            &AllocationLog {
                action_id: Uuid::new_v4().to_string(),
                tenant_id: ctx.tenant_id.clone(),
                actor: ctx.user_id.clone(),
                scenario: outcome.scenario(),
                lot_id: outcome.primary_lot().lot_id.clone(),
                action_ts: now,
                payload_json: payload,
                detail: Some(outcome.summary()),
            },
        )?;

        Ok((outcome, warnings, action_id))
    }

    // ==========================================
    // 解析 / 校验辅助
    // ==========================================

    /// 加载目标酒批与罐
    ///
    /// 并入已有酒批时以目标占用所在罐为准; 请求罐不一致时产生警告
    fn resolve_resources(
        conn: &Connection,
        ctx: &RequestContext,
        plan: &AllocationPlan,
    ) -> AllocationResult<ResolvedResources> {
        let mut warnings = Vec::new();

        let target = match plan {
            AllocationPlan::Blend(BlendPlan {
                target: BlendTarget::ExistingLot(lot_id),
                ..
            }) => Some(Self::load_blend_target(conn, ctx, lot_id)?),
            _ => None,
        };

        let mut tanks = Vec::new();
        for allocation in plan.allocations() {
            let tank_id = match &target {
                Some(t) => {
                    if t.assignment.tank_id != allocation.tank_id {
                        warnings.push(format!(
                            "目标酒批 {} 位于罐 {}, 忽略请求中的罐 {}",
                            t.lot.lot_code, t.assignment.tank_id, allocation.tank_id
                        ));
                    }
                    t.assignment.tank_id.as_str()
                }
                None => allocation.tank_id.as_str(),
            };
            let tank = TankRepository::find_by_id(conn, &ctx.tenant_id, tank_id)?.ok_or_else(
                || AllocationError::TankNotFound {
                    tank_id: tank_id.to_string(),
                },
            )?;
            tanks.push(tank);
        }

        Ok(ResolvedResources {
            tanks,
            target,
            warnings,
        })
    }

    fn load_blend_target(
        conn: &Connection,
        ctx: &RequestContext,
        lot_id: &str,
    ) -> AllocationResult<BlendTargetContext> {
        let lot = LotRepository::find_by_id(conn, &ctx.tenant_id, lot_id)?.ok_or_else(|| {
            AllocationError::TargetLotNotFound {
                lot_id: lot_id.to_string(),
            }
        })?;
        let assignment = AssignmentRepository::find_current_for_lot(conn, lot_id)?.ok_or_else(
            || AllocationError::TargetAssignmentNotFound {
                lot_id: lot_id.to_string(),
            },
        )?;
        Ok(BlendTargetContext { lot, assignment })
    }

    fn check_availability(
        conn: &Connection,
        plan: &AllocationPlan,
        tanks: &[Tank],
    ) -> AllocationResult<AvailabilityReport> {
        let common = plan.common();
        let requests: Vec<TankWindowRequest> = tanks
            .iter()
            .map(|t| TankWindowRequest {
                tank_id: t.tank_id.clone(),
                planned_start: common.planned_start,
                planned_end: common.planned_end,
            })
            .collect();
        let by_id: BTreeMap<String, Tank> = tanks
            .iter()
            .map(|t| (t.tank_id.clone(), t.clone()))
            .collect();
        Ok(AvailabilityChecker::check(conn, &requests, &by_id)?)
    }

    /// 逐罐容量校验（与 tanks 同序）
    fn check_capacity(
        conn: &Connection,
        plan: &AllocationPlan,
        resolved: &ResolvedResources,
    ) -> AllocationResult<Vec<CapacityCheck>> {
        let mut checks = Vec::with_capacity(resolved.tanks.len());
        for (tank, allocation) in resolved.tanks.iter().zip(plan.allocations()) {
            let check = match &resolved.target {
                Some(target) => CapacityValidator::validate_for_target(
                    conn,
                    tank,
                    &target.assignment,
                    allocation.volume,
                )?,
                None => CapacityValidator::validate(conn, tank, allocation.volume)?,
            };
            checks.push(check);
        }
        Ok(checks)
    }

    /// 加载批次（按请求顺序）; 缺失或不属于租户的批次 → BATCHES_NOT_FOUND
    fn load_batches(
        conn: &Connection,
        ctx: &RequestContext,
        plan: &AllocationPlan,
    ) -> AllocationResult<Vec<Batch>> {
        let ids: Vec<String> = plan.batch_ids().into_iter().map(str::to_string).collect();
        let batches = BatchRepository::find_by_ids(conn, &ctx.tenant_id, &ids)?;
        if batches.len() != ids.len() {
            let found: HashSet<&str> = batches.iter().map(|b| b.batch_id.as_str()).collect();
            let missing = ids
                .iter()
                .filter(|id| !found.contains(id.as_str()))
                .cloned()
                .collect();
            return Err(AllocationError::BatchesNotFound { missing });
        }
        Ok(batches)
    }

    /// 目标酒批中已有的贡献批次
    fn load_contributors(
        conn: &Connection,
        ctx: &RequestContext,
        lot_id: &str,
    ) -> AllocationResult<Vec<Batch>> {
        let mut seen = HashSet::new();
        let ids: Vec<String> = LotRepository::list_lot_batches(conn, lot_id)?
            .into_iter()
            .map(|lb| lb.batch_id)
            .filter(|id| seen.insert(id.clone()))
            .collect();
        Ok(BatchRepository::find_by_ids(conn, &ctx.tenant_id, &ids)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::request::TankAllocation;
    use crate::domain::types::{BatchStatus, TankStatus};
    use chrono::NaiveDate;
    use std::sync::Mutex;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn setup() -> AllocationOrchestrator<AllocationSettings> {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();

        let now = at(1);
        for (id, cap) in [("T1", 500.0), ("T2", 500.0)] {
            TankRepository::insert(
                &conn,
                &Tank {
                    tank_id: id.to_string(),
                    tenant_id: "brewery-a".to_string(),
                    name: format!("FV-{}", id),
                    capacity: cap,
                    status: TankStatus::Available,
                    current_volume: 0.0,
                    current_lot_code: None,
                    current_batch_label: None,
                    updated_at: now,
                },
            )
            .unwrap();
        }
        BatchRepository::insert(
            &conn,
            &Batch {
                batch_id: "B1".to_string(),
                tenant_id: "brewery-a".to_string(),
                batch_number: "#101".to_string(),
                recipe_name: None,
                style_family: Some("IPA".to_string()),
                status: BatchStatus::Brewing,
                updated_at: now,
            },
        )
        .unwrap();

        let store = Arc::new(LineageStore::from_connection(Arc::new(Mutex::new(conn))));
        AllocationOrchestrator::new(store, Arc::new(AllocationSettings::default()))
    }

    fn request(allocations: &[(&str, f64)]) -> AllocationRequest {
        AllocationRequest {
            batch_ids: vec!["B1".to_string()],
            allocations: allocations
                .iter()
                .map(|(t, v)| TankAllocation::new(*t, *v))
                .collect(),
            planned_start: at(2),
            planned_end: at(16),
            blend: false,
            target_lot_id: None,
            notes: None,
            initial_gravity: None,
            initial_temperature: None,
        }
    }

    #[tokio::test]
    async fn test_simple_commit_writes_audit_log() {
        let orchestrator = setup();
        let ctx = RequestContext::new("brewery-a", "brewer");
        let commit = orchestrator.allocate(&ctx, &request(&[("T1", 450.0)])).await.unwrap();
        assert_eq!(commit.scenario(), AllocationScenario::Simple);
        assert!(commit.side_effect_warnings.is_empty());

        let logs = orchestrator
            .store()
            .read(|conn| AllocationLogRepository::find_recent_by_tenant(conn, "brewery-a", 10))
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action_id, commit.action_id);
        assert_eq!(logs[0].lot_id, commit.outcome.primary_lot().lot_id);
    }

    #[tokio::test]
    async fn test_unknown_tank_is_referential_error() {
        let orchestrator = setup();
        let ctx = RequestContext::new("brewery-a", "brewer");
        let err = orchestrator
            .allocate(&ctx, &request(&[("T404", 100.0)]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "TANK_NOT_FOUND");
    }

    #[test]
    fn test_preview_reports_without_writing() {
        let orchestrator = setup();
        let ctx = RequestContext::new("brewery-a", "brewer");
        let preview = orchestrator
            .preview(&ctx, &request(&[("T1", 300.0), ("T2", 600.0)]))
            .unwrap();
        assert_eq!(preview.scenario, AllocationScenario::Split);
        assert!(preview.availability.as_ref().unwrap().all_available);
        assert!(preview.capacity[0].ok);
        assert!(!preview.capacity[1].ok);
        assert!(!preview.is_feasible());

        let lots: i64 = orchestrator
            .store()
            .read(|conn| -> crate::repository::RepositoryResult<i64> {
                Ok(conn.query_row("SELECT COUNT(*) FROM lot", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(lots, 0);
    }

    struct FailingPublisher;

    impl LineageEventPublisher for FailingPublisher {
        fn publish(
            &self,
            _event: LineageEvent,
        ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            Err("broker offline".into())
        }
    }

    #[tokio::test]
    async fn test_publish_failure_is_side_effect_warning() {
        let orchestrator = setup().with_event_publisher(Arc::new(FailingPublisher));
        let ctx = RequestContext::new("brewery-a", "brewer");
        let commit = orchestrator
            .allocate(&ctx, &request(&[("T1", 200.0)]))
            .await
            .unwrap();
        assert_eq!(commit.side_effect_warnings.len(), 1);
        assert!(commit.side_effect_warnings[0].contains("broker offline"));
    }
}
