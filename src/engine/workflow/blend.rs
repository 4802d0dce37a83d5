// ==========================================
// 发酵批次与罐位分配引擎 - BLEND 工作流
// ==========================================
// M 批次 → 单罐:
// 1. 目标: 并入已有酒批（复用其酒批与罐占用）或新建混酿酒批 + 罐占用
// 2. 每个批次: 贡献 = 体积 / M, 百分比 = 100 / M; FERMENTING; 时间线;
//    可选初始读数; BLEND 转移记录
// 3. 标记混酿结果 + blended_at; 混酿编码只分配一次:
//    本次新建的酒批与已是混酿结果的酒批不再换码, 其余按编码格式判断
// 4. 按目标占用的实时体积复核容量, 失败则整笔回滚
// 5. 目标酒批与罐占用的计划体积累加
// ==========================================

use crate::domain::assignment::TankAssignment;
use crate::domain::batch::Batch;
use crate::domain::lot::{Lot, LotBatch};
use crate::domain::request::{BlendPlan, BlendTarget};
use crate::domain::tank::Tank;
use crate::domain::transfer::Transfer;
use crate::domain::types::{BatchEventType, BatchStatus, TransferStatus, TransferType};
use crate::engine::capacity::{CapacityCheck, CapacityValidator};
use crate::engine::error::{AllocationError, AllocationResult};
use crate::engine::lot_code::is_blend_code;
use crate::engine::workflow::WorkflowContext;
use crate::repository::error::RepositoryError;
use crate::repository::{AssignmentRepository, LotRepository, TransferRepository};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

/// 并入已有酒批时的目标（事务内加载）
#[derive(Debug, Clone)]
pub struct BlendTargetContext {
    pub lot: Lot,
    pub assignment: TankAssignment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlendOutcome {
    pub lot: Lot,
    pub assignment: TankAssignment,
    pub tank: Tank,
    pub batches: Vec<Batch>,
    pub lot_batches: Vec<LotBatch>,
    pub transfers: Vec<Transfer>,
    pub added_volume: f64,
    pub created_new_lot: bool,
    /// 本次请求分配的混酿编码（未分配为 None）
    pub blend_code_assigned: Option<String>,
    pub capacity: CapacityCheck,
}

/// `target` 仅在 `plan.target` 为 ExistingLot 时提供; `tank` 为实际目标罐
pub fn run(
    wf: &WorkflowContext<'_>,
    plan: &BlendPlan,
    tank: &Tank,
    batches: &[Batch],
    target: Option<BlendTargetContext>,
) -> AllocationResult<BlendOutcome> {
    if batches.is_empty() {
        return Err(AllocationError::NoBatches);
    }

    let added_volume = plan.allocation.volume;
    let batch_count = batches.len() as f64;
    let mut blend_code_assigned = None;

    // ===== 1. 目标酒批 / 罐占用 =====
    let (lot, assignment, created_new_lot) = match (&plan.target, target) {
        (BlendTarget::ExistingLot(_), Some(ctx)) => (ctx.lot, ctx.assignment, false),
        (BlendTarget::ExistingLot(lot_id), None) => {
            return Err(AllocationError::TargetLotNotFound {
                lot_id: lot_id.clone(),
            });
        }
        (BlendTarget::NewLot, _) => {
            let code = wf.codes.next_code(
                wf.conn,
                &wf.request.tenant_id,
                &wf.settings.blend_code_prefix,
                wf.now,
            )?;
            let lot = wf.new_lot(code.clone(), 0.0, None, true, plan.common.notes.clone());
            LotRepository::insert(wf.conn, &lot)?;

            let assignment = wf.new_assignment(&tank.tank_id, &lot, 0.0, &plan.common);
            AssignmentRepository::insert(wf.conn, &assignment)?;

            blend_code_assigned = Some(code);
            (lot, assignment, true)
        }
    };

    // ===== 2. 逐批次链接 =====
    let contribution = added_volume / batch_count;
    let percentage = 100.0 / batch_count;
    let mut lot_batches = Vec::with_capacity(batches.len());
    let mut transfers = Vec::with_capacity(batches.len());

    for batch in batches {
        let link = wf.new_lot_batch(&lot.lot_id, &batch.batch_id, contribution, percentage);
        LotRepository::insert_lot_batch(wf.conn, &link)?;

        wf.start_fermentation(
            batch,
            BatchEventType::BlendedIntoLot,
            format!(
                "混入罐 {} 酒批 {}, 贡献体积 {}",
                tank.name, lot.lot_code, contribution
            ),
            Some(json!({
                "lot_id": lot.lot_id,
                "tank_id": tank.tank_id,
                "tank_name": tank.name,
                "volume_contribution": contribution,
                "batch_percentage": percentage,
                "batch_count": batches.len(),
            })),
            plan.common.initial_reading,
        )?;

        let transfer = Transfer {
            transfer_id: Uuid::new_v4().to_string(),
            tenant_id: wf.request.tenant_id.clone(),
            transfer_type: TransferType::Blend,
            source_tank_id: None,
            destination_tank_id: tank.tank_id.clone(),
            source_lot_id: None,
            destination_lot_id: lot.lot_id.clone(),
            batch_id: Some(batch.batch_id.clone()),
            volume: contribution,
            status: TransferStatus::Completed,
            executed_by: wf.request.user_id.clone(),
            executed_at: wf.now,
        };
        TransferRepository::insert(wf.conn, &transfer)?;

        lot_batches.push(link);
        transfers.push(transfer);
    }

    // ===== 3. 混酿标记 + 编码（幂等） =====
    let already_coded = created_new_lot
        || lot.is_blend_result
        || is_blend_code(&lot.lot_code, &wf.settings.blend_code_prefix);
    let new_code = if already_coded {
        None
    } else {
        let code = wf.codes.next_code(
            wf.conn,
            &wf.request.tenant_id,
            &wf.settings.blend_code_prefix,
            wf.now,
        )?;
        info!(lot_id = %lot.lot_id, old_code = %lot.lot_code, new_code = %code, "分配混酿编码");
        Some(code)
    };
    LotRepository::mark_blend_result(wf.conn, &lot.lot_id, wf.now, new_code.as_deref())?;
    if new_code.is_some() {
        blend_code_assigned = new_code;
    }

    // ===== 4. 容量复核（实时目标占用） =====
    let live_assignment = AssignmentRepository::find_by_id(wf.conn, &assignment.assignment_id)?
        .ok_or_else(|| RepositoryError::NotFound {
            entity: "TankAssignment".to_string(),
            id: assignment.assignment_id.clone(),
        })?;
    let capacity =
        CapacityValidator::validate_for_target(wf.conn, tank, &live_assignment, added_volume)?;
    if !capacity.ok {
        warn!(
            tank_id = %tank.tank_id,
            total_after = capacity.total_after,
            capacity = capacity.capacity,
            "混酿容量复核失败, 回滚"
        );
    }
    capacity.ensure_fits(tank)?;

    // ===== 5. 体积累加 =====
    LotRepository::add_planned_volume(wf.conn, &lot.lot_id, added_volume, wf.now)?;
    AssignmentRepository::add_planned_volume(
        wf.conn,
        &assignment.assignment_id,
        added_volume,
        wf.now,
    )?;

    let lot = LotRepository::find_by_id(wf.conn, &wf.request.tenant_id, &lot.lot_id)?
        .ok_or_else(|| RepositoryError::NotFound {
            entity: "Lot".to_string(),
            id: lot.lot_id.clone(),
        })?;
    let assignment = AssignmentRepository::find_by_id(wf.conn, &assignment.assignment_id)?
        .ok_or_else(|| RepositoryError::NotFound {
            entity: "TankAssignment".to_string(),
            id: assignment.assignment_id.clone(),
        })?;

    info!(
        lot_code = %lot.lot_code,
        tank_id = %tank.tank_id,
        batch_count = batches.len(),
        added_volume,
        created_new_lot,
        "BLEND 分配完成"
    );

    let batches = batches
        .iter()
        .cloned()
        .map(|mut b| {
            b.status = BatchStatus::Fermenting;
            b.updated_at = wf.now;
            b
        })
        .collect();

    Ok(BlendOutcome {
        lot,
        assignment,
        tank: tank.clone(),
        batches,
        lot_batches,
        transfers,
        added_volume,
        created_new_lot,
        blend_code_assigned,
        capacity,
    })
}
