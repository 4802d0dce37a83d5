// ==========================================
// 发酵批次与罐位分配引擎 - SIMPLE 工作流
// ==========================================
// 单批次 → 单罐:
// 酒批(ACTIVE) → 批次贡献 100% → 罐占用(ACTIVE) → 批次 FERMENTING
// → 时间线事件 → 可选初始读数
// ==========================================

use crate::domain::assignment::TankAssignment;
use crate::domain::batch::Batch;
use crate::domain::lot::{Lot, LotBatch};
use crate::domain::request::SimplePlan;
use crate::domain::tank::Tank;
use crate::domain::types::{BatchEventType, BatchStatus};
use crate::engine::error::AllocationResult;
use crate::engine::workflow::WorkflowContext;
use crate::repository::{AssignmentRepository, LotRepository};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleOutcome {
    pub lot: Lot,
    pub lot_batch: LotBatch,
    pub assignment: TankAssignment,
    pub tank: Tank,
    pub batch: Batch,
}

pub fn run(
    wf: &WorkflowContext<'_>,
    plan: &SimplePlan,
    tank: &Tank,
    batch: &Batch,
) -> AllocationResult<SimpleOutcome> {
    let volume = plan.allocation.volume;

    let code = wf.codes.next_code(
        wf.conn,
        &wf.request.tenant_id,
        &wf.settings.lot_code_prefix,
        wf.now,
    )?;
    let lot = wf.new_lot(code, volume, None, false, plan.common.notes.clone());
    LotRepository::insert(wf.conn, &lot)?;

    let lot_batch = wf.new_lot_batch(&lot.lot_id, &batch.batch_id, volume, 100.0);
    LotRepository::insert_lot_batch(wf.conn, &lot_batch)?;

    let assignment = wf.new_assignment(&tank.tank_id, &lot, volume, &plan.common);
    AssignmentRepository::insert(wf.conn, &assignment)?;

    wf.start_fermentation(
        batch,
        BatchEventType::FermentationStarted,
        format!("入罐 {} 开始发酵, 酒批 {}, 体积 {}", tank.name, lot.lot_code, volume),
        Some(json!({
            "lot_id": lot.lot_id,
            "lot_code": lot.lot_code,
            "tank_id": tank.tank_id,
            "tank_name": tank.name,
            "volume": volume,
        })),
        plan.common.initial_reading,
    )?;

    info!(
        lot_code = %lot.lot_code,
        tank_id = %tank.tank_id,
        batch_id = %batch.batch_id,
        volume,
        "SIMPLE 分配完成"
    );

    let mut batch = batch.clone();
    batch.status = BatchStatus::Fermenting;
    batch.updated_at = wf.now;

    Ok(SimpleOutcome {
        lot,
        lot_batch,
        assignment,
        tank: tank.clone(),
        batch,
    })
}
