// ==========================================
// 发酵批次与罐位分配引擎 - SPLIT 工作流
// ==========================================
// 单批次 → N 罐:
// 1. 父批: 全量体积, 批次贡献 100%, 不占罐
// 2. 每个罐一个子批: parent_lot_id → 父批, 独立批次贡献 + 罐占用
//    + SPLIT 转移记录 (来源罐 = 第一个分配罐)
// 3. 批次 FERMENTING 一次, 时间线事件一条, 初始读数至多一条
// ==========================================

use crate::domain::assignment::TankAssignment;
use crate::domain::batch::Batch;
use crate::domain::lot::{Lot, LotBatch};
use crate::domain::request::SplitPlan;
use crate::domain::tank::Tank;
use crate::domain::transfer::Transfer;
use crate::domain::types::{
    BatchEventType, BatchStatus, SplitPercentageMode, TransferStatus, TransferType,
};
use crate::engine::error::{AllocationError, AllocationResult};
use crate::engine::lot_code::child_code;
use crate::engine::workflow::WorkflowContext;
use crate::repository::{AssignmentRepository, LotRepository, TransferRepository};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitOutcome {
    pub parent_lot: Lot,
    pub child_lots: Vec<Lot>,
    pub lot_batches: Vec<LotBatch>,
    pub assignments: Vec<TankAssignment>,
    pub transfers: Vec<Transfer>,
    pub batch: Batch,
}

/// 子批百分比
///
/// - Round: 每个子批 round(v / total * 100), 合计可能偏离 100
/// - NormalizeLast: 前 N-1 个取整, 最后一个吸收余数（不低于 0）, 合计为 100
pub fn split_percentages(volumes: &[f64], mode: SplitPercentageMode) -> Vec<f64> {
    let total: f64 = volumes.iter().sum();
    if volumes.is_empty() || total <= 0.0 {
        return vec![0.0; volumes.len()];
    }

    let rounded: Vec<f64> = volumes.iter().map(|v| (v / total * 100.0).round()).collect();
    match mode {
        SplitPercentageMode::Round => rounded,
        SplitPercentageMode::NormalizeLast => {
            let last = volumes.len() - 1;
            let head: f64 = rounded[..last].iter().sum();
            let mut result = rounded;
            result[last] = (100.0 - head).max(0.0);
            result
        }
    }
}

/// `tanks` 与 `plan.allocations` 一一对应（同序）
pub fn run(
    wf: &WorkflowContext<'_>,
    plan: &SplitPlan,
    tanks: &[Tank],
    batch: &Batch,
) -> AllocationResult<SplitOutcome> {
    if tanks.len() != plan.allocations.len() || tanks.is_empty() {
        return Err(AllocationError::InvalidCombination(format!(
            "分罐目标数量不匹配: {} 个分配, {} 个罐",
            plan.allocations.len(),
            tanks.len()
        )));
    }

    let total = plan.total_volume();
    let volumes: Vec<f64> = plan.allocations.iter().map(|a| a.volume).collect();
    let percentages = split_percentages(&volumes, wf.settings.split_percentage_mode);
    debug!(?percentages, mode = ?wf.settings.split_percentage_mode, "分罐百分比");

    // ===== 父批 =====
    let code = wf.codes.next_code(
        wf.conn,
        &wf.request.tenant_id,
        &wf.settings.lot_code_prefix,
        wf.now,
    )?;
    let parent_lot = wf.new_lot(code, total, None, false, plan.common.notes.clone());
    LotRepository::insert(wf.conn, &parent_lot)?;

    let parent_link = wf.new_lot_batch(&parent_lot.lot_id, &batch.batch_id, total, 100.0);
    LotRepository::insert_lot_batch(wf.conn, &parent_link)?;

    let source_tank_id = tanks[0].tank_id.clone();

    // ===== 子批 =====
    let mut child_lots = Vec::with_capacity(tanks.len());
    let mut lot_batches = vec![parent_link];
    let mut assignments = Vec::with_capacity(tanks.len());
    let mut transfers = Vec::with_capacity(tanks.len());

    for (index, ((allocation, tank), percentage)) in plan
        .allocations
        .iter()
        .zip(tanks.iter())
        .zip(percentages.iter())
        .enumerate()
    {
        let child = wf.new_lot(
            child_code(&parent_lot.lot_code, index + 1),
            allocation.volume,
            Some(parent_lot.lot_id.clone()),
            false,
            plan.common.notes.clone(),
        );
        LotRepository::insert(wf.conn, &child)?;

        let link = wf.new_lot_batch(&child.lot_id, &batch.batch_id, allocation.volume, *percentage);
        LotRepository::insert_lot_batch(wf.conn, &link)?;

        let assignment = wf.new_assignment(&tank.tank_id, &child, allocation.volume, &plan.common);
        AssignmentRepository::insert(wf.conn, &assignment)?;

        let transfer = Transfer {
            transfer_id: Uuid::new_v4().to_string(),
            tenant_id: wf.request.tenant_id.clone(),
            transfer_type: TransferType::Split,
            source_tank_id: Some(source_tank_id.clone()),
            destination_tank_id: tank.tank_id.clone(),
            source_lot_id: Some(parent_lot.lot_id.clone()),
            destination_lot_id: child.lot_id.clone(),
            batch_id: Some(batch.batch_id.clone()),
            volume: allocation.volume,
            status: TransferStatus::Completed,
            executed_by: wf.request.user_id.clone(),
            executed_at: wf.now,
        };
        TransferRepository::insert(wf.conn, &transfer)?;

        child_lots.push(child);
        lot_batches.push(link);
        assignments.push(assignment);
        transfers.push(transfer);
    }

    // ===== 批次状态 / 时间线 =====
    let tank_names: Vec<&str> = tanks.iter().map(|t| t.name.as_str()).collect();
    let destinations: Vec<_> = child_lots
        .iter()
        .zip(tanks.iter())
        .map(|(child, tank)| {
            json!({
                "tank_id": tank.tank_id,
                "tank_name": tank.name,
                "lot_id": child.lot_id,
                "lot_code": child.lot_code,
                "volume": child.planned_volume,
            })
        })
        .collect();

    wf.start_fermentation(
        batch,
        BatchEventType::SplitToTanks,
        format!(
            "分罐发酵: {} → {}, 父批 {}, 总体积 {}",
            batch.batch_number,
            tank_names.join(", "),
            parent_lot.lot_code,
            total
        ),
        Some(json!({
            "parent_lot_id": parent_lot.lot_id,
            "parent_lot_code": parent_lot.lot_code,
            "destinations": destinations,
        })),
        plan.common.initial_reading,
    )?;

    info!(
        parent_lot_code = %parent_lot.lot_code,
        batch_id = %batch.batch_id,
        children = child_lots.len(),
        total,
        "SPLIT 分配完成"
    );

    let mut batch = batch.clone();
    batch.status = BatchStatus::Fermenting;
    batch.updated_at = wf.now;

    Ok(SplitOutcome {
        parent_lot,
        child_lots,
        lot_batches,
        assignments,
        transfers,
        batch,
    })
}
