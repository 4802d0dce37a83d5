// ==========================================
// 发酵批次与罐位分配引擎 - 分配工作流
// ==========================================
// 职责: 三种场景的事务内写入流程
// - simple: 单批次 → 单罐
// - split: 单批次 → 多罐 (父批 + 子批 + 转移记录)
// - blend: 多批次 → 单罐 (新建或并入已有酒批)
// 红线: 工作流只在编排器打开的事务内运行, 任何一步失败整笔回滚
// ==========================================

pub mod blend;
pub mod simple;
pub mod split;

use crate::config::AllocationSettings;
use crate::domain::assignment::TankAssignment;
use crate::domain::batch::{Batch, BatchEvent, GravityReading};
use crate::domain::lot::{Lot, LotBatch};
use crate::domain::request::{InitialReading, PlanCommon, RequestContext};
use crate::domain::transfer::Transfer;
use crate::domain::types::{
    AllocationScenario, AssignmentStatus, BatchEventType, BatchStatus, LotStatus,
};
use crate::engine::lot_code::LotCodeGenerator;
use crate::engine::side_effects::TankDisplayUpdate;
use crate::repository::error::RepositoryResult;
use crate::repository::BatchRepository;
use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub use blend::{BlendOutcome, BlendTargetContext};
pub use simple::SimpleOutcome;
pub use split::{split_percentages, SplitOutcome};

/// 工作流执行上下文（事务内有效）
pub struct WorkflowContext<'a> {
    pub conn: &'a Connection,
    pub request: &'a RequestContext,
    pub settings: &'a AllocationSettings,
    pub codes: &'a dyn LotCodeGenerator,
    pub now: NaiveDateTime,
}

impl<'a> WorkflowContext<'a> {
    /// 新建 ACTIVE 酒批（未落库）
    pub(crate) fn new_lot(
        &self,
        lot_code: String,
        planned_volume: f64,
        parent_lot_id: Option<String>,
        blend: bool,
        notes: Option<String>,
    ) -> Lot {
        Lot {
            lot_id: Uuid::new_v4().to_string(),
            tenant_id: self.request.tenant_id.clone(),
            lot_code,
            phase: self.settings.default_lot_phase,
            status: LotStatus::Active,
            planned_volume,
            parent_lot_id,
            is_blend_result: blend,
            is_blend_target: blend,
            blended_at: None,
            notes,
            created_by: self.request.user_id.clone(),
            created_at: self.now,
            updated_at: self.now,
        }
    }

    /// 新建 ACTIVE 罐占用（未落库）
    pub(crate) fn new_assignment(
        &self,
        tank_id: &str,
        lot: &Lot,
        planned_volume: f64,
        common: &PlanCommon,
    ) -> TankAssignment {
        TankAssignment {
            assignment_id: Uuid::new_v4().to_string(),
            tenant_id: self.request.tenant_id.clone(),
            tank_id: tank_id.to_string(),
            lot_id: lot.lot_id.clone(),
            planned_start: common.planned_start,
            planned_end: common.planned_end,
            planned_volume,
            actual_volume: None,
            phase: lot.phase,
            status: AssignmentStatus::Active,
            created_by: self.request.user_id.clone(),
            created_at: self.now,
            updated_at: self.now,
        }
    }

    pub(crate) fn new_lot_batch(
        &self,
        lot_id: &str,
        batch_id: &str,
        volume_contribution: f64,
        batch_percentage: f64,
    ) -> LotBatch {
        LotBatch {
            lot_batch_id: Uuid::new_v4().to_string(),
            lot_id: lot_id.to_string(),
            batch_id: batch_id.to_string(),
            volume_contribution,
            batch_percentage,
            created_at: self.now,
        }
    }

    /// 批次进入发酵: 状态 → FERMENTING, 追加时间线事件, 可选记录初始读数
    pub(crate) fn start_fermentation(
        &self,
        batch: &Batch,
        event_type: BatchEventType,
        message: String,
        metadata: Option<JsonValue>,
        reading: Option<InitialReading>,
    ) -> RepositoryResult<()> {
        BatchRepository::update_status(self.conn, &batch.batch_id, BatchStatus::Fermenting, self.now)?;

        BatchRepository::insert_event(
            self.conn,
            &BatchEvent {
                event_id: Uuid::new_v4().to_string(),
                batch_id: batch.batch_id.clone(),
                event_type,
                message,
                metadata_json: metadata,
                created_at: self.now,
                created_by: self.request.user_id.clone(),
            },
        )?;

        if let Some(reading) = reading {
            BatchRepository::insert_gravity_reading(
                self.conn,
                &GravityReading {
                    reading_id: Uuid::new_v4().to_string(),
                    batch_id: batch.batch_id.clone(),
                    specific_gravity: reading.specific_gravity,
                    temperature: reading.temperature,
                    recorded_at: self.now,
                    recorded_by: self.request.user_id.clone(),
                },
            )?;
        }
        Ok(())
    }
}

// ==========================================
// WorkflowOutcome - 工作流产出
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "scenario", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowOutcome {
    Simple(SimpleOutcome),
    Split(SplitOutcome),
    Blend(BlendOutcome),
}

impl WorkflowOutcome {
    pub fn scenario(&self) -> AllocationScenario {
        match self {
            WorkflowOutcome::Simple(_) => AllocationScenario::Simple,
            WorkflowOutcome::Split(_) => AllocationScenario::Split,
            WorkflowOutcome::Blend(_) => AllocationScenario::Blend,
        }
    }

    /// 主酒批（SIMPLE 的酒批 / SPLIT 的父批 / BLEND 的目标酒批）
    pub fn primary_lot(&self) -> &Lot {
        match self {
            WorkflowOutcome::Simple(o) => &o.lot,
            WorkflowOutcome::Split(o) => &o.parent_lot,
            WorkflowOutcome::Blend(o) => &o.lot,
        }
    }

    /// 产生或更新的转移记录
    pub fn transfers(&self) -> &[Transfer] {
        match self {
            WorkflowOutcome::Simple(_) => &[],
            WorkflowOutcome::Split(o) => &o.transfers,
            WorkflowOutcome::Blend(o) => &o.transfers,
        }
    }

    /// 提交后需要刷新的罐展示字段
    pub fn display_updates(&self) -> Vec<TankDisplayUpdate> {
        match self {
            WorkflowOutcome::Simple(o) => vec![TankDisplayUpdate {
                tank_id: o.tank.tank_id.clone(),
                current_volume: o.assignment.planned_volume,
                lot_code: o.lot.lot_code.clone(),
                batch_label: o.batch.batch_number.clone(),
            }],
            WorkflowOutcome::Split(o) => o
                .assignments
                .iter()
                .zip(o.child_lots.iter())
                .map(|(a, child)| TankDisplayUpdate {
                    tank_id: a.tank_id.clone(),
                    current_volume: a.planned_volume,
                    lot_code: child.lot_code.clone(),
                    batch_label: o.batch.batch_number.clone(),
                })
                .collect(),
            WorkflowOutcome::Blend(o) => vec![TankDisplayUpdate {
                tank_id: o.tank.tank_id.clone(),
                current_volume: o.assignment.planned_volume,
                lot_code: o.lot.lot_code.clone(),
                batch_label: o
                    .batches
                    .iter()
                    .map(|b| b.batch_number.as_str())
                    .collect::<Vec<_>>()
                    .join(" + "),
            }],
        }
    }

    /// 审计摘要
    pub fn summary(&self) -> String {
        match self {
            WorkflowOutcome::Simple(o) => format!(
                "批次 {} → 罐 {} ({}), 酒批 {}",
                o.batch.batch_number, o.tank.name, o.assignment.planned_volume, o.lot.lot_code
            ),
            WorkflowOutcome::Split(o) => format!(
                "批次 {} 分罐 {} 路, 父批 {} ({})",
                o.batch.batch_number,
                o.child_lots.len(),
                o.parent_lot.lot_code,
                o.parent_lot.planned_volume
            ),
            WorkflowOutcome::Blend(o) => format!(
                "{} 个批次混入罐 {}, 酒批 {} (+{})",
                o.batches.len(),
                o.tank.name,
                o.lot.lot_code,
                o.added_volume
            ),
        }
    }
}
