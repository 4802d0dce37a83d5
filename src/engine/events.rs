// ==========================================
// 发酵批次与罐位分配引擎 - 谱系事件发布
// ==========================================
// 职责: 定义谱系事件发布 trait, 供下游（报表 / 看板）订阅
// 红线: 事件只在分配事务提交后发布; 发布失败不影响已提交的数据
// ==========================================

use crate::engine::workflow::WorkflowOutcome;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 谱系事件类型
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineageEventType {
    /// 单罐入罐生成酒批
    LotCreated,
    /// 分罐生成父批 + 子批
    LotSplit,
    /// 批次混入酒批
    LotBlended,
}

impl LineageEventType {
    pub fn as_str(&self) -> &str {
        match self {
            LineageEventType::LotCreated => "LotCreated",
            LineageEventType::LotSplit => "LotSplit",
            LineageEventType::LotBlended => "LotBlended",
        }
    }
}

/// 谱系事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageEvent {
    pub event_type: LineageEventType,
    pub tenant_id: String,
    pub actor: String,
    /// 主酒批
    pub lot_id: String,
    pub lot_code: String,
    /// 分罐子批
    pub child_lot_ids: Vec<String>,
    pub tank_ids: Vec<String>,
    pub batch_ids: Vec<String>,
    pub volume: f64,
    pub occurred_at: NaiveDateTime,
}

impl LineageEvent {
    /// 从工作流产出构造事件
    pub fn from_outcome(
        outcome: &WorkflowOutcome,
        tenant_id: &str,
        actor: &str,
        occurred_at: NaiveDateTime,
    ) -> Self {
        let (event_type, child_lot_ids, tank_ids, batch_ids, volume) = match outcome {
            WorkflowOutcome::Simple(o) => (
                LineageEventType::LotCreated,
                Vec::new(),
                vec![o.tank.tank_id.clone()],
                vec![o.batch.batch_id.clone()],
                o.lot.planned_volume,
            ),
            WorkflowOutcome::Split(o) => (
                LineageEventType::LotSplit,
                o.child_lots.iter().map(|l| l.lot_id.clone()).collect(),
                o.assignments.iter().map(|a| a.tank_id.clone()).collect(),
                vec![o.batch.batch_id.clone()],
                o.parent_lot.planned_volume,
            ),
            WorkflowOutcome::Blend(o) => (
                LineageEventType::LotBlended,
                Vec::new(),
                vec![o.tank.tank_id.clone()],
                o.batches.iter().map(|b| b.batch_id.clone()).collect(),
                o.added_volume,
            ),
        };
        let lot = outcome.primary_lot();
        Self {
            event_type,
            tenant_id: tenant_id.to_string(),
            actor: actor.to_string(),
            lot_id: lot.lot_id.clone(),
            lot_code: lot.lot_code.clone(),
            child_lot_ids,
            tank_ids,
            batch_ids,
            volume,
            occurred_at,
        }
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 谱系事件发布者
///
/// # 返回
/// - `Ok(id)`: 下游消息 ID（如果支持）或空字符串
/// - `Err`: 发布失败（调用方记为副作用警告）
pub trait LineageEventPublisher: Send + Sync {
    fn publish(&self, event: LineageEvent) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl LineageEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: LineageEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - lot_code={}, event_type={}",
            event.lot_code,
            event.event_type.as_str()
        );
        Ok(String::new())
    }
}

/// 可选的事件发布者包装
///
/// 简化 Option<Arc<dyn LineageEventPublisher>> 的使用
#[derive(Clone)]
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn LineageEventPublisher>>,
}

impl OptionalEventPublisher {
    pub fn with_publisher(publisher: Arc<dyn LineageEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件（如果有发布者）
    pub fn publish(&self, event: LineageEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        match &self.inner {
            Some(publisher) => publisher.publish(event),
            None => {
                tracing::debug!(
                    "OptionalEventPublisher: 未配置发布者，跳过事件 - lot_code={}, event_type={}",
                    event.lot_code,
                    event.event_type.as_str()
                );
                Ok(String::new())
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}
