// ==========================================
// 发酵批次与罐位分配引擎 - 分配请求模型
// ==========================================
// 职责:
// - AllocationRequest: 入站请求形状 (边界处反序列化)
// - AllocationPlan: 校验后按场景区分的强类型请求 (封闭枚举)
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// RequestContext - 请求上下文
// ==========================================
// 由认证/租户中间件提供, 本引擎视为不透明标识
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub tenant_id: String,
    pub user_id: String,
}

impl RequestContext {
    pub fn new(tenant_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
        }
    }
}

// ==========================================
// TankAllocation - 单罐分配 (罐 + 体积)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankAllocation {
    pub tank_id: String,
    pub volume: f64,
}

impl TankAllocation {
    pub fn new(tank_id: impl Into<String>, volume: f64) -> Self {
        Self {
            tank_id: tank_id.into(),
            volume,
        }
    }
}

// ==========================================
// InitialReading - 入罐初始读数
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialReading {
    pub specific_gravity: f64,
    pub temperature: Option<f64>,
}

// ==========================================
// AllocationRequest - 入站分配请求
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub batch_ids: Vec<String>,
    pub allocations: Vec<TankAllocation>,
    pub planned_start: NaiveDateTime,
    pub planned_end: NaiveDateTime,
    #[serde(default)]
    pub blend: bool,
    #[serde(default)]
    pub target_lot_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub initial_gravity: Option<f64>,
    #[serde(default)]
    pub initial_temperature: Option<f64>,
}

impl AllocationRequest {
    /// 请求总体积
    pub fn total_volume(&self) -> f64 {
        self.allocations.iter().map(|a| a.volume).sum()
    }

    /// 初始读数 (仅在提供比重时记录, 温度单独提供时忽略)
    pub fn initial_reading(&self) -> Option<InitialReading> {
        self.initial_gravity.map(|sg| InitialReading {
            specific_gravity: sg,
            temperature: self.initial_temperature,
        })
    }

    /// 是否为并入已有酒批的混酿
    pub fn is_blend_into_existing(&self) -> bool {
        self.blend && self.target_lot_id.is_some()
    }
}

// ==========================================
// AllocationPlan - 按场景区分的强类型请求
// ==========================================

/// 公共字段: 时间窗 / 备注 / 初始读数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanCommon {
    pub planned_start: NaiveDateTime,
    pub planned_end: NaiveDateTime,
    pub notes: Option<String>,
    pub initial_reading: Option<InitialReading>,
}

/// 单批次 → 单罐
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplePlan {
    pub batch_id: String,
    pub allocation: TankAllocation,
    pub common: PlanCommon,
}

/// 单批次 → 多罐
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitPlan {
    pub batch_id: String,
    pub allocations: Vec<TankAllocation>,
    pub common: PlanCommon,
}

impl SplitPlan {
    pub fn total_volume(&self) -> f64 {
        self.allocations.iter().map(|a| a.volume).sum()
    }
}

/// 混酿目标
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "lot_id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlendTarget {
    /// 新建混酿酒批
    NewLot,
    /// 并入已有酒批 (罐已被该酒批占用)
    ExistingLot(String),
}

/// 多批次 → 单罐
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendPlan {
    pub batch_ids: Vec<String>,
    pub allocation: TankAllocation,
    pub target: BlendTarget,
    pub common: PlanCommon,
}

impl BlendPlan {
    pub fn is_into_existing(&self) -> bool {
        matches!(self.target, BlendTarget::ExistingLot(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scenario", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationPlan {
    Simple(SimplePlan),
    Split(SplitPlan),
    Blend(BlendPlan),
}

impl AllocationPlan {
    pub fn common(&self) -> &PlanCommon {
        match self {
            AllocationPlan::Simple(p) => &p.common,
            AllocationPlan::Split(p) => &p.common,
            AllocationPlan::Blend(p) => &p.common,
        }
    }

    /// 涉及的罐分配列表
    pub fn allocations(&self) -> Vec<&TankAllocation> {
        match self {
            AllocationPlan::Simple(p) => vec![&p.allocation],
            AllocationPlan::Split(p) => p.allocations.iter().collect(),
            AllocationPlan::Blend(p) => vec![&p.allocation],
        }
    }

    /// 涉及的批次列表
    pub fn batch_ids(&self) -> Vec<&str> {
        match self {
            AllocationPlan::Simple(p) => vec![p.batch_id.as_str()],
            AllocationPlan::Split(p) => vec![p.batch_id.as_str()],
            AllocationPlan::Blend(p) => p.batch_ids.iter().map(|s| s.as_str()).collect(),
        }
    }
}
