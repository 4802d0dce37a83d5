// ==========================================
// 发酵批次与罐位分配引擎 - 混酿兼容性校验
// ==========================================
// 职责: 判定一组批次能否混入同一酒批
// 说明: 具体判定规则是可替换的策略 (BlendCompatibilityPolicy),
//       引擎只负责: compatible=false → 整笔混酿失败; warnings → 原样透传
// ==========================================

use crate::domain::batch::Batch;
use crate::domain::types::BatchStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument};

/// 兼容性报告
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompatibilityReport {
    pub compatible: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

// ==========================================
// 兼容性策略 Trait
// ==========================================

/// 混酿兼容性策略
///
/// # 参数
/// - `candidates`: 本次要混入的批次
/// - `existing`: 目标酒批中已有的贡献批次（新建混酿时为空）
pub trait BlendCompatibilityPolicy: Send + Sync {
    fn evaluate(&self, candidates: &[Batch], existing: &[Batch]) -> CompatibilityReport;
}

/// 默认策略: 按风格大类匹配
///
/// - 风格大类不一致 → 错误
/// - 已完成 / 已取消的批次 → 错误
/// - 缺少风格大类 → 警告
/// - 风格一致但配方不同 → 警告
/// - 批次已在发酵中 → 警告
#[derive(Debug, Clone, Default)]
pub struct StyleFamilyPolicy;

impl BlendCompatibilityPolicy for StyleFamilyPolicy {
    fn evaluate(&self, candidates: &[Batch], existing: &[Batch]) -> CompatibilityReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for batch in candidates {
            match batch.status {
                BatchStatus::Completed | BatchStatus::Cancelled => errors.push(format!(
                    "批次 {} 状态为 {}, 不能混酿",
                    batch.batch_number, batch.status
                )),
                BatchStatus::Fermenting => warnings.push(format!(
                    "批次 {} 已在发酵中",
                    batch.batch_number
                )),
                _ => {}
            }
        }

        let all: Vec<&Batch> = existing.iter().chain(candidates.iter()).collect();

        let families: BTreeSet<String> = all
            .iter()
            .filter_map(|b| b.style_family.as_deref())
            .map(|f| f.trim().to_uppercase())
            .filter(|f| !f.is_empty())
            .collect();
        if families.len() > 1 {
            errors.push(format!(
                "风格大类不一致: {}",
                families.into_iter().collect::<Vec<_>>().join(" / ")
            ));
        }

        for batch in candidates {
            let missing = batch
                .style_family
                .as_deref()
                .map(|f| f.trim().is_empty())
                .unwrap_or(true);
            if missing {
                warnings.push(format!(
                    "批次 {} 未登记风格大类, 无法确认兼容性",
                    batch.batch_number
                ));
            }
        }

        let recipes: BTreeSet<&str> = all
            .iter()
            .filter_map(|b| b.recipe_name.as_deref())
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .collect();
        if recipes.len() > 1 {
            warnings.push(format!(
                "配方不同: {}",
                recipes.into_iter().collect::<Vec<_>>().join(" / ")
            ));
        }

        CompatibilityReport {
            compatible: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

// ==========================================
// CompatibilityValidator
// ==========================================
#[derive(Clone)]
pub struct CompatibilityValidator {
    policy: Arc<dyn BlendCompatibilityPolicy>,
}

impl CompatibilityValidator {
    pub fn new(policy: Arc<dyn BlendCompatibilityPolicy>) -> Self {
        Self { policy }
    }

    /// 校验混酿兼容性
    #[instrument(skip_all, fields(candidates = candidates.len(), existing = existing.len()))]
    pub fn validate(&self, candidates: &[Batch], existing: &[Batch]) -> CompatibilityReport {
        let report = self.policy.evaluate(candidates, existing);
        debug!(
            compatible = report.compatible,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "混酿兼容性"
        );
        report
    }
}

impl Default for CompatibilityValidator {
    fn default() -> Self {
        Self::new(Arc::new(StyleFamilyPolicy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn batch(id: &str, family: Option<&str>, recipe: Option<&str>, status: BatchStatus) -> Batch {
        Batch {
            batch_id: id.to_string(),
            tenant_id: "brewery-a".to_string(),
            batch_number: format!("#{}", id),
            recipe_name: recipe.map(str::to_string),
            style_family: family.map(str::to_string),
            status,
            updated_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn test_same_family_is_compatible() {
        let validator = CompatibilityValidator::default();
        let report = validator.validate(
            &[
                batch("B1", Some("IPA"), Some("House IPA"), BatchStatus::Brewing),
                batch("B2", Some("ipa "), Some("House IPA"), BatchStatus::Brewing),
            ],
            &[],
        );
        assert!(report.compatible);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_family_mismatch_is_error() {
        let report = StyleFamilyPolicy.evaluate(
            &[
                batch("B1", Some("IPA"), None, BatchStatus::Brewing),
                batch("B2", Some("STOUT"), None, BatchStatus::Brewing),
            ],
            &[],
        );
        assert!(!report.compatible);
        assert!(report.errors[0].contains("STOUT"));
    }

    #[test]
    fn test_existing_contributors_considered() {
        let report = StyleFamilyPolicy.evaluate(
            &[batch("B2", Some("LAGER"), None, BatchStatus::Brewing)],
            &[batch("B1", Some("IPA"), None, BatchStatus::Fermenting)],
        );
        assert!(!report.compatible);
    }

    #[test]
    fn test_near_misses_are_warnings() {
        let report = StyleFamilyPolicy.evaluate(
            &[
                batch("B1", Some("IPA"), Some("House IPA"), BatchStatus::Fermenting),
                batch("B2", None, Some("Hazy IPA"), BatchStatus::Brewing),
            ],
            &[],
        );
        assert!(report.compatible);
        assert_eq!(report.warnings.len(), 3);
    }

    #[test]
    fn test_completed_batch_rejected() {
        let report = StyleFamilyPolicy.evaluate(
            &[batch("B1", Some("IPA"), None, BatchStatus::Completed)],
            &[],
        );
        assert!(!report.compatible);
    }
}
