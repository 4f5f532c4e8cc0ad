//! 结果汇总 (Result aggregation)
//!
//! 统计各类别数量/百分比, 按固定阈值给出诊断:
//! - 活力: PR% + NP% > 40 → fertile-pattern, 否则 infertile-pattern
//! - 形态: normal% > 4 → normal, 否则 abnormal
//! - 总体样本为0 → 全部 0%, indeterminate
//!
//! 置信度只用于报告, 不参与诊断。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::kinematics::KinematicOverview;
use crate::models::{ClassificationResult, Label, MotionLabel, ShapeLabel};

/// 前向 + 非前向运动百分比阈值
pub const MOTILITY_THRESHOLD_PCT: f64 = 40.0;

/// 正常形态百分比阈值
pub const MORPHOLOGY_THRESHOLD_PCT: f64 = 4.0;

// ========== 诊断 ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MotilityDiagnosis {
    FertilePattern,
    InfertilePattern,
    Indeterminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MorphologyDiagnosis {
    Normal,
    Abnormal,
    Indeterminate,
}

/// 两个维度的综合结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CombinedVerdict {
    BothNormal,
    AnyAbnormal,
    Indeterminate,
}

impl CombinedVerdict {
    /// 任一维度异常 → any-abnormal; 否则任一不确定 → indeterminate
    pub fn from_diagnoses(motility: MotilityDiagnosis, morphology: MorphologyDiagnosis) -> Self {
        match (motility, morphology) {
            (MotilityDiagnosis::InfertilePattern, _) | (_, MorphologyDiagnosis::Abnormal) => {
                CombinedVerdict::AnyAbnormal
            }
            (MotilityDiagnosis::FertilePattern, MorphologyDiagnosis::Normal) => {
                CombinedVerdict::BothNormal
            }
            _ => CombinedVerdict::Indeterminate,
        }
    }
}

// ========== 类别统计 ==========

/// 单个维度的类别计数与百分比
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelStats<L: Ord> {
    pub total: usize,
    pub counts: BTreeMap<L, usize>,
    pub percentages: BTreeMap<L, f64>,
    /// 平均置信度 (仅报告)
    pub mean_confidence: Option<f64>,
}

impl<L: Label> LabelStats<L> {
    pub fn from_results(results: &[ClassificationResult<L>]) -> Self {
        let mut counts: BTreeMap<L, usize> = L::ALL.iter().map(|&l| (l, 0)).collect();
        for r in results {
            *counts.entry(r.label).or_insert(0) += 1;
        }

        let total = results.len();
        let percentages = counts
            .iter()
            .map(|(&l, &n)| (l, percentage(n, total)))
            .collect();
        let mean_confidence = if total == 0 {
            None
        } else {
            Some(results.iter().map(|r| r.confidence as f64).sum::<f64>() / total as f64)
        };

        Self {
            total,
            counts,
            percentages,
            mean_confidence,
        }
    }

    pub fn count(&self, label: L) -> usize {
        self.counts.get(&label).copied().unwrap_or(0)
    }

    pub fn percentage(&self, label: L) -> f64 {
        self.percentages.get(&label).copied().unwrap_or(0.0)
    }

    /// 数量最多的类别 (并列取类别顺序靠前者), 空样本为 None
    pub fn dominant(&self) -> Option<L> {
        if self.total == 0 {
            return None;
        }
        let mut best: Option<(L, usize)> = None;
        for &l in L::ALL {
            let n = self.count(l);
            if best.map_or(true, |(_, b)| n > b) {
                best = Some((l, n));
            }
        }
        best.map(|(l, _)| l)
    }
}

/// 百分比, 分母为0时为0
fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}

// ========== 报告 ==========

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotilityReport {
    #[serde(flatten)]
    pub stats: LabelStats<MotionLabel>,
    pub dominant: Option<MotionLabel>,
    /// PR% + NP%
    pub motile_percentage: f64,
    pub diagnosis: MotilityDiagnosis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MorphologyReport {
    #[serde(flatten)]
    pub stats: LabelStats<ShapeLabel>,
    pub normal_percentage: f64,
    pub diagnosis: MorphologyDiagnosis,
}

/// 未参与分类的粒子数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Omissions {
    /// 没有任何可用裁剪 (无运动片段)
    pub without_clip: usize,
    /// 最佳帧无法裁剪
    pub without_silhouette: usize,
    /// 最佳帧无目标连通域
    pub no_target: usize,
}

/// 最终报告
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    /// RFC 3339
    pub generated_at: String,
    pub trajectories: usize,
    pub kinematics: KinematicOverview,
    pub motility: MotilityReport,
    pub morphology: MorphologyReport,
    pub verdict: CombinedVerdict,
    pub omissions: Omissions,
}

/// 结果汇总器
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultAggregator;

impl ResultAggregator {
    pub fn motility(results: &[ClassificationResult<MotionLabel>]) -> MotilityReport {
        let stats = LabelStats::from_results(results);
        let motile = stats.count(MotionLabel::Progressive) + stats.count(MotionLabel::NonProgressive);
        let motile_percentage = percentage(motile, stats.total);

        let diagnosis = if stats.total == 0 {
            MotilityDiagnosis::Indeterminate
        } else if motile_percentage > MOTILITY_THRESHOLD_PCT {
            MotilityDiagnosis::FertilePattern
        } else {
            MotilityDiagnosis::InfertilePattern
        };

        MotilityReport {
            dominant: stats.dominant(),
            stats,
            motile_percentage,
            diagnosis,
        }
    }

    pub fn morphology(results: &[ClassificationResult<ShapeLabel>]) -> MorphologyReport {
        let stats = LabelStats::from_results(results);
        let normal_percentage = stats.percentage(ShapeLabel::Normal);

        let diagnosis = if stats.total == 0 {
            MorphologyDiagnosis::Indeterminate
        } else if normal_percentage > MORPHOLOGY_THRESHOLD_PCT {
            MorphologyDiagnosis::Normal
        } else {
            MorphologyDiagnosis::Abnormal
        };

        MorphologyReport {
            stats,
            normal_percentage,
            diagnosis,
        }
    }

    /// 汇总两个维度并生成最终报告
    pub fn aggregate(
        motion: &[ClassificationResult<MotionLabel>],
        shape: &[ClassificationResult<ShapeLabel>],
        trajectories: usize,
        kinematics: KinematicOverview,
        omissions: Omissions,
    ) -> AggregateReport {
        let motility = Self::motility(motion);
        let morphology = Self::morphology(shape);
        let verdict = CombinedVerdict::from_diagnoses(motility.diagnosis, morphology.diagnosis);

        AggregateReport {
            generated_at: chrono::Local::now().to_rfc3339(),
            trajectories,
            kinematics,
            motility,
            morphology,
            verdict,
            omissions,
        }
    }
}
