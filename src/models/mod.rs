/// 分类器统一接口与实现
///
/// # 架构说明
///
/// 训练好的网络只被看作一个打分函数 (Scoring Function):
/// 批量张量进, `[N, C]` 概率矩阵出。分类器适配层负责:
/// - 按配置切分批次 (batch_size)
/// - 校验输出形状与取值 (有限, 位于 [0, 1])
/// - 概率 → 标签 + 置信度
///
/// - **MotionClassifier**: 片段 [N, 32, 64, 64, 3] → IM / NP / PR
/// - **ShapeClassifier**: 轮廓 [N, 224, 224, 3] → normal / abnormal
///
/// ## 使用示例
/// ```rust,ignore
/// use motility_rs::models::{MotionClassifier, ScoreFn};
///
/// let scorer = ScoreFn(|batch: ndarray::ArrayD<f32>| -> anyhow::Result<ndarray::Array2<f32>> {
///     Ok(ndarray::Array2::from_elem((batch.shape()[0], 3), 1.0 / 3.0))
/// });
/// let mut classifier = MotionClassifier::new(Box::new(scorer), None);
/// let results = classifier.classify(&ids, clips.batch(&ids))?;
/// ```
use std::fmt;

use ndarray::{concatenate, Array2, ArrayD, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::tracking::ParticleId;

pub mod motion;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod shape;

pub use motion::MotionClassifier;
#[cfg(feature = "onnx")]
pub use onnx::OrtScorer;
pub use shape::ShapeClassifier;

/// 概率允许的浮点误差
const PROB_TOLERANCE: f32 = 1e-4;

// ========== 打分函数 ==========

/// 打分函数: 批量输入 → [N, C] 概率
pub trait ScoringFunction: Send {
    fn score(&mut self, batch: ArrayD<f32>) -> anyhow::Result<Array2<f32>>;

    /// 日志中显示的名称
    fn name(&self) -> &str {
        "scorer"
    }
}

/// 闭包打分函数
pub struct ScoreFn<F>(pub F);

impl<F> ScoringFunction for ScoreFn<F>
where
    F: FnMut(ArrayD<f32>) -> anyhow::Result<Array2<f32>> + Send,
{
    fn score(&mut self, batch: ArrayD<f32>) -> anyhow::Result<Array2<f32>> {
        (self.0)(batch)
    }

    fn name(&self) -> &str {
        "closure"
    }
}

// ========== 标签 ==========

/// 分类标签
pub trait Label: Copy + Eq + Ord + fmt::Debug + 'static {
    /// 按模型输出列顺序排列的全部标签
    const ALL: &'static [Self];

    /// 报告中使用的代码
    fn code(&self) -> &'static str;
}

/// 运动类别 (模型输出列顺序: IM, NP, PR)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MotionLabel {
    /// 不动
    #[serde(rename = "IM")]
    Immotile,
    /// 非前向运动
    #[serde(rename = "NP")]
    NonProgressive,
    /// 前向运动
    #[serde(rename = "PR")]
    Progressive,
}

impl Label for MotionLabel {
    const ALL: &'static [Self] = &[
        MotionLabel::Immotile,
        MotionLabel::NonProgressive,
        MotionLabel::Progressive,
    ];

    fn code(&self) -> &'static str {
        match self {
            MotionLabel::Immotile => "IM",
            MotionLabel::NonProgressive => "NP",
            MotionLabel::Progressive => "PR",
        }
    }
}

/// 形态类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeLabel {
    Normal,
    Abnormal,
}

impl Label for ShapeLabel {
    const ALL: &'static [Self] = &[ShapeLabel::Normal, ShapeLabel::Abnormal];

    fn code(&self) -> &'static str {
        match self {
            ShapeLabel::Normal => "normal",
            ShapeLabel::Abnormal => "abnormal",
        }
    }
}

impl fmt::Display for MotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl fmt::Display for ShapeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// 单个粒子的分类结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationResult<L> {
    pub particle_id: ParticleId,
    pub label: L,
    /// 所选标签的概率
    pub confidence: f32,
}

// ========== 批量打分 ==========

/// 按批次调用打分函数并校验输出
///
/// `accepts_cols` 判断输出列数是否合法; 返回拼接后的 [N, C] 矩阵。
pub(crate) fn score_in_batches(
    scorer: &mut dyn ScoringFunction,
    axis: &'static str,
    inputs: ArrayD<f32>,
    batch_size: Option<usize>,
    accepts_cols: impl Fn(usize) -> bool,
) -> Result<Array2<f32>> {
    let total = inputs.len_of(Axis(0));
    if total == 0 {
        return Ok(Array2::zeros((0, 0)));
    }
    let chunk = batch_size.unwrap_or(total).max(1);

    let mut parts: Vec<Array2<f32>> = Vec::new();
    for batch in inputs.axis_chunks_iter(Axis(0), chunk) {
        let rows = batch.len_of(Axis(0));
        debug!(axis, rows, scorer = scorer.name(), "scoring batch");

        let scores = scorer
            .score(batch.to_owned())
            .map_err(|e| AnalysisError::classifier(axis, format!("{:#}", e)))?;

        if scores.nrows() != rows || !accepts_cols(scores.ncols()) {
            return Err(AnalysisError::classifier(
                axis,
                format!(
                    "unexpected output shape {:?} for batch of {}",
                    scores.shape(),
                    rows
                ),
            ));
        }
        if let Some(bad) = scores
            .iter()
            .find(|p| !p.is_finite() || **p < -PROB_TOLERANCE || **p > 1.0 + PROB_TOLERANCE)
        {
            return Err(AnalysisError::classifier(
                axis,
                format!("probability out of range: {}", bad),
            ));
        }
        parts.push(scores);
    }

    let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
    concatenate(Axis(0), &views).map_err(|e| AnalysisError::classifier(axis, e.to_string()))
}
