/// 分析错误类型 (Analysis error taxonomy)
///
/// - 输入耗尽: `NoDetections` / `NoTrajectories`
/// - 分类器失败: `Classifier`
/// - 解码失败: `Decode`
///
/// 单个粒子采样失败不是错误,由采样器记录为 omission。
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no particles detected in input")]
    NoDetections,

    #[error("no trajectories survived filtering (min length {min_length})")]
    NoTrajectories { min_length: usize },

    #[error("{axis} classifier failed: {reason}")]
    Classifier { axis: &'static str, reason: String },

    #[error("frame decode failed: {0}")]
    Decode(String),

    #[error("invalid trajectory table: {0}")]
    Table(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AnalysisError {
    /// 是否为 "无可分析对象" 类错误
    pub fn is_nothing_to_analyze(&self) -> bool {
        matches!(
            self,
            AnalysisError::NoDetections | AnalysisError::NoTrajectories { .. }
        )
    }

    pub(crate) fn classifier(axis: &'static str, reason: impl Into<String>) -> Self {
        AnalysisError::Classifier {
            axis,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;
