#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 配置参数 + 命令行
pub mod error; // 错误类型
pub mod input; // 检测点/视频帧输入
pub mod kinematics; // 运动学特征
pub mod models; // 分类器接口与实现
pub mod pipeline; // 分析流水线
pub mod report; // 汇总/导出/叠加图
pub mod sampling; // 运动片段 + 形态轮廓采样
pub mod tracking; // 轨迹关联 + 漂移校正
pub mod utils; // 裁剪工具

pub use crate::config::{Args, PipelineConfig};
pub use crate::error::{AnalysisError, Result};
pub use crate::kinematics::{KinematicAnalyzer, KinematicSummary};
pub use crate::models::{
    ClassificationResult, MotionClassifier, MotionLabel, ScoreFn, ScoringFunction, ShapeClassifier,
    ShapeLabel,
};
pub use crate::pipeline::{track, AnalysisOutcome, Analyzer, TrackingOutcome};
pub use crate::report::{AggregateReport, ResultAggregator};
pub use crate::tracking::{Detection, DriftCorrector, Trajectory, TrajectoryLinker, TrajectorySet};
