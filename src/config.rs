/// 配置参数 (Pipeline configuration + CLI arguments)
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

// ========== 固定常量 ==========

/// 每个运动片段的帧数
pub const CLIP_LENGTH: usize = 32;

/// 运动片段裁剪尺寸 (正方形边长)
pub const CLIP_CROP_SIZE: u32 = 64;

/// 形态轮廓图尺寸
pub const SILHOUETTE_SIZE: u32 = 224;

// ========== 流水线配置 ==========

/// 轨迹关联参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkingConfig {
    /// 最近邻搜索半径 (像素)
    pub search_range: f32,
    /// 允许跳过的帧数 (gap-closing)
    pub memory: u32,
    /// 最短轨迹长度 (检测点数)
    pub min_length: usize,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            search_range: 15.0,
            memory: 3,
            min_length: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    pub enabled: bool,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicsConfig {
    /// 视频帧率
    pub fps: f32,
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        Self { fps: 30.0 }
    }
}

/// 形态分割参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SilhouetteConfig {
    /// 最佳帧裁剪尺寸 (缩放前)
    pub crop_size: u32,
    /// 自适应阈值的高斯 sigma
    pub blur_sigma: f32,
    /// 自适应阈值偏移 (局部均值减去该值)
    pub offset: i16,
    pub erode_radius: u8,
    pub open_radius: u8,
    pub close_radius: u8,
}

impl Default for SilhouetteConfig {
    fn default() -> Self {
        Self {
            crop_size: 64,
            blur_sigma: 2.0,
            offset: 2,
            erode_radius: 1,
            open_radius: 1,
            close_radius: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// 形态判定阈值: P(abnormal) < threshold → normal
    pub shape_threshold: f32,
    /// 批量大小, None 表示一次提交全部样本
    pub batch_size: Option<usize>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            shape_threshold: 0.5,
            batch_size: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub linking: LinkingConfig,
    pub drift: DriftConfig,
    pub kinematics: KinematicsConfig,
    pub silhouette: SilhouetteConfig,
    pub classifier: ClassifierConfig,
}

impl PipelineConfig {
    /// 从JSON文件加载配置 (缺失字段使用默认值)
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: &str| Err(AnalysisError::Config(msg.to_string()));

        if !(self.linking.search_range > 0.0) {
            return bad("linking.search_range must be positive");
        }
        if self.linking.min_length == 0 {
            return bad("linking.min_length must be at least 1");
        }
        if !(self.kinematics.fps > 0.0) {
            return bad("kinematics.fps must be positive");
        }
        if self.silhouette.crop_size == 0 {
            return bad("silhouette.crop_size must be positive");
        }
        if !(self.silhouette.blur_sigma > 0.0) {
            return bad("silhouette.blur_sigma must be positive");
        }
        if !(0.0..=1.0).contains(&self.classifier.shape_threshold) {
            return bad("classifier.shape_threshold must lie in [0, 1]");
        }
        if self.classifier.batch_size == Some(0) {
            return bad("classifier.batch_size must be at least 1");
        }
        Ok(())
    }
}

// ========== 命令行参数 ==========

/// 精子运动/形态分析
#[derive(Parser, Debug)]
#[command(author, version, about = "精子活力与形态分析 - motility & morphology analysis", long_about = None)]
pub struct Args {
    /// JSON 配置文件 (可选)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 检测点 → 轨迹关联 + 漂移校正 → 轨迹表
    Track {
        /// 检测点CSV (frame,x,y,signal)
        #[arg(short, long)]
        detections: PathBuf,

        /// 输出轨迹表
        #[arg(short, long, default_value = "final_tracks.csv")]
        output: PathBuf,
    },

    /// 轨迹表 + 视频帧 → 运动学/分类/报告
    Analyze {
        /// 轨迹表 (particle,frame,x,y,signal)
        #[arg(short, long)]
        tracks: PathBuf,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },

    /// 完整流程: track + analyze
    Run {
        #[arg(short, long)]
        detections: PathBuf,

        /// 中间轨迹表输出路径
        #[arg(long, default_value = "final_tracks.csv")]
        tracks_out: PathBuf,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct AnalysisArgs {
    /// 视频帧目录 (按文件名排序的图像序列)
    #[arg(short, long)]
    pub frames: PathBuf,

    /// 运动分类模型 (ONNX, 需要 `onnx` 功能)
    #[arg(long)]
    pub motion_model: Option<PathBuf>,

    /// 形态分类模型 (ONNX, 需要 `onnx` 功能)
    #[arg(long)]
    pub shape_model: Option<PathBuf>,

    /// 报告输出 (JSON)
    #[arg(long, default_value = "report.json")]
    pub report: PathBuf,

    /// 逐粒子结果输出 (CSV)
    #[arg(long)]
    pub particles: Option<PathBuf>,

    /// 轨迹叠加预览图 (PNG)
    #[arg(long)]
    pub preview: Option<PathBuf>,
}
