/// 分析流水线 (Analysis Pipeline)
///
/// 两个阶段:
/// - track:   检测点 → 轨迹关联 → 漂移校正 → 轨迹集合
/// - analyze: 轨迹集合 + 帧源 → 单次扫描采样 → 运动学 → 分类 → 汇总报告
///
/// 单线程顺序执行; 帧源按值传入, 扫描结束 (或任何错误) 时立即释放,
/// 在调用分类器之前已关闭。
use std::collections::BTreeMap;
use std::sync::Arc;

use image::RgbImage;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{AnalysisError, Result};
use crate::input::FrameSource;
use crate::kinematics::{KinematicAnalyzer, KinematicSummary};
use crate::models::{ClassificationResult, MotionClassifier, MotionLabel, ShapeClassifier, ShapeLabel};
use crate::report::{
    particle_records, render_tracks, AggregateReport, Omissions, ParticleRecord, ResultAggregator,
};
use crate::sampling::{
    ClipSampler, ClipSet, NearestToCenter, SilhouetteExtractor, SilhouetteSet, TargetSelector,
};
use crate::tracking::{Detection, DriftCorrector, DriftProfile, ParticleId, TrajectoryLinker, TrajectorySet};

// ========== 阶段一: 轨迹 ==========

/// 轨迹阶段输出
#[derive(Debug, Clone)]
pub struct TrackingOutcome {
    pub trajectories: TrajectorySet,
    /// 漂移校正关闭时为 None
    pub drift: Option<DriftProfile>,
}

/// 检测点 → 校正后的轨迹
pub fn track(detections: Vec<Detection>, config: &PipelineConfig) -> Result<TrackingOutcome> {
    let linked = TrajectoryLinker::new(&config.linking).link(detections)?;

    if !config.drift.enabled {
        info!("⏭️ 漂移校正已关闭");
        return Ok(TrackingOutcome {
            trajectories: linked,
            drift: None,
        });
    }

    let (trajectories, drift) = DriftCorrector::new().correct(&linked);
    Ok(TrackingOutcome {
        trajectories,
        drift: Some(drift),
    })
}

// ========== 阶段二: 分析 ==========

/// 分析阶段输出
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub kinematics: Vec<KinematicSummary>,
    pub motion: Vec<ClassificationResult<MotionLabel>>,
    pub shape: Vec<ClassificationResult<ShapeLabel>>,
    pub report: AggregateReport,
    /// 扫描到的第一帧 (用于预览)
    pub first_frame: Option<RgbImage>,
}

impl AnalysisOutcome {
    pub fn particle_records(&self) -> Vec<ParticleRecord> {
        particle_records(&self.kinematics, &self.motion, &self.shape)
    }

    pub fn motion_labels(&self) -> BTreeMap<ParticleId, MotionLabel> {
        self.motion.iter().map(|r| (r.particle_id, r.label)).collect()
    }

    /// 第一帧上叠加全部轨迹
    pub fn preview(&self, set: &TrajectorySet) -> Option<RgbImage> {
        let frame = self.first_frame.as_ref()?;
        let (_, last) = set.frame_span()?;
        Some(render_tracks(frame, set, last, &self.motion_labels()))
    }
}

/// 单次扫描的采样结果
struct ScanOutput {
    clips: Option<ClipSet>,
    silhouettes: Option<SilhouetteSet>,
    first_frame: Option<RgbImage>,
}

/// 分析器: 持有配置与 (可选的) 两个分类器
///
/// 未配置的分类器对应维度跳过采样, 报告中为 indeterminate。
pub struct Analyzer {
    config: PipelineConfig,
    motion: Option<MotionClassifier>,
    shape: Option<ShapeClassifier>,
    selector: Arc<dyn TargetSelector>,
}

impl Analyzer {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            motion: None,
            shape: None,
            selector: Arc::new(NearestToCenter),
        }
    }

    pub fn with_motion_classifier(mut self, classifier: MotionClassifier) -> Self {
        self.motion = Some(classifier);
        self
    }

    pub fn with_shape_classifier(mut self, classifier: ShapeClassifier) -> Self {
        self.shape = Some(classifier);
        self
    }

    /// 替换形态分割的目标选择策略
    pub fn with_selector(mut self, selector: Arc<dyn TargetSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 运行分析
    pub fn analyze<S: FrameSource>(&mut self, set: &TrajectorySet, source: S) -> Result<AnalysisOutcome> {
        if set.is_empty() {
            return Err(AnalysisError::NoTrajectories {
                min_length: self.config.linking.min_length,
            });
        }

        // 1. 单次扫描 (帧源在此处释放)
        let scan = self.scan(set, source)?;

        // 2. 运动学
        let kinematics = KinematicAnalyzer::new(self.config.kinematics.fps).analyze_all(set);
        let overview = KinematicAnalyzer::overview(&kinematics);
        info!(
            "📐 运动学: {} 条轨迹, 平均VCL {:.2} px/s",
            overview.particles,
            overview.mean_velocity.unwrap_or(0.0)
        );

        // 3. 分类
        let mut omissions = Omissions::default();

        let motion = match (self.motion.as_mut(), &scan.clips) {
            (Some(classifier), Some(clips)) => {
                omissions.without_clip = clips.omitted().len();
                let ids = clips.ids();
                classifier.classify(&ids, clips.batch(&ids))?
            }
            _ => {
                warn!("⚠️ 未配置运动分类器, 活力诊断为 indeterminate");
                Vec::new()
            }
        };

        let shape = match (self.shape.as_mut(), &scan.silhouettes) {
            (Some(classifier), Some(silhouettes)) => {
                omissions.without_silhouette = silhouettes.omitted().len();
                omissions.no_target = silhouettes.no_target_count();
                let ids = silhouettes.target_ids();
                classifier.classify(&ids, silhouettes.batch(&ids))?
            }
            _ => {
                warn!("⚠️ 未配置形态分类器, 形态诊断为 indeterminate");
                Vec::new()
            }
        };

        // 4. 汇总
        let report = ResultAggregator::aggregate(&motion, &shape, set.len(), overview, omissions);
        info!(
            "📊 活力 {:?} (PR+NP {:.1}%), 形态 {:?} (正常 {:.1}%), 结论 {:?}",
            report.motility.diagnosis,
            report.motility.motile_percentage,
            report.morphology.diagnosis,
            report.morphology.normal_percentage,
            report.verdict
        );

        Ok(AnalysisOutcome {
            kinematics,
            motion,
            shape,
            report,
            first_frame: scan.first_frame,
        })
    }

    /// 一次前向扫描同时驱动两个采样器
    fn scan<S: FrameSource>(&self, set: &TrajectorySet, mut source: S) -> Result<ScanOutput> {
        let mut clips = self.motion.as_ref().map(|_| ClipSampler::new(set));
        let mut silhouettes = self.shape.as_ref().map(|_| {
            SilhouetteExtractor::new(set, &self.config.silhouette).with_selector(self.selector.clone())
        });
        let mut first_frame = None;
        let mut scanned = 0usize;

        loop {
            let pending = clips.as_ref().map_or(false, |c| !c.is_done())
                || silhouettes.as_ref().map_or(false, |s| !s.is_done());
            if !pending && first_frame.is_some() {
                break;
            }
            let Some(frame) = source.next_frame()? else {
                break;
            };
            scanned += 1;

            if let Some(sampler) = clips.as_mut() {
                sampler.observe(&frame);
            }
            if let Some(extractor) = silhouettes.as_mut() {
                extractor.observe(&frame);
            }
            if first_frame.is_none() {
                first_frame = Some(frame.image);
            }
        }

        match source.len_hint() {
            Some(total) => info!("🎬 扫描完成: {} / {} 帧", scanned, total),
            None => info!("🎬 扫描完成: {} 帧", scanned),
        }

        Ok(ScanOutput {
            clips: clips.map(ClipSampler::finish),
            silhouettes: silhouettes.map(SilhouetteExtractor::finish),
            first_frame,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::MemoryFrames;
    use crate::models::{ScoreFn, ScoringFunction};
    use ndarray::{Array2, ArrayD};

    fn walkers(n: u32, frames: u32) -> Vec<Detection> {
        (0..frames)
            .flat_map(|f| (0..n).map(move |i| Detection::new(f, 10.0 + f as f32, 10.0 + 20.0 * i as f32, 1.0)))
            .collect()
    }

    fn uniform(cols: usize, value: f32) -> Box<dyn ScoringFunction> {
        Box::new(ScoreFn(move |batch: ArrayD<f32>| -> anyhow::Result<Array2<f32>> {
            Ok(Array2::from_elem((batch.shape()[0], cols), value))
        }))
    }

    #[test]
    fn test_track_links_and_corrects() {
        let outcome = track(walkers(3, 20), &PipelineConfig::default()).unwrap();
        assert_eq!(outcome.trajectories.len(), 3);
        assert!(outcome.drift.is_some());

        let mut config = PipelineConfig::default();
        config.drift.enabled = false;
        let outcome = track(walkers(3, 20), &config).unwrap();
        assert!(outcome.drift.is_none());
    }

    #[test]
    fn test_track_without_detections() {
        let err = track(Vec::new(), &PipelineConfig::default()).unwrap_err();
        assert!(err.is_nothing_to_analyze());
    }

    #[test]
    fn test_empty_set_is_nothing_to_analyze() {
        let mut analyzer = Analyzer::new(PipelineConfig::default());
        let mut frames = MemoryFrames::new(vec![RgbImage::new(8, 8)]);
        let err = analyzer.analyze(&TrajectorySet::new(), &mut frames).unwrap_err();
        assert!(matches!(err, AnalysisError::NoTrajectories { .. }));
        assert_eq!(frames.consumed(), 0);
    }

    #[test]
    fn test_without_classifiers_reads_only_first_frame() {
        let set = track(walkers(2, 15), &PipelineConfig::default()).unwrap().trajectories;
        let mut analyzer = Analyzer::new(PipelineConfig::default());
        let mut frames = MemoryFrames::new(vec![RgbImage::new(64, 64); 15]);
        let outcome = analyzer.analyze(&set, &mut frames).unwrap();

        assert_eq!(frames.consumed(), 1);
        assert_eq!(outcome.kinematics.len(), 2);
        assert!(outcome.motion.is_empty());
        assert_eq!(outcome.report.verdict, crate::report::CombinedVerdict::Indeterminate);
        assert!(outcome.preview(&set).is_some());
    }

    #[test]
    fn test_classifier_failure_aborts_run() {
        let set = track(walkers(1, 12), &PipelineConfig::default()).unwrap().trajectories;
        let failing = ScoreFn(|_batch: ArrayD<f32>| -> anyhow::Result<Array2<f32>> {
            anyhow::bail!("model unavailable")
        });
        let mut analyzer = Analyzer::new(PipelineConfig::default())
            .with_motion_classifier(MotionClassifier::new(Box::new(failing), None));
        let frames = MemoryFrames::new(vec![RgbImage::new(64, 64); 12]);
        let err = analyzer.analyze(&set, frames).unwrap_err();
        assert!(matches!(err, AnalysisError::Classifier { axis: "motion", .. }));
    }

    #[test]
    fn test_motion_axis_reaches_report() {
        let set = track(walkers(3, 12), &PipelineConfig::default()).unwrap().trajectories;
        let mut analyzer = Analyzer::new(PipelineConfig::default())
            .with_motion_classifier(MotionClassifier::new(uniform(3, 1.0 / 3.0), Some(2)));
        let frames = MemoryFrames::new(vec![RgbImage::new(64, 80); 12]);
        let outcome = analyzer.analyze(&set, frames).unwrap();

        // 概率全部相同 → 取第一类 IM
        assert_eq!(outcome.motion.len(), 3);
        assert!(outcome.motion.iter().all(|r| r.label == MotionLabel::Immotile));
        assert_eq!(
            outcome.report.motility.diagnosis,
            crate::report::MotilityDiagnosis::InfertilePattern
        );
        assert_eq!(outcome.particle_records().len(), 3);
    }
}
